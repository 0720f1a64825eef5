//! Content plumbing for dagcopy
//!
//! This crate provides the storage-side building blocks the copy engine is
//! wired from:
//!
//! - **[`Memory`]**: an in-memory content-addressable store and tag namespace
//! - **[`Proxy`]**: a read-through cache in front of a source store
//! - **[`OciEdgeFinder`]**: down-edge discovery for OCI / Docker manifests,
//!   image indexes and artifact manifests
//!
//! # Examples
//!
//! ```rust
//! use dagcopy_content::{fetch_all, Memory};
//! use dagcopy_types::{media_type, Descriptor};
//!
//! # tokio_test::block_on(async {
//! let memory = Memory::new();
//! let desc = Descriptor::from_bytes(media_type::OCI_CONFIG, b"{}");
//! memory.push_bytes(&desc, b"{}".to_vec()).await?;
//! assert_eq!(fetch_all(&memory, &desc).await?, b"{}");
//! # Ok::<(), dagcopy_types::Error>(())
//! # });
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use dagcopy_types::{ContentReader, Descriptor, Error, ReadOnlyStorage, Result};
use tokio::io::AsyncReadExt;

pub mod manifest;
pub mod memory;
pub mod proxy;

pub use manifest::{pack, ArtifactManifest, ImageIndex, ImageManifest, OciEdgeFinder};
pub use memory::Memory;
pub use proxy::Proxy;

/// Upper bound on the buffer reserved from a descriptor's declared size
const MAX_PREALLOC: usize = 1 << 20;

/// Fetch the whole content of `desc` into memory
pub async fn fetch_all<S>(storage: &S, desc: &Descriptor) -> Result<Vec<u8>>
where
    S: ReadOnlyStorage + ?Sized,
{
    let mut reader = storage.fetch(desc).await?;
    read_sized(&mut reader, desc).await
}

/// Read exactly `desc.size` bytes from `reader`.
///
/// Declared sizes come from untrusted manifests, so at most `size + 1`
/// bytes are read and a length mismatch is an [`Error::Verification`].
pub async fn read_sized(reader: &mut ContentReader, desc: &Descriptor) -> Result<Vec<u8>> {
    let hint = usize::try_from(desc.size)
        .unwrap_or(usize::MAX)
        .min(MAX_PREALLOC);
    let mut data = Vec::with_capacity(hint);
    reader
        .take(desc.size.saturating_add(1))
        .read_to_end(&mut data)
        .await?;

    if data.len() as u64 != desc.size {
        return Err(Error::verification(
            desc.digest.as_str(),
            format!("expected {} bytes, read {}", desc.size, data.len()),
        ));
    }
    Ok(data)
}
