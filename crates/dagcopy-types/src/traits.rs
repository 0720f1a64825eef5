//! Storage and discovery traits the copy engine is written against
//!
//! Concrete backends (registries, OCI layouts on disk, in-memory stores)
//! implement these traits; the engine only ever talks to `dyn`/generic
//! implementations.

use crate::{Descriptor, Result};
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Readable byte stream of one blob. Dropping it releases the underlying
/// resources.
pub type ContentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Read side of a content-addressable store
#[async_trait]
pub trait ReadOnlyStorage: Send + Sync {
    /// Open the content identified by `desc` for reading
    async fn fetch(&self, desc: &Descriptor) -> Result<ContentReader>;

    /// Check whether the content identified by `desc` is stored
    async fn exists(&self, desc: &Descriptor) -> Result<bool>;
}

/// Content-addressable store that can also be written to
#[async_trait]
pub trait Storage: ReadOnlyStorage {
    /// Store the content read from `content` under `desc`.
    ///
    /// Must fail with [`crate::Error::AlreadyExists`] when the digest is
    /// already stored.
    async fn push(&self, desc: &Descriptor, content: ContentReader) -> Result<()>;
}

/// Storage with a reference (tag) namespace
#[async_trait]
pub trait Target: Storage {
    /// Resolve a reference to the descriptor it points at
    async fn resolve(&self, reference: &str) -> Result<Descriptor>;

    /// Point `reference` at `desc`
    async fn tag(&self, desc: &Descriptor, reference: &str) -> Result<()>;
}

/// Down-edge discovery: lists the children of a node by fetching and
/// parsing its bytes.
#[async_trait]
pub trait EdgeFinder: Send + Sync {
    /// Return the ordered children of `desc`, or an empty list for leaf
    /// content. Implementations must not fetch content they cannot parse.
    async fn down_edges(
        &self,
        storage: &dyn ReadOnlyStorage,
        desc: &Descriptor,
    ) -> Result<Vec<Descriptor>>;
}
