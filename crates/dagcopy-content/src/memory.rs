//! In-memory content-addressable store
//!
//! [`Memory`] is the default cache of the copy engine and a convenient
//! [`Target`] for tests. Content is held as shared immutable buffers, so
//! concurrent fetches of one digest never copy the bytes.

use async_trait::async_trait;
use dagcopy_types::{
    ContentReader, Descriptor, Digest, Error, ReadOnlyStorage, Result, Storage, Target,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

use crate::read_sized;

/// Check sha256 content against its digest; other algorithms are trusted
fn verify_digest(desc: &Descriptor, data: &[u8]) -> Result<()> {
    if desc.digest.algorithm() != "sha256" {
        return Ok(());
    }
    let actual = Digest::sha256(data);
    if actual != desc.digest {
        return Err(Error::verification(
            desc.digest.as_str(),
            format!("content hashes to {}", actual),
        ));
    }
    Ok(())
}

/// In-memory CAS with a tag namespace
#[derive(Debug, Default)]
pub struct Memory {
    content: RwLock<HashMap<Digest, Arc<[u8]>>>,
    tags: RwLock<HashMap<String, Descriptor>>,
}

impl Memory {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `desc`, failing with [`Error::AlreadyExists`] on
    /// duplicates
    pub async fn push_bytes(&self, desc: &Descriptor, data: impl Into<Arc<[u8]>>) -> Result<()> {
        let mut content = self.content.write().await;
        if content.contains_key(&desc.digest) {
            return Err(Error::already_exists(desc.digest.as_str()));
        }
        content.insert(desc.digest.clone(), data.into());
        trace!(digest = %desc.digest, "stored content in memory");
        Ok(())
    }

    /// Read back the bytes stored under `desc`, if any
    pub async fn get(&self, desc: &Descriptor) -> Option<Arc<[u8]>> {
        self.content.read().await.get(&desc.digest).cloned()
    }

    /// Number of stored blobs
    pub async fn len(&self) -> usize {
        self.content.read().await.len()
    }

    /// Whether the store holds no blobs
    pub async fn is_empty(&self) -> bool {
        self.content.read().await.is_empty()
    }
}

#[async_trait]
impl ReadOnlyStorage for Memory {
    async fn fetch(&self, desc: &Descriptor) -> Result<ContentReader> {
        let data = self
            .get(desc)
            .await
            .ok_or_else(|| Error::not_found(desc.digest.as_str()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        Ok(self.content.read().await.contains_key(&desc.digest))
    }
}

#[async_trait]
impl Storage for Memory {
    async fn push(&self, desc: &Descriptor, mut content: ContentReader) -> Result<()> {
        if self.exists(desc).await? {
            return Err(Error::already_exists(desc.digest.as_str()));
        }
        let data = read_sized(&mut content, desc).await?;
        verify_digest(desc, &data)?;
        self.push_bytes(desc, data).await
    }
}

#[async_trait]
impl Target for Memory {
    async fn resolve(&self, reference: &str) -> Result<Descriptor> {
        self.tags
            .read()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::not_found(reference))
    }

    async fn tag(&self, desc: &Descriptor, reference: &str) -> Result<()> {
        if !self.exists(desc).await? {
            return Err(Error::not_found(desc.digest.as_str()));
        }
        self.tags
            .write()
            .await
            .insert(reference.to_string(), desc.clone());
        Ok(())
    }
}
