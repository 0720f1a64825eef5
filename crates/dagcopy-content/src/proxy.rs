//! Caching proxy in front of a source store
//!
//! Structured nodes are read twice during a copy: once to discover their
//! children and once to push them to the destination. [`Proxy`] makes the
//! second read (and any repeated discovery) hit the cache instead of the
//! source.

use async_trait::async_trait;
use dagcopy_types::{ContentReader, Descriptor, ReadOnlyStorage, Result, Storage};
use std::io::Cursor;
use std::sync::Arc;
use tracing::trace;

use crate::read_sized;

/// Read-through cache over a source store
pub struct Proxy<S: ?Sized> {
    source: Arc<S>,
    cache: Arc<dyn Storage>,
}

impl<S: ReadOnlyStorage + ?Sized> Proxy<S> {
    /// Create a proxy that caches everything it reads from `source`
    pub fn new(source: Arc<S>, cache: Arc<dyn Storage>) -> Self {
        Self { source, cache }
    }

    /// The cache store
    pub fn cache(&self) -> &Arc<dyn Storage> {
        &self.cache
    }

    /// The underlying source store
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }
}

#[async_trait]
impl<S: ReadOnlyStorage + ?Sized> ReadOnlyStorage for Proxy<S> {
    async fn fetch(&self, desc: &Descriptor) -> Result<ContentReader> {
        match self.cache.fetch(desc).await {
            Ok(reader) => {
                trace!(digest = %desc.digest, "cache hit");
                return Ok(reader);
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let mut reader = self.source.fetch(desc).await?;
        let data = read_sized(&mut reader, desc).await?;
        drop(reader);
        let data: Arc<[u8]> = data.into();

        // another reader may have cached the same digest meanwhile
        match self
            .cache
            .push(desc, Box::new(Cursor::new(Arc::clone(&data))))
            .await
        {
            Ok(()) => trace!(digest = %desc.digest, "cached content from source"),
            Err(err) if err.is_already_exists() => {}
            Err(err) => return Err(err),
        }

        Ok(Box::new(Cursor::new(data)))
    }

    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        self.cache.exists(desc).await
    }
}
