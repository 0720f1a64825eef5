//! Options for graph and reference copies

use dagcopy_config::Config;
use dagcopy_types::{Concurrency, Descriptor, EdgeFinder, Result, Storage};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-node callback invoked around transfers
pub type Hook = Arc<dyn Fn(Descriptor) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Callback mapping the resolved root to the node actually copied.
/// Returning `None` aborts the copy with [`dagcopy_types::Error::NotFound`].
pub type RootFilter =
    Arc<dyn Fn(Descriptor) -> BoxFuture<'static, Result<Option<Descriptor>>> + Send + Sync>;

fn hook<F, Fut>(f: F) -> Hook
where
    F: Fn(Descriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |desc| f(desc).boxed())
}

/// Options for [`crate::copy_graph`]
#[derive(Clone, Default)]
pub struct CopyGraphOptions {
    /// Maximum number of concurrently running node steps
    pub concurrency: Concurrency,
    /// Store for non-leaf content; a fresh in-memory store when unset
    pub cache: Option<Arc<dyn Storage>>,
    /// Down-edge discovery; OCI manifests when unset
    pub edge_finder: Option<Arc<dyn EdgeFinder>>,
    /// External cancellation of the whole copy
    pub cancellation: Option<CancellationToken>,
    /// Called right before a node is transferred
    pub pre_copy: Option<Hook>,
    /// Called right after a node was transferred
    pub post_copy: Option<Hook>,
    /// Called when a node already exists at the destination
    pub skipped: Option<Hook>,
}

impl CopyGraphOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.copy.concurrency(),
            ..Self::default()
        }
    }

    /// Set the concurrency limit; non-positive values use the default
    pub fn with_concurrency(mut self, limit: i64) -> Self {
        self.concurrency = Concurrency::new(limit);
        self
    }

    /// Use `cache` for non-leaf content
    pub fn with_cache(mut self, cache: Arc<dyn Storage>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Discover children with `edge_finder`
    pub fn with_edge_finder(mut self, edge_finder: Arc<dyn EdgeFinder>) -> Self {
        self.edge_finder = Some(edge_finder);
        self
    }

    /// Abort the copy when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set the pre-copy hook
    pub fn with_pre_copy<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Descriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.pre_copy = Some(hook(f));
        self
    }

    /// Set the post-copy hook
    pub fn with_post_copy<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Descriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.post_copy = Some(hook(f));
        self
    }

    /// Set the skipped hook
    pub fn with_skipped<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Descriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.skipped = Some(hook(f));
        self
    }
}

impl fmt::Debug for CopyGraphOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyGraphOptions")
            .field("concurrency", &self.concurrency)
            .field("cache", &self.cache.is_some())
            .field("edge_finder", &self.edge_finder.is_some())
            .field("cancellation", &self.cancellation)
            .field("pre_copy", &self.pre_copy.is_some())
            .field("post_copy", &self.post_copy.is_some())
            .field("skipped", &self.skipped.is_some())
            .finish()
    }
}

/// Options for [`crate::copy`]
#[derive(Clone, Default)]
pub struct CopyOptions {
    /// Options for copying the graph below the resolved root
    pub graph: CopyGraphOptions,
    /// Maps the resolved root to the node actually copied
    pub root_filter: Option<RootFilter>,
}

impl CopyOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `graph` for the graph copy
    pub fn with_graph(mut self, graph: CopyGraphOptions) -> Self {
        self.graph = graph;
        self
    }

    /// Set the root filter
    pub fn with_root_filter<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Descriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Descriptor>>> + Send + 'static,
    {
        self.root_filter = Some(Arc::new(move |desc| f(desc).boxed()));
        self
    }
}

impl From<CopyGraphOptions> for CopyOptions {
    fn from(graph: CopyGraphOptions) -> Self {
        Self {
            graph,
            root_filter: None,
        }
    }
}

impl fmt::Debug for CopyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyOptions")
            .field("graph", &self.graph)
            .field("root_filter", &self.root_filter.is_some())
            .finish()
    }
}
