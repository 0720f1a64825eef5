//! Unified test utilities for dagcopy integration tests
//!
//! [`InstrumentedStore`] wraps an in-memory store, counts every fetch and
//! push per digest and can be told to fail, stall or report "already
//! exists" for chosen digests. [`HookRecorder`] installs copy hooks that log
//! their calls and measure how many transfers overlap.

use async_trait::async_trait;
use dagcopy_config::{init_logging, LoggingConfig};
use dagcopy_content::{pack, ImageIndex, ImageManifest, Memory};
use dagcopy_engine::CopyGraphOptions;
use dagcopy_types::{
    media_type, ContentReader, Descriptor, Digest, Error, ReadOnlyStorage, Result, Storage,
    Target,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Install a debug-level subscriber once for the whole test binary
pub fn init_test_logging() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        colored_output: false,
        ..LoggingConfig::default()
    };
    let _ = init_logging(&config);
}

/// Operation observed by an [`InstrumentedStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// Content was opened for reading
    Fetch(Digest),
    /// Content was written
    Push(Digest),
}

/// In-memory store that records and manipulates the traffic it sees
#[derive(Default)]
pub struct InstrumentedStore {
    inner: Memory,
    events: Mutex<Vec<StoreEvent>>,
    failing: Mutex<HashSet<Digest>>,
    stalled: Mutex<HashSet<Digest>>,
    racing: Mutex<HashSet<Digest>>,
    push_delay: Mutex<Option<Duration>>,
    stalls: AtomicUsize,
}

impl InstrumentedStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store content without recording it
    pub async fn seed(&self, desc: &Descriptor, data: &[u8]) {
        // content may legitimately be seeded twice by graph builders
        let _ = self.inner.push_bytes(desc, data.to_vec()).await;
    }

    /// Whether the digest is stored
    pub async fn contains(&self, desc: &Descriptor) -> bool {
        self.inner.get(desc).await.is_some()
    }

    /// Stored bytes of a digest
    pub async fn content(&self, desc: &Descriptor) -> Option<Vec<u8>> {
        self.inner.get(desc).await.map(|data| data.to_vec())
    }

    /// Make fetches and pushes of `desc` fail with a storage error
    pub fn fail_on(&self, desc: &Descriptor) {
        self.failing.lock().unwrap().insert(desc.digest.clone());
    }

    /// Make fetches of `desc` never complete
    pub fn stall_on(&self, desc: &Descriptor) {
        self.stalled.lock().unwrap().insert(desc.digest.clone());
    }

    /// Make pushes of `desc` store the content and then report
    /// "already exists", as if a concurrent writer won the race
    pub fn race_on(&self, desc: &Descriptor) {
        self.racing.lock().unwrap().insert(desc.digest.clone());
    }

    /// Sleep this long inside every push
    pub fn set_push_delay(&self, delay: Duration) {
        *self.push_delay.lock().unwrap() = Some(delay);
    }

    /// Every recorded event, in order
    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of fetches of `desc`
    pub fn fetch_count(&self, desc: &Descriptor) -> usize {
        self.count(&StoreEvent::Fetch(desc.digest.clone()))
    }

    /// Number of pushes of `desc`
    pub fn push_count(&self, desc: &Descriptor) -> usize {
        self.count(&StoreEvent::Push(desc.digest.clone()))
    }

    /// Total number of pushes
    pub fn total_pushes(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, StoreEvent::Push(_)))
            .count()
    }

    /// Position of the first push of `desc` in the event log
    pub fn push_position(&self, desc: &Descriptor) -> Option<usize> {
        let push = StoreEvent::Push(desc.digest.clone());
        self.events.lock().unwrap().iter().position(|e| *e == push)
    }

    /// Number of fetches that stalled
    pub fn stalled_fetches(&self) -> usize {
        self.stalls.load(Ordering::SeqCst)
    }

    fn count(&self, wanted: &StoreEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| *event == wanted)
            .count()
    }

    fn record(&self, event: StoreEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn check_failure(&self, desc: &Descriptor) -> Result<()> {
        if self.failing.lock().unwrap().contains(&desc.digest) {
            return Err(Error::storage(format!("{}: injected failure", desc.digest)));
        }
        Ok(())
    }
}

#[async_trait]
impl ReadOnlyStorage for InstrumentedStore {
    async fn fetch(&self, desc: &Descriptor) -> Result<ContentReader> {
        self.record(StoreEvent::Fetch(desc.digest.clone()));
        self.check_failure(desc)?;

        let stalled = self.stalled.lock().unwrap().contains(&desc.digest);
        if stalled {
            self.stalls.fetch_add(1, Ordering::SeqCst);
            futures::future::pending::<()>().await;
        }
        self.inner.fetch(desc).await
    }

    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        self.inner.exists(desc).await
    }
}

#[async_trait]
impl Storage for InstrumentedStore {
    async fn push(&self, desc: &Descriptor, content: ContentReader) -> Result<()> {
        self.record(StoreEvent::Push(desc.digest.clone()));
        self.check_failure(desc)?;

        let delay = *self.push_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let racing = self.racing.lock().unwrap().contains(&desc.digest);
        self.inner.push(desc, content).await?;
        if racing {
            return Err(Error::already_exists(desc.digest.as_str()));
        }
        Ok(())
    }
}

#[async_trait]
impl Target for InstrumentedStore {
    async fn resolve(&self, reference: &str) -> Result<Descriptor> {
        self.inner.resolve(reference).await
    }

    async fn tag(&self, desc: &Descriptor, reference: &str) -> Result<()> {
        self.inner.tag(desc, reference).await
    }
}

/// Hook call observed by a [`HookRecorder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    /// Pre-copy hook ran
    PreCopy(Digest),
    /// Post-copy hook ran
    PostCopy(Digest),
    /// Skipped hook ran
    Skipped(Digest),
}

/// Records hook calls and measures overlapping transfers
#[derive(Debug, Default)]
pub struct HookRecorder {
    events: Mutex<Vec<HookEvent>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl HookRecorder {
    /// Create an empty recorder
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install recording hooks on `opts`
    pub fn install(self: &Arc<Self>, opts: CopyGraphOptions) -> CopyGraphOptions {
        let pre = Arc::clone(self);
        let post = Arc::clone(self);
        let skipped = Arc::clone(self);
        opts.with_pre_copy(move |desc| {
            let now = pre.active.fetch_add(1, Ordering::SeqCst) + 1;
            pre.peak.fetch_max(now, Ordering::SeqCst);
            pre.push(HookEvent::PreCopy(desc.digest));
            async { Ok(()) }
        })
        .with_post_copy(move |desc| {
            post.active.fetch_sub(1, Ordering::SeqCst);
            post.push(HookEvent::PostCopy(desc.digest));
            async { Ok(()) }
        })
        .with_skipped(move |desc| {
            skipped.push(HookEvent::Skipped(desc.digest));
            async { Ok(()) }
        })
    }

    /// Every recorded hook call, in order
    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Position of `event` in the log
    pub fn position(&self, event: &HookEvent) -> Option<usize> {
        self.events.lock().unwrap().iter().position(|e| e == event)
    }

    /// Number of times `event` was recorded
    pub fn count(&self, event: &HookEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == event)
            .count()
    }

    /// Highest number of transfers observed between their pre- and
    /// post-copy hooks at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn push(&self, event: HookEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Graph under construction in a source store, with its edges recorded
pub struct Graph {
    store: Arc<InstrumentedStore>,
    edges: HashMap<Descriptor, Vec<Descriptor>>,
    nodes: Vec<Descriptor>,
}

impl Graph {
    /// Build into `store`
    pub fn new(store: Arc<InstrumentedStore>) -> Self {
        Self {
            store,
            edges: HashMap::new(),
            nodes: Vec::new(),
        }
    }

    /// Add a layer blob
    pub async fn layer(&mut self, data: &str) -> Descriptor {
        self.leaf(media_type::OCI_LAYER_GZIP, data.as_bytes()).await
    }

    /// Add a config blob
    pub async fn config(&mut self, data: &str) -> Descriptor {
        let body = format!("{{\"name\":{:?}}}", data);
        self.leaf(media_type::OCI_CONFIG, body.as_bytes()).await
    }

    /// Add an image manifest over `config` and `layers`
    pub async fn manifest(&mut self, config: &Descriptor, layers: &[Descriptor]) -> Descriptor {
        let manifest = ImageManifest::new(config.clone(), layers.to_vec());
        let mut children = vec![config.clone()];
        children.extend_from_slice(layers);
        self.structured(media_type::OCI_MANIFEST, &manifest, children)
            .await
    }

    /// Add an image index over `manifests`
    pub async fn index(&mut self, manifests: &[Descriptor]) -> Descriptor {
        let index = ImageIndex::new(manifests.to_vec());
        self.structured(media_type::OCI_INDEX, &index, manifests.to_vec())
            .await
    }

    /// Children recorded for `desc`
    pub fn children(&self, desc: &Descriptor) -> &[Descriptor] {
        self.edges.get(desc).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every parent/child pair
    pub fn edges(&self) -> Vec<(Descriptor, Descriptor)> {
        self.edges
            .iter()
            .flat_map(|(parent, children)| {
                children
                    .iter()
                    .map(move |child| (parent.clone(), child.clone()))
            })
            .collect()
    }

    /// Every distinct node, in insertion order
    pub fn nodes(&self) -> &[Descriptor] {
        &self.nodes
    }

    async fn leaf(&mut self, media: &str, data: &[u8]) -> Descriptor {
        let desc = Descriptor::from_bytes(media, data);
        self.store.seed(&desc, data).await;
        self.add_node(&desc);
        desc
    }

    async fn structured<T: Serialize>(
        &mut self,
        media: &str,
        manifest: &T,
        children: Vec<Descriptor>,
    ) -> Descriptor {
        let (desc, data) = pack(media, manifest).unwrap();
        self.store.seed(&desc, &data).await;
        if self.add_node(&desc) {
            self.edges.insert(desc.clone(), children);
        }
        desc
    }

    fn add_node(&mut self, desc: &Descriptor) -> bool {
        if self.nodes.contains(desc) {
            return false;
        }
        self.nodes.push(desc.clone());
        true
    }
}
