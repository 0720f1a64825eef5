//! Limiter-gated concurrent graph traversal
//!
//! [`dispatch`] walks a DAG from its root. Every visited node runs its
//! [`VisitHandler::pre_visit`] step, then all of its children concurrently,
//! then its [`VisitHandler::post_visit`] step, so a node is always finished
//! after everything below it.
//!
//! Handler steps hold a slot of a shared [`Semaphore`]. A node gives its slot
//! back while its children run and may give it back from inside
//! `post_visit` (see [`LimitRegion::end`]) while it waits on work owned by
//! another branch. Holding slots across those waits deadlocks as soon as the
//! graph is deeper than the limit.
//!
//! The first failure anywhere cancels the whole traversal and is the error
//! `dispatch` reports.

use async_trait::async_trait;
use dagcopy_types::{Descriptor, Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Outcome of a pre-visit step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visit {
    /// Do not descend and do not run the post-visit step
    Skip,
    /// Visit these children, then run the post-visit step
    Descend(Vec<Descriptor>),
}

/// Per-node traversal logic
#[async_trait]
pub trait VisitHandler: Send + Sync + 'static {
    /// Runs when a node is first reached, holding a limiter slot
    async fn pre_visit(&self, desc: &Descriptor) -> Result<Visit>;

    /// Runs after every child of the node has finished.
    ///
    /// The region holds a limiter slot on entry. Implementations that block
    /// on other branches must [`LimitRegion::end`] it first and
    /// [`LimitRegion::start`] it again before doing limited work.
    async fn post_visit(&self, desc: &Descriptor, region: &mut LimitRegion) -> Result<()>;
}

/// A re-enterable hold on one limiter slot
#[derive(Debug)]
pub struct LimitRegion {
    limiter: Arc<Semaphore>,
    token: CancellationToken,
    permit: Option<OwnedSemaphorePermit>,
}

impl LimitRegion {
    /// Create an inactive region
    pub fn new(limiter: Arc<Semaphore>, token: CancellationToken) -> Self {
        Self {
            limiter,
            token,
            permit: None,
        }
    }

    /// Acquire a slot, waiting for one to free up. No-op if already held.
    pub async fn start(&mut self) -> Result<()> {
        if self.permit.is_some() {
            return Ok(());
        }

        let limiter = Arc::clone(&self.limiter);
        let permit = tokio::select! {
            biased;
            () = self.token.cancelled() => return Err(Error::Cancelled),
            permit = limiter.acquire_owned() => permit.map_err(|_| Error::Cancelled)?,
        };
        self.permit = Some(permit);
        Ok(())
    }

    /// Release the slot. No-op if not held.
    pub fn end(&mut self) {
        self.permit = None;
    }

    /// Whether the region currently holds a slot
    pub fn is_active(&self) -> bool {
        self.permit.is_some()
    }

    /// Cancellation token of the traversal this region belongs to
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

struct Shared<H> {
    handler: Arc<H>,
    limiter: Arc<Semaphore>,
    token: CancellationToken,
    first_error: Mutex<Option<Error>>,
}

impl<H> Shared<H> {
    /// Record a failure; only the first one is kept
    fn fail(&self, error: Error) {
        let mut first = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            if !error.is_cancelled() {
                warn!("aborting traversal: {}", error);
            }
            *first = Some(error);
        }
        self.token.cancel();
    }

    fn take_error(&self) -> Option<Error> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Run `future` unless the traversal is cancelled first
pub(crate) async fn guarded<T, F>(token: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}

/// Traverse the graph rooted at `root`, running at most as many handler
/// steps at once as `limiter` has permits.
///
/// Returns once every started task has finished. On failure the result is
/// the first error recorded; an external cancellation of `token` surfaces as
/// [`Error::Cancelled`].
pub async fn dispatch<H: VisitHandler>(
    handler: Arc<H>,
    root: Descriptor,
    limiter: Arc<Semaphore>,
    token: CancellationToken,
) -> Result<()> {
    let shared = Arc::new(Shared {
        handler,
        limiter,
        token,
        first_error: Mutex::new(None),
    });

    // the root runs as a task too, so a panic there is reported like any other
    let mut tasks = JoinSet::new();
    tasks.spawn(visit(Arc::clone(&shared), root));
    join_all(&shared, &mut tasks).await;

    match shared.take_error() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn visit<H: VisitHandler>(shared: Arc<Shared<H>>, desc: Descriptor) -> BoxFuture<'static, ()> {
    async move {
        if let Err(error) = visit_node(&shared, &desc).await {
            shared.fail(error);
        }
    }
    .boxed()
}

async fn join_all<H>(shared: &Shared<H>, tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            shared.fail(Error::other(format!("copy task failed: {}", e)));
        }
    }
}

async fn visit_node<H: VisitHandler>(shared: &Arc<Shared<H>>, desc: &Descriptor) -> Result<()> {
    let mut region = LimitRegion::new(Arc::clone(&shared.limiter), shared.token.clone());
    region.start().await?;

    let children = match guarded(&shared.token, shared.handler.pre_visit(desc)).await? {
        Visit::Skip => return Ok(()),
        Visit::Descend(children) => children,
    };

    if !children.is_empty() {
        region.end();
        trace!(digest = %desc.digest, children = children.len(), "descending");

        let mut tasks = JoinSet::new();
        for child in children {
            tasks.spawn(visit(Arc::clone(shared), child));
        }
        join_all(shared, &mut tasks).await;

        if shared.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        region.start().await?;
    }

    guarded(&shared.token, shared.handler.post_visit(desc, &mut region)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagcopy_types::{media_type, ErrorKind};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn node(name: &str) -> Descriptor {
        Descriptor::from_bytes(media_type::OCI_LAYER_GZIP, name.as_bytes())
    }

    /// Tree-shaped handler that logs post-visits and measures concurrency
    #[derive(Default)]
    struct TreeHandler {
        children: HashMap<Descriptor, Vec<Descriptor>>,
        failing: Option<Descriptor>,
        panicking: Option<Descriptor>,
        stuck: Option<Descriptor>,
        finished: Mutex<Vec<Descriptor>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl TreeHandler {
        fn with_edges(edges: &[(&str, &[&str])]) -> Self {
            let children = edges
                .iter()
                .map(|(parent, kids)| (node(parent), kids.iter().map(|k| node(k)).collect()))
                .collect();
            Self {
                children,
                ..Self::default()
            }
        }

        async fn busy(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }

        fn finished(&self) -> Vec<Descriptor> {
            self.finished.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VisitHandler for TreeHandler {
        async fn pre_visit(&self, desc: &Descriptor) -> Result<Visit> {
            self.busy().await;
            Ok(Visit::Descend(
                self.children.get(desc).cloned().unwrap_or_default(),
            ))
        }

        async fn post_visit(&self, desc: &Descriptor, region: &mut LimitRegion) -> Result<()> {
            assert!(region.is_active());
            if self.stuck.as_ref() == Some(desc) {
                futures::future::pending::<()>().await;
            }
            if self.panicking.as_ref() == Some(desc) {
                panic!("{}: handler bug", desc.digest);
            }
            if self.failing.as_ref() == Some(desc) {
                return Err(Error::storage(format!("{}: boom", desc.digest)));
            }
            self.busy().await;
            self.finished.lock().unwrap().push(desc.clone());
            Ok(())
        }
    }

    async fn run(handler: &Arc<TreeHandler>, limit: usize, token: CancellationToken) -> Result<()> {
        dispatch(
            Arc::clone(handler),
            node("root"),
            Arc::new(Semaphore::new(limit)),
            token,
        )
        .await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_children_finish_before_parent() {
        let handler = Arc::new(TreeHandler::with_edges(&[
            ("root", &["a", "b"]),
            ("a", &["a1", "a2"]),
            ("b", &["b1"]),
        ]));

        run(&handler, 2, CancellationToken::new()).await.unwrap();

        let finished = handler.finished();
        assert_eq!(finished.len(), 6);
        let position = |name: &str| finished.iter().position(|d| *d == node(name)).unwrap();
        assert!(position("a1") < position("a"));
        assert!(position("a2") < position("a"));
        assert!(position("b1") < position("b"));
        assert_eq!(position("root"), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_limit_bounds_running_steps() {
        let leaves: Vec<String> = (0..12).map(|i| format!("leaf-{}", i)).collect();
        let leaves: Vec<&str> = leaves.iter().map(String::as_str).collect();
        let handler = Arc::new(TreeHandler::with_edges(&[("root", leaves.as_slice())]));

        run(&handler, 2, CancellationToken::new()).await.unwrap();

        assert_eq!(handler.finished().len(), 13);
        assert!(handler.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_deep_chain_with_single_slot() {
        let handler = Arc::new(TreeHandler::with_edges(&[
            ("root", &["l1"]),
            ("l1", &["l2"]),
            ("l2", &["l3"]),
        ]));

        tokio::time::timeout(Duration::from_secs(5), run(&handler, 1, CancellationToken::new()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handler.finished().len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_first_error_is_reported() {
        let mut handler = TreeHandler::with_edges(&[("root", &["good", "bad"]), ("bad", &[])]);
        handler.failing = Some(node("bad"));
        let handler = Arc::new(handler);

        let error = run(&handler, 3, CancellationToken::new()).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(matches!(error, Error::Storage { .. }));
        assert!(error.to_string().contains("boom"));
        assert!(!handler.finished().contains(&node("root")));
    }

    #[rstest::rstest]
    #[case::root("root")]
    #[case::child("inner")]
    #[tokio::test]
    async fn test_panicking_step_becomes_error(#[case] culprit: &str) {
        let mut handler = TreeHandler::with_edges(&[("root", &["inner"])]);
        handler.panicking = Some(node(culprit));
        let handler = Arc::new(handler);

        let error = run(&handler, 2, CancellationToken::new()).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Other);
        assert!(error.to_string().contains("copy task failed"));
        assert!(!handler.finished().contains(&node("root")));
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let mut handler = TreeHandler::with_edges(&[("root", &["stuck", "other"])]);
        handler.stuck = Some(node("stuck"));
        let handler = Arc::new(handler);

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let error = tokio::time::timeout(Duration::from_secs(5), run(&handler, 3, token))
            .await
            .unwrap()
            .unwrap_err();
        assert!(error.is_cancelled());
        assert!(!handler.finished().contains(&node("root")));
    }

    #[tokio::test]
    async fn test_region_is_reentrant() {
        let limiter = Arc::new(Semaphore::new(1));
        let mut region = LimitRegion::new(Arc::clone(&limiter), CancellationToken::new());

        region.start().await.unwrap();
        region.start().await.unwrap();
        assert!(region.is_active());
        assert_eq!(limiter.available_permits(), 0);

        region.end();
        region.end();
        assert!(!region.is_active());
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_region_start_observes_cancellation() {
        let limiter = Arc::new(Semaphore::new(0));
        let token = CancellationToken::new();
        let mut region = LimitRegion::new(limiter, token.clone());
        token.cancel();

        assert!(region.start().await.unwrap_err().is_cancelled());
    }
}
