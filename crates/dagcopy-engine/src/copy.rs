//! Graph and reference copies
//!
//! A copy walks the source graph with [`dispatch`]. Structured nodes are
//! read through a caching [`Proxy`] to discover their children, then pushed
//! from the cache once every child is at the destination. Leaves stream
//! straight from the source. The [`Tracker`] gives each digest a single
//! owner, so shared subtrees are transferred once.

use crate::dispatch::{dispatch, guarded, LimitRegion, Visit, VisitHandler};
use crate::monitor::StatisticsCollector;
use crate::options::{CopyGraphOptions, CopyOptions, Hook};
use crate::status::Tracker;
use async_trait::async_trait;
use dagcopy_content::{Memory, OciEdgeFinder, Proxy};
use dagcopy_types::{
    CopyStats, Descriptor, EdgeFinder, Error, ReadOnlyStorage, Result, Storage, Target,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Per-copy state shared by every visit
struct Copier<S: ?Sized, D: ?Sized> {
    proxy: Proxy<S>,
    dst: Arc<D>,
    tracker: Tracker,
    edge_finder: Arc<dyn EdgeFinder>,
    pre_copy: Option<Hook>,
    post_copy: Option<Hook>,
    skipped: Option<Hook>,
    stats: StatisticsCollector,
}

impl<S, D> Copier<S, D>
where
    S: ReadOnlyStorage + ?Sized,
    D: Storage + ?Sized,
{
    /// Transfer one node from `from` to the destination, wrapped in the
    /// pre/post-copy hooks
    async fn copy_node<F>(&self, from: &F, desc: &Descriptor) -> Result<()>
    where
        F: ReadOnlyStorage + ?Sized,
    {
        if let Some(hook) = &self.pre_copy {
            hook(desc.clone()).await?;
        }

        let content = from.fetch(desc).await?;
        match self.dst.push(desc, content).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                trace!(digest = %desc.digest, "destination already had content");
            }
            Err(e) => return Err(e),
        }
        self.stats.record_copied(desc.size);
        debug!(digest = %desc.digest, size = desc.size, media_type = %desc.media_type, "copied");

        if let Some(hook) = &self.post_copy {
            hook(desc.clone()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<S, D> VisitHandler for Copier<S, D>
where
    S: ReadOnlyStorage + ?Sized + 'static,
    D: Storage + ?Sized + 'static,
{
    async fn pre_visit(&self, desc: &Descriptor) -> Result<Visit> {
        let (done, committed) = self.tracker.try_commit(desc);
        if !committed {
            trace!(digest = %desc.digest, "already committed");
            return Ok(Visit::Skip);
        }

        if self.dst.exists(desc).await? {
            done.signal();
            self.stats.record_skipped();
            debug!(digest = %desc.digest, "skipped: exists at destination");
            if let Some(hook) = &self.skipped {
                hook(desc.clone()).await?;
            }
            return Ok(Visit::Skip);
        }

        let children = self.edge_finder.down_edges(&self.proxy, desc).await?;
        Ok(Visit::Descend(children))
    }

    async fn post_visit(&self, desc: &Descriptor, region: &mut LimitRegion) -> Result<()> {
        let done = self.tracker.get(desc).ok_or_else(|| {
            Error::invariant(format!("{}: node not committed", desc.digest))
        })?;

        if self.proxy.cache().exists(desc).await? {
            let children = self.edge_finder.down_edges(&self.proxy, desc).await?;

            // the children may still be in flight on other branches
            region.end();
            for child in &children {
                let (child_done, committed) = self.tracker.try_commit(child);
                if committed {
                    return Err(Error::invariant(format!(
                        "{}: {}: down edge not committed",
                        desc.digest, child.digest
                    )));
                }
                guarded(region.token(), async {
                    child_done.wait().await;
                    Ok(())
                })
                .await?;
            }
            region.start().await?;

            self.copy_node(self.proxy.cache().as_ref(), desc).await?;
        } else {
            self.copy_node(self.proxy.source().as_ref(), desc).await?;
        }

        done.signal();
        Ok(())
    }
}

/// Copy the graph rooted at `root` from `src` to `dst`.
///
/// Nodes already at the destination are skipped along with everything below
/// them. Every node is pushed only after all of its children are present at
/// the destination. At most `opts.concurrency` node steps run at once.
///
/// The first failure cancels the remaining work and is returned; nodes copied
/// before it stay at the destination.
pub async fn copy_graph<S, D>(
    src: Arc<S>,
    dst: Arc<D>,
    root: Descriptor,
    opts: CopyGraphOptions,
) -> Result<CopyStats>
where
    S: ReadOnlyStorage + ?Sized + 'static,
    D: Storage + ?Sized + 'static,
{
    let cache: Arc<dyn Storage> = match opts.cache {
        Some(cache) => cache,
        None => Arc::new(Memory::new()),
    };
    let edge_finder: Arc<dyn EdgeFinder> = match opts.edge_finder {
        Some(edge_finder) => edge_finder,
        None => Arc::new(OciEdgeFinder),
    };
    let token = opts
        .cancellation
        .as_ref()
        .map_or_else(CancellationToken::new, CancellationToken::child_token);
    let limit = opts.concurrency.get().min(Semaphore::MAX_PERMITS);

    info!(root = %root.digest, concurrency = limit, "starting graph copy");

    let copier = Arc::new(Copier {
        proxy: Proxy::new(src, cache),
        dst,
        tracker: Tracker::new(),
        edge_finder,
        pre_copy: opts.pre_copy,
        post_copy: opts.post_copy,
        skipped: opts.skipped,
        stats: StatisticsCollector::new(),
    });

    dispatch(
        Arc::clone(&copier),
        root.clone(),
        Arc::new(Semaphore::new(limit)),
        token,
    )
    .await?;

    let stats = copier.stats.snapshot();
    info!(
        root = %root.digest,
        copied = stats.nodes_copied,
        skipped = stats.nodes_skipped,
        bytes = stats.bytes_copied,
        elapsed_ms = stats.duration.as_millis() as u64,
        "graph copy finished"
    );
    Ok(stats)
}

/// Copy the graph `src_ref` points at in `src` to `dst` and tag it there as
/// `dst_ref` (`src_ref` when empty).
///
/// Returns the descriptor of the copied root, after the root filter if one
/// is set.
pub async fn copy<T, U>(
    src: Arc<T>,
    src_ref: &str,
    dst: Arc<U>,
    dst_ref: &str,
    opts: CopyOptions,
) -> Result<Descriptor>
where
    T: Target + ?Sized + 'static,
    U: Target + ?Sized + 'static,
{
    let dst_ref = if dst_ref.is_empty() { src_ref } else { dst_ref };

    let mut root = src.resolve(src_ref).await?;
    if let Some(filter) = &opts.root_filter {
        root = filter(root)
            .await?
            .ok_or_else(|| Error::not_found(format!("{}: no root selected", src_ref)))?;
    }
    debug!(reference = src_ref, root = %root.digest, "resolved root");

    copy_graph(src, Arc::clone(&dst), root.clone(), opts.graph).await?;
    dst.tag(&root, dst_ref).await?;
    info!(reference = dst_ref, root = %root.digest, "tagged copied root");

    Ok(root)
}
