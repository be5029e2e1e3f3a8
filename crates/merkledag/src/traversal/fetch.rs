use std::collections::HashMap;

use anyhow::anyhow;
use cid::Cid;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::context::Context;
use crate::link::Link;
use crate::service::{DagError, DagService};

use super::ProgressTracker;

/// Nodes loaded at once by a single fetch
pub const DEFAULT_FETCH_CONCURRENCY: usize = 32;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Upper bound on nodes being loaded at the same time
    pub concurrency: usize,
    /// Notified once for every node the fetch plans to retrieve
    pub progress: Option<ProgressTracker>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            progress: None,
        }
    }
}

impl FetchOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Copy everything reachable from `root` into `dest`.
///  Nodes already in `dest` are not fetched again, but their
///  links are still followed.
pub async fn fetch_graph<S, D>(
    ctx: &Context,
    root: Cid,
    source: &S,
    dest: &D,
    options: &FetchOptions,
) -> Result<(), DagError>
where
    S: DagService + ?Sized,
    D: DagService + ?Sized,
{
    fetch_graph_with_depth_limit(ctx, root, -1, source, dest, options).await
}

/// Copy everything within `depth_limit` hops of `root` into `dest`.
///  A negative limit means no limit; zero fetches the root alone.
///
/// The first failure aborts the fetch. Nodes stored before the
///  failure stay in `dest`.
pub async fn fetch_graph_with_depth_limit<S, D>(
    ctx: &Context,
    root: Cid,
    depth_limit: i64,
    source: &S,
    dest: &D,
    options: &FetchOptions,
) -> Result<(), DagError>
where
    S: DagService + ?Sized,
    D: DagService + ?Sized,
{
    tracing::debug!(
        "fetch_graph: fetching {} with depth limit {}",
        root,
        depth_limit
    );

    let fetcher = Fetcher {
        ctx,
        source,
        dest,
        limit: usize::try_from(depth_limit).ok(),
        permits: Semaphore::new(options.concurrency.max(1)),
        progress: options.progress.as_ref(),
        seen: Mutex::new(HashMap::new()),
    };

    match fetcher.fetch(root, 0).await {
        Ok(()) => {
            tracing::debug!(
                "fetch_graph: done with {}, {} nodes visited",
                root,
                fetcher.seen.lock().len()
            );
            Ok(())
        }
        Err(e) => {
            tracing::warn!("fetch_graph: fetch of {} failed: {}", root, e);
            Err(e)
        }
    }
}

struct Fetcher<'a, S: ?Sized, D: ?Sized> {
    ctx: &'a Context,
    source: &'a S,
    dest: &'a D,
    limit: Option<usize>,
    permits: Semaphore,
    progress: Option<&'a ProgressTracker>,
    // shallowest depth each node has been expanded at
    seen: Mutex<HashMap<Cid, usize>>,
}

impl<'a, S, D> Fetcher<'a, S, D>
where
    S: DagService + ?Sized,
    D: DagService + ?Sized,
{
    /// Whether `cid` should be expanded when reached at `depth`.
    ///  A node already expanded deeper down is expanded again so
    ///  its own children get the benefit of the shorter path.
    fn visit(&self, cid: Cid, depth: usize) -> bool {
        if self.limit.is_some_and(|limit| depth > limit) {
            return false;
        }
        let mut seen = self.seen.lock();
        match seen.get(&cid) {
            Some(previous) if *previous <= depth => false,
            Some(_) => {
                seen.insert(cid, depth);
                true
            }
            None => {
                seen.insert(cid, depth);
                if let Some(progress) = self.progress {
                    progress.plan_to_pin(cid);
                }
                true
            }
        }
    }

    fn fetch<'b>(&'b self, cid: Cid, depth: usize) -> BoxFuture<'b, Result<(), DagError>> {
        async move {
            if !self.visit(cid, depth) {
                return Ok(());
            }
            let links = self.load(cid).await?;
            try_join_all(links.iter().map(|link| self.fetch(link.cid, depth + 1))).await?;
            Ok(())
        }
        .boxed()
    }

    /// Links of `cid`, reading from `dest` and falling back to `source`
    async fn load(&self, cid: Cid) -> Result<Vec<Link>, DagError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| DagError::Default(anyhow!(e)))?;

        match self.ctx.run(self.dest.get(&cid)).await {
            Ok(node) => return Ok(node.links().to_vec()),
            Err(DagError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        tracing::trace!("fetch_graph: {} missing locally, fetching", cid);
        let node = self.ctx.run(self.source.get(&cid)).await?;
        self.ctx.run(self.dest.add(&node)).await?;
        Ok(node.links().to_vec())
    }
}
