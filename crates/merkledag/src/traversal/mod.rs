use std::collections::HashSet;
use std::future::Future;

use cid::Cid;
use futures::future::{BoxFuture, FutureExt};

use crate::context::Context;
use crate::link::Link;
use crate::service::{DagError, DagService};

mod fetch;
mod progress;

pub use fetch::{fetch_graph, fetch_graph_with_depth_limit, FetchOptions, DEFAULT_FETCH_CONCURRENCY};
pub use progress::ProgressTracker;

/**
 * Traversal
 * =========
 * Walks take a `get_links` function rather than a dag service,
 *  so the same walk can run against a local store, a remote
 *  one, or a store that only knows links.
 * The visitor decides whether a node is expanded: returning
 *  false prunes the node's subtree without fetching it. Pair a
 *  walk with a [`CidSet`] to expand each node once, which is
 *  what keeps walks over diamonds and cycles finite.
 */

/// A set of cids, usable directly as a walk visitor
#[derive(Debug, Clone, Default)]
pub struct CidSet {
    set: HashSet<Cid>,
}

impl CidSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `cid`, reporting whether it was new
    pub fn visit(&mut self, cid: Cid) -> bool {
        self.set.insert(cid)
    }

    pub fn insert(&mut self, cid: Cid) {
        self.set.insert(cid);
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.set.contains(cid)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cid> {
        self.set.iter()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Do not call the visitor on the root. Its links are still walked.
    pub skip_root: bool,
    /// Treat nodes missing from the store as leaves instead of failing
    pub ignore_missing: bool,
}

/// Turn a dag service into a `get_links` function for walks
pub fn get_links_direct<'a, S>(
    ds: &'a S,
) -> impl Fn(Cid) -> BoxFuture<'a, Result<Vec<Link>, DagError>> + Send + Sync + 'a
where
    S: DagService + ?Sized,
{
    move |cid| async move { ds.get_links(&cid).await }.boxed()
}

/// Depth-first walk from `root`, expanding every cid `visit` accepts
pub async fn walk<G, Fut, V>(ctx: &Context, get_links: G, root: Cid, mut visit: V) -> Result<(), DagError>
where
    G: Fn(Cid) -> Fut + Sync,
    Fut: Future<Output = Result<Vec<Link>, DagError>> + Send,
    V: FnMut(Cid) -> bool + Send,
{
    walk_depth(ctx, get_links, root, move |cid, _| visit(cid)).await
}

/// Like [`walk`], also handing the visitor the number of hops from root
pub async fn walk_depth<G, Fut, V>(
    ctx: &Context,
    get_links: G,
    root: Cid,
    visit: V,
) -> Result<(), DagError>
where
    G: Fn(Cid) -> Fut + Sync,
    Fut: Future<Output = Result<Vec<Link>, DagError>> + Send,
    V: FnMut(Cid, usize) -> bool + Send,
{
    walk_depth_with_options(ctx, get_links, root, visit, WalkOptions::default()).await
}

pub async fn walk_depth_with_options<G, Fut, V>(
    ctx: &Context,
    get_links: G,
    root: Cid,
    mut visit: V,
    options: WalkOptions,
) -> Result<(), DagError>
where
    G: Fn(Cid) -> Fut + Sync,
    Fut: Future<Output = Result<Vec<Link>, DagError>> + Send,
    V: FnMut(Cid, usize) -> bool + Send,
{
    walk_inner(ctx, &get_links, root, 0, &mut visit, &options).await
}

fn walk_inner<'a, G, Fut, V>(
    ctx: &'a Context,
    get_links: &'a G,
    cid: Cid,
    depth: usize,
    visit: &'a mut V,
    options: &'a WalkOptions,
) -> BoxFuture<'a, Result<(), DagError>>
where
    G: Fn(Cid) -> Fut + Sync,
    Fut: Future<Output = Result<Vec<Link>, DagError>> + Send + 'a,
    V: FnMut(Cid, usize) -> bool + Send,
{
    Box::pin(async move {
        if !(options.skip_root && depth == 0) && !visit(cid, depth) {
            return Ok(());
        }

        let links = match ctx.run(get_links(cid)).await {
            Ok(links) => links,
            Err(DagError::NotFound(missing)) if options.ignore_missing => {
                tracing::debug!("walk: ignoring missing node {}", missing);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for link in links {
            walk_inner(ctx, get_links, link.cid, depth + 1, &mut *visit, options).await?;
        }
        Ok(())
    })
}
