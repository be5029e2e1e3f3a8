use std::collections::HashSet;

use async_trait::async_trait;
use cid::Cid;
use futures::stream::{self, BoxStream, StreamExt};

use crate::link::Link;
use crate::node::{Node, NodeError};

mod memory;

pub use memory::MemoryDagService;

// upper bound on gets in flight for one get_many call
const GET_MANY_CONCURRENCY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("dag service error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("node not found: {0}")]
    NotFound(Cid),
    #[error("node error: {0}")]
    Node(#[from] NodeError),
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl DagError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DagError::NotFound(_))
    }
}

/// A content-addressed store of nodes.
///  Implementations decide where blocks live; callers only
///  ever see decoded [`Node`]s keyed by their cid.
#[async_trait]
pub trait DagService: Send + Sync {
    /// Get a single node
    ///
    /// # Returns
    /// * `Ok(Node)` - The decoded node
    /// * `Err(DagError::NotFound)` - The store does not hold `cid`
    async fn get(&self, cid: &Cid) -> Result<Node, DagError>;

    /// Get a batch of nodes.
    ///  Duplicate ids are fetched once, results come back in the
    ///  order ids were first seen, and a failure for one id does
    ///  not end the stream.
    fn get_many(&self, cids: Vec<Cid>) -> BoxStream<'_, Result<Node, DagError>> {
        let mut seen = HashSet::new();
        let unique: Vec<Cid> = cids.into_iter().filter(|cid| seen.insert(*cid)).collect();
        stream::iter(unique)
            .map(move |cid| async move { self.get(&cid).await })
            .buffered(GET_MANY_CONCURRENCY)
            .boxed()
    }

    /// Store a node. Adding a node that is already present is a no-op.
    async fn add(&self, node: &Node) -> Result<(), DagError>;

    async fn add_many(&self, nodes: &[Node]) -> Result<(), DagError> {
        for node in nodes {
            self.add(node).await?;
        }
        Ok(())
    }

    /// Remove a node. Removing a missing node is not an error.
    async fn remove(&self, cid: &Cid) -> Result<(), DagError>;

    async fn has(&self, cid: &Cid) -> Result<bool, DagError>;

    /// Links of the node behind `cid`
    async fn get_links(&self, cid: &Cid) -> Result<Vec<Link>, DagError> {
        let node = self.get(cid).await?;
        Ok(node.links().to_vec())
    }
}

#[async_trait]
impl<T: DagService + ?Sized> DagService for std::sync::Arc<T> {
    async fn get(&self, cid: &Cid) -> Result<Node, DagError> {
        (**self).get(cid).await
    }

    fn get_many(&self, cids: Vec<Cid>) -> BoxStream<'_, Result<Node, DagError>> {
        (**self).get_many(cids)
    }

    async fn add(&self, node: &Node) -> Result<(), DagError> {
        (**self).add(node).await
    }

    async fn add_many(&self, nodes: &[Node]) -> Result<(), DagError> {
        (**self).add_many(nodes).await
    }

    async fn remove(&self, cid: &Cid) -> Result<(), DagError> {
        (**self).remove(cid).await
    }

    async fn has(&self, cid: &Cid) -> Result<bool, DagError> {
        (**self).has(cid).await
    }

    async fn get_links(&self, cid: &Cid) -> Result<Vec<Link>, DagError> {
        (**self).get_links(cid).await
    }
}
