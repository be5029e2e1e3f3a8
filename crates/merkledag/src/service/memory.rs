use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use parking_lot::RwLock;

use crate::node::Node;

use super::{DagError, DagService};

/// In-memory dag service over a map of encoded blocks.
///  Clones share the same blocks.
#[derive(Debug, Clone, Default)]
pub struct MemoryDagService {
    blocks: Arc<RwLock<HashMap<Cid, Bytes>>>,
}

impl MemoryDagService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// Every cid currently held, in no particular order
    pub fn cids(&self) -> Vec<Cid> {
        self.blocks.read().keys().copied().collect()
    }
}

#[async_trait]
impl DagService for MemoryDagService {
    async fn get(&self, cid: &Cid) -> Result<Node, DagError> {
        let block = self.blocks.read().get(cid).cloned();
        match block {
            Some(block) => Ok(Node::from_block(*cid, block)?),
            None => {
                tracing::trace!("MemoryDagService::get: miss for {}", cid);
                Err(DagError::NotFound(*cid))
            }
        }
    }

    async fn add(&self, node: &Node) -> Result<(), DagError> {
        self.blocks
            .write()
            .entry(node.cid())
            .or_insert_with(|| node.raw_data().clone());
        Ok(())
    }

    async fn add_many(&self, nodes: &[Node]) -> Result<(), DagError> {
        let mut blocks = self.blocks.write();
        for node in nodes {
            blocks
                .entry(node.cid())
                .or_insert_with(|| node.raw_data().clone());
        }
        Ok(())
    }

    async fn remove(&self, cid: &Cid) -> Result<(), DagError> {
        self.blocks.write().remove(cid);
        Ok(())
    }

    async fn has(&self, cid: &Cid) -> Result<bool, DagError> {
        Ok(self.blocks.read().contains_key(cid))
    }
}
