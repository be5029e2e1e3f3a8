//! Shared test utilities for dagutils integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use merkledag::prelude::*;
use rand::RngCore;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A link-less proto node holding `data`, added to `ds`
pub async fn leaf(ds: &impl DagService, data: &str) -> ProtoNode {
    let node = MutableNode::with_data(data.as_bytes().to_vec())
        .finalize()
        .unwrap();
    ds.add(&Node::Proto(node.clone())).await.unwrap();
    node
}

pub async fn random_leaf(ds: &impl DagService) -> ProtoNode {
    let mut buf = [0u8; 16];
    rand::rng().fill_bytes(&mut buf);
    let node = MutableNode::with_data(buf.to_vec()).finalize().unwrap();
    ds.add(&Node::Proto(node.clone())).await.unwrap();
    node
}

/// A proto node with `data` linking to each `(name, child)`, added to `ds`
pub async fn dir(ds: &impl DagService, data: &str, children: &[(&str, &ProtoNode)]) -> ProtoNode {
    let mut builder = MutableNode::with_data(data.as_bytes().to_vec());
    for (name, child) in children {
        builder
            .add_node_link(name, &Node::Proto((*child).clone()))
            .unwrap();
    }
    let node = builder.finalize().unwrap();
    ds.add(&Node::Proto(node.clone())).await.unwrap();
    node
}

/// Follow `path` from `root`, reading every hop from `ds`
pub async fn resolve(ds: &impl DagService, root: &ProtoNode, path: &str) -> Node {
    let mut current = Node::Proto(root.clone());
    for name in path.split('/') {
        let cid = current.as_proto().unwrap().get_node_link(name).unwrap().cid;
        current = ds.get(&cid).await.unwrap();
    }
    current
}

/// A memory store that counts reads
#[derive(Default, Clone)]
pub struct CountingDagService {
    pub inner: MemoryDagService,
    gets: Arc<AtomicUsize>,
}

impl CountingDagService {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DagService for CountingDagService {
    async fn get(&self, cid: &Cid) -> Result<Node, DagError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(cid).await
    }

    async fn add(&self, node: &Node) -> Result<(), DagError> {
        self.inner.add(node).await
    }

    async fn remove(&self, cid: &Cid) -> Result<(), DagError> {
        self.inner.remove(cid).await
    }

    async fn has(&self, cid: &Cid) -> Result<bool, DagError> {
        self.inner.has(cid).await
    }
}
