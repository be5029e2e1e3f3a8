//! Shared test utilities for merkledag integration tests
#![allow(dead_code)]

use merkledag::prelude::*;
use rand::RngCore;
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber, honouring RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn node_with_data(data: &[u8]) -> MutableNode {
    MutableNode::with_data(data.to_vec())
}

/// A proto node holding 16 random bytes, added to `ds`
pub async fn random_leaf(ds: &impl DagService) -> ProtoNode {
    let mut buf = [0u8; 16];
    rand::rng().fill_bytes(&mut buf);
    let node = node_with_data(&buf).finalize().unwrap();
    ds.add(&Node::Proto(node.clone())).await.unwrap();
    node
}

/// Build (and store) the graph
///
/// ```text
/// root -> l11 -> l21
///             -> l22
///             -> l23
///      -> l12
///      -> l23
/// ```
///
/// Links are named after the cid they point to.
pub async fn make_depth_testing_graph(ds: &impl DagService) -> ProtoNode {
    let l12 = node_with_data(b"leve1_node2").finalize().unwrap();
    let l21 = node_with_data(b"leve2_node1").finalize().unwrap();
    let l22 = node_with_data(b"leve2_node2").finalize().unwrap();
    let l23 = node_with_data(b"leve2_node3").finalize().unwrap();

    let mut l11 = node_with_data(b"leve1_node1");
    for child in [&l21, &l22, &l23] {
        l11.add_node_link(&child.cid().to_string(), &Node::Proto(child.clone()))
            .unwrap();
    }
    let l11 = l11.finalize().unwrap();

    let mut root = MutableNode::new();
    for child in [&l11, &l12, &l23] {
        root.add_node_link(&child.cid().to_string(), &Node::Proto(child.clone()))
            .unwrap();
    }
    let root = root.finalize().unwrap();

    for node in [&l23, &l22, &l21, &l12, &l11, &root] {
        ds.add(&Node::Proto(node.clone())).await.unwrap();
    }
    root
}

/// A tree `depth` levels deep where every inner node has `width`
///  children and every leaf is random. Returns the root and the
///  number of nodes below it.
pub async fn make_wide_dag(ds: &impl DagService, depth: usize, width: usize) -> (ProtoNode, usize) {
    if depth == 0 {
        return (random_leaf(ds).await, 0);
    }
    let mut builder = MutableNode::new();
    let mut below = 0;
    for i in 0..width {
        let (child, child_below) = Box::pin(make_wide_dag(ds, depth - 1, width)).await;
        builder
            .add_node_link(&i.to_string(), &Node::Proto(child))
            .unwrap();
        below += child_below + 1;
    }
    let node = builder.finalize().unwrap();
    ds.add(&Node::Proto(node.clone())).await.unwrap();
    (node, below)
}
