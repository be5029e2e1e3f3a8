/**
 * Dag-pb wire format. Hand-rolled protobuf for the
 *  two messages a node is made of.
 */
pub mod codec;
pub mod config;
/**
 * Cancellation and deadlines for anything that
 *  talks to a store.
 */
pub mod context;
pub mod link;
/**
 * Node model: builders, finalized proto nodes
 *  and raw leaves.
 */
pub mod node;
/**
 * Content identifier formats: which version, codec
 *  and hash function a node is identified with.
 */
pub mod prefix;
/**
 * The dag service abstraction and an in-memory
 *  implementation of it.
 */
pub mod service;
/**
 * Walking and fetching graphs of nodes.
 */
pub mod traversal;

pub use cid::Cid;

pub mod prelude {
    pub use crate::codec::CodecError;
    pub use crate::config::{ConfigError, DagConfig};
    pub use crate::context::{CancelHandle, Context};
    pub use crate::link::Link;
    pub use crate::node::{MutableNode, Node, NodeError, NodeStat, ProtoNode, RawNode};
    pub use crate::prefix::{prefix_for_cid_version, CidPrefix, HashFunction, DAG_PB, RAW};
    pub use crate::service::{DagError, DagService, MemoryDagService};
    pub use crate::traversal::{
        fetch_graph, fetch_graph_with_depth_limit, get_links_direct, walk, walk_depth,
        walk_depth_with_options, CidSet, FetchOptions, ProgressTracker, WalkOptions,
    };
    pub use cid::Cid;
}
