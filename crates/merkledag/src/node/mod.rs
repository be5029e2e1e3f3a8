use std::fmt;

use bytes::Bytes;
use cid::Cid;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::codec::CodecError;
use crate::link::Link;
use crate::prefix::{DAG_PB, RAW};

mod mutable;
mod proto;
mod raw;

pub use mutable::MutableNode;
pub use proto::ProtoNode;
pub use raw::RawNode;

/**
 * Nodes
 * =====
 * A node is a block of bytes identified by the hash of those bytes.
 *  There are two kinds we know how to store and walk:
 *  - Proto nodes: dag-pb encoded, carrying opaque data plus an
 *     ordered list of named links to other nodes
 *  - Raw nodes: opaque leaves with no links at all
 * Proto nodes are assembled with a [`MutableNode`] and become
 *  an immutable [`ProtoNode`] once finalized, so a content id
 *  is never handed out for a node that is still changing.
 */

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("link name must not be empty")]
    EmptyName,
    #[error("no link named {0:?}")]
    LinkNotFound(String),
    #[error("end of path, no more links to resolve")]
    EndOfPath,
    #[error("unsupported hash function: 0x{0:x}")]
    UnsupportedHashFunction(u64),
    #[error("unknown hash function: {0}")]
    UnknownHashFunction(String),
    #[error("unsupported cid version: {0}")]
    UnsupportedCidVersion(u64),
    #[error("invalid cid prefix: {0}")]
    InvalidPrefix(String),
    #[error("unsupported codec: 0x{0:x}")]
    UnsupportedCodec(u64),
    #[error("hash error: {0}")]
    Hash(String),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("node {cid} is not a {expected} node")]
    NotExpectedNodeKind { cid: Cid, expected: &'static str },
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sizes describing a single proto node
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeStat {
    #[serde_as(as = "DisplayFromStr")]
    pub hash: Cid,
    pub num_links: usize,
    // size of the encoded block
    pub block_size: usize,
    // size of the encoded links section
    pub links_size: usize,
    pub data_size: usize,
    // block size plus the sizes of everything linked
    pub cumulative_size: u64,
}

impl fmt::Display for NodeStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NodeStat{{NumLinks: {}, BlockSize: {}, LinksSize: {}, DataSize: {}, CumulativeSize: {}}}",
            self.num_links, self.block_size, self.links_size, self.data_size, self.cumulative_size
        )
    }
}

/// Anything a dag service can store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Proto(ProtoNode),
    Raw(RawNode),
}

impl Node {
    /// Interpret a stored block according to the codec of its cid
    pub fn from_block(cid: Cid, block: Bytes) -> Result<Self, NodeError> {
        match cid.codec() {
            DAG_PB => Ok(Node::Proto(ProtoNode::from_block(cid, block)?)),
            RAW => Ok(Node::Raw(RawNode::from_block(cid, block))),
            other => Err(NodeError::UnsupportedCodec(other)),
        }
    }

    pub fn cid(&self) -> Cid {
        match self {
            Node::Proto(node) => node.cid(),
            Node::Raw(node) => node.cid(),
        }
    }

    /// The encoded block this node is stored as
    pub fn raw_data(&self) -> &Bytes {
        match self {
            Node::Proto(node) => node.raw_data(),
            Node::Raw(node) => node.raw_data(),
        }
    }

    pub fn links(&self) -> &[Link] {
        match self {
            Node::Proto(node) => node.links(),
            Node::Raw(_) => &[],
        }
    }

    /// Cumulative size of the node and everything it links to
    pub fn size(&self) -> Result<u64, NodeError> {
        match self {
            Node::Proto(node) => node.size(),
            Node::Raw(node) => Ok(node.size()),
        }
    }

    pub fn is_proto(&self) -> bool {
        matches!(self, Node::Proto(_))
    }

    pub fn as_proto(&self) -> Result<&ProtoNode, NodeError> {
        match self {
            Node::Proto(node) => Ok(node),
            Node::Raw(node) => Err(NodeError::NotExpectedNodeKind {
                cid: node.cid(),
                expected: "proto",
            }),
        }
    }

    pub fn into_proto(self) -> Result<ProtoNode, NodeError> {
        match self {
            Node::Proto(node) => Ok(node),
            Node::Raw(node) => Err(NodeError::NotExpectedNodeKind {
                cid: node.cid(),
                expected: "proto",
            }),
        }
    }
}

impl From<ProtoNode> for Node {
    fn from(node: ProtoNode) -> Self {
        Node::Proto(node)
    }
}

impl From<RawNode> for Node {
    fn from(node: RawNode) -> Self {
        Node::Raw(node)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prefix::CidPrefix;

    #[test]
    fn test_from_block_dispatches_on_codec() {
        let proto = MutableNode::with_data(b"proto".to_vec()).finalize().unwrap();
        let raw = RawNode::new(b"raw".to_vec()).unwrap();

        let node = Node::from_block(proto.cid(), proto.raw_data().clone()).unwrap();
        assert!(node.is_proto());
        assert_eq!(node, Node::Proto(proto));

        let node = Node::from_block(raw.cid(), raw.raw_data().clone()).unwrap();
        assert!(!node.is_proto());
        assert!(node.links().is_empty());
        assert_eq!(node.size().unwrap(), 3);

        let cbor = CidPrefix::v1().with_codec(0x71).sum(b"x").unwrap();
        assert!(matches!(
            Node::from_block(cbor, Bytes::from_static(b"x")),
            Err(NodeError::UnsupportedCodec(0x71))
        ));
    }

    #[test]
    fn test_into_proto_rejects_raw() {
        let raw = RawNode::new(b"leaf".to_vec()).unwrap();
        let cid = raw.cid();
        match Node::from(raw).into_proto() {
            Err(NodeError::NotExpectedNodeKind { cid: got, expected }) => {
                assert_eq!(got, cid);
                assert_eq!(expected, "proto");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
