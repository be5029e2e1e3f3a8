use cid::Cid;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::node::{Node, NodeError};

/// A named, sized reference from one node to another.
///  `size` is the cumulative byte size of the subtree behind
///  `cid`. It is carried along for callers and never verified.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
    #[serde(rename = "Cid")]
    #[serde_as(as = "DisplayFromStr")]
    pub cid: Cid,
}

impl Link {
    pub fn new(name: impl Into<String>, size: u64, cid: Cid) -> Self {
        Self {
            name: name.into(),
            size,
            cid,
        }
    }

    /// Link to `node` under `name`, recording the node's cumulative size
    pub fn from_node(name: impl Into<String>, node: &Node) -> Result<Self, NodeError> {
        Ok(Self {
            name: name.into(),
            size: node.size()?,
            cid: node.cid(),
        })
    }
}
