use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::codec::encode_node;
use crate::link::Link;
use crate::prefix::{CidPrefix, DAG_PB};

use super::{Node, NodeError, ProtoNode};

/// Stable sort by link name. Links sharing a name keep their relative order.
pub(crate) fn sort_links(links: &mut [Link]) {
    links.sort_by(|a, b| a.name.cmp(&b.name));
}

#[serde_as]
#[derive(Serialize, Deserialize)]
pub(super) struct NodeJson {
    #[serde_as(as = "Base64")]
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Builder for a [`ProtoNode`].
///  Links are kept sorted by name after every change, so finalizing
///  the same set of links and data always produces the same block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutableNode {
    data: Bytes,
    links: Vec<Link>,
    // unset means CIDv0
    prefix: Option<CidPrefix>,
}

impl MutableNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub(super) fn from_parts(data: Bytes, links: Vec<Link>, prefix: Option<CidPrefix>) -> Self {
        Self {
            data,
            links,
            prefix,
        }
    }

    /// Read a builder from its json form
    pub fn from_json(json: &str) -> Result<Self, NodeError> {
        let NodeJson { data, mut links } = serde_json::from_str(json)?;
        sort_links(&mut links);
        Ok(Self {
            data: Bytes::from(data),
            links,
            prefix: None,
        })
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn set_links(&mut self, mut links: Vec<Link>) {
        sort_links(&mut links);
        self.links = links;
    }

    /// Link `node` under `name`
    pub fn add_node_link(&mut self, name: &str, node: &Node) -> Result<(), NodeError> {
        if name.is_empty() {
            return Err(NodeError::EmptyName);
        }
        let link = Link::from_node(name, node)?;
        self.push_link(link);
        Ok(())
    }

    /// Add a copy of `link` under `name`
    pub fn add_raw_link(&mut self, name: &str, link: &Link) -> Result<(), NodeError> {
        if name.is_empty() {
            return Err(NodeError::EmptyName);
        }
        self.push_link(Link::new(name, link.size, link.cid));
        Ok(())
    }

    fn push_link(&mut self, link: Link) {
        self.links.push(link);
        sort_links(&mut self.links);
    }

    /// Remove every link named `name`
    pub fn remove_node_link(&mut self, name: &str) -> Result<(), NodeError> {
        let before = self.links.len();
        self.links.retain(|link| link.name != name);
        if self.links.len() == before {
            return Err(NodeError::LinkNotFound(name.to_string()));
        }
        sort_links(&mut self.links);
        Ok(())
    }

    /// A copy of this builder with the link `name` pointing at `node`
    pub fn update_node_link(&self, name: &str, node: &ProtoNode) -> Result<MutableNode, NodeError> {
        let mut updated = self.clone();
        match updated.remove_node_link(name) {
            Ok(()) | Err(NodeError::LinkNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        updated.add_node_link(name, &Node::Proto(node.clone()))?;
        Ok(updated)
    }

    pub fn get_node_link(&self, name: &str) -> Result<&Link, NodeError> {
        self.links
            .iter()
            .find(|link| link.name == name)
            .ok_or_else(|| NodeError::LinkNotFound(name.to_string()))
    }

    pub fn cid_prefix(&self) -> CidPrefix {
        self.prefix.unwrap_or_default()
    }

    /// Set the prefix used to hash this node. The codec is always
    ///  dag-pb; `None` goes back to CIDv0.
    pub fn set_cid_prefix(&mut self, prefix: Option<CidPrefix>) {
        self.prefix = prefix.map(|prefix| prefix.with_codec(DAG_PB));
    }

    pub fn set_cid_format(
        &mut self,
        version: u64,
        hash_code: u64,
        length: Option<usize>,
    ) -> Result<(), NodeError> {
        self.prefix = Some(CidPrefix::new(version, hash_code, length)?);
        Ok(())
    }

    /// Encode and hash the current state. The builder is left untouched.
    pub fn finalize(&self) -> Result<ProtoNode, NodeError> {
        let prefix = self.cid_prefix();
        let mut links = self.links.clone();
        sort_links(&mut links);
        let encoded = Bytes::from(encode_node(&links, &self.data));
        let cid = prefix.sum(&encoded)?;
        Ok(ProtoNode::from_parts(
            links,
            self.data.clone(),
            encoded,
            cid,
            prefix,
        ))
    }
}
