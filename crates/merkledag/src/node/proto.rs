use bytes::Bytes;
use cid::Cid;

use crate::codec::{decode_node, encode_node};
use crate::link::Link;
use crate::prefix::CidPrefix;
use crate::service::{DagError, DagService};

use super::mutable::{sort_links, NodeJson};
use super::{MutableNode, Node, NodeError, NodeStat};

/// A finalized dag-pb node.
///  Links are kept exactly as they were encoded, which for anything
///  built by [`MutableNode::finalize`] means sorted by name. Decoded
///  blocks keep whatever order they arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoNode {
    links: Vec<Link>,
    data: Bytes,
    encoded: Bytes,
    cid: Cid,
    prefix: CidPrefix,
}

impl ProtoNode {
    pub(super) fn from_parts(
        links: Vec<Link>,
        data: Bytes,
        encoded: Bytes,
        cid: Cid,
        prefix: CidPrefix,
    ) -> Self {
        Self {
            links,
            data,
            encoded,
            cid,
            prefix,
        }
    }

    /// Decode a block and identify it by hashing with `prefix`
    pub fn decode(block: impl Into<Bytes>, prefix: &CidPrefix) -> Result<Self, NodeError> {
        let encoded = block.into();
        let (links, data) = decode_node(&encoded)?;
        let cid = prefix.sum(&encoded)?;
        Ok(Self::from_parts(links, data, encoded, cid, *prefix))
    }

    /// Decode a block that is already known to be identified by `cid`.
    ///  The hash function is not checked, so blocks addressed with
    ///  any multihash can be read; re-finalizing them needs a
    ///  supported one.
    pub fn from_block(cid: Cid, block: Bytes) -> Result<Self, NodeError> {
        let prefix = CidPrefix::from_cid(&cid);
        let (links, data) = decode_node(&block)?;
        Ok(Self::from_parts(links, data, block, cid, prefix))
    }

    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The encoded block this node was hashed from
    pub fn raw_data(&self) -> &Bytes {
        &self.encoded
    }

    pub fn cid_prefix(&self) -> CidPrefix {
        self.prefix
    }

    /// Encoded length plus the cumulative sizes of all links
    pub fn size(&self) -> Result<u64, NodeError> {
        self.links
            .iter()
            .try_fold(self.encoded.len() as u64, |acc, link| acc.checked_add(link.size))
            .ok_or_else(|| {
                NodeError::Encoding(format!("cumulative size of {} overflows u64", self.cid))
            })
    }

    pub fn stat(&self) -> Result<NodeStat, NodeError> {
        let block_size = self.encoded.len();
        Ok(NodeStat {
            hash: self.cid,
            num_links: self.links.len(),
            block_size,
            links_size: block_size - self.data.len(),
            data_size: self.data.len(),
            cumulative_size: self.size()?,
        })
    }

    /// First link carrying `name`
    pub fn get_node_link(&self, name: &str) -> Result<&Link, NodeError> {
        self.links
            .iter()
            .find(|link| link.name == name)
            .ok_or_else(|| NodeError::LinkNotFound(name.to_string()))
    }

    /// Resolve the first segment of `path` to a link, returning
    ///  the link and the segments left to resolve past it
    pub fn resolve_link<'a>(&self, path: &'a [&'a str]) -> Result<(&Link, &'a [&'a str]), NodeError> {
        let (first, rest) = path.split_first().ok_or(NodeError::EndOfPath)?;
        let link = self.get_node_link(first)?;
        Ok((link, rest))
    }

    /// Names of all links, in stored order
    pub fn tree(&self) -> Vec<String> {
        self.links.iter().map(|link| link.name.clone()).collect()
    }

    /// The bytes this node would encode to with its links sorted.
    ///  Equal to [`ProtoNode::raw_data`] for anything built by finalize.
    pub fn canonical_encoding(&self) -> Vec<u8> {
        let mut links = self.links.clone();
        sort_links(&mut links);
        encode_node(&links, &self.data)
    }

    /// A builder seeded with this node's data, links and prefix
    pub fn to_mutable(&self) -> MutableNode {
        MutableNode::from_parts(self.data.clone(), self.links.clone(), Some(self.prefix))
    }

    pub fn to_json(&self) -> Result<String, NodeError> {
        let json = NodeJson {
            data: self.data.to_vec(),
            links: self.links.clone(),
        };
        Ok(serde_json::to_string(&json)?)
    }

    /// Fetch the node behind the link named `name`
    pub async fn get_linked_node<S>(&self, ds: &S, name: &str) -> Result<Node, DagError>
    where
        S: DagService + ?Sized,
    {
        let link = self.get_node_link(name)?;
        ds.get(&link.cid).await
    }

    /// Like [`ProtoNode::get_linked_node`], failing if the target is not a proto node
    pub async fn get_linked_proto_node<S>(&self, ds: &S, name: &str) -> Result<ProtoNode, DagError>
    where
        S: DagService + ?Sized,
    {
        let node = self.get_linked_node(ds, name).await?;
        Ok(node.into_proto()?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::RawNode;
    use crate::service::MemoryDagService;

    fn empty() -> ProtoNode {
        MutableNode::new().finalize().unwrap()
    }

    fn foobar() -> ProtoNode {
        let child = Node::Proto(empty());
        let mut node = MutableNode::with_data(b"foobar".to_vec());
        for name in ["a", "b", "c"] {
            node.add_node_link(name, &child).unwrap();
        }
        node.finalize().unwrap()
    }

    #[test]
    fn test_empty_node_cid() {
        let node = empty();
        assert!(node.raw_data().is_empty());
        assert_eq!(
            node.cid().to_string(),
            "QmdfTbBqBPQ7VNxZEYEj14VmRuZBkqFbiwReogJgS1zR1n"
        );
    }

    #[test]
    fn test_stable_cid() {
        let node = foobar();
        assert_eq!(node.raw_data().len(), 137);
        assert_eq!(
            node.cid().to_string(),
            "QmXycug2uGiifuzVPeyrWTiZHTK13iE4hyqbqgcYZCj3aC"
        );

        let mut v1 = node.to_mutable();
        v1.set_cid_prefix(Some(CidPrefix::v1()));
        assert_eq!(
            v1.finalize().unwrap().cid().to_string(),
            "bafybeiepggrorzc6ee2ubezne4mgpjh6mmzdwajm6wieex6uw4b33tvqju"
        );
    }

    #[test]
    fn test_stat() {
        let node = foobar();
        let stat = node.stat().unwrap();
        assert_eq!(stat.hash, node.cid());
        assert_eq!(stat.num_links, 3);
        assert_eq!(stat.block_size, 137);
        assert_eq!(stat.data_size, 6);
        assert_eq!(stat.links_size, 131);
        // every child is the empty node, so sizes add nothing
        assert_eq!(stat.cumulative_size, 137);
        assert_eq!(
            stat.to_string(),
            "NodeStat{NumLinks: 3, BlockSize: 137, LinksSize: 131, DataSize: 6, CumulativeSize: 137}"
        );
    }

    #[test]
    fn test_size_overflow() {
        let child = Node::Raw(RawNode::new(b"x".to_vec()).unwrap());
        let mut builder = MutableNode::new();
        builder
            .add_raw_link("big", &Link::new("", u64::MAX, child.cid()))
            .unwrap();
        let node = builder.finalize().unwrap();
        assert!(matches!(node.size(), Err(NodeError::Encoding(_))));
    }

    #[test]
    fn test_decode_and_from_block_agree() {
        let node = foobar();
        let decoded = ProtoNode::decode(node.raw_data().clone(), &CidPrefix::v0()).unwrap();
        let from_block = ProtoNode::from_block(node.cid(), node.raw_data().clone()).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(from_block, node);
        assert_eq!(decoded.canonical_encoding(), node.raw_data().to_vec());
    }

    #[test]
    fn test_resolve_link() {
        let node = foobar();
        let path = ["b", "deeper", "still"];
        let (link, rest) = node.resolve_link(&path).unwrap();
        assert_eq!(link.name, "b");
        assert_eq!(rest, &["deeper", "still"]);

        assert!(matches!(node.resolve_link(&[]), Err(NodeError::EndOfPath)));
        assert!(matches!(
            node.resolve_link(&["zzz"]),
            Err(NodeError::LinkNotFound(name)) if name == "zzz"
        ));
        assert_eq!(node.tree(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_get_linked_nodes() {
        let ds = MemoryDagService::new();
        let leaf = RawNode::new(b"leaf".to_vec()).unwrap();
        let dir = MutableNode::with_data(b"dir".to_vec()).finalize().unwrap();
        ds.add(&Node::Raw(leaf.clone())).await.unwrap();
        ds.add(&Node::Proto(dir.clone())).await.unwrap();

        let mut builder = MutableNode::new();
        builder.add_node_link("leaf", &Node::Raw(leaf.clone())).unwrap();
        builder.add_node_link("dir", &Node::Proto(dir.clone())).unwrap();
        let root = builder.finalize().unwrap();

        let got = root.get_linked_node(&ds, "leaf").await.unwrap();
        assert_eq!(got, Node::Raw(leaf));
        let got = root.get_linked_proto_node(&ds, "dir").await.unwrap();
        assert_eq!(got, dir);

        assert!(matches!(
            root.get_linked_proto_node(&ds, "leaf").await,
            Err(DagError::Node(NodeError::NotExpectedNodeKind { .. }))
        ));
        assert!(matches!(
            root.get_linked_node(&ds, "nope").await,
            Err(DagError::Node(NodeError::LinkNotFound(_)))
        ));
    }
}
