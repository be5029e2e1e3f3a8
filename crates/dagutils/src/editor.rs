use futures::future::BoxFuture;
use merkledag::prelude::*;

/// Builds intermediate nodes for path segments that do not exist yet
pub type CreateNode<'c> = &'c (dyn Fn() -> MutableNode + Send + Sync);

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("path segments must not be empty")]
    EmptyName,
    #[error("change at {0} has no target node")]
    MissingTarget(String),
    #[error("dag error: {0}")]
    Dag(#[source] DagError),
    #[error("node error: {0}")]
    Node(#[from] NodeError),
}

impl From<DagError> for EditorError {
    fn from(e: DagError) -> Self {
        match e {
            DagError::Node(e) => EditorError::Node(e),
            e => EditorError::Dag(e),
        }
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, EditorError> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(EditorError::EmptyName);
    }
    Ok(segments)
}

/// Path-addressed edits against a tree of proto nodes.
///
/// Every node the editor writes goes to a private in-memory staging
///  store. Nodes it only needs to read are looked up in staging
///  first and then in the optional source store, so an edit deep in
///  a large tree only loads the nodes along the edited path.
///  [`Editor::finalize`] copies the new nodes out of staging.
pub struct Editor<'a> {
    root: ProtoNode,
    staging: MemoryDagService,
    source: Option<&'a dyn DagService>,
}

impl<'a> Editor<'a> {
    pub fn new<S>(root: ProtoNode, source: Option<&'a S>) -> Self
    where
        S: DagService + 'a,
    {
        Self {
            root,
            staging: MemoryDagService::new(),
            source: source.map(|source| source as &dyn DagService),
        }
    }

    pub fn without_source(root: ProtoNode) -> Self {
        Self {
            root,
            staging: MemoryDagService::new(),
            source: None,
        }
    }

    /// A copy of the current root
    pub fn get_node(&self) -> ProtoNode {
        self.root.clone()
    }

    /// The staging store holding every node written so far
    pub fn dag_service(&self) -> &MemoryDagService {
        &self.staging
    }

    /// Link `node` at `path`, replacing whatever the last segment
    ///  pointed at. Missing intermediate nodes are built with `create`
    ///  when one is given, otherwise they fail the edit.
    pub async fn insert_node_at_path(
        &mut self,
        path: &str,
        node: &Node,
        create: Option<CreateNode<'_>>,
    ) -> Result<(), EditorError> {
        let segments = split_path(path)?;
        let root = self.root.clone();
        let mutable = root.to_mutable();
        let new_root = self
            .insert_inner(Some(root), mutable, &segments, node, create)
            .await?;
        tracing::debug!(
            "Editor::insert_node_at_path: inserted {} at {}, new root {}",
            node.cid(),
            path,
            new_root.cid()
        );
        self.root = new_root;
        self.prune_staging().await
    }

    /// Remove every link named by the last segment of `path`
    pub async fn remove_link_at_path(&mut self, path: &str) -> Result<(), EditorError> {
        let segments = split_path(path)?;
        let root = self.root.clone();
        let new_root = self.remove_inner(&root, &segments).await?;
        tracing::debug!(
            "Editor::remove_link_at_path: removed {}, new root {}",
            path,
            new_root.cid()
        );
        self.root = new_root;
        self.prune_staging().await
    }

    /// Replace the data of the node at `path`. An empty path is the root.
    pub async fn set_data_at_path(
        &mut self,
        path: &str,
        data: impl Into<bytes::Bytes>,
    ) -> Result<(), EditorError> {
        let segments = if path.is_empty() {
            Vec::new()
        } else {
            split_path(path)?
        };
        let data = data.into();
        let root = self.root.clone();
        let new_root = self.set_data_inner(&root, &segments, &data).await?;
        tracing::debug!(
            "Editor::set_data_at_path: set data at {:?}, new root {}",
            path,
            new_root.cid()
        );
        self.root = new_root;
        self.prune_staging().await
    }

    /// Drop staged nodes the current root no longer reaches.
    ///  A replaced node may still be linked from another path, so
    ///  nothing is dropped until the whole edit is done.
    async fn prune_staging(&self) -> Result<(), EditorError> {
        let mut reachable = CidSet::new();
        walk_depth_with_options(
            &Context::background(),
            get_links_direct(&self.staging),
            self.root.cid(),
            |cid, _| reachable.visit(cid),
            WalkOptions {
                skip_root: false,
                ignore_missing: true,
            },
        )
        .await?;

        let stale: Vec<Cid> = self
            .staging
            .cids()
            .into_iter()
            .filter(|cid| !reachable.contains(cid))
            .collect();
        tracing::trace!("Editor: dropping {} superseded staged nodes", stale.len());
        for cid in stale {
            self.staging.remove(&cid).await?;
        }
        Ok(())
    }

    /// Write the current root and every node it reaches through
    ///  staging into `dest`. Links missing from staging point at
    ///  nodes the editor never touched; those are left for `dest`
    ///  to already hold and are not read from the source.
    pub async fn finalize<D>(&self, dest: &D) -> Result<ProtoNode, EditorError>
    where
        D: DagService + ?Sized,
    {
        let root = self.get_node();
        self.copy_dag(Node::Proto(root.clone()), dest).await?;
        tracing::debug!("Editor::finalize: committed {}", root.cid());
        Ok(root)
    }

    fn copy_dag<'b, D>(&'b self, node: Node, dest: &'b D) -> BoxFuture<'b, Result<(), EditorError>>
    where
        D: DagService + ?Sized,
    {
        Box::pin(async move {
            dest.add(&node).await?;
            for link in node.links() {
                let child = match self.staging.get(&link.cid).await {
                    Ok(child) => child,
                    Err(DagError::NotFound(_)) => continue,
                    Err(e) => return Err(e.into()),
                };
                self.copy_dag(child, dest).await?;
            }
            Ok(())
        })
    }

    /// The proto node linked from `parent` under `name`, read from
    ///  staging and then from the source
    async fn linked_proto_node(&self, parent: &ProtoNode, name: &str) -> Result<ProtoNode, DagError> {
        match parent.get_linked_proto_node(&self.staging, name).await {
            Err(DagError::NotFound(cid)) => match self.source {
                Some(source) => parent.get_linked_proto_node(source, name).await,
                None => Err(DagError::NotFound(cid)),
            },
            res => res,
        }
    }

    /// The existing child under `name` along with a builder for its
    ///  replacement, or only a fresh builder when it gets created
    async fn linked_child(
        &self,
        orig: Option<&ProtoNode>,
        name: &str,
        create: Option<CreateNode<'_>>,
    ) -> Result<(Option<ProtoNode>, MutableNode), EditorError> {
        let Some(orig) = orig else {
            return match create {
                Some(create) => Ok((None, create())),
                None => Err(NodeError::LinkNotFound(name.to_string()).into()),
            };
        };

        match self.linked_proto_node(orig, name).await {
            Ok(child) => {
                let mutable = child.to_mutable();
                Ok((Some(child), mutable))
            }
            Err(DagError::Node(NodeError::LinkNotFound(missing))) => match create {
                Some(create) => {
                    tracing::trace!("Editor: creating intermediate node {}", name);
                    Ok((None, create()))
                }
                None => Err(NodeError::LinkNotFound(missing).into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    fn insert_inner<'b>(
        &'b self,
        orig: Option<ProtoNode>,
        mut mutable: MutableNode,
        path: &'b [&'b str],
        node: &'b Node,
        create: Option<CreateNode<'b>>,
    ) -> BoxFuture<'b, Result<ProtoNode, EditorError>> {
        Box::pin(async move {
            let (name, rest) = path.split_first().ok_or(EditorError::EmptyName)?;

            let child = if rest.is_empty() {
                self.staging.add(node).await?;
                node.clone()
            } else {
                let (child, child_mutable) = self.linked_child(orig.as_ref(), name, create).await?;
                let new_child = self
                    .insert_inner(child, child_mutable, rest, node, create)
                    .await?;
                Node::Proto(new_child)
            };

            self.commit_link(&mut mutable, name, &child).await
        })
    }

    fn remove_inner<'b>(
        &'b self,
        orig: &'b ProtoNode,
        path: &'b [&'b str],
    ) -> BoxFuture<'b, Result<ProtoNode, EditorError>> {
        Box::pin(async move {
            let (name, rest) = path.split_first().ok_or(EditorError::EmptyName)?;
            let mut mutable = orig.to_mutable();

            if rest.is_empty() {
                mutable.remove_node_link(name)?;
                let finalized = mutable.finalize()?;
                self.staging.add(&Node::Proto(finalized.clone())).await?;
                return Ok(finalized);
            }

            let child = self.linked_proto_node(orig, name).await?;
            let new_child = self.remove_inner(&child, rest).await?;
            self.commit_link(&mut mutable, name, &Node::Proto(new_child))
                .await
        })
    }

    fn set_data_inner<'b>(
        &'b self,
        orig: &'b ProtoNode,
        path: &'b [&'b str],
        data: &'b bytes::Bytes,
    ) -> BoxFuture<'b, Result<ProtoNode, EditorError>> {
        Box::pin(async move {
            let mut mutable = orig.to_mutable();

            let Some((name, rest)) = path.split_first() else {
                mutable.set_data(data.clone());
                let finalized = mutable.finalize()?;
                self.staging.add(&Node::Proto(finalized.clone())).await?;
                return Ok(finalized);
            };

            let child = self.linked_proto_node(orig, name).await?;
            let new_child = self.set_data_inner(&child, rest, data).await?;
            self.commit_link(&mut mutable, name, &Node::Proto(new_child))
                .await
        })
    }

    /// Point `name` at `child`, then finalize into staging
    async fn commit_link(
        &self,
        mutable: &mut MutableNode,
        name: &str,
        child: &Node,
    ) -> Result<ProtoNode, EditorError> {
        match mutable.remove_node_link(name) {
            Ok(()) | Err(NodeError::LinkNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        mutable.add_node_link(name, child)?;
        let finalized = mutable.finalize()?;
        self.staging.add(&Node::Proto(finalized.clone())).await?;
        Ok(finalized)
    }
}
