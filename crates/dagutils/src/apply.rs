use merkledag::prelude::*;

use crate::diff::{node_data, Change, ChangeType, NODE_DATA_PATH};
use crate::editor::{Editor, EditorError};

/// Apply `changes` to `root` in order, reading the nodes they point
///  at from `ds` and writing the new tree back into it.
///
/// Not transactional: the first failing change aborts the whole
///  run and leaves `ds` with whatever was written up to then.
pub async fn apply_change<S>(
    ds: &S,
    root: &ProtoNode,
    changes: &[Change],
) -> Result<ProtoNode, EditorError>
where
    S: DagService,
{
    let mut editor = Editor::new(root.clone(), Some(ds));

    for change in changes {
        tracing::trace!("apply_change: {}", change);
        match change.kind {
            ChangeType::Add => {
                let node = target_node(ds, change).await?;
                editor
                    .insert_node_at_path(&change.path, &Node::Proto(node), None)
                    .await?;
            }
            ChangeType::Remove => {
                editor.remove_link_at_path(&change.path).await?;
            }
            ChangeType::Mod if change.is_node_data() => {
                let after = change
                    .after
                    .ok_or_else(|| EditorError::MissingTarget(change.path.clone()))?;
                let data = node_data(ds, &after).await?;
                editor.set_data_at_path(data_parent(&change.path), data).await?;
            }
            ChangeType::Mod => {
                let node = target_node(ds, change).await?;
                editor.remove_link_at_path(&change.path).await?;
                editor
                    .insert_node_at_path(&change.path, &Node::Proto(node), None)
                    .await?;
            }
        }
    }

    let new_root = editor.finalize(ds).await?;
    tracing::debug!(
        "apply_change: applied {} changes to {}, new root {}",
        changes.len(),
        root.cid(),
        new_root.cid()
    );
    Ok(new_root)
}

async fn target_node<S>(ds: &S, change: &Change) -> Result<ProtoNode, EditorError>
where
    S: DagService,
{
    let after = change
        .after
        .ok_or_else(|| EditorError::MissingTarget(change.path.clone()))?;
    let node = ds.get(&after).await?;
    Ok(node.into_proto()?)
}

/// Path of the node a `<NODE-DATA>` change applies to
fn data_parent(path: &str) -> &str {
    path.strip_suffix(NODE_DATA_PATH)
        .map(|parent| parent.trim_end_matches('/'))
        .unwrap_or(path)
}
