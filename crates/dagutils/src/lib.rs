/**
 * Applying a list of changes back onto a tree.
 */
pub mod apply;
/**
 * Structural diffs between two proto nodes, and
 *  merging of independently computed diffs.
 */
pub mod diff;
/**
 * Path-based editing of a tree of proto nodes,
 *  staged in memory until finalized into a store.
 */
pub mod editor;

pub mod prelude {
    pub use crate::apply::apply_change;
    pub use crate::diff::{diff, merge_diffs, Change, ChangeType, Conflict, NODE_DATA_PATH};
    pub use crate::editor::{CreateNode, Editor, EditorError};
}
