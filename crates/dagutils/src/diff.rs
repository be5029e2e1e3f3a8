use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use futures::future::BoxFuture;
use merkledag::prelude::*;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

/// Pseudo path a change to a node's own data is reported at
pub const NODE_DATA_PATH: &str = "<NODE-DATA>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Add,
    Remove,
    Mod,
}

/// A single edit turning one tree into another.
///  `before` is unset for additions and `after` for removals.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeType,
    pub path: String,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub before: Option<Cid>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub after: Option<Cid>,
}

impl Change {
    pub fn add(path: impl Into<String>, after: Cid) -> Self {
        Self {
            kind: ChangeType::Add,
            path: path.into(),
            before: None,
            after: Some(after),
        }
    }

    pub fn remove(path: impl Into<String>, before: Cid) -> Self {
        Self {
            kind: ChangeType::Remove,
            path: path.into(),
            before: Some(before),
            after: None,
        }
    }

    pub fn modify(path: impl Into<String>, before: Cid, after: Cid) -> Self {
        Self {
            kind: ChangeType::Mod,
            path: path.into(),
            before: Some(before),
            after: Some(after),
        }
    }

    /// Whether this change targets a node's data rather than a link
    pub fn is_node_data(&self) -> bool {
        self.path == NODE_DATA_PATH || self.path.ends_with(&format!("/{}", NODE_DATA_PATH))
    }
}

fn cid_or_undef(cid: &Option<Cid>) -> String {
    match cid {
        Some(cid) => cid.to_string(),
        None => "<undef>".to_string(),
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChangeType::Add => write!(f, "Added {} at {}", cid_or_undef(&self.after), self.path),
            ChangeType::Remove => write!(
                f,
                "Removed {} from {}",
                cid_or_undef(&self.before),
                self.path
            ),
            ChangeType::Mod => write!(
                f,
                "Changed {} to {} at {}",
                cid_or_undef(&self.before),
                cid_or_undef(&self.after),
                self.path
            ),
        }
    }
}

/// Two changes from different diffs touching the same path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub a: Change,
    pub b: Change,
}

// links of one node sharing a name, ordered by target
struct SameNameLinks<'a> {
    name: &'a str,
    links: Vec<&'a Link>,
}

impl SameNameLinks<'_> {
    fn single(&self) -> Option<&Link> {
        match self.links.as_slice() {
            [link] => Some(*link),
            _ => None,
        }
    }

    fn report(&self, kind: ChangeType, out: &mut Vec<Change>) {
        for link in &self.links {
            match kind {
                ChangeType::Add => out.push(Change::add(&link.name, link.cid)),
                ChangeType::Remove => out.push(Change::remove(&link.name, link.cid)),
                ChangeType::Mod => {}
            }
        }
    }
}

/// Group links by name, sorting by name and then by the
///  string form of the target
fn grouped_links(node: &ProtoNode) -> Vec<SameNameLinks<'_>> {
    let mut links: Vec<(&Link, String)> = node
        .links()
        .iter()
        .map(|link| (link, link.cid.to_string()))
        .collect();
    links.sort_by(|(a, a_cid), (b, b_cid)| a.name.cmp(&b.name).then_with(|| a_cid.cmp(b_cid)));

    let mut groups: Vec<SameNameLinks<'_>> = Vec::new();
    for (link, _) in links {
        match groups.last_mut() {
            Some(group) if group.name == link.name => group.links.push(link),
            _ => groups.push(SameNameLinks {
                name: &link.name,
                links: vec![link],
            }),
        }
    }
    groups
}

/// The changes that turn `a` into `b`.
///
/// Links are matched by name. A name carried by more than one link
///  on either side is reported as a wholesale removal and addition.
///  Single links with different targets are diffed recursively,
///  with the sub-changes prefixed by the link name; two leaf targets
///  are reported as one modification at the link name.
pub async fn diff<S>(ds: &S, a: &ProtoNode, b: &ProtoNode) -> Result<Vec<Change>, DagError>
where
    S: DagService + ?Sized,
{
    diff_nodes(ds, a, b).await
}

fn diff_nodes<'a, S>(
    ds: &'a S,
    a: &'a ProtoNode,
    b: &'a ProtoNode,
) -> BoxFuture<'a, Result<Vec<Change>, DagError>>
where
    S: DagService + ?Sized,
{
    Box::pin(async move {
        if a.cid() == b.cid() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        if a.data() != b.data() {
            out.push(Change::modify(NODE_DATA_PATH, a.cid(), b.cid()));
        }

        let groups_a = grouped_links(a);
        let groups_b = grouped_links(b);
        let (mut i, mut j) = (0, 0);
        while i < groups_a.len() && j < groups_b.len() {
            let group_a = &groups_a[i];
            let group_b = &groups_b[j];

            match group_a.name.cmp(group_b.name) {
                std::cmp::Ordering::Less => {
                    group_a.report(ChangeType::Remove, &mut out);
                    i += 1;
                    continue;
                }
                std::cmp::Ordering::Greater => {
                    group_b.report(ChangeType::Add, &mut out);
                    j += 1;
                    continue;
                }
                std::cmp::Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }

            match (group_a.single(), group_b.single()) {
                (Some(link_a), Some(link_b)) => {
                    if link_a.cid != link_b.cid {
                        out.extend(diff_links(ds, link_a, link_b).await?);
                    }
                }
                _ => {
                    group_a.report(ChangeType::Remove, &mut out);
                    group_b.report(ChangeType::Add, &mut out);
                }
            }
        }

        for group in &groups_a[i..] {
            group.report(ChangeType::Remove, &mut out);
        }
        for group in &groups_b[j..] {
            group.report(ChangeType::Add, &mut out);
        }

        Ok(out)
    })
}

async fn diff_links<S>(ds: &S, a: &Link, b: &Link) -> Result<Vec<Change>, DagError>
where
    S: DagService + ?Sized,
{
    let node_a = ds.get(&a.cid).await?;
    let node_b = ds.get(&b.cid).await?;

    if node_a.links().is_empty() && node_b.links().is_empty() {
        return Ok(vec![Change::modify(&a.name, a.cid, b.cid)]);
    }

    let node_a = node_a.into_proto()?;
    let node_b = node_b.into_proto()?;
    let sub = diff_nodes(ds, &node_a, &node_b).await?;
    Ok(sub
        .into_iter()
        .map(|mut change| {
            change.path = format!("{}/{}", a.name, change.path);
            change
        })
        .collect())
}

/// Combine two diffs of the same base.
///  Changes of `a` and `b` at the same path conflict and are left
///  out of the merged list. The merged list holds `a`'s remaining
///  changes in order, followed by `b`'s.
///
/// A `b` change conflicts at most once. If `a` holds several changes
///  at that path, only the first is reported as a conflict and the
///  later ones are kept in the merged list.
pub fn merge_diffs(a: &[Change], b: &[Change]) -> (Vec<Change>, Vec<Conflict>) {
    let mut paths: HashMap<&str, &Change> = HashMap::new();
    for change in b {
        paths.insert(&change.path, change);
    }

    let mut merged = Vec::new();
    let mut conflicts = Vec::new();
    for change_a in a {
        match paths.remove(change_a.path.as_str()) {
            Some(change_b) => conflicts.push(Conflict {
                a: change_a.clone(),
                b: change_b.clone(),
            }),
            None => merged.push(change_a.clone()),
        }
    }

    for change_b in b {
        if paths.contains_key(change_b.path.as_str()) {
            merged.push(change_b.clone());
        }
    }

    (merged, conflicts)
}

/// Data of the node behind `cid`, for changes at [`NODE_DATA_PATH`]
pub(crate) async fn node_data<S>(ds: &S, cid: &Cid) -> Result<Bytes, DagError>
where
    S: DagService + ?Sized,
{
    let node = ds.get(cid).await?.into_proto()?;
    Ok(node.data().clone())
}
