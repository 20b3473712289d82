//! Transcript and tree materialization
//!
//! Turns the stored parent-pointer graph into caller-facing shapes: a
//! linear transcript for one branch, or the whole conversation as a nested
//! tree. Stateless; every call re-reads the store, so results are always a
//! consistent snapshot and safe to re-invoke.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::store::{Message, MessageStore};

/// Root-to-head transcript for the branch ending at `head_id`.
///
/// Walks parent links up to the root, then reverses. For every consecutive
/// pair in the result, the second message's parent is the first.
pub fn project(store: &MessageStore, head_id: &str) -> Result<Vec<Message>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = store.get(head_id)?;

    loop {
        if !seen.insert(current.id.clone()) {
            // Parent links must terminate; a revisit means the store is
            // corrupt, not that the caller erred
            return Err(StoreError::corrupt(format!(
                "cycle in parent links at message {}",
                current.id
            )));
        }
        let parent_id = current.parent_id.clone();
        chain.push(current);
        match parent_id {
            None => break,
            Some(ref parent) => current = store.get(parent)?,
        }
    }

    chain.reverse();
    Ok(chain)
}

/// Transcript of a conversation's most recent branch: the path to the
/// newest leaf.
pub fn project_root(store: &MessageStore, root_id: &str) -> Result<Vec<Message>> {
    let leaves = store.leaves(root_id)?;
    match leaves.first() {
        Some(newest) => project(store, &newest.id),
        None => Err(StoreError::NotFound(format!("conversation {}", root_id))),
    }
}

/// A conversation materialized as a nested tree, children oldest first.
#[derive(Debug, Serialize)]
pub struct TreeNode {
    pub message: Message,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Number of messages in this subtree.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }
}

/// Materialize the whole conversation under `root_id`.
///
/// The adjacency map is built from a single conversation scan rather than
/// per-node child queries; the scan's chronological order carries over to
/// each child list.
pub fn tree(store: &MessageStore, root_id: &str) -> Result<TreeNode> {
    let root = store.get(root_id).map_err(|e| match e {
        StoreError::NotFound(_) => StoreError::NotFound(format!("conversation {}", root_id)),
        other => other,
    })?;
    if !root.is_root() {
        return Err(StoreError::NotFound(format!("conversation {}", root_id)));
    }

    let mut children_by_parent: HashMap<String, Vec<Message>> = HashMap::new();
    for message in store.messages_in(root_id)? {
        if let Some(ref parent) = message.parent_id {
            children_by_parent
                .entry(parent.clone())
                .or_default()
                .push(message);
        }
    }

    Ok(build_node(root, &mut children_by_parent))
}

fn build_node(message: Message, children_by_parent: &mut HashMap<String, Vec<Message>>) -> TreeNode {
    let children = children_by_parent
        .remove(&message.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| build_node(child, children_by_parent))
        .collect();
    TreeNode { message, children }
}
