//! Parent-index view over a post's comments.
//!
//! Depth is found by walking parent links with a step bound and a visited
//! set, so a corrupted chain (a cycle, or a parent on another post) ends the
//! walk with an error instead of looping.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    #[error("comment {0} is not part of this thread")]
    Unknown(Uuid),
    #[error("comment chain through {0} loops back on itself")]
    Cycle(Uuid),
    #[error("comment nesting exceeds depth {0}")]
    TooDeep(usize),
}

#[derive(Debug, Clone, Copy)]
struct Node {
    parent: Option<Uuid>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct CommentTree {
    nodes: HashMap<Uuid, Node>,
}

impl CommentTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: Uuid, parent: Option<Uuid>, created_at: DateTime<Utc>) {
        self.nodes.insert(id, Node { parent, created_at });
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Depth of `id`, roots being 0. Fails once the walk passes `max_depth`.
    pub fn depth(&self, id: Uuid, max_depth: usize) -> Result<usize, WalkError> {
        let mut visited = HashSet::new();
        let mut current = id;
        let mut depth = 0;

        loop {
            if !visited.insert(current) {
                return Err(WalkError::Cycle(current));
            }
            let node = self.nodes.get(&current).ok_or(WalkError::Unknown(current))?;
            match node.parent {
                None => return Ok(depth),
                Some(parent) => {
                    depth += 1;
                    if depth > max_depth {
                        return Err(WalkError::TooDeep(max_depth));
                    }
                    current = parent;
                }
            }
        }
    }

    /// Depth a reply to `parent` would get.
    pub fn reply_depth(&self, parent: Uuid, max_depth: usize) -> Result<usize, WalkError> {
        let depth = self.depth(parent, max_depth)? + 1;
        if depth > max_depth {
            return Err(WalkError::TooDeep(max_depth));
        }
        Ok(depth)
    }

    /// Pre-order traversal: each root followed by its replies, siblings
    /// oldest first. Nodes stuck in a cycle or hanging off a missing parent
    /// are appended at depth 0 so nothing disappears from the listing.
    pub fn thread_order(&self) -> Vec<(Uuid, usize)> {
        let mut children: HashMap<Option<Uuid>, Vec<(DateTime<Utc>, Uuid)>> = HashMap::new();
        for (id, node) in &self.nodes {
            let parent = node.parent.filter(|p| self.nodes.contains_key(p));
            children.entry(parent).or_default().push((node.created_at, *id));
        }
        for list in children.values_mut() {
            list.sort();
        }

        let mut out = Vec::with_capacity(self.nodes.len());
        let mut emitted = HashSet::new();
        let mut stack: Vec<(Uuid, usize)> = children
            .get(&None)
            .map(|roots| roots.iter().rev().map(|(_, id)| (*id, 0)).collect())
            .unwrap_or_default();

        while let Some((id, depth)) = stack.pop() {
            if !emitted.insert(id) {
                continue;
            }
            out.push((id, depth));
            if let Some(replies) = children.get(&Some(id)) {
                stack.extend(replies.iter().rev().map(|(_, child)| (*child, depth + 1)));
            }
        }

        if out.len() < self.nodes.len() {
            let mut stranded: Vec<(DateTime<Utc>, Uuid)> = self
                .nodes
                .iter()
                .filter(|(id, _)| !emitted.contains(*id))
                .map(|(id, node)| (node.created_at, *id))
                .collect();
            stranded.sort();
            tracing::warn!(count = stranded.len(), "comments unreachable from any root");
            out.extend(stranded.into_iter().map(|(_, id)| (id, 0)));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(minutes)
    }

    fn chain(len: usize) -> (CommentTree, Vec<Uuid>) {
        let mut tree = CommentTree::new();
        let ids: Vec<Uuid> = (0..len).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            let parent = if i == 0 { None } else { Some(ids[i - 1]) };
            tree.insert(*id, parent, at(i as i64));
        }
        (tree, ids)
    }

    #[test]
    fn depth_counts_parent_links() {
        let (tree, ids) = chain(4);
        assert_eq!(tree.depth(ids[0], 8), Ok(0));
        assert_eq!(tree.depth(ids[3], 8), Ok(3));
    }

    #[test]
    fn reply_past_the_cap_is_rejected() {
        let (tree, ids) = chain(3);
        assert_eq!(tree.reply_depth(ids[1], 2), Ok(2));
        assert_eq!(tree.reply_depth(ids[2], 2), Err(WalkError::TooDeep(2)));
    }

    #[test]
    fn cycle_is_detected_instead_of_looping() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut tree = CommentTree::new();
        tree.insert(a, Some(b), at(0));
        tree.insert(b, Some(a), at(1));
        assert!(matches!(tree.depth(a, 100), Err(WalkError::Cycle(_))));
    }

    #[test]
    fn missing_parent_is_reported() {
        let mut tree = CommentTree::new();
        let orphan = Uuid::new_v4();
        let ghost = Uuid::new_v4();
        tree.insert(orphan, Some(ghost), at(0));
        assert_eq!(tree.depth(orphan, 8), Err(WalkError::Unknown(ghost)));
    }

    #[test]
    fn thread_order_is_preorder_with_oldest_sibling_first() {
        let mut tree = CommentTree::new();
        let (root_a, root_b, reply_1, reply_2, nested) =
            (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        tree.insert(root_b, None, at(5));
        tree.insert(root_a, None, at(0));
        tree.insert(reply_2, Some(root_a), at(3));
        tree.insert(reply_1, Some(root_a), at(1));
        tree.insert(nested, Some(reply_1), at(2));

        assert_eq!(
            tree.thread_order(),
            vec![(root_a, 0), (reply_1, 1), (nested, 2), (reply_2, 1), (root_b, 0)]
        );
    }

    #[test]
    fn cyclic_nodes_still_appear_in_listing() {
        let mut tree = CommentTree::new();
        let (root, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        tree.insert(root, None, at(0));
        tree.insert(a, Some(b), at(1));
        tree.insert(b, Some(a), at(2));

        let order = tree.thread_order();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], (root, 0));
        assert!(order.contains(&(a, 0)));
        assert!(order.contains(&(b, 0)));
    }
}
