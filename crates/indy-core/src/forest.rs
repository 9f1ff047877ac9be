//! Arena view of a project's task forest.
//!
//! Parent links come from user data and may form cycles. Depth lookups walk
//! the parent chain iteratively and memoise every node they pass; reaching
//! a node already on the current path closes a loop.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

/// The part of a task the scheduler needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub planned_end: Option<DateTime<Utc>>,
}

/// Task records indexed by id.
#[derive(Debug, Default)]
pub struct TaskForest {
    nodes: Vec<TaskNode>,
    index: HashMap<i64, usize>,
    depth_memo: Vec<Option<usize>>,
}

impl TaskForest {
    /// Build from nodes. A later node with a duplicate id replaces the
    /// earlier one.
    pub fn new(nodes: impl IntoIterator<Item = TaskNode>) -> Self {
        let mut forest = Self::default();
        for node in nodes {
            match forest.index.get(&node.id) {
                Some(&idx) => forest.nodes[idx] = node,
                None => {
                    forest.index.insert(node.id, forest.nodes.len());
                    forest.nodes.push(node);
                }
            }
        }
        forest.depth_memo = vec![None; forest.nodes.len()];
        forest
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&TaskNode> {
        self.index.get(&id).map(|&idx| &self.nodes[idx])
    }

    fn parent_idx(&self, idx: usize) -> Option<usize> {
        self.nodes[idx]
            .parent_id
            .and_then(|pid| self.index.get(&pid).copied())
    }

    /// Number of ancestors above `id`. Roots and unknown ids are 0; on a
    /// loop, the node the walk comes back to counts as 0.
    pub fn depth(&mut self, id: i64) -> usize {
        let Some(&entry) = self.index.get(&id) else {
            return 0;
        };
        if let Some(d) = self.depth_memo[entry] {
            return d;
        }

        // Walk up until a root, a memoised node, or a node already on the
        // path. `above` is the depth of the parent of the path's last node.
        let mut path = vec![entry];
        let mut on_path = HashMap::from([(entry, 0usize)]);
        let (above, tail_len) = loop {
            let Some(&last) = path.last() else { break (None, 0) };
            match self.parent_idx(last) {
                None => break (None, path.len()),
                Some(parent) => {
                    if let Some(d) = self.depth_memo[parent] {
                        break (Some(d), path.len());
                    }
                    if let Some(&pos) = on_path.get(&parent) {
                        // Entered anywhere, a loop node walks the whole
                        // loop before coming back to itself.
                        let cycle_len = path.len() - pos;
                        for &idx in &path[pos..] {
                            self.depth_memo[idx] = Some(cycle_len);
                        }
                        break (Some(cycle_len), pos);
                    }
                    on_path.insert(parent, path.len());
                    path.push(parent);
                }
            }
        };

        let mut above = above;
        for &idx in path[..tail_len].iter().rev() {
            let d = above.map_or(0, |a| a + 1);
            self.depth_memo[idx] = Some(d);
            above = Some(d);
        }
        self.depth_memo[entry].unwrap_or(0)
    }

    /// Ancestor ids of `id`, nearest first, stopping at the first repeat.
    pub fn ancestors(&self, id: i64) -> Vec<i64> {
        let mut out = Vec::new();
        let Some(&start) = self.index.get(&id) else {
            return out;
        };
        let mut seen = HashSet::from([start]);
        let mut cur = self.parent_idx(start);
        while let Some(idx) = cur {
            if !seen.insert(idx) {
                break;
            }
            out.push(self.nodes[idx].id);
            cur = self.parent_idx(idx);
        }
        out
    }
}
