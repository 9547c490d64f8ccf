//! Whole-tree structural checks.

use super::key::Key;
use super::node::Node;
use super::tree::BPlusTree;
use cedar_common::{Address, CedarError, Result};

/// Shape of a verified tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeShape {
    /// Levels below the root.
    pub depth: u32,
    /// Nodes reachable from the root.
    pub nodes: u64,
    pub leaves: u64,
    /// Keys stored across all leaves.
    pub keys: u64,
}

/// Key range a subtree must fall in: `lower <= k < upper`.
#[derive(Clone, Copy)]
struct Bounds {
    lower: Option<Key>,
    upper: Option<Key>,
}

impl Bounds {
    fn contains(&self, key: &Key) -> bool {
        self.lower.map_or(true, |l| *key >= l) && self.upper.map_or(true, |u| *key < u)
    }
}

impl BPlusTree {
    /// Walks every node reachable from the root and checks key order, the
    /// separator rule, equal leaf depth, parent pointers and the leaf chain.
    ///
    /// Any violation is reported as [`CedarError::IndexCorrupted`] naming the
    /// offending node.
    pub fn verify(&mut self) -> Result<TreeShape> {
        let root = self.root().clone();
        if !root.is_root() {
            return Err(CedarError::corrupted(root.address().get(), "root has a parent"));
        }

        let mut shape = TreeShape {
            depth: self.depth(),
            ..Default::default()
        };
        let mut leaves = Vec::new();
        let bounds = Bounds {
            lower: None,
            upper: None,
        };
        self.verify_subtree(root, 0, bounds, &mut leaves, &mut shape)?;
        verify_chain(&leaves)?;

        shape.leaves = leaves.len() as u64;
        tracing::debug!(
            depth = shape.depth,
            nodes = shape.nodes,
            leaves = shape.leaves,
            keys = shape.keys,
            "tree verified"
        );
        Ok(shape)
    }

    /// Returns the subtree minimum, or `None` for an empty root leaf.
    fn verify_subtree(
        &mut self,
        node: Node,
        level: u32,
        bounds: Bounds,
        leaves: &mut Vec<(Address, Address, Address)>,
        shape: &mut TreeShape,
    ) -> Result<Option<Key>> {
        let address = node.address().get();
        shape.nodes += 1;

        if !node.keys().windows(2).all(|w| w[0] < w[1]) {
            return Err(CedarError::corrupted(address, "keys not strictly increasing"));
        }
        if let Some(key) = node.keys().iter().find(|k| !bounds.contains(k)) {
            return Err(CedarError::corrupted(
                address,
                format!("key {} outside the range routed to this node", key),
            ));
        }
        if node.count() > self.config().max_keys() {
            return Err(CedarError::corrupted(address, "node over capacity"));
        }

        if node.is_leaf() {
            if level != self.depth() {
                return Err(CedarError::corrupted(
                    address,
                    format!("leaf at level {} in tree of depth {}", level, self.depth()),
                ));
            }
            if node.is_empty() && !node.is_root() {
                return Err(CedarError::corrupted(address, "empty non-root leaf"));
            }
            shape.keys += node.count() as u64;
            leaves.push((node.address(), node.left(), node.right()));
            return Ok(node.min_key());
        }

        if node.children().len() != node.count() + 1 {
            return Err(CedarError::corrupted(address, "child count is not key count + 1"));
        }

        let mut io = 0;
        let mut subtree_min = None;
        for (i, &child_address) in node.children().iter().enumerate() {
            let child = self.load(child_address, &mut io)?;
            if child.parent() != node.address() {
                return Err(CedarError::corrupted(
                    child_address.get(),
                    format!("parent pointer {} does not match {}", child.parent(), node.address()),
                ));
            }

            let child_bounds = Bounds {
                lower: if i == 0 { bounds.lower } else { Some(node.keys()[i - 1]) },
                upper: node.keys().get(i).copied().or(bounds.upper),
            };
            let child_min = self.verify_subtree(child, level + 1, child_bounds, leaves, shape)?;

            if i == 0 {
                subtree_min = child_min;
            } else if child_min != Some(node.keys()[i - 1]) {
                return Err(CedarError::corrupted(
                    address,
                    format!("separator {} is not the minimum of child {}", node.keys()[i - 1], i),
                ));
            }
        }
        Ok(subtree_min)
    }

    /// Every key in leaf-chain order, starting from the leftmost leaf.
    pub fn leaf_chain(&mut self) -> Result<Vec<Key>> {
        let mut io = 0;
        let mut node = self.root().clone();
        while !node.is_leaf() {
            let first = node.children()[0];
            node = self.load(first, &mut io)?;
        }

        let limit = self.num_nodes();
        let mut visited = 0;
        let mut keys = Vec::new();
        loop {
            visited += 1;
            if visited > limit {
                return Err(CedarError::corrupted(node.address().get(), "leaf chain has a cycle"));
            }
            keys.extend_from_slice(node.keys());
            match node.right().non_null() {
                Some(next) => node = self.load(next, &mut io)?,
                None => break,
            }
        }
        Ok(keys)
    }
}

/// Leaves in tree order must be doubly linked in the same order.
fn verify_chain(leaves: &[(Address, Address, Address)]) -> Result<()> {
    for (i, &(address, left, right)) in leaves.iter().enumerate() {
        let expected_left = if i == 0 { Address::NULL } else { leaves[i - 1].0 };
        let expected_right = leaves.get(i + 1).map_or(Address::NULL, |l| l.0);
        if left != expected_left || right != expected_right {
            return Err(CedarError::corrupted(
                address.get(),
                format!(
                    "sibling links ({}, {}) expected ({}, {})",
                    left, right, expected_left, expected_right
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cedar_common::IndexConfig;
    use tempfile::tempdir;

    #[test]
    fn test_verify_empty_tree() {
        let dir = tempdir().unwrap();
        let mut tree = BPlusTree::create(dir.path(), "f", IndexConfig::default(), false).unwrap();
        let shape = tree.verify().unwrap();
        assert_eq!(
            shape,
            TreeShape {
                depth: 0,
                nodes: 1,
                leaves: 1,
                keys: 0
            }
        );
        assert!(tree.leaf_chain().unwrap().is_empty());
    }

    #[test]
    fn test_verify_after_many_splits() {
        let dir = tempdir().unwrap();
        let mut tree =
            BPlusTree::create(dir.path(), "f", IndexConfig::with_branching_factor(3), false).unwrap();
        for v in 0..200u64 {
            // Interleave so splits happen in the middle of the key space.
            let code = (v * 37) % 200;
            tree.insert(Key::new(code, v)).unwrap();
        }

        let shape = tree.verify().unwrap();
        assert_eq!(shape.keys, 200);
        assert_eq!(shape.nodes, tree.num_nodes());
        assert!(shape.depth >= 4);

        let chain = tree.leaf_chain().unwrap();
        assert_eq!(chain.len(), 200);
        assert!(chain.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_verify_chain_detects_broken_link() {
        let a = Address::new(101);
        let b = Address::new(1112);
        assert!(verify_chain(&[(a, Address::NULL, b), (b, a, Address::NULL)]).is_ok());
        let err = verify_chain(&[(a, Address::NULL, Address::NULL), (b, a, Address::NULL)]).unwrap_err();
        assert!(matches!(err, CedarError::IndexCorrupted { address: 101, .. }));
    }
}
