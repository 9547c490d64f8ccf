//! Tagged B+ tree node shared by leaves and internal nodes.
//!
//! A node is one value holding the superset of leaf and internal fields,
//! discriminated by [`NodeKind`]. Sibling pointers are meaningful only for
//! leaves, child addresses only for internal nodes.
//!
//! Internal node routing: child `i` holds keys strictly less than `keys[i]`
//! and child `i + 1` holds keys greater than or equal to `keys[i]`.

use super::key::Key;
use cedar_common::Address;
use std::cmp::Ordering;

/// Discriminator of a node line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Leaf: sorted keys plus left/right sibling addresses.
    Leaf,
    /// Internal: sorted separators plus `count + 1` child addresses.
    Internal,
}

impl NodeKind {
    /// Tag byte written at the start of the node line.
    pub fn tag(self) -> u8 {
        match self {
            NodeKind::Leaf => b'L',
            NodeKind::Internal => b'N',
        }
    }

    /// Parses a tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'L' => Some(NodeKind::Leaf),
            b'N' => Some(NodeKind::Internal),
            _ => None,
        }
    }
}

/// A B+ tree node as held in memory between a read and a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: NodeKind,
    address: Address,
    parent: Address,
    left: Address,
    right: Address,
    keys: Vec<Key>,
    children: Vec<Address>,
}

impl Node {
    /// Creates an empty leaf with no parent and no siblings.
    pub fn empty_leaf(address: Address) -> Self {
        Self {
            kind: NodeKind::Leaf,
            address,
            parent: Address::NULL,
            left: Address::NULL,
            right: Address::NULL,
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Creates a leaf from decoded fields.
    pub fn leaf(address: Address, parent: Address, left: Address, right: Address, keys: Vec<Key>) -> Self {
        Self {
            kind: NodeKind::Leaf,
            address,
            parent,
            left,
            right,
            keys,
            children: Vec::new(),
        }
    }

    /// Creates an internal node from decoded fields.
    ///
    /// `children.len()` must be `keys.len() + 1`.
    pub fn internal(address: Address, parent: Address, keys: Vec<Key>, children: Vec<Address>) -> Self {
        debug_assert_eq!(children.len(), keys.len() + 1);
        Self {
            kind: NodeKind::Internal,
            address,
            parent,
            left: Address::NULL,
            right: Address::NULL,
            keys,
            children,
        }
    }

    /// Creates the root produced by a root split.
    pub fn new_root(address: Address, left: Address, separator: Key, right: Address) -> Self {
        Self::internal(address, Address::NULL, vec![separator], vec![left, right])
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sets the address this node lives at. Addresses come from the read or
    /// append position, never from line contents.
    #[inline]
    pub fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    #[inline]
    pub fn parent(&self) -> Address {
        self.parent
    }

    #[inline]
    pub fn set_parent(&mut self, parent: Address) {
        self.parent = parent;
    }

    /// True if this node has no parent.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_null()
    }

    /// Left sibling of a leaf.
    #[inline]
    pub fn left(&self) -> Address {
        debug_assert!(self.is_leaf(), "left sibling of an internal node");
        self.left
    }

    /// Right sibling of a leaf.
    #[inline]
    pub fn right(&self) -> Address {
        debug_assert!(self.is_leaf(), "right sibling of an internal node");
        self.right
    }

    #[inline]
    pub fn set_left(&mut self, left: Address) {
        debug_assert!(self.is_leaf(), "left sibling of an internal node");
        self.left = left;
    }

    #[inline]
    pub fn set_right(&mut self, right: Address) {
        debug_assert!(self.is_leaf(), "right sibling of an internal node");
        self.right = right;
    }

    /// Current key occupancy.
    #[inline]
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Child addresses of an internal node.
    #[inline]
    pub fn children(&self) -> &[Address] {
        debug_assert!(!self.is_leaf(), "children of a leaf");
        &self.children
    }

    /// Smallest key, if any.
    #[inline]
    pub fn min_key(&self) -> Option<Key> {
        self.keys.first().copied()
    }

    /// Largest key, if any.
    #[inline]
    pub fn max_key(&self) -> Option<Key> {
        self.keys.last().copied()
    }

    /// True once the node holds more keys than its capacity allows.
    #[inline]
    pub fn is_overflowing(&self, max_keys: usize) -> bool {
        self.keys.len() > max_keys
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Binary search for `key`. `Ok(i)` if present, `Err(i)` for the
    /// insertion point.
    #[inline]
    pub fn position_of(&self, key: &Key) -> std::result::Result<usize, usize> {
        self.keys.binary_search(key)
    }

    /// Strong child selection: follows the right child whenever `key` is
    /// greater than or equal to the separator.
    #[inline]
    pub fn child_for(&self, key: &Key) -> Address {
        let idx = self.keys.partition_point(|k| k <= key);
        self.children[idx]
    }

    /// Weak child selection: the leftmost child that could hold a key with
    /// search value `code`.
    #[inline]
    pub fn child_for_weak(&self, code: u64) -> Address {
        let idx = self.keys.partition_point(|k| k.weak_cmp(code) == Ordering::Less);
        self.children[idx]
    }

    /// Position of the first key whose search value equals `code`.
    pub fn first_weak_position(&self, code: u64) -> Option<usize> {
        let pos = self.keys.partition_point(|k| k.weak_cmp(code) == Ordering::Less);
        match self.keys.get(pos) {
            Some(k) if k.weak_eq(code) => Some(pos),
            _ => None,
        }
    }

    /// Position of the first key whose search value is greater than `code`.
    pub fn next_weak_position(&self, code: u64) -> Option<usize> {
        let pos = self.keys.partition_point(|k| k.weak_cmp(code) != Ordering::Greater);
        if pos < self.keys.len() {
            Some(pos)
        } else {
            None
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Inserts a key into a leaf in sorted position.
    ///
    /// Returns false, leaving the leaf untouched, if the key is already
    /// present. The leaf may end up one key over capacity; the caller splits.
    pub fn insert_key(&mut self, key: Key) -> bool {
        debug_assert!(self.is_leaf(), "insert_key on an internal node");
        match self.keys.binary_search(&key) {
            Ok(_) => false,
            Err(pos) => {
                self.keys.insert(pos, key);
                true
            }
        }
    }

    /// Inserts a separator with the child holding keys at or above it.
    ///
    /// Returns false if the separator is already present.
    pub fn insert_child(&mut self, separator: Key, child: Address) -> bool {
        debug_assert!(!self.is_leaf(), "insert_child on a leaf");
        match self.keys.binary_search(&separator) {
            Ok(_) => false,
            Err(pos) => {
                self.keys.insert(pos, separator);
                self.children.insert(pos + 1, child);
                true
            }
        }
    }

    /// Splits an overflowing leaf.
    ///
    /// The lower `count / 2` keys stay here and the rest move to a new leaf
    /// at `at`, linked between this leaf and its old right sibling. The
    /// separator for the parent is the new leaf's minimum key, which stays
    /// in the new leaf.
    pub fn split_leaf(&mut self, at: Address) -> Node {
        debug_assert!(self.is_leaf(), "split_leaf on an internal node");
        let mid = self.keys.len() / 2;
        let upper = self.keys.split_off(mid);

        let sibling = Node::leaf(at, self.parent, self.address, self.right, upper);
        self.right = at;
        sibling
    }

    /// Splits an overflowing internal node.
    ///
    /// The middle key is removed from both halves and returned as the
    /// separator for the next level. Children of the returned node still
    /// carry this node as parent until the caller rewrites them.
    pub fn split_internal(&mut self, at: Address) -> (Key, Node) {
        debug_assert!(!self.is_leaf(), "split_internal on a leaf");
        let mid = self.keys.len() / 2;
        let upper_keys = self.keys.split_off(mid + 1);
        let upper_children = self.children.split_off(mid + 1);
        let promoted = self.keys.pop().unwrap_or_default();

        let sibling = Node::internal(at, self.parent, upper_keys, upper_children);
        (promoted, sibling)
    }
}
