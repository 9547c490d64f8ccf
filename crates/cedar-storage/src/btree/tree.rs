//! Disk-resident B+ tree secondary index.
//!
//! The tree owns its index file and code dictionary and keeps only the root
//! node cached. Every other node is read from its line, changed as a local
//! value, and written back before the operation returns.

use super::dictionary::CodeDictionary;
use super::file::IndexFile;
use super::key::Key;
use super::node::Node;
use crate::tuple::{BoundPredicate, Predicate, RecordSink, RecordSource};
use cedar_common::{Address, CedarError, IndexConfig, Result};
use std::path::Path;

/// Name of the index file inside a tree directory.
const TREE_FILE: &str = "tree";

/// Name of the dictionary directory inside a tree directory.
const CODES_DIR: &str = "codes";

/// Leaf found by a weak descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeakLeaf {
    /// Address of the first leaf that may hold the searched value.
    pub address: Address,
    /// Node loads performed to reach it; the cached root is free.
    pub io_steps: u64,
}

/// Counters of one weak range scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Keys whose search value matched.
    pub keys: u64,
    /// Records emitted to the sink.
    pub tuples: u64,
    /// Dictionary lookups, node loads and record page loads.
    pub io_steps: u64,
}

/// Counters of a bulk build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Records scanned from the source.
    pub records: u64,
    /// Keys actually inserted; records sharing a value and address collapse.
    pub keys: u64,
}

/// B+ tree over one field of a record source.
pub struct BPlusTree {
    field: String,
    file: IndexFile,
    dictionary: CodeDictionary,
    config: IndexConfig,
    /// Cached root node.
    root: Node,
    /// Levels below the root; 0 while the root is a leaf.
    depth: u32,
}

impl BPlusTree {
    /// Creates an empty tree in `dir`, replacing any previous index and
    /// dictionary there.
    pub fn create(dir: &Path, field: &str, config: IndexConfig, fsync_enabled: bool) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let file = IndexFile::create(&dir.join(TREE_FILE), config, fsync_enabled)?;
        let dictionary = CodeDictionary::create(&dir.join(CODES_DIR), fsync_enabled)?;

        Ok(Self {
            field: field.to_string(),
            root: Node::empty_leaf(Address::new(config.root_address())),
            file,
            dictionary,
            config,
            depth: 0,
        })
    }

    /// Reopens a tree previously built in `dir`.
    pub fn open(dir: &Path, field: &str, config: IndexConfig, fsync_enabled: bool) -> Result<Self> {
        let (mut file, root_address, depth) = IndexFile::open(&dir.join(TREE_FILE), config, fsync_enabled)?;
        let root = file.read_node(root_address)?;
        if !root.is_root() {
            return Err(CedarError::corrupted(
                root_address.get(),
                format!("header root has parent {}", root.parent()),
            ));
        }
        let dictionary = CodeDictionary::open(&dir.join(CODES_DIR), fsync_enabled)?;

        Ok(Self {
            field: field.to_string(),
            file,
            dictionary,
            config,
            root,
            depth,
        })
    }

    /// Creates a tree and inserts every record of `source`.
    pub fn build(
        dir: &Path,
        field: &str,
        config: IndexConfig,
        fsync_enabled: bool,
        source: &dyn RecordSource,
    ) -> Result<Self> {
        let mut tree = Self::create(dir, field, config, fsync_enabled)?;
        tree.insert_all(source)?;
        Ok(tree)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Indexed field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Levels below the root.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn root_address(&self) -> Address {
        self.root.address()
    }

    /// Number of distinct values seen by the dictionary.
    #[inline]
    pub fn unique_keys(&self) -> u64 {
        self.dictionary.len()
    }

    pub fn dictionary(&self) -> &CodeDictionary {
        &self.dictionary
    }

    /// Number of node lines in the index file.
    pub fn num_nodes(&self) -> u64 {
        self.file.num_nodes()
    }

    /// Flushes the index file.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Inserts one key per record of `source`, in storage order.
    pub fn insert_all(&mut self, source: &dyn RecordSource) -> Result<BuildStats> {
        let position = source.schema().position(&self.field)?;
        let mut stats = BuildStats::default();

        for item in source.scan()? {
            let (address, tuple) = item?;
            let value = tuple
                .get(position)
                .ok_or_else(|| CedarError::ColumnNotFound(self.field.clone()))?;
            if self.insert_value(value, address)? {
                stats.keys += 1;
            }
            stats.records += 1;
        }

        tracing::info!(
            field = %self.field,
            records = stats.records,
            keys = stats.keys,
            unique = self.dictionary.len(),
            depth = self.depth,
            "index built"
        );
        Ok(stats)
    }

    /// Registers `value` in the dictionary and inserts `(code, record)`.
    pub fn insert_value(&mut self, value: &str, record: Address) -> Result<bool> {
        let code = self.dictionary.code_of(value)?;
        self.insert(Key::new(code, record.get()))
    }

    /// Inserts a key. Returns `Ok(false)` without touching the file if the
    /// key is already present.
    pub fn insert(&mut self, key: Key) -> Result<bool> {
        let max_keys = self.config.max_keys();
        let mut io = 0;

        let mut node = self.descend(&key, &mut io)?;
        if !node.insert_key(key) {
            return Ok(false);
        }
        if !node.is_overflowing(max_keys) {
            self.store(&node)?;
            return Ok(true);
        }

        // Leaf split: the right half is appended and linked into the chain.
        let at = self.file.next_address();
        let mut sibling = node.split_leaf(at);
        let mut separator = sibling
            .min_key()
            .ok_or_else(|| CedarError::Internal("leaf split produced an empty half".to_string()))?;
        self.file.append_node(&sibling)?;

        if let Some(next) = sibling.right().non_null() {
            let mut next_leaf = self.load(next, &mut io)?;
            next_leaf.set_left(at);
            self.store(&next_leaf)?;
        }
        self.store(&node)?;
        tracing::debug!(
            leaf = node.address().get(),
            sibling = at.get(),
            separator = %separator,
            "leaf split"
        );

        loop {
            if node.is_root() {
                self.grow_root(node, sibling, separator)?;
                return Ok(true);
            }

            let mut parent = self.load(node.parent(), &mut io)?;
            if !parent.insert_child(separator, sibling.address()) {
                return Err(CedarError::corrupted(
                    parent.address().get(),
                    format!("separator {} already present", separator),
                ));
            }
            if !parent.is_overflowing(max_keys) {
                self.store(&parent)?;
                return Ok(true);
            }

            // Internal split: the middle key moves up and is kept in neither half.
            let at = self.file.next_address();
            let (promoted, upper) = parent.split_internal(at);
            self.file.append_node(&upper)?;
            self.store(&parent)?;
            for &child in upper.children() {
                let mut child_node = self.load(child, &mut io)?;
                child_node.set_parent(at);
                self.store(&child_node)?;
            }
            tracing::debug!(
                node = parent.address().get(),
                sibling = at.get(),
                separator = %promoted,
                "internal split"
            );

            node = parent;
            sibling = upper;
            separator = promoted;
        }
    }

    /// Replaces the root by a new internal node over `left` and `right`.
    fn grow_root(&mut self, mut left: Node, mut right: Node, separator: Key) -> Result<()> {
        let at = self.file.next_address();
        let root = Node::new_root(at, left.address(), separator, right.address());
        self.file.append_node(&root)?;

        left.set_parent(at);
        right.set_parent(at);
        self.store(&left)?;
        self.store(&right)?;

        self.root = root;
        self.depth += 1;
        self.file.write_header(at, self.depth)?;
        tracing::debug!(root = at.get(), depth = self.depth, "root split");
        Ok(())
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Address of the unique leaf that holds or would hold `key`.
    pub fn locate_leaf(&mut self, key: &Key) -> Result<Address> {
        let mut io = 0;
        Ok(self.descend(key, &mut io)?.address())
    }

    /// True if `key` is in the tree.
    pub fn contains(&mut self, key: &Key) -> Result<bool> {
        let mut io = 0;
        Ok(self.descend(key, &mut io)?.position_of(key).is_ok())
    }

    /// First leaf that may hold a key with search value `code`.
    ///
    /// Codes the dictionary never assigned are rejected before descending.
    pub fn locate_leaf_weak(&mut self, code: u64) -> Result<WeakLeaf> {
        let mut io = 0;
        let leaf = self.descend_weak(code, &mut io)?;
        Ok(WeakLeaf {
            address: leaf.address(),
            io_steps: io,
        })
    }

    /// Number of keys whose search value is `code`.
    pub fn count_weak(&mut self, code: u64) -> Result<u64> {
        let mut io = 0;
        self.scan_weak(code, &mut io, |_| Ok(()))
    }

    /// Record addresses of every key with search value `code`, in key order.
    pub fn addresses_weak(&mut self, code: u64) -> Result<Vec<Address>> {
        let mut io = 0;
        let mut addresses = Vec::new();
        self.scan_weak(code, &mut io, |key| {
            addresses.push(key.record_address());
            Ok(())
        })?;
        Ok(addresses)
    }

    /// Streams every record whose indexed field equals `value` into `sink`.
    ///
    /// A value the dictionary has never seen matches nothing and does not
    /// allocate a code.
    pub fn select(
        &mut self,
        value: &str,
        source: &dyn RecordSource,
        sink: &mut dyn RecordSink,
    ) -> Result<ScanStats> {
        let predicate = Predicate::eq(&self.field, value).bind(source.schema())?;
        self.select_matching(value, &predicate, source, sink)
    }

    /// Weak scan on `value` that emits the fetched records satisfying
    /// `predicate`.
    pub fn select_matching(
        &mut self,
        value: &str,
        predicate: &BoundPredicate,
        source: &dyn RecordSource,
        sink: &mut dyn RecordSink,
    ) -> Result<ScanStats> {
        // One step for the dictionary lookup.
        let mut stats = ScanStats {
            io_steps: 1,
            ..Default::default()
        };
        let Some(code) = self.dictionary.lookup(value)? else {
            tracing::debug!(field = %self.field, value, "value not in dictionary");
            return Ok(stats);
        };

        let scanned = self.select_code(code, predicate, source, sink)?;
        stats.keys = scanned.keys;
        stats.tuples = scanned.tuples;
        stats.io_steps += scanned.io_steps;
        Ok(stats)
    }

    /// Weak scan on a dictionary code that emits matching records.
    pub fn select_code(
        &mut self,
        code: u64,
        predicate: &BoundPredicate,
        source: &dyn RecordSource,
        sink: &mut dyn RecordSink,
    ) -> Result<ScanStats> {
        let mut io = 0;
        let mut tuples = 0;
        let mut pages = 0;

        let keys = self.scan_weak(code, &mut io, |key| {
            pages += 1;
            for tuple in source.records_at(key.record_address())? {
                if predicate.matches(&tuple) {
                    sink.emit(&tuple)?;
                    tuples += 1;
                }
            }
            Ok(())
        })?;

        Ok(ScanStats {
            keys,
            tuples,
            io_steps: io + pages,
        })
    }

    /// Visits every key with search value `code` in ascending order,
    /// following the leaf chain across leaf boundaries.
    fn scan_weak<F>(&mut self, code: u64, io: &mut u64, mut visit: F) -> Result<u64>
    where
        F: FnMut(Key) -> Result<()>,
    {
        let mut leaf = self.descend_weak(code, io)?;
        let Some(mut start) = leaf.first_weak_position(code) else {
            return Ok(0);
        };

        let mut matched = 0;
        loop {
            // Matches run up to the first greater search value or the leaf end.
            let end = leaf.next_weak_position(code).unwrap_or(leaf.count());
            for &key in &leaf.keys()[start..end] {
                visit(key)?;
                matched += 1;
            }
            if end < leaf.count() {
                break;
            }

            match leaf.right().non_null() {
                Some(next) => {
                    leaf = self.load(next, io)?;
                    start = 0;
                }
                None => break,
            }
        }
        Ok(matched)
    }

    /// Strong descent to the leaf responsible for `key`.
    fn descend(&mut self, key: &Key, io: &mut u64) -> Result<Node> {
        let mut node = self.root.clone();
        let mut level = 0;
        while !node.is_leaf() {
            let child = node.child_for(key);
            node = self.load_child(&node, child, &mut level, io)?;
        }
        self.check_leaf_level(&node, level)?;
        Ok(node)
    }

    /// Weak descent followed by the rightward walk along the leaf chain.
    fn descend_weak(&mut self, code: u64, io: &mut u64) -> Result<Node> {
        if !self.dictionary.contains_code(code) {
            return Err(CedarError::UnknownCode(code));
        }

        let mut node = self.root.clone();
        let mut level = 0;
        while !node.is_leaf() {
            let child = node.child_for_weak(code);
            node = self.load_child(&node, child, &mut level, io)?;
        }
        self.check_leaf_level(&node, level)?;

        while let Some(next) = node.right().non_null() {
            match node.max_key() {
                Some(max) if max.search_value >= code => break,
                _ => node = self.load(next, io)?,
            }
        }
        Ok(node)
    }

    fn load_child(&mut self, parent: &Node, child: Address, level: &mut u32, io: &mut u64) -> Result<Node> {
        *level += 1;
        if *level > self.depth {
            return Err(CedarError::corrupted(
                child.get(),
                format!("descent deeper than tree depth {}", self.depth),
            ));
        }
        let node = self.load(child, io)?;
        if node.parent() != parent.address() {
            return Err(CedarError::corrupted(
                child.get(),
                format!(
                    "parent pointer {} does not match parent {}",
                    node.parent(),
                    parent.address()
                ),
            ));
        }
        Ok(node)
    }

    fn check_leaf_level(&self, leaf: &Node, level: u32) -> Result<()> {
        if level != self.depth {
            return Err(CedarError::corrupted(
                leaf.address().get(),
                format!("leaf at level {} in tree of depth {}", level, self.depth),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Node I/O
    // =========================================================================

    /// Loads a node, serving the root from cache.
    pub(super) fn load(&mut self, address: Address, io: &mut u64) -> Result<Node> {
        if address == self.root.address() {
            return Ok(self.root.clone());
        }
        *io += 1;
        self.file.read_node(address)
    }

    /// Writes a node back and refreshes the root cache when it is the root.
    fn store(&mut self, node: &Node) -> Result<()> {
        self.file.write_node(node)?;
        if node.address() == self.root.address() {
            self.root = node.clone();
        }
        Ok(())
    }

    /// Cached root node.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Reads any node by address.
    pub fn node(&mut self, address: Address) -> Result<Node> {
        let mut io = 0;
        self.load(address, &mut io)
    }
}
