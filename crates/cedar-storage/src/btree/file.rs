//! Flat index file holding the header line and one fixed-width line per node.

use super::codec::{decode_header, decode_node, encode_header, encode_node};
use super::node::Node;
use cedar_common::{Address, CedarError, IndexConfig, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Line-addressed index file.
///
/// Byte layout:
/// ```text
/// +---------------------------+ 0
/// | header (header_width)\n   |
/// +---------------------------+ header_width + 1  (initial root)
/// | node line (line_width)\n  |
/// +---------------------------+ + line_width + 1
/// | ...                       |
/// ```
///
/// Node lines are overwritten in place and new nodes are only appended,
/// so an address stays valid for the lifetime of the file.
pub struct IndexFile {
    file: File,
    config: IndexConfig,
    /// Current file length, which is also the next append address.
    len: u64,
    fsync_enabled: bool,
}

impl IndexFile {
    /// Creates (or truncates) an index file holding a header and one empty
    /// root leaf.
    pub fn create(path: &Path, config: IndexConfig, fsync_enabled: bool) -> Result<Self> {
        config.validate()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut index = Self {
            file,
            config,
            len: config.root_address(),
            fsync_enabled,
        };

        let root = Address::new(config.root_address());
        index.write_header(root, 0)?;
        index.append_node(&Node::empty_leaf(root))?;
        Ok(index)
    }

    /// Opens an existing index file and returns it with its header.
    pub fn open(path: &Path, config: IndexConfig, fsync_enabled: bool) -> Result<(Self, Address, u32)> {
        config.validate()?;
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();

        if len < config.root_address() + config.node_stride() {
            return Err(CedarError::HeaderCorrupted(format!(
                "index file is {} bytes, too short for a header and root",
                len
            )));
        }
        if (len - config.root_address()) % config.node_stride() != 0 {
            return Err(CedarError::HeaderCorrupted(format!(
                "index file length {} is not a whole number of node lines",
                len
            )));
        }

        let mut index = Self {
            file,
            config,
            len,
            fsync_enabled,
        };
        let (root, depth) = index.read_header()?;
        index.check_address(root)?;
        Ok((index, root, depth))
    }

    /// Address the next appended node will get.
    #[inline]
    pub fn next_address(&self) -> Address {
        Address::new(self.len)
    }

    /// Number of node lines in the file.
    pub fn num_nodes(&self) -> u64 {
        (self.len - self.config.root_address()) / self.config.node_stride()
    }

    /// Reads the header.
    pub fn read_header(&mut self) -> Result<(Address, u32)> {
        let mut line = vec![0u8; self.config.header_width + 1];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut line)?;
        if line.last() != Some(&b'\n') {
            return Err(CedarError::HeaderCorrupted("header line not terminated".to_string()));
        }
        decode_header(&line)
    }

    /// Rewrites the header in place.
    pub fn write_header(&mut self, root: Address, depth: u32) -> Result<()> {
        let line = encode_header(root, depth, self.config.header_width)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&line)?;
        self.sync()
    }

    /// Reads the node at `address`.
    pub fn read_node(&mut self, address: Address) -> Result<Node> {
        self.check_address(address)?;

        let mut line = vec![0u8; self.config.line_width + 1];
        self.file.seek(SeekFrom::Start(address.get()))?;
        self.file.read_exact(&mut line)?;
        if line.last() != Some(&b'\n') {
            return Err(CedarError::corrupted(address.get(), "node line not terminated"));
        }

        tracing::trace!(address = address.get(), "node load");
        decode_node(&line, address, self.config.max_keys())
    }

    /// Overwrites an existing node line in place.
    pub fn write_node(&mut self, node: &Node) -> Result<()> {
        self.check_address(node.address())?;
        let line = encode_node(node, self.config.line_width)?;
        self.file.seek(SeekFrom::Start(node.address().get()))?;
        self.file.write_all(&line)?;
        self.sync()
    }

    /// Appends a node at the end of the file. The node's address must be
    /// [`next_address`](Self::next_address).
    pub fn append_node(&mut self, node: &Node) -> Result<Address> {
        let address = self.next_address();
        if node.address() != address {
            return Err(CedarError::Internal(format!(
                "append of node addressed {} at end offset {}",
                node.address(),
                address
            )));
        }

        let line = encode_node(node, self.config.line_width)?;
        self.file.seek(SeekFrom::Start(address.get()))?;
        self.file.write_all(&line)?;
        self.len += self.config.node_stride();
        self.sync()?;
        Ok(address)
    }

    /// Flushes file contents to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if self.fsync_enabled {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Rejects addresses that do not start a node line of this file.
    fn check_address(&self, address: Address) -> Result<()> {
        let root = self.config.root_address();
        let raw = address.get();
        if raw < root || raw >= self.len {
            return Err(CedarError::corrupted(
                raw,
                format!("address outside node region [{}, {})", root, self.len),
            ));
        }
        if (raw - root) % self.config.node_stride() != 0 {
            return Err(CedarError::corrupted(raw, "address not aligned to a node line"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::key::Key;
    use tempfile::tempdir;

    fn create_test_file() -> (IndexFile, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let file = IndexFile::create(&dir.path().join("tree"), IndexConfig::default(), false).unwrap();
        (file, dir)
    }

    #[test]
    fn test_create_initial_layout() {
        let (mut file, dir) = create_test_file();
        assert_eq!(file.read_header().unwrap(), (Address::new(101), 0));
        assert_eq!(file.next_address(), Address::new(101 + 1011));
        assert_eq!(file.num_nodes(), 1);

        let root = file.read_node(Address::new(101)).unwrap();
        assert_eq!(root, Node::empty_leaf(Address::new(101)));

        let raw = std::fs::read(dir.path().join("tree")).unwrap();
        assert_eq!(raw.len(), 101 + 1011);
        assert_eq!(raw[100], b'\n');
        assert!(raw[..4].starts_with(b"101 "));
        assert!(raw[101..].starts_with(b"L 0 0 0 0"));
    }

    #[test]
    fn test_append_and_overwrite() {
        let (mut file, _dir) = create_test_file();

        let at = file.next_address();
        let mut leaf = Node::empty_leaf(at);
        leaf.insert_key(Key::new(1, 1));
        assert_eq!(file.append_node(&leaf).unwrap(), at);
        assert_eq!(file.num_nodes(), 2);

        leaf.insert_key(Key::new(2, 2));
        file.write_node(&leaf).unwrap();

        let read = file.read_node(at).unwrap();
        assert_eq!(read.keys(), &[Key::new(1, 1), Key::new(2, 2)]);

        // Overwriting does not disturb the neighbouring root.
        let root = file.read_node(Address::new(101)).unwrap();
        assert!(root.is_empty());
    }

    #[test]
    fn test_append_wrong_address_rejected() {
        let (mut file, _dir) = create_test_file();
        let leaf = Node::empty_leaf(Address::new(999));
        assert!(matches!(
            file.append_node(&leaf),
            Err(CedarError::Internal(_))
        ));
    }

    #[test]
    fn test_read_rejects_bad_addresses() {
        let (mut file, _dir) = create_test_file();
        assert!(file.read_node(Address::NULL).is_err());
        assert!(file.read_node(Address::new(102)).is_err());
        assert!(file.read_node(Address::new(101 + 1011)).is_err());
    }

    #[test]
    fn test_write_unallocated_rejected() {
        let (mut file, _dir) = create_test_file();
        let leaf = Node::empty_leaf(Address::new(101 + 1011));
        assert!(file.write_node(&leaf).is_err());
    }

    #[test]
    fn test_reopen_reads_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree");
        {
            let mut file = IndexFile::create(&path, IndexConfig::default(), true).unwrap();
            let at = file.next_address();
            file.append_node(&Node::empty_leaf(at)).unwrap();
            file.write_header(at, 1).unwrap();
        }

        let (file, root, depth) = IndexFile::open(&path, IndexConfig::default(), false).unwrap();
        assert_eq!(root, Address::new(101 + 1011));
        assert_eq!(depth, 1);
        assert_eq!(file.num_nodes(), 2);
    }

    #[test]
    fn test_open_truncated_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree");
        std::fs::write(&path, b"101 0\n").unwrap();
        assert!(matches!(
            IndexFile::open(&path, IndexConfig::default(), false),
            Err(CedarError::HeaderCorrupted(_))
        ));
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let result = IndexFile::open(&dir.path().join("absent"), IndexConfig::default(), false);
        assert!(matches!(result, Err(CedarError::Io(_))));
    }
}
