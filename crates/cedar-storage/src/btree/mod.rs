//! Disk-resident B+ tree secondary index.
//!
//! One index file per indexed field holds a fixed-width header line followed
//! by fixed-width node lines, so every node can be rewritten in place and is
//! addressed by its byte offset:
//!
//! ```text
//! offset 0                      header: "root depth" padded to header_width
//! offset header_width + 1       root node at creation (empty leaf)
//! offset 101 + k * stride       node k, stride = line_width + 1
//! ```
//!
//! Node lines (whitespace separated, padded with spaces):
//!
//! ```text
//! L parent left right count (search_value tie_break)*count
//! N parent count child_0 (search_value tie_break child_i)*count
//! ```
//!
//! Field values are mapped to dense codes by a [`CodeDictionary`] so keys
//! compare as integers. Leaf splits keep the separator in the right half;
//! internal splits move the middle key up and keep it in neither half.

pub mod codec;
pub mod dictionary;
pub mod file;
pub mod key;
pub mod node;
pub mod tree;
pub mod verify;

pub use dictionary::{path_component, CodeDictionary};
pub use file::IndexFile;
pub use key::Key;
pub use node::{Node, NodeKind};
pub use tree::{BPlusTree, BuildStats, ScanStats, WeakLeaf};
pub use verify::TreeShape;
