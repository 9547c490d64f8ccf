//! Storage engine for Cedar.
//!
//! This crate provides:
//! - A disk-resident B+ tree secondary index with a string-to-code dictionary
//! - A paged tuple store for table records and selection results
//! - Tuple, schema and predicate representation
//! - Tables that load a CSV file and index every field

pub mod btree;
pub mod heap;
mod table;
mod tuple;

pub use btree::{
    BPlusTree, BuildStats, CodeDictionary, IndexFile, Key, Node, NodeKind, ScanStats, TreeShape,
    WeakLeaf,
};
pub use heap::{HeapFile, HeapFileConfig, HeapPage, HeapScan};
pub use table::{result_dir_name, ResultSet, Table};
pub use tuple::{BoundPredicate, Predicate, RecordSink, RecordSource, Schema, Tuple};
