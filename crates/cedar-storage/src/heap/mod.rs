//! Paged tuple storage.
//!
//! - HeapPage: fixed-capacity text page of CSV tuples
//! - HeapFile: directory of pages with append, random page reads and scans

pub mod constants;
mod file;
mod page;

pub use file::{HeapFile, HeapFileConfig, HeapScan};
pub use page::HeapPage;
