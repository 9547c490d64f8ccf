//! Selection operator for Cedar tables.
//!
//! Answers `SELECT * FROM table WHERE f1 = v1 AND ... AND fn = vn` with one
//! weak scan on the most selective index and a filter over the fetched pages.

mod operator;

pub use operator::{Selection, SelectionOutput, Stats};
