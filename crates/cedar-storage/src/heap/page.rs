//! Text page holding up to `capacity` tuples.

use super::constants::OCCUPANCY_WIDTH;
use crate::tuple::{Schema, Tuple};
use cedar_common::{CedarError, Result};

/// A tuple page.
///
/// File layout:
/// ```text
/// <occupancy padded to 20>\n
/// <tuple csv line>\n
/// ...
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapPage {
    tuples: Vec<Tuple>,
    capacity: usize,
}

impl HeapPage {
    /// Creates an empty page.
    pub fn new(capacity: usize) -> Self {
        Self {
            tuples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn occupancy(&self) -> usize {
        self.tuples.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.tuples.len() >= self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    pub fn into_tuples(self) -> Vec<Tuple> {
        self.tuples
    }

    /// Adds a tuple. Fails with `Internal` if the page is full.
    pub fn push(&mut self, tuple: Tuple) -> Result<()> {
        if self.is_full() {
            return Err(CedarError::Internal(format!(
                "push into full page of capacity {}",
                self.capacity
            )));
        }
        self.tuples.push(tuple);
        Ok(())
    }

    /// Serializes the page.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("{:<width$}\n", self.occupancy(), width = OCCUPANCY_WIDTH);
        for tuple in &self.tuples {
            out.push_str(&tuple.to_csv_line());
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Parses a page file read from page number `page`.
    pub fn from_bytes(data: &[u8], schema: &Schema, capacity: usize, page: u64) -> Result<Self> {
        let corrupt = |reason: String| CedarError::TupleCorrupted { page, reason };

        let text = std::str::from_utf8(data).map_err(|e| corrupt(format!("invalid utf-8: {}", e)))?;
        let mut lines = text.lines();
        let occupancy = lines
            .next()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .ok_or_else(|| corrupt("missing occupancy header".to_string()))?;
        if occupancy > capacity {
            return Err(corrupt(format!(
                "occupancy {} exceeds capacity {}",
                occupancy, capacity
            )));
        }

        let mut tuples = Vec::with_capacity(capacity);
        for _ in 0..occupancy {
            let line = lines
                .next()
                .ok_or_else(|| corrupt(format!("expected {} tuples", occupancy)))?;
            tuples.push(Tuple::parse(line, schema)?);
        }

        Ok(Self { tuples, capacity })
    }
}
