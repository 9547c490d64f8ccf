//! Configuration structures for Cedar.

use crate::error::{CedarError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Widest decimal rendering of a u64 field plus its separating space.
const FIELD_WIDTH: usize = 21;

/// Default header line width.
const DEFAULT_HEADER_WIDTH: usize = 100;

/// Default branching factor.
const DEFAULT_BRANCHING_FACTOR: usize = 10;

/// Largest accepted branching factor.
pub const MAX_BRANCHING_FACTOR: usize = 1 << 16;

/// Layout parameters of a B+ tree index file.
///
/// Widths missing from a serialized config are derived from the
/// branching factor given next to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexConfigFile")]
pub struct IndexConfig {
    /// Maximum children of an internal node (M). Nodes hold at most M-1 keys.
    pub branching_factor: usize,
    /// Width of the header line, excluding its newline.
    pub header_width: usize,
    /// Width of every node line, excluding its newline.
    pub line_width: usize,
}

/// Serialized form of [`IndexConfig`] with every field optional.
#[derive(Deserialize)]
struct IndexConfigFile {
    branching_factor: Option<usize>,
    header_width: Option<usize>,
    line_width: Option<usize>,
}

impl From<IndexConfigFile> for IndexConfig {
    fn from(file: IndexConfigFile) -> Self {
        let defaults =
            IndexConfig::with_branching_factor(file.branching_factor.unwrap_or(DEFAULT_BRANCHING_FACTOR));
        Self {
            header_width: file.header_width.unwrap_or(defaults.header_width),
            line_width: file.line_width.unwrap_or(defaults.line_width),
            ..defaults
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::with_branching_factor(DEFAULT_BRANCHING_FACTOR)
    }
}

impl IndexConfig {
    /// Creates the default layout for a given branching factor.
    pub fn with_branching_factor(branching_factor: usize) -> Self {
        Self {
            branching_factor,
            header_width: DEFAULT_HEADER_WIDTH,
            line_width: Self::default_line_width(branching_factor),
        }
    }

    /// Default node line width, `100 * M + 10`. Saturates for absurd `M`,
    /// which [`validate`](Self::validate) rejects.
    pub fn default_line_width(branching_factor: usize) -> usize {
        branching_factor.saturating_mul(100).saturating_add(10)
    }

    /// Changes the branching factor and resets the line width to its default.
    pub fn set_branching_factor(&mut self, branching_factor: usize) {
        self.branching_factor = branching_factor;
        self.line_width = Self::default_line_width(branching_factor);
    }

    /// Maximum number of keys a node may hold.
    #[inline]
    pub fn max_keys(&self) -> usize {
        self.branching_factor.saturating_sub(1)
    }

    /// Address of the initial root, right after the header line.
    #[inline]
    pub fn root_address(&self) -> u64 {
        self.header_width as u64 + 1
    }

    /// Distance in bytes between consecutive node lines.
    #[inline]
    pub fn node_stride(&self) -> u64 {
        self.line_width as u64 + 1
    }

    /// Smallest line width that holds any node at this branching factor.
    pub fn min_line_width(&self) -> usize {
        let keys = self.max_keys();
        let leaf_fields = keys.saturating_mul(2).saturating_add(4);
        let internal_fields = keys.saturating_mul(3).saturating_add(3);
        leaf_fields
            .max(internal_fields)
            .saturating_mul(FIELD_WIDTH)
            .saturating_add(1)
    }

    /// Checks that the layout can hold every node and header it will encode.
    pub fn validate(&self) -> Result<()> {
        if !(3..=MAX_BRANCHING_FACTOR).contains(&self.branching_factor) {
            return Err(CedarError::InvalidParameter {
                name: "branching_factor".to_string(),
                value: self.branching_factor.to_string(),
            });
        }
        if self.header_width < 2 * FIELD_WIDTH {
            return Err(CedarError::InvalidParameter {
                name: "header_width".to_string(),
                value: self.header_width.to_string(),
            });
        }
        if self.line_width < self.min_line_width() {
            return Err(CedarError::ConfigError(format!(
                "line_width {} is below the {} bytes needed for branching factor {}",
                self.line_width,
                self.min_line_width(),
                self.branching_factor
            )));
        }
        Ok(())
    }
}

/// Storage configuration for tables, tuple pages and indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory under which every table gets its own subdirectory.
    pub data_dir: PathBuf,
    /// Tuples per tuple-store page.
    pub page_capacity: usize,
    /// Enable fsync after index and page writes.
    pub fsync_enabled: bool,
    /// Index file layout shared by every index of a table.
    pub index: IndexConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./generated"),
            page_capacity: 12,
            fsync_enabled: false,
            index: IndexConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Validates the page capacity and the index layout.
    pub fn validate(&self) -> Result<()> {
        if self.page_capacity == 0 {
            return Err(CedarError::InvalidParameter {
                name: "page_capacity".to_string(),
                value: "0".to_string(),
            });
        }
        self.index.validate()
    }
}
