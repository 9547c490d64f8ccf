//! Tuple store constants.

/// Width of the occupancy header line at the top of each page file,
/// excluding its newline.
pub const OCCUPANCY_WIDTH: usize = 20;

/// Name of the file holding a store's page count.
pub const TOTAL_FILE: &str = "total";
