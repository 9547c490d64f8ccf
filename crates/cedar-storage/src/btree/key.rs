//! Index keys and the weak (search-value only) comparator.

use cedar_common::Address;
use std::cmp::Ordering;

/// Key of the secondary index.
///
/// `search_value` is the dictionary code of the indexed field; `tie_break`
/// is the record address, which makes keys unique when many records share
/// a search value. Keys order by `search_value` first and `tie_break` second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Key {
    /// Dictionary code of the indexed value.
    pub search_value: u64,
    /// Disambiguator, the address of the record this key points to.
    pub tie_break: u64,
}

impl Key {
    /// Creates a key.
    #[inline]
    pub const fn new(search_value: u64, tie_break: u64) -> Self {
        Self {
            search_value,
            tie_break,
        }
    }

    /// Address of the record this key indexes.
    #[inline]
    pub fn record_address(&self) -> Address {
        Address::new(self.tie_break)
    }

    /// Compares only the search value against `code`.
    #[inline]
    pub fn weak_cmp(&self, code: u64) -> Ordering {
        self.search_value.cmp(&code)
    }

    /// True if the key's search value equals `code`.
    #[inline]
    pub fn weak_eq(&self, code: u64) -> bool {
        self.search_value == code
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.search_value, self.tie_break)
    }
}
