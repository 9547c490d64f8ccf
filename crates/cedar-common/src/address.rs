//! Byte-offset addresses into index and data files.

use serde::{Deserialize, Serialize};

/// Opaque address of a node line in the index file, or of a page in the
/// tuple store.
///
/// Node addresses are byte offsets and stay stable for the node's lifetime.
/// Zero is reserved as the null address (no parent, no sibling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(u64);

impl Address {
    /// The null address.
    pub const NULL: Address = Address(0);

    /// Creates an address from its raw value.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Address(raw)
    }

    /// Returns the raw offset.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns true for the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Converts the null address into `None`.
    #[inline]
    pub fn non_null(self) -> Option<Address> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<u64> for Address {
    fn from(raw: u64) -> Self {
        Address(raw)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_address() {
        assert!(Address::NULL.is_null());
        assert_eq!(Address::NULL.non_null(), None);
        assert_eq!(Address::default(), Address::NULL);
    }

    #[test]
    fn test_non_null_address() {
        let addr = Address::new(101);
        assert!(!addr.is_null());
        assert_eq!(addr.non_null(), Some(addr));
        assert_eq!(addr.get(), 101);
        assert_eq!(addr.to_string(), "101");
    }

    #[test]
    fn test_address_ordering() {
        assert!(Address::new(101) < Address::new(1112));
        assert_eq!(Address::from(7u64), Address::new(7));
    }
}
