//! Secret lifecycle management.
//!
//! [`SecretCell`] is an in-memory holder for transient credential text
//! (a master password or recovery key) with exactly one owner: the active
//! ceremony. The invariant it exists to uphold is that the value is the
//! empty string whenever no ceremony is active — immediately after
//! success, after cancellation, after an unrecoverable error, and after
//! the owning view is torn down. The ceremony controller clears the cell
//! centrally in its transition applier so every exit path is covered, not
//! just the happy one.
//!
//! The backing storage is [`Zeroizing`], so `clear()` wipes the plaintext
//! in place and dropping the cell wipes whatever it still holds.

use zeroize::{Zeroize, Zeroizing};

/// Single-owner cell for transient plaintext credentials.
#[derive(Debug, Default)]
pub struct SecretCell {
    value: Zeroizing<String>,
}

impl SecretCell {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held value, wiping the previous one first.
    pub fn set(&mut self, value: &str) {
        self.value.zeroize();
        self.value.push_str(value);
    }

    /// Read the held value. Empty when the cell is cleared.
    pub fn read(&self) -> &str {
        &self.value
    }

    /// Wipe the held value in place.
    pub fn clear(&mut self) {
        self.value.zeroize();
    }

    /// Whether the cell currently holds nothing.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_read_clear_roundtrip() {
        let mut cell = SecretCell::new();
        assert!(cell.is_empty());

        cell.set("hunter2");
        assert_eq!(cell.read(), "hunter2");
        assert!(!cell.is_empty());

        cell.clear();
        assert!(cell.is_empty());
        assert_eq!(cell.read(), "");
    }

    #[test]
    fn set_replaces_previous_value() {
        let mut cell = SecretCell::new();
        cell.set("first");
        cell.set("second");
        assert_eq!(cell.read(), "second");
    }

    #[test]
    fn clear_is_idempotent() {
        let mut cell = SecretCell::new();
        cell.set("x");
        cell.clear();
        cell.clear();
        assert!(cell.is_empty());
    }
}
