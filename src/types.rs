//! Shared identifiers, value payloads, and the crate-wide error type.

use std::fmt;

use thiserror::Error;

/// Size of every on-disk page in bytes. Page 0 is the table header; every
/// other page holds a single tree node or sits on the free list.
pub const PAGE_SIZE: usize = 4096;

/// Fixed width of a stored value in bytes. Shorter inputs are zero-padded.
pub const VALUE_LEN: usize = 120;

/// Identifier of a page inside the table file (offset / `PAGE_SIZE`).
///
/// `PageId(0)` is the header page and doubles as the null sentinel wherever a
/// page reference may be absent (no parent, no sibling, empty tree).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageId(pub u64);

impl PageId {
    /// The null sentinel (also the header page, which is never a node).
    pub const NULL: PageId = PageId(0);

    /// Returns true if this id is the null sentinel.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
/// Errors surfaced by the table and its storage layers.
pub enum SableError {
    /// Underlying storage failure. There is no rollback path; a failure in
    /// the middle of a structural change can leave the file inconsistent.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// On-disk state that violates the file format.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Caller-supplied argument the table cannot accept.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Insert of a key that is already present. The tree is left unchanged.
    #[error("duplicate key {0}")]
    DuplicateKey(i64),
    /// Delete of a key that is not present.
    #[error("key {0} not found")]
    NotFound(i64),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SableError>;

/// Fixed-width value stored alongside each key.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Value(pub [u8; VALUE_LEN]);

impl Value {
    /// Builds a value from `bytes`, zero-padding up to [`VALUE_LEN`].
    /// Longer inputs are rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > VALUE_LEN {
            return Err(SableError::Invalid("value longer than VALUE_LEN"));
        }
        let mut buf = [0u8; VALUE_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Full fixed-width payload, padding included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload with trailing zero padding stripped.
    pub fn trimmed(&self) -> &[u8] {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != 0)
            .map(|pos| pos + 1)
            .unwrap_or(0);
        &self.0[..end]
    }
}

impl Default for Value {
    fn default() -> Self {
        Self([0u8; VALUE_LEN])
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({:?})", self.trimmed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_from_slice_pads_with_zeros() {
        let value = Value::from_slice(b"hello").unwrap();
        assert_eq!(value.trimmed(), b"hello");
        assert_eq!(value.as_bytes().len(), VALUE_LEN);
        assert!(value.as_bytes()[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn value_from_slice_rejects_oversized_input() {
        let long = [7u8; VALUE_LEN + 1];
        let err = Value::from_slice(&long).unwrap_err();
        assert!(matches!(err, SableError::Invalid(_)));
    }

    #[test]
    fn value_trimmed_handles_all_zero_payload() {
        assert_eq!(Value::default().trimmed(), b"");
    }

    #[test]
    fn page_id_null_sentinel() {
        assert!(PageId::NULL.is_null());
        assert!(!PageId(1).is_null());
    }
}
