//! Codec for the header page (page 0).

use std::ops::Range;

use crate::types::{PageId, Result, SableError, PAGE_SIZE};

const META_FREE_HEAD: Range<usize> = 0..8;
const META_ROOT: Range<usize> = 8..16;
const META_PAGE_COUNT: Range<usize> = 16..24;

/// Table metadata stored in page 0.
///
/// Every allocation, free, and root change rewrites this page; operations
/// that depend on current tree shape re-read it first rather than caching.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Meta {
    /// Head of the free-page list, null when the list is empty.
    pub free_head: PageId,
    /// Root of the tree, null when the tree is empty.
    pub root: PageId,
    /// Next unused page number when the free list is empty. Always at least
    /// 1: page 0 is the header itself.
    pub page_count: u64,
}

impl Meta {
    /// Metadata for a freshly-initialized table file.
    pub fn fresh() -> Self {
        Self {
            free_head: PageId::NULL,
            root: PageId::NULL,
            page_count: 1,
        }
    }

    /// Serializes the header into a page-sized buffer, zeroing the reserved
    /// tail. All fields are little-endian.
    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < PAGE_SIZE {
            return Err(SableError::Invalid("header buffer smaller than a page"));
        }
        buf[..PAGE_SIZE].fill(0);
        buf[META_FREE_HEAD].copy_from_slice(&self.free_head.0.to_le_bytes());
        buf[META_ROOT].copy_from_slice(&self.root.0.to_le_bytes());
        buf[META_PAGE_COUNT].copy_from_slice(&self.page_count.to_le_bytes());
        Ok(())
    }

    /// Decodes and validates the header page.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < PAGE_SIZE {
            return Err(SableError::Corruption("header page truncated"));
        }
        let free_head = PageId(u64::from_le_bytes(buf[META_FREE_HEAD].try_into().unwrap()));
        let root = PageId(u64::from_le_bytes(buf[META_ROOT].try_into().unwrap()));
        let page_count = u64::from_le_bytes(buf[META_PAGE_COUNT].try_into().unwrap());
        if page_count == 0 {
            return Err(SableError::Corruption("header page count zero"));
        }
        if root.0 >= page_count {
            return Err(SableError::Corruption("header root out of range"));
        }
        if free_head.0 >= page_count {
            return Err(SableError::Corruption("header free head out of range"));
        }
        Ok(Self {
            free_head,
            root,
            page_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_roundtrip() {
        let meta = Meta {
            free_head: PageId(7),
            root: PageId(3),
            page_count: 12,
        };
        let mut buf = vec![0u8; PAGE_SIZE];
        meta.encode(&mut buf).unwrap();
        assert_eq!(Meta::decode(&buf).unwrap(), meta);
    }

    #[test]
    fn fresh_meta_has_no_root_and_one_page() {
        let meta = Meta::fresh();
        assert!(meta.root.is_null());
        assert!(meta.free_head.is_null());
        assert_eq!(meta.page_count, 1);
    }

    #[test]
    fn decode_rejects_zero_page_count() {
        let buf = vec![0u8; PAGE_SIZE];
        let err = Meta::decode(&buf).unwrap_err();
        assert!(matches!(err, SableError::Corruption(_)));
    }

    #[test]
    fn decode_rejects_out_of_range_root() {
        let meta = Meta {
            free_head: PageId::NULL,
            root: PageId(9),
            page_count: 4,
        };
        let mut buf = vec![0u8; PAGE_SIZE];
        // Encode bypasses validation; decode must catch the bad root.
        meta.encode(&mut buf).unwrap();
        let err = Meta::decode(&buf).unwrap_err();
        assert!(matches!(err, SableError::Corruption(_)));
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let err = Meta::decode(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, SableError::Corruption(_)));
    }
}
