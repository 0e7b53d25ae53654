//! On-disk node codec: a raw page interpreted as a leaf or an internal node.
//!
//! Both kinds share a 128-byte node header. The first word is the parent
//! page for live nodes and the next-free link while the page sits on the
//! free list; the word at offset 120 is the right sibling for leaves and the
//! leftmost child for internal nodes. All integers are little-endian.

use std::ops::Range;

use crate::pager::Pager;
use crate::types::{PageId, Result, SableError, Value, PAGE_SIZE, VALUE_LEN};

/// Bytes reserved for the node header at the front of every node page.
pub const NODE_HDR_LEN: usize = 128;

const NODE_PARENT: Range<usize> = 0..8;
const NODE_IS_LEAF: Range<usize> = 8..12;
const NODE_NUM_KEYS: Range<usize> = 12..16;
const NODE_SPECIAL: Range<usize> = 120..128;

/// Encoded size of one leaf record (`key: i64` + fixed-width value).
pub const RECORD_LEN: usize = 8 + VALUE_LEN;
/// Encoded size of one internal branch (`key: i64` + `child: u64`).
pub const BRANCH_LEN: usize = 16;

/// Maximum records a leaf page can hold.
pub const LEAF_MAX_RECORDS: usize = (PAGE_SIZE - NODE_HDR_LEN) / RECORD_LEN;
/// Maximum branches an internal page can hold.
pub const INTERNAL_MAX_BRANCHES: usize = (PAGE_SIZE - NODE_HDR_LEN) / BRANCH_LEN;

/// Leaf order: capacity plus the one overflow slot that exists only in the
/// in-memory merge buffer during a split.
pub const LEAF_ORDER: usize = LEAF_MAX_RECORDS + 1;
/// Internal order, defined the same way as [`LEAF_ORDER`].
pub const INTERNAL_ORDER: usize = INTERNAL_MAX_BRANCHES + 1;

/// Split point for `length` entries: half, rounded up.
pub fn cut(length: usize) -> usize {
    if length % 2 == 0 {
        length / 2
    } else {
        length / 2 + 1
    }
}

/// One key/value record in a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record {
    /// Record key.
    pub key: i64,
    /// Fixed-width value payload.
    pub value: Value,
}

/// One separator/child pair in an internal node. `child` covers keys in
/// `[key, next_key)`, or up to infinity for the last branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Branch {
    /// Separator key.
    pub key: i64,
    /// Child page covering keys at or above `key`.
    pub child: PageId,
}

/// Decoded leaf page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leaf {
    /// Parent page, null for the root.
    pub parent: PageId,
    /// Next leaf to the right, null for the rightmost leaf.
    pub right_sibling: PageId,
    /// Records sorted strictly ascending by key.
    pub records: Vec<Record>,
}

impl Leaf {
    /// An empty leaf with no parent and no sibling.
    pub fn new() -> Self {
        Self {
            parent: PageId::NULL,
            right_sibling: PageId::NULL,
            records: Vec::new(),
        }
    }

    /// Minimum records a non-root leaf must keep.
    pub fn min_keys() -> usize {
        cut(LEAF_ORDER - 1)
    }
}

impl Default for Leaf {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded internal page. `leftmost_child` covers keys below the first
/// branch key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Internal {
    /// Parent page, null for the root.
    pub parent: PageId,
    /// Child covering keys below `branches[0].key`.
    pub leftmost_child: PageId,
    /// Branches sorted strictly ascending by key.
    pub branches: Vec<Branch>,
}

impl Internal {
    /// Minimum branches a non-root internal node must keep.
    pub fn min_keys() -> usize {
        cut(INTERNAL_ORDER) - 1
    }

    /// Number of children (branches plus the leftmost child).
    pub fn child_count(&self) -> usize {
        self.branches.len() + 1
    }

    /// Position of `child` among this node's children: 0 for the leftmost
    /// child, `i + 1` for `branches[i].child`.
    pub fn child_index(&self, child: PageId) -> Option<usize> {
        if self.leftmost_child == child {
            return Some(0);
        }
        self.branches
            .iter()
            .position(|b| b.child == child)
            .map(|i| i + 1)
    }

    /// Child at position `idx` (see [`Internal::child_index`]).
    pub fn child_at(&self, idx: usize) -> PageId {
        if idx == 0 {
            self.leftmost_child
        } else {
            self.branches[idx - 1].child
        }
    }

    /// Child to descend into when searching for `key`: the branch with the
    /// largest key at or below the target, else the leftmost child.
    pub fn search_child(&self, key: i64) -> PageId {
        for branch in self.branches.iter().rev() {
            if branch.key <= key {
                return branch.child;
            }
        }
        self.leftmost_child
    }
}

/// A node page decoded into its typed form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Leaf page holding records.
    Leaf(Leaf),
    /// Internal page holding separators and child pointers.
    Internal(Internal),
}

impl Node {
    /// Reads and decodes the node stored at `id`.
    pub fn read(pager: &Pager, id: PageId) -> Result<Node> {
        let buf = pager.read_page(id)?;
        Node::decode(&buf)
    }

    /// Encodes and writes this node to `id`.
    pub fn write(&self, pager: &Pager, id: PageId) -> Result<()> {
        let mut buf = vec![0u8; PAGE_SIZE];
        self.encode(&mut buf)?;
        pager.write_page(id, &buf)
    }

    /// Decodes a node from a raw page buffer.
    pub fn decode(buf: &[u8]) -> Result<Node> {
        if buf.len() < PAGE_SIZE {
            return Err(SableError::Corruption("node page truncated"));
        }
        let parent = PageId(u64::from_le_bytes(buf[NODE_PARENT].try_into().unwrap()));
        let is_leaf = u32::from_le_bytes(buf[NODE_IS_LEAF].try_into().unwrap());
        let num_keys = u32::from_le_bytes(buf[NODE_NUM_KEYS].try_into().unwrap()) as usize;
        let special = PageId(u64::from_le_bytes(buf[NODE_SPECIAL].try_into().unwrap()));
        match is_leaf {
            1 => {
                if num_keys > LEAF_MAX_RECORDS {
                    return Err(SableError::Corruption("leaf key count exceeds capacity"));
                }
                let mut records = Vec::with_capacity(num_keys);
                for i in 0..num_keys {
                    let off = NODE_HDR_LEN + i * RECORD_LEN;
                    let key = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
                    let mut value = [0u8; VALUE_LEN];
                    value.copy_from_slice(&buf[off + 8..off + RECORD_LEN]);
                    records.push(Record {
                        key,
                        value: Value(value),
                    });
                }
                Ok(Node::Leaf(Leaf {
                    parent,
                    right_sibling: special,
                    records,
                }))
            }
            0 => {
                if num_keys > INTERNAL_MAX_BRANCHES {
                    return Err(SableError::Corruption(
                        "internal key count exceeds capacity",
                    ));
                }
                let mut branches = Vec::with_capacity(num_keys);
                for i in 0..num_keys {
                    let off = NODE_HDR_LEN + i * BRANCH_LEN;
                    let key = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
                    let child = PageId(u64::from_le_bytes(
                        buf[off + 8..off + 16].try_into().unwrap(),
                    ));
                    branches.push(Branch { key, child });
                }
                Ok(Node::Internal(Internal {
                    parent,
                    leftmost_child: special,
                    branches,
                }))
            }
            _ => Err(SableError::Corruption("unknown node kind")),
        }
    }

    /// Encodes this node into a page-sized buffer.
    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < PAGE_SIZE {
            return Err(SableError::Invalid("node buffer smaller than a page"));
        }
        buf[..PAGE_SIZE].fill(0);
        match self {
            Node::Leaf(leaf) => {
                if leaf.records.len() > LEAF_MAX_RECORDS {
                    return Err(SableError::Invalid("leaf holds too many records"));
                }
                buf[NODE_PARENT].copy_from_slice(&leaf.parent.0.to_le_bytes());
                buf[NODE_IS_LEAF].copy_from_slice(&1u32.to_le_bytes());
                buf[NODE_NUM_KEYS].copy_from_slice(&(leaf.records.len() as u32).to_le_bytes());
                buf[NODE_SPECIAL].copy_from_slice(&leaf.right_sibling.0.to_le_bytes());
                for (i, record) in leaf.records.iter().enumerate() {
                    let off = NODE_HDR_LEN + i * RECORD_LEN;
                    buf[off..off + 8].copy_from_slice(&record.key.to_le_bytes());
                    buf[off + 8..off + RECORD_LEN].copy_from_slice(&record.value.0);
                }
            }
            Node::Internal(node) => {
                if node.branches.len() > INTERNAL_MAX_BRANCHES {
                    return Err(SableError::Invalid("internal holds too many branches"));
                }
                buf[NODE_PARENT].copy_from_slice(&node.parent.0.to_le_bytes());
                buf[NODE_IS_LEAF].copy_from_slice(&0u32.to_le_bytes());
                buf[NODE_NUM_KEYS].copy_from_slice(&(node.branches.len() as u32).to_le_bytes());
                buf[NODE_SPECIAL].copy_from_slice(&node.leftmost_child.0.to_le_bytes());
                for (i, branch) in node.branches.iter().enumerate() {
                    let off = NODE_HDR_LEN + i * BRANCH_LEN;
                    buf[off..off + 8].copy_from_slice(&branch.key.to_le_bytes());
                    buf[off + 8..off + 16].copy_from_slice(&branch.child.0.to_le_bytes());
                }
            }
        }
        Ok(())
    }

    /// Parent page of this node.
    pub fn parent(&self) -> PageId {
        match self {
            Node::Leaf(leaf) => leaf.parent,
            Node::Internal(node) => node.parent,
        }
    }

    /// Rewrites the parent back-reference.
    pub fn set_parent(&mut self, parent: PageId) {
        match self {
            Node::Leaf(leaf) => leaf.parent = parent,
            Node::Internal(node) => node.parent = parent,
        }
    }

    /// Number of keys held by this node.
    pub fn num_keys(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.records.len(),
            Node::Internal(node) => node.branches.len(),
        }
    }

    /// Minimum keys a non-root node of this kind must keep.
    pub fn min_keys(&self) -> usize {
        match self {
            Node::Leaf(_) => Leaf::min_keys(),
            Node::Internal(_) => Internal::min_keys(),
        }
    }

    /// Unwraps a leaf, reporting corruption otherwise.
    pub fn into_leaf(self) -> Result<Leaf> {
        match self {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(SableError::Corruption("expected a leaf page")),
        }
    }

    /// Unwraps an internal node, reporting corruption otherwise.
    pub fn into_internal(self) -> Result<Internal> {
        match self {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(SableError::Corruption("expected an internal page")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_constants_fill_the_page() {
        assert_eq!(LEAF_MAX_RECORDS, 31);
        assert_eq!(INTERNAL_MAX_BRANCHES, 248);
        assert_eq!(NODE_HDR_LEN + LEAF_MAX_RECORDS * RECORD_LEN, PAGE_SIZE);
        assert_eq!(NODE_HDR_LEN + INTERNAL_MAX_BRANCHES * BRANCH_LEN, PAGE_SIZE);
    }

    #[test]
    fn cut_rounds_up_on_odd_lengths() {
        assert_eq!(cut(31), 16);
        assert_eq!(cut(32), 16);
        assert_eq!(cut(249), 125);
    }

    #[test]
    fn split_halves_meet_the_minimum() {
        // A full leaf plus the incoming record splits into halves that are
        // both at or above the leaf minimum.
        let split = cut(LEAF_ORDER - 1);
        assert!(split >= Leaf::min_keys());
        assert!(LEAF_ORDER - split >= Leaf::min_keys());
        // Same for internal nodes, accounting for the promoted separator.
        let split = cut(INTERNAL_ORDER);
        assert!(split - 1 >= Internal::min_keys());
        assert!(INTERNAL_ORDER - split >= Internal::min_keys());
    }

    #[test]
    fn leaf_codec_roundtrip() {
        let leaf = Leaf {
            parent: PageId(4),
            right_sibling: PageId(9),
            records: (0..LEAF_MAX_RECORDS as i64)
                .map(|k| Record {
                    key: k * 3,
                    value: Value::from_slice(format!("v-{k}").as_bytes()).unwrap(),
                })
                .collect(),
        };
        let mut buf = vec![0u8; PAGE_SIZE];
        Node::Leaf(leaf.clone()).encode(&mut buf).unwrap();
        assert_eq!(Node::decode(&buf).unwrap(), Node::Leaf(leaf));
    }

    #[test]
    fn internal_codec_roundtrip() {
        let node = Internal {
            parent: PageId::NULL,
            leftmost_child: PageId(2),
            branches: (0..INTERNAL_MAX_BRANCHES as i64)
                .map(|k| Branch {
                    key: k * 10,
                    child: PageId(100 + k as u64),
                })
                .collect(),
        };
        let mut buf = vec![0u8; PAGE_SIZE];
        Node::Internal(node.clone()).encode(&mut buf).unwrap();
        assert_eq!(Node::decode(&buf).unwrap(), Node::Internal(node));
    }

    #[test]
    fn decode_rejects_unknown_node_kind() {
        let mut buf = vec![0u8; PAGE_SIZE];
        buf[8] = 2;
        let err = Node::decode(&buf).unwrap_err();
        assert!(matches!(err, SableError::Corruption(_)));
    }

    #[test]
    fn decode_rejects_oversized_key_count() {
        let mut buf = vec![0u8; PAGE_SIZE];
        Node::Leaf(Leaf::new()).encode(&mut buf).unwrap();
        buf[12..16].copy_from_slice(&(LEAF_MAX_RECORDS as u32 + 1).to_le_bytes());
        let err = Node::decode(&buf).unwrap_err();
        assert!(matches!(err, SableError::Corruption(_)));
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let err = Node::decode(&[0u8; NODE_HDR_LEN]).unwrap_err();
        assert!(matches!(err, SableError::Corruption(_)));
    }

    #[test]
    fn encode_rejects_overfull_leaf() {
        let leaf = Leaf {
            parent: PageId::NULL,
            right_sibling: PageId::NULL,
            records: (0..LEAF_MAX_RECORDS as i64 + 1)
                .map(|k| Record {
                    key: k,
                    value: Value::default(),
                })
                .collect(),
        };
        let mut buf = vec![0u8; PAGE_SIZE];
        let err = Node::Leaf(leaf).encode(&mut buf).unwrap_err();
        assert!(matches!(err, SableError::Invalid(_)));
    }

    #[test]
    fn search_child_follows_largest_key_at_or_below_target() {
        let node = Internal {
            parent: PageId::NULL,
            leftmost_child: PageId(10),
            branches: vec![
                Branch {
                    key: 100,
                    child: PageId(11),
                },
                Branch {
                    key: 200,
                    child: PageId(12),
                },
            ],
        };
        assert_eq!(node.search_child(50), PageId(10));
        assert_eq!(node.search_child(100), PageId(11));
        assert_eq!(node.search_child(150), PageId(11));
        assert_eq!(node.search_child(201), PageId(12));
    }

    #[test]
    fn child_index_covers_leftmost_and_branches() {
        let node = Internal {
            parent: PageId::NULL,
            leftmost_child: PageId(10),
            branches: vec![
                Branch {
                    key: 100,
                    child: PageId(11),
                },
                Branch {
                    key: 200,
                    child: PageId(12),
                },
            ],
        };
        assert_eq!(node.child_index(PageId(10)), Some(0));
        assert_eq!(node.child_index(PageId(11)), Some(1));
        assert_eq!(node.child_index(PageId(12)), Some(2));
        assert_eq!(node.child_index(PageId(13)), None);
        assert_eq!(node.child_at(0), PageId(10));
        assert_eq!(node.child_at(2), PageId(12));
    }
}
