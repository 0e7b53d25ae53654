//! B+Tree table: the public key/value surface and the search path.
//!
//! Tree operations never hold a node graph. Each step reads the page(s) it
//! needs through the pager, mutates an in-memory copy, and writes it back
//! before moving to the parent; the only durable state between steps is the
//! file itself.

use std::path::Path;

use tracing::debug;

use crate::pager::Pager;
use crate::types::{PageId, Result, SableError, Value};

pub mod node;

mod delete;
mod insert;

pub use crate::pager::TableOptions;

use node::{Internal, Leaf, Node};

/// A disk-resident B+Tree mapping `i64` keys to fixed-width values, stored
/// in a single paged file.
pub struct Table {
    pager: Pager,
}

impl Table {
    /// Opens the table at `path` with default options, creating the file if
    /// it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, TableOptions::default())
    }

    /// Opens the table at `path` with explicit options.
    pub fn open_with(path: impl AsRef<Path>, options: TableOptions) -> Result<Self> {
        Ok(Self {
            pager: Pager::open(path, options)?,
        })
    }

    /// Inserts `key` with `value` (at most [`crate::VALUE_LEN`] bytes,
    /// zero-padded). Rejects keys that are already present.
    pub fn insert(&mut self, key: i64, value: &[u8]) -> Result<()> {
        let value = Value::from_slice(value)?;
        insert::insert(&self.pager, key, value)
    }

    /// Looks up `key`, returning its value if present.
    pub fn find(&self, key: i64) -> Result<Option<Value>> {
        find_record(&self.pager, key)
    }

    /// Deletes `key`, rebalancing the tree as needed.
    pub fn delete(&mut self, key: i64) -> Result<()> {
        delete::delete(&self.pager, key)
    }

    /// True if the tree holds no records.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.pager.meta()?.root.is_null())
    }

    /// Current root page, if the tree is non-empty. Exposed for the display
    /// layer; not needed for lookups.
    pub fn root(&self) -> Result<Option<PageId>> {
        let root = self.pager.meta()?.root;
        Ok(if root.is_null() { None } else { Some(root) })
    }

    /// Number of edges from the root down to any leaf (0 for a single-leaf
    /// tree). The tree is balanced, so every leaf sits at this depth.
    pub fn height(&self) -> Result<u32> {
        let meta = self.pager.meta()?;
        if meta.root.is_null() {
            return Ok(0);
        }
        let mut depth = 0;
        let mut current = meta.root;
        loop {
            match Node::read(&self.pager, current)? {
                Node::Leaf(_) => return Ok(depth),
                Node::Internal(node) => {
                    current = node.leftmost_child;
                    depth += 1;
                }
            }
        }
    }

    /// Leftmost leaf of the tree, the entry point for in-order traversal.
    pub fn first_leaf(&self) -> Result<Option<PageId>> {
        let meta = self.pager.meta()?;
        if meta.root.is_null() {
            return Ok(None);
        }
        let mut current = meta.root;
        loop {
            match Node::read(&self.pager, current)? {
                Node::Leaf(_) => return Ok(Some(current)),
                Node::Internal(node) => current = node.leftmost_child,
            }
        }
    }

    /// The leaf to the right of `leaf`, if any.
    pub fn next_sibling(&self, leaf: PageId) -> Result<Option<PageId>> {
        let leaf = Node::read(&self.pager, leaf)?.into_leaf()?;
        Ok(if leaf.right_sibling.is_null() {
            None
        } else {
            Some(leaf.right_sibling)
        })
    }

    /// Iterates every record in ascending key order by walking the leaf
    /// sibling chain.
    pub fn scan(&self) -> Result<Scan<'_>> {
        let first = match self.first_leaf()? {
            Some(id) => Some(Node::read(&self.pager, id)?.into_leaf()?),
            None => None,
        };
        Ok(Scan {
            pager: &self.pager,
            leaf: first,
            idx: 0,
        })
    }

    /// Drops every record and returns all tree pages to the free list.
    pub fn clear(&mut self) -> Result<()> {
        let meta = self.pager.meta()?;
        if meta.root.is_null() {
            return Ok(());
        }
        let mut stack = vec![meta.root];
        while let Some(id) = stack.pop() {
            if let Node::Internal(node) = Node::read(&self.pager, id)? {
                stack.push(node.leftmost_child);
                stack.extend(node.branches.iter().map(|b| b.child));
            }
            self.pager.free_page(id)?;
        }
        self.pager.set_root(PageId::NULL)?;
        debug!(target: "sable::tree", "cleared table");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pager(&self) -> &Pager {
        &self.pager
    }
}

/// Descends from the root to the leaf that would contain `key`. Returns
/// `None` on an empty tree.
pub(crate) fn find_leaf(pager: &Pager, key: i64) -> Result<Option<PageId>> {
    let meta = pager.meta()?;
    if meta.root.is_null() {
        return Ok(None);
    }
    let mut current = meta.root;
    loop {
        match Node::read(pager, current)? {
            Node::Leaf(_) => return Ok(Some(current)),
            Node::Internal(node) => current = node.search_child(key),
        }
    }
}

/// Exact-match lookup: linear scan of the target leaf's sorted records.
pub(crate) fn find_record(pager: &Pager, key: i64) -> Result<Option<Value>> {
    let leaf_id = match find_leaf(pager, key)? {
        Some(id) => id,
        None => return Ok(None),
    };
    let leaf = Node::read(pager, leaf_id)?.into_leaf()?;
    Ok(leaf
        .records
        .iter()
        .find(|record| record.key == key)
        .map(|record| record.value))
}

/// Rewrites the parent back-reference of `child`. Every reparenting path
/// (new root, split, merge, redistribute) goes through here.
pub(crate) fn set_parent(pager: &Pager, child: PageId, parent: PageId) -> Result<()> {
    let mut node = Node::read(pager, child)?;
    node.set_parent(parent);
    node.write(pager, child)
}

/// Reads the internal node at `id`, and the position of `child` among its
/// children. Used by both engines when walking from a child to its parent.
pub(crate) fn read_parent_of(
    pager: &Pager,
    id: PageId,
    child: PageId,
) -> Result<(Internal, usize)> {
    let parent = Node::read(pager, id)?.into_internal()?;
    let idx = parent
        .child_index(child)
        .ok_or(SableError::Corruption("parent does not reference child"))?;
    Ok((parent, idx))
}

/// Iterator over all records in key order.
pub struct Scan<'a> {
    pager: &'a Pager,
    leaf: Option<Leaf>,
    idx: usize,
}

impl Iterator for Scan<'_> {
    type Item = Result<(i64, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = self.leaf.as_ref()?;
            if self.idx < leaf.records.len() {
                let record = leaf.records[self.idx];
                self.idx += 1;
                return Some(Ok((record.key, record.value)));
            }
            let next = leaf.right_sibling;
            if next.is_null() {
                self.leaf = None;
                return None;
            }
            match Node::read(self.pager, next).and_then(Node::into_leaf) {
                Ok(next_leaf) => {
                    self.leaf = Some(next_leaf);
                    self.idx = 0;
                }
                Err(err) => {
                    self.leaf = None;
                    return Some(Err(err));
                }
            }
        }
    }
}
