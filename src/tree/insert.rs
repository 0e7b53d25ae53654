//! Insertion engine: sorted in-place inserts, bottom-up splits, and root
//! growth, all expressed over page numbers.

use tracing::{debug, trace};

use crate::pager::Pager;
use crate::types::{PageId, Result, SableError, Value};

use super::node::{cut, Branch, Internal, Leaf, Node, Record, INTERNAL_ORDER, LEAF_ORDER};
use super::{find_leaf, find_record, set_parent};

/// Inserts `key`/`value`. Duplicates are rejected, not overwritten.
pub(crate) fn insert(pager: &Pager, key: i64, value: Value) -> Result<()> {
    if find_record(pager, key)?.is_some() {
        return Err(SableError::DuplicateKey(key));
    }
    let record = Record { key, value };

    let leaf_id = match find_leaf(pager, key)? {
        Some(id) => id,
        None => return start_new_tree(pager, record),
    };
    let leaf = Node::read(pager, leaf_id)?.into_leaf()?;
    if leaf.records.len() < LEAF_ORDER - 1 {
        insert_into_leaf(pager, leaf_id, leaf, record)
    } else {
        insert_into_leaf_after_splitting(pager, leaf_id, leaf, record)
    }
}

/// First insertion: a single-record leaf becomes the root.
fn start_new_tree(pager: &Pager, record: Record) -> Result<()> {
    let root_id = pager.alloc_page()?;
    let mut root = Leaf::new();
    root.records.push(record);
    Node::Leaf(root).write(pager, root_id)?;
    pager.set_root(root_id)?;
    debug!(target: "sable::tree", root = root_id.0, "started new tree");
    Ok(())
}

/// Shift-and-insert into a leaf with spare capacity.
fn insert_into_leaf(pager: &Pager, leaf_id: PageId, mut leaf: Leaf, record: Record) -> Result<()> {
    let pos = insertion_point(&leaf.records, record.key);
    leaf.records.insert(pos, record);
    Node::Leaf(leaf).write(pager, leaf_id)
}

/// Splits a full leaf around the incoming record and propagates the new
/// right sibling's first key to the parent.
fn insert_into_leaf_after_splitting(
    pager: &Pager,
    leaf_id: PageId,
    mut leaf: Leaf,
    record: Record,
) -> Result<()> {
    let new_id = pager.alloc_page()?;

    // Merge buffer of LEAF_ORDER entries: existing records plus the new one,
    // in sorted order.
    let pos = insertion_point(&leaf.records, record.key);
    leaf.records.insert(pos, record);

    let split = cut(LEAF_ORDER - 1);
    let right_records = leaf.records.split_off(split);
    let separator = right_records[0].key;
    let new_leaf = Leaf {
        parent: leaf.parent,
        right_sibling: leaf.right_sibling,
        records: right_records,
    };
    leaf.right_sibling = new_id;

    let parent = leaf.parent;
    Node::Leaf(new_leaf).write(pager, new_id)?;
    Node::Leaf(leaf).write(pager, leaf_id)?;
    trace!(
        target: "sable::tree",
        left = leaf_id.0,
        right = new_id.0,
        separator,
        "split leaf"
    );
    insert_into_parent(pager, parent, leaf_id, separator, new_id)
}

/// Links a freshly-split pair into the tree: grows a new root when the split
/// node was the root, otherwise inserts the separator into the parent,
/// splitting it in turn if full.
fn insert_into_parent(
    pager: &Pager,
    parent_id: PageId,
    left: PageId,
    key: i64,
    right: PageId,
) -> Result<()> {
    if parent_id.is_null() {
        return insert_into_new_root(pager, left, key, right);
    }
    let (parent, child_idx) = super::read_parent_of(pager, parent_id, left)?;
    // The new branch lands immediately after the parent's pointer to the
    // left half, which is also its sorted position.
    if parent.branches.len() < INTERNAL_ORDER - 1 {
        insert_into_node(pager, parent_id, parent, child_idx, key, right)
    } else {
        insert_into_node_after_splitting(pager, parent_id, parent, child_idx, key, right)
    }
}

/// Inserts a branch into an internal node with spare capacity.
fn insert_into_node(
    pager: &Pager,
    node_id: PageId,
    mut node: Internal,
    branch_pos: usize,
    key: i64,
    right: PageId,
) -> Result<()> {
    node.branches.insert(branch_pos, Branch { key, child: right });
    Node::Internal(node).write(pager, node_id)
}

/// Splits a full internal node around the incoming branch. The middle key is
/// promoted to the grandparent rather than copied down, and every child
/// moved to the new node is reparented.
fn insert_into_node_after_splitting(
    pager: &Pager,
    node_id: PageId,
    mut node: Internal,
    branch_pos: usize,
    key: i64,
    right: PageId,
) -> Result<()> {
    let new_id = pager.alloc_page()?;

    // Merge buffer of INTERNAL_ORDER branches.
    node.branches.insert(branch_pos, Branch { key, child: right });

    let split = cut(INTERNAL_ORDER);
    let right_branches = node.branches.split_off(split);
    let promoted = node
        .branches
        .pop()
        .ok_or(SableError::Corruption("internal split on empty buffer"))?;
    let k_prime = promoted.key;

    let new_node = Internal {
        parent: node.parent,
        leftmost_child: promoted.child,
        branches: right_branches,
    };
    let grandparent = node.parent;

    Node::Internal(node).write(pager, node_id)?;
    Node::Internal(new_node.clone()).write(pager, new_id)?;

    // Every child that moved right now answers to the new node.
    set_parent(pager, new_node.leftmost_child, new_id)?;
    for branch in &new_node.branches {
        set_parent(pager, branch.child, new_id)?;
    }
    trace!(
        target: "sable::tree",
        left = node_id.0,
        right = new_id.0,
        k_prime,
        "split internal node"
    );
    insert_into_parent(pager, grandparent, node_id, k_prime, new_id)
}

/// The root split: a new internal root adopts both halves and the tree
/// grows one level.
fn insert_into_new_root(pager: &Pager, left: PageId, key: i64, right: PageId) -> Result<()> {
    let root_id = pager.alloc_page()?;
    let root = Internal {
        parent: PageId::NULL,
        leftmost_child: left,
        branches: vec![Branch { key, child: right }],
    };
    Node::Internal(root).write(pager, root_id)?;
    pager.set_root(root_id)?;
    set_parent(pager, left, root_id)?;
    set_parent(pager, right, root_id)?;
    debug!(target: "sable::tree", root = root_id.0, "tree grew one level");
    Ok(())
}

/// Index of the first record with a key above `key`.
fn insertion_point(records: &[Record], key: i64) -> usize {
    records
        .iter()
        .position(|record| record.key > key)
        .unwrap_or(records.len())
}
