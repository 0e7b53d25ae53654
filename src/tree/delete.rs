//! Deletion engine: leaf removal, bottom-up merge/redistribute, and root
//! collapse, expressed purely over page numbers. A node that drops below its
//! minimum merges with a sibling when the pair fits in one page, otherwise
//! borrows exactly one entry from it.

use tracing::{debug, trace};

use crate::pager::Pager;
use crate::types::{PageId, Result, SableError};

use super::node::{Internal, Leaf, Node, INTERNAL_ORDER, LEAF_ORDER};
use super::{find_leaf, read_parent_of, set_parent};

/// Deletes `key`, reporting `NotFound` if absent.
pub(crate) fn delete(pager: &Pager, key: i64) -> Result<()> {
    let leaf_id = find_leaf(pager, key)?.ok_or(SableError::NotFound(key))?;
    let mut leaf = Node::read(pager, leaf_id)?.into_leaf()?;
    let pos = leaf
        .records
        .iter()
        .position(|record| record.key == key)
        .ok_or(SableError::NotFound(key))?;
    leaf.records.remove(pos);
    Node::Leaf(leaf).write(pager, leaf_id)?;
    rebalance(pager, leaf_id)
}

/// Restores the occupancy invariant for the node at `id` after it lost an
/// entry. Recurses up one level whenever a merge removes a separator from
/// the parent.
fn rebalance(pager: &Pager, id: PageId) -> Result<()> {
    let meta = pager.meta()?;
    let node = Node::read(pager, id)?;

    if id == meta.root {
        return adjust_root(pager, id, node);
    }
    if node.num_keys() >= node.min_keys() {
        return Ok(());
    }

    // Underflow. Pair the node with its left sibling, or with its right
    // sibling when it is the parent's leftmost child.
    let parent_id = node.parent();
    let (parent, child_idx) = read_parent_of(pager, parent_id, id)?;
    if parent.child_count() < 2 {
        return Err(SableError::Corruption("non-root parent has a single child"));
    }
    let (left_pos, right_pos) = if child_idx == 0 {
        (0, 1)
    } else {
        (child_idx - 1, child_idx)
    };
    let sep_idx = right_pos - 1;
    let left_id = parent.child_at(left_pos);
    let right_id = parent.child_at(right_pos);
    let node_is_left = child_idx == left_pos;

    match (
        Node::read(pager, left_id)?,
        Node::read(pager, right_id)?,
    ) {
        (Node::Leaf(left), Node::Leaf(right)) => {
            if left.records.len() + right.records.len() < LEAF_ORDER {
                merge_leaves(pager, parent_id, parent, sep_idx, left_id, left, right_id, right)
            } else {
                redistribute_leaves(
                    pager,
                    parent_id,
                    parent,
                    sep_idx,
                    left_id,
                    left,
                    right_id,
                    right,
                    node_is_left,
                )
            }
        }
        (Node::Internal(left), Node::Internal(right)) => {
            if left.branches.len() + right.branches.len() < INTERNAL_ORDER - 1 {
                merge_internals(pager, parent_id, parent, sep_idx, left_id, left, right_id, right)
            } else {
                redistribute_internals(
                    pager,
                    parent_id,
                    parent,
                    sep_idx,
                    left_id,
                    left,
                    right_id,
                    right,
                    node_is_left,
                )
            }
        }
        _ => Err(SableError::Corruption("sibling nodes of differing kinds")),
    }
}

/// Root special cases: a root may shrink to zero keys, at which point an
/// internal root hands the tree to its only child and a leaf root empties
/// the tree entirely.
fn adjust_root(pager: &Pager, root_id: PageId, node: Node) -> Result<()> {
    if node.num_keys() > 0 {
        return Ok(());
    }
    match node {
        Node::Internal(root) => {
            let new_root = root.leftmost_child;
            set_parent(pager, new_root, PageId::NULL)?;
            pager.set_root(new_root)?;
            pager.free_page(root_id)?;
            debug!(
                target: "sable::tree",
                old = root_id.0,
                new = new_root.0,
                "tree shrank one level"
            );
        }
        Node::Leaf(_) => {
            pager.set_root(PageId::NULL)?;
            pager.free_page(root_id)?;
            debug!(target: "sable::tree", old = root_id.0, "tree emptied");
        }
    }
    Ok(())
}

/// Folds the right leaf into the left, frees the right page, and deletes the
/// separator from the parent (which may itself underflow).
#[allow(clippy::too_many_arguments)]
fn merge_leaves(
    pager: &Pager,
    parent_id: PageId,
    parent: Internal,
    sep_idx: usize,
    left_id: PageId,
    mut left: Leaf,
    right_id: PageId,
    right: Leaf,
) -> Result<()> {
    left.records.extend(right.records);
    left.right_sibling = right.right_sibling;
    Node::Leaf(left).write(pager, left_id)?;
    pager.free_page(right_id)?;
    trace!(
        target: "sable::tree",
        survivor = left_id.0,
        removed = right_id.0,
        "merged leaf into left sibling"
    );
    remove_branch(pager, parent_id, parent, sep_idx)
}

/// Folds the right internal node into the left, pulling the separator down
/// between them and reparenting every moved child.
#[allow(clippy::too_many_arguments)]
fn merge_internals(
    pager: &Pager,
    parent_id: PageId,
    parent: Internal,
    sep_idx: usize,
    left_id: PageId,
    mut left: Internal,
    right_id: PageId,
    right: Internal,
) -> Result<()> {
    let k_prime = parent.branches[sep_idx].key;
    left.branches.push(super::node::Branch {
        key: k_prime,
        child: right.leftmost_child,
    });
    left.branches.extend(right.branches.iter().copied());
    Node::Internal(left).write(pager, left_id)?;

    set_parent(pager, right.leftmost_child, left_id)?;
    for branch in &right.branches {
        set_parent(pager, branch.child, left_id)?;
    }
    pager.free_page(right_id)?;
    trace!(
        target: "sable::tree",
        survivor = left_id.0,
        removed = right_id.0,
        k_prime,
        "merged internal node into left sibling"
    );
    remove_branch(pager, parent_id, parent, sep_idx)
}

/// Removes the separator branch at `sep_idx` from the parent and rebalances
/// it in turn. This is the upward leg of the deletion recursion.
fn remove_branch(
    pager: &Pager,
    parent_id: PageId,
    mut parent: Internal,
    sep_idx: usize,
) -> Result<()> {
    parent.branches.remove(sep_idx);
    Node::Internal(parent).write(pager, parent_id)?;
    rebalance(pager, parent_id)
}

/// Moves one record across the leaf boundary so both siblings meet the
/// minimum, and rewrites the separator to the new boundary key.
#[allow(clippy::too_many_arguments)]
fn redistribute_leaves(
    pager: &Pager,
    parent_id: PageId,
    mut parent: Internal,
    sep_idx: usize,
    left_id: PageId,
    mut left: Leaf,
    right_id: PageId,
    mut right: Leaf,
    node_is_left: bool,
) -> Result<()> {
    if node_is_left {
        // Right sibling donates its first record.
        let record = right.records.remove(0);
        left.records.push(record);
        parent.branches[sep_idx].key = right.records[0].key;
    } else {
        // Left sibling donates its last record, which becomes the boundary.
        let record = left
            .records
            .pop()
            .ok_or(SableError::Corruption("redistribute from empty leaf"))?;
        parent.branches[sep_idx].key = record.key;
        right.records.insert(0, record);
    }
    Node::Leaf(left).write(pager, left_id)?;
    Node::Leaf(right).write(pager, right_id)?;
    Node::Internal(parent).write(pager, parent_id)?;
    trace!(
        target: "sable::tree",
        left = left_id.0,
        right = right_id.0,
        "redistributed one leaf record"
    );
    Ok(())
}

/// Rotates one branch through the parent separator between two internal
/// siblings, reparenting the child that changes sides.
#[allow(clippy::too_many_arguments)]
fn redistribute_internals(
    pager: &Pager,
    parent_id: PageId,
    mut parent: Internal,
    sep_idx: usize,
    left_id: PageId,
    mut left: Internal,
    right_id: PageId,
    mut right: Internal,
    node_is_left: bool,
) -> Result<()> {
    let k_prime = parent.branches[sep_idx].key;
    if node_is_left {
        // Pull the separator down into the left node; the right sibling's
        // leftmost child changes sides and its first key moves up.
        let donated = right.branches.remove(0);
        left.branches.push(super::node::Branch {
            key: k_prime,
            child: right.leftmost_child,
        });
        set_parent(pager, right.leftmost_child, left_id)?;
        right.leftmost_child = donated.child;
        parent.branches[sep_idx].key = donated.key;
    } else {
        // Mirror image: the left sibling's last branch rotates through the
        // separator into the right node.
        let donated = left
            .branches
            .pop()
            .ok_or(SableError::Corruption("redistribute from empty internal"))?;
        right.branches.insert(
            0,
            super::node::Branch {
                key: k_prime,
                child: right.leftmost_child,
            },
        );
        right.leftmost_child = donated.child;
        set_parent(pager, donated.child, right_id)?;
        parent.branches[sep_idx].key = donated.key;
    }
    Node::Internal(left).write(pager, left_id)?;
    Node::Internal(right).write(pager, right_id)?;
    Node::Internal(parent).write(pager, parent_id)?;
    trace!(
        target: "sable::tree",
        left = left_id.0,
        right = right_id.0,
        "redistributed one internal branch"
    );
    Ok(())
}
