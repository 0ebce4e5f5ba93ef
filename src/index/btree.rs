use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{BurrowError, PageId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::storage::page::{HeaderPage, HeaderPageRef};

use super::btree_page::{NodeMut, NodeRef};
use super::comparator::KeyComparator;
use super::index_iterator::IndexIterator;
use super::key::PageCodec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Insert,
    Delete,
}

/// Latches held during a write descent: the tree-level root latch plus
/// the crabbing stack of retained ancestor pages, root first. Dropping
/// the context unwinds everything, so every early return is clean.
struct Context<'a> {
    root_lock: Option<RwLockWriteGuard<'a, PageId>>,
    stack: Vec<WritePageGuard>,
}

impl Context<'_> {
    fn release_ancestors(&mut self) {
        self.stack.clear();
        self.root_lock = None;
    }
}

/// A concurrent B+-tree index over buffer-managed pages.
///
/// Keys are unique under the injected comparator. Point lookups and
/// range scans take read latches; inserts and deletes descend with latch
/// crabbing, retaining ancestors only while a split or merge might reach
/// them. The root page id lives behind a tree-level latch that descent
/// releases like any other ancestor, and every root change is persisted
/// through the header page.
pub struct BPlusTree<K, V, C> {
    index_name: String,
    root_page_id: RwLock<PageId>,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: PageCodec,
    V: PageCodec,
    C: KeyComparator<K>,
{
    /// Creates a handle over a new, empty index. Nothing is written until
    /// the first insert.
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Self {
        assert!(leaf_max_size >= 2, "leaf fanout too small");
        assert!(internal_max_size >= 3, "internal fanout too small");
        Self {
            index_name: name.into(),
            root_page_id: RwLock::new(INVALID_PAGE_ID),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            _marker: PhantomData,
        }
    }

    /// Reopens an index by recovering its root id from the header page.
    pub fn open(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let name = name.into();
        let root_id = {
            let guard = bpm.fetch_page_read(HEADER_PAGE_ID)?;
            HeaderPageRef::new(guard.data())
                .get_root_id(&name)
                .unwrap_or(INVALID_PAGE_ID)
        };
        let tree = Self::new(name, bpm, comparator, leaf_max_size, internal_max_size);
        *tree.root_page_id.write() = root_id;
        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.read().is_valid()
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    /// Returns the value bound to `key`, as a zero- or one-element list.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>> {
        let Some(leaf) = self.find_leaf_read(Some(key))? else {
            return Ok(Vec::new());
        };
        let node = NodeRef::<K, V>::new(leaf.data());
        let pos = self.lower_bound(&node, key);
        if pos < node.size() && self.compare_at(&node, pos, key) == Ordering::Equal {
            Ok(vec![node.value_at(pos)])
        } else {
            Ok(Vec::new())
        }
    }

    /// Inserts a key-value pair. Returns false if the key already exists.
    pub fn insert(&self, key: K, value: V) -> Result<bool> {
        let mut root_lock = self.root_page_id.write();
        if !root_lock.is_valid() {
            let mut guard = self.bpm.new_page()?;
            let root_id = guard.page_id();
            {
                let mut node = NodeMut::<K, V>::new(guard.data_mut());
                node.init_leaf(root_id, INVALID_PAGE_ID, self.leaf_max_size);
                node.leaf_insert_at(0, &key, &value);
            }
            drop(guard);
            *root_lock = root_id;
            self.update_root_page_id(root_id, true)?;
            debug!(root = root_id.as_i32(), "created root leaf");
            return Ok(true);
        }

        let mut ctx = Context {
            root_lock: Some(root_lock),
            stack: Vec::new(),
        };
        let mut leaf = self.find_leaf_write(&key, Op::Insert, &mut ctx)?;

        // A concurrent split may have moved the key range rightwards
        // between descent and here: if every key in this leaf is below
        // the incoming key, the successor may own it now.
        let hand_off = {
            let node = NodeRef::<K, V>::new(leaf.data());
            let size = node.size();
            if size > 0
                && self.compare_at(&node, size - 1, &key) == Ordering::Less
                && node.next_page_id().is_valid()
            {
                Some(node.next_page_id())
            } else {
                None
            }
        };
        if let Some(next_id) = hand_off {
            let next = self.bpm.fetch_page_write(next_id)?;
            let belongs = {
                let node = NodeRef::<K, V>::new(next.data());
                node.size() > 0 && self.compare_at(&node, 0, &key) != Ordering::Greater
            };
            if belongs {
                leaf = next;
            }
        }

        let insert_pos = {
            let node = NodeRef::<K, V>::new(leaf.data());
            let pos = self.lower_bound(&node, &key);
            if pos < node.size() && self.compare_at(&node, pos, &key) == Ordering::Equal {
                None
            } else {
                Some(pos)
            }
        };
        let Some(pos) = insert_pos else {
            return Ok(false);
        };

        {
            let mut node = NodeMut::<K, V>::new(leaf.data_mut());
            node.leaf_insert_at(pos, &key, &value);
        }

        if NodeRef::<K, V>::new(leaf.data()).size() >= self.leaf_max_size {
            self.split_leaf(leaf, &mut ctx)?;
        }
        Ok(true)
    }

    /// Removes a key. Absent keys are a no-op.
    pub fn remove(&self, key: &K) -> Result<()> {
        let root_lock = self.root_page_id.write();
        if !root_lock.is_valid() {
            return Ok(());
        }

        let mut ctx = Context {
            root_lock: Some(root_lock),
            stack: Vec::new(),
        };
        let mut leaf = self.find_leaf_write(key, Op::Delete, &mut ctx)?;

        let found = {
            let node = NodeRef::<K, V>::new(leaf.data());
            let pos = self.lower_bound(&node, key);
            (pos < node.size() && self.compare_at(&node, pos, key) == Ordering::Equal)
                .then_some(pos)
        };
        let Some(pos) = found else {
            return Ok(());
        };

        {
            let mut node = NodeMut::<K, V>::new(leaf.data_mut());
            node.leaf_remove_at(pos);
        }

        let (size, min_size, is_root) = {
            let node = NodeRef::<K, V>::new(leaf.data());
            (node.size(), node.min_size(), node.is_root())
        };

        if is_root {
            if size == 0 {
                // The last key is gone; the tree is empty again.
                let leaf_id = leaf.page_id();
                let mut root_lock = ctx
                    .root_lock
                    .take()
                    .expect("an underfull root retains the root latch");
                *root_lock = INVALID_PAGE_ID;
                drop(leaf);
                self.update_root_page_id(INVALID_PAGE_ID, false)?;
                self.bpm.delete_page(leaf_id)?;
                debug!("tree emptied");
            }
            return Ok(());
        }

        if size < min_size {
            self.coalesce_or_redistribute(leaf, &mut ctx)?;
        }
        Ok(())
    }

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator<K, V>> {
        match self.find_leaf_read(None)? {
            None => Ok(IndexIterator::end(Arc::clone(&self.bpm))),
            Some(leaf) => {
                let page_id = leaf.page_id();
                drop(leaf);
                IndexIterator::new(Arc::clone(&self.bpm), page_id, 0)
            }
        }
    }

    /// Iterator positioned at the first key >= `key`.
    pub fn begin_at(&self, key: &K) -> Result<IndexIterator<K, V>> {
        let Some(leaf) = self.find_leaf_read(Some(key))? else {
            return Ok(IndexIterator::end(Arc::clone(&self.bpm)));
        };
        let (page_id, index) = {
            let node = NodeRef::<K, V>::new(leaf.data());
            let pos = self.lower_bound(&node, key);
            if pos < node.size() {
                (node.page_id(), pos)
            } else {
                // Everything here is smaller; the successor starts at or
                // above the key.
                (node.next_page_id(), 0)
            }
        };
        drop(leaf);
        if !page_id.is_valid() {
            return Ok(IndexIterator::end(Arc::clone(&self.bpm)));
        }
        IndexIterator::new(Arc::clone(&self.bpm), page_id, index)
    }

    /// The past-the-end iterator.
    pub fn end(&self) -> IndexIterator<K, V> {
        IndexIterator::end(Arc::clone(&self.bpm))
    }

    /// Writes the root id record for this index into the header page.
    fn update_root_page_id(&self, root_id: PageId, insert_record: bool) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());
        if insert_record && header.insert_record(&self.index_name, root_id)? {
            return Ok(());
        }
        // A record may already exist from an earlier life of this index.
        if !header.update_record(&self.index_name, root_id) {
            header.insert_record(&self.index_name, root_id)?;
        }
        Ok(())
    }

    fn compare_at(&self, node: &NodeRef<'_, K, V>, index: usize, key: &K) -> Ordering {
        self.comparator.compare(&node.key_at(index), key)
    }

    /// First slot whose key is >= `key`.
    fn lower_bound(&self, node: &NodeRef<'_, K, V>, key: &K) -> usize {
        let mut lo = 0;
        let mut hi = node.size();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.compare_at(node, mid, key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Child entry to descend into: the largest i >= 1 with
    /// `key >= key_at(i)`, or entry 0 when no separator is that small.
    fn child_index_for(&self, node: &NodeRef<'_, K, V>, key: &K) -> usize {
        let mut lo = 1;
        let mut hi = node.size();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.compare_at(node, mid, key) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo - 1
    }

    /// A node is safe when the pending operation cannot propagate a
    /// structural change above it: no split on insert (a full leaf splits
    /// at `max_size` after insertion, an internal node past it), no merge
    /// or root collapse on delete.
    fn is_safe(&self, node: &NodeRef<'_, K, V>, op: Op) -> bool {
        match op {
            Op::Insert => {
                if node.is_leaf() {
                    node.size() + 1 < node.max_size()
                } else {
                    node.size() < node.max_size()
                }
            }
            Op::Delete => {
                if node.is_root() {
                    if node.is_leaf() {
                        node.size() > 1
                    } else {
                        node.size() > 2
                    }
                } else {
                    node.size() > node.min_size()
                }
            }
        }
    }

    /// Read-latched descent; crabs parent-to-child, holding at most two
    /// latches at a time. `None` key descends to the leftmost leaf.
    fn find_leaf_read(&self, key: Option<&K>) -> Result<Option<ReadPageGuard>> {
        let root_lock = self.root_page_id.read();
        let root_id = *root_lock;
        if !root_id.is_valid() {
            return Ok(None);
        }
        let mut guard = self.bpm.fetch_page_read(root_id)?;
        drop(root_lock);

        loop {
            let (is_leaf, child_id) = {
                let node = NodeRef::<K, V>::new(guard.data());
                if node.is_leaf() {
                    (true, INVALID_PAGE_ID)
                } else {
                    let idx = match key {
                        Some(key) => self.child_index_for(&node, key),
                        None => 0,
                    };
                    (false, node.child_at(idx))
                }
            };
            if is_leaf {
                return Ok(Some(guard));
            }
            // The child is latched before the parent guard is replaced.
            guard = self.bpm.fetch_page_read(child_id)?;
        }
    }

    /// Write-latched descent with crabbing. Ancestors (the root latch
    /// included) are released as soon as a child proves safe; otherwise
    /// they accumulate on the context stack.
    fn find_leaf_write(
        &self,
        key: &K,
        op: Op,
        ctx: &mut Context<'_>,
    ) -> Result<WritePageGuard> {
        let root_id = **ctx
            .root_lock
            .as_ref()
            .expect("write descent starts under the root latch");
        let mut guard = self.bpm.fetch_page_write(root_id)?;
        if self.is_safe(&NodeRef::<K, V>::new(guard.data()), op) {
            ctx.release_ancestors();
        }

        loop {
            let (is_leaf, child_id) = {
                let node = NodeRef::<K, V>::new(guard.data());
                if node.is_leaf() {
                    (true, INVALID_PAGE_ID)
                } else {
                    (false, node.child_at(self.child_index_for(&node, key)))
                }
            };
            if is_leaf {
                return Ok(guard);
            }

            let child = self.bpm.fetch_page_write(child_id)?;
            if self.is_safe(&NodeRef::<K, V>::new(child.data()), op) {
                ctx.release_ancestors();
                guard = child;
            } else {
                let parent = std::mem::replace(&mut guard, child);
                ctx.stack.push(parent);
            }
        }
    }

    /// Splits a full leaf: the upper half moves to a fresh page spliced
    /// into the chain, and the new page's first key is promoted to the
    /// parent. The new page is unreachable while it is populated, so it
    /// needs no latch beyond its own guard.
    fn split_leaf(&self, mut leaf: WritePageGuard, ctx: &mut Context<'_>) -> Result<()> {
        let leaf_id = leaf.page_id();
        let (parent_id, old_next, mid) = {
            let node = NodeRef::<K, V>::new(leaf.data());
            (node.parent_page_id(), node.next_page_id(), node.size() / 2)
        };

        let moved = NodeMut::<K, V>::new(leaf.data_mut()).leaf_split_off(mid);
        let sep = moved[0].0;

        let mut new_guard = self.bpm.new_page()?;
        let new_id = new_guard.page_id();
        {
            let mut node = NodeMut::<K, V>::new(new_guard.data_mut());
            node.init_leaf(new_id, parent_id, self.leaf_max_size);
            node.leaf_extend(&moved);
            node.set_next_page_id(old_next);
        }
        NodeMut::<K, V>::new(leaf.data_mut()).set_next_page_id(new_id);

        debug!(
            left = leaf_id.as_i32(),
            right = new_id.as_i32(),
            "leaf split"
        );

        drop(new_guard);
        drop(leaf);
        self.insert_into_parent(parent_id, leaf_id, sep, new_id, ctx)
    }

    /// Hooks a freshly split-off `right_id` into the tree: inserts
    /// `(key, right_id)` after `left_id`'s entry in the parent, creating
    /// a new root when `left_id` was the root, and splitting the parent
    /// upward as needed. Children arrive (and leave) unlatched; the
    /// parent comes off the crabbing stack when it was retained and is
    /// re-latched by id otherwise, with the stale-parent-hint retry that
    /// entails.
    fn insert_into_parent(
        &self,
        mut parent_id: PageId,
        mut left_id: PageId,
        mut key: K,
        mut right_id: PageId,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        loop {
            if !parent_id.is_valid() {
                // `left_id` was the root; grow the tree by one level.
                let mut root_lock = match ctx.root_lock.take() {
                    Some(lock) => lock,
                    None => self.root_page_id.write(),
                };
                let mut left = self.bpm.fetch_page_write(left_id)?;
                let current_parent = NodeRef::<K, V>::new(left.data()).parent_page_id();
                if current_parent.is_valid() {
                    // Raced with another split that already grew the
                    // tree; insert into the parent it chose.
                    drop(left);
                    drop(root_lock);
                    parent_id = current_parent;
                    continue;
                }

                let mut root_guard = self.bpm.new_page()?;
                let new_root_id = root_guard.page_id();
                {
                    let mut node = NodeMut::<K, V>::new(root_guard.data_mut());
                    node.init_internal(new_root_id, INVALID_PAGE_ID, self.internal_max_size);
                    // Entry 0 carries only the left child; its key slot
                    // is never read.
                    node.internal_extend(&[(key, left_id), (key, right_id)]);
                }
                NodeMut::<K, V>::new(left.data_mut()).set_parent_page_id(new_root_id);
                drop(left);
                {
                    let mut right = self.bpm.fetch_page_write(right_id)?;
                    NodeMut::<K, V>::new(right.data_mut()).set_parent_page_id(new_root_id);
                }
                drop(root_guard);

                *root_lock = new_root_id;
                self.update_root_page_id(new_root_id, false)?;
                debug!(root = new_root_id.as_i32(), "root split");
                return Ok(());
            }

            let retained = matches!(ctx.stack.last(), Some(g) if g.page_id() == parent_id);
            let mut parent = if retained {
                ctx.stack.pop().unwrap()
            } else {
                self.bpm.fetch_page_write(parent_id)?
            };

            let pos = NodeRef::<K, V>::new(parent.data()).index_of_child(left_id);
            let Some(pos) = pos else {
                // The parent pointer was a stale hint; re-read it under
                // the child's latch and try again.
                drop(parent);
                let left = self.bpm.fetch_page_read(left_id)?;
                parent_id = NodeRef::<K, V>::new(left.data()).parent_page_id();
                continue;
            };

            {
                let mut node = NodeMut::<K, V>::new(parent.data_mut());
                node.internal_insert_at(pos + 1, &key, right_id);
            }
            {
                let mut right = self.bpm.fetch_page_write(right_id)?;
                NodeMut::<K, V>::new(right.data_mut()).set_parent_page_id(parent_id);
            }

            let size = NodeRef::<K, V>::new(parent.data()).size();
            if size <= self.internal_max_size {
                return Ok(());
            }

            // Split the parent at the middle; the pivot key moves up and
            // its child becomes the new sibling's entry 0.
            let split_from = (size + 1) / 2;
            let sep = NodeRef::<K, V>::new(parent.data()).key_at(split_from);
            let parent_parent = NodeRef::<K, V>::new(parent.data()).parent_page_id();
            let moved = NodeMut::<K, V>::new(parent.data_mut()).internal_split_off(split_from);

            let mut new_guard = self.bpm.new_page()?;
            let new_id = new_guard.page_id();
            {
                let mut node = NodeMut::<K, V>::new(new_guard.data_mut());
                node.init_internal(new_id, parent_parent, self.internal_max_size);
                node.internal_extend(&moved);
            }
            for (_, child_id) in &moved {
                let mut child = self.bpm.fetch_page_write(*child_id)?;
                NodeMut::<K, V>::new(child.data_mut()).set_parent_page_id(new_id);
            }
            debug!(
                left = parent_id.as_i32(),
                right = new_id.as_i32(),
                "internal split"
            );

            drop(new_guard);
            drop(parent);

            left_id = parent_id;
            right_id = new_id;
            key = sep;
            parent_id = parent_parent;
        }
    }

    /// Fixes an underfull node after a delete: borrow one item from a
    /// sibling when it can spare one, merge into the left node otherwise.
    /// The left sibling is preferred, and sibling latches are taken in
    /// ascending page-id order (releasing and re-taking the node's own
    /// latch when needed) so concurrent merges cannot deadlock.
    fn coalesce_or_redistribute(
        &self,
        node: WritePageGuard,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        let node_id = node.page_id();
        let parent_id = NodeRef::<K, V>::new(node.data()).parent_page_id();

        let retained = matches!(ctx.stack.last(), Some(g) if g.page_id() == parent_id);
        let mut parent = if retained {
            ctx.stack.pop().unwrap()
        } else {
            self.bpm.fetch_page_write(parent_id)?
        };

        let (idx, sib_is_left, sibling_id) = {
            let view = NodeRef::<K, V>::new(parent.data());
            let Some(idx) = view.index_of_child(node_id) else {
                return Err(BurrowError::IndexCorrupted(format!(
                    "page {node_id} missing from its parent {parent_id}"
                )));
            };
            let (sib_idx, sib_is_left) = if idx > 0 {
                (idx - 1, true)
            } else {
                (idx + 1, false)
            };
            (idx, sib_is_left, view.child_at(sib_idx))
        };

        // Lock order is ascending page id. The parent latch keeps the
        // node's structure stable across the release window.
        let (mut node, mut sibling) = if sibling_id < node_id {
            drop(node);
            let sibling = self.bpm.fetch_page_write(sibling_id)?;
            let node = self.bpm.fetch_page_write(node_id)?;
            (node, sibling)
        } else {
            let sibling = self.bpm.fetch_page_write(sibling_id)?;
            (node, sibling)
        };

        let (sib_size, sib_min, is_leaf) = {
            let view = NodeRef::<K, V>::new(sibling.data());
            (view.size(), view.min_size(), view.is_leaf())
        };

        if sib_size > sib_min {
            if is_leaf {
                self.redistribute_leaf(&mut node, &mut sibling, &mut parent, idx, sib_is_left);
            } else {
                self.redistribute_internal(
                    &mut node,
                    &mut sibling,
                    &mut parent,
                    idx,
                    sib_is_left,
                )?;
            }
            return Ok(());
        }

        // Merge into the left-hand page and drop the right-hand one.
        let (mut left, mut right, sep_idx) = if sib_is_left {
            (sibling, node, idx)
        } else {
            (node, sibling, idx + 1)
        };
        let left_id = left.page_id();
        let right_id = right.page_id();

        if is_leaf {
            let right_next = NodeRef::<K, V>::new(right.data()).next_page_id();
            let items = NodeMut::<K, V>::new(right.data_mut()).leaf_split_off(0);
            let mut node = NodeMut::<K, V>::new(left.data_mut());
            node.leaf_extend(&items);
            node.set_next_page_id(right_next);
        } else {
            // The separator comes down onto the right node's first child.
            let sep = NodeRef::<K, V>::new(parent.data()).key_at(sep_idx);
            let mut items = NodeMut::<K, V>::new(right.data_mut()).internal_split_off(0);
            items[0].0 = sep;
            NodeMut::<K, V>::new(left.data_mut()).internal_extend(&items);
            for (_, child_id) in &items {
                let mut child = self.bpm.fetch_page_write(*child_id)?;
                NodeMut::<K, V>::new(child.data_mut()).set_parent_page_id(left_id);
            }
        }

        NodeMut::<K, V>::new(parent.data_mut()).internal_remove_at(sep_idx);

        drop(left);
        drop(right);
        self.bpm.delete_page(right_id)?;
        debug!(
            merged = right_id.as_i32(),
            into = left_id.as_i32(),
            "merged underfull node"
        );

        let (p_size, p_min, p_is_root) = {
            let view = NodeRef::<K, V>::new(parent.data());
            (view.size(), view.min_size(), view.is_root())
        };

        if p_is_root {
            if p_size == 1 {
                // A root with a single child gets collapsed away.
                let child_id = NodeRef::<K, V>::new(parent.data()).child_at(0);
                let old_root_id = parent.page_id();
                let mut root_lock = ctx
                    .root_lock
                    .take()
                    .expect("a collapsing root retains the root latch");
                {
                    let mut child = self.bpm.fetch_page_write(child_id)?;
                    NodeMut::<K, V>::new(child.data_mut()).set_parent_page_id(INVALID_PAGE_ID);
                }
                drop(parent);
                *root_lock = child_id;
                self.update_root_page_id(child_id, false)?;
                self.bpm.delete_page(old_root_id)?;
                debug!(root = child_id.as_i32(), "root collapsed");
            }
            return Ok(());
        }

        if p_size < p_min {
            // Descendant latches are gone; only the parent (and retained
            // ancestors) are still held across the recursion.
            return self.coalesce_or_redistribute(parent, ctx);
        }
        Ok(())
    }

    /// Moves one boundary item from a leaf sibling and refreshes the
    /// separator in the parent.
    fn redistribute_leaf(
        &self,
        node: &mut WritePageGuard,
        sibling: &mut WritePageGuard,
        parent: &mut WritePageGuard,
        idx: usize,
        sib_is_left: bool,
    ) {
        if sib_is_left {
            let last = NodeRef::<K, V>::new(sibling.data()).size() - 1;
            let (key, value) = NodeRef::<K, V>::new(sibling.data()).item_at(last);
            NodeMut::<K, V>::new(sibling.data_mut()).leaf_remove_at(last);
            NodeMut::<K, V>::new(node.data_mut()).leaf_insert_at(0, &key, &value);
            NodeMut::<K, V>::new(parent.data_mut()).set_key_at(idx, &key);
        } else {
            let (key, value) = NodeRef::<K, V>::new(sibling.data()).item_at(0);
            NodeMut::<K, V>::new(sibling.data_mut()).leaf_remove_at(0);
            let size = NodeRef::<K, V>::new(node.data()).size();
            NodeMut::<K, V>::new(node.data_mut()).leaf_insert_at(size, &key, &value);
            let new_sep = NodeRef::<K, V>::new(sibling.data()).key_at(0);
            NodeMut::<K, V>::new(parent.data_mut()).set_key_at(idx + 1, &new_sep);
        }
    }

    /// Rotates one child through the parent separator between internal
    /// siblings, mirroring the leaf case.
    fn redistribute_internal(
        &self,
        node: &mut WritePageGuard,
        sibling: &mut WritePageGuard,
        parent: &mut WritePageGuard,
        idx: usize,
        sib_is_left: bool,
    ) -> Result<()> {
        let node_id = node.page_id();
        if sib_is_left {
            let old_sep = NodeRef::<K, V>::new(parent.data()).key_at(idx);
            let last = NodeRef::<K, V>::new(sibling.data()).size() - 1;
            let (moved_key, moved_child) =
                NodeRef::<K, V>::new(sibling.data()).internal_item_at(last);
            NodeMut::<K, V>::new(sibling.data_mut()).internal_remove_at(last);
            {
                let mut view = NodeMut::<K, V>::new(node.data_mut());
                view.internal_insert_at(0, &old_sep, moved_child);
                // The old separator now belongs to the previous first
                // child, sitting at slot 1.
                view.set_key_at(1, &old_sep);
            }
            NodeMut::<K, V>::new(parent.data_mut()).set_key_at(idx, &moved_key);
            let mut child = self.bpm.fetch_page_write(moved_child)?;
            NodeMut::<K, V>::new(child.data_mut()).set_parent_page_id(node_id);
        } else {
            let sep_idx = idx + 1;
            let old_sep = NodeRef::<K, V>::new(parent.data()).key_at(sep_idx);
            let (_, moved_child) = NodeRef::<K, V>::new(sibling.data()).internal_item_at(0);
            let new_sep = NodeRef::<K, V>::new(sibling.data()).key_at(1);
            let size = NodeRef::<K, V>::new(node.data()).size();
            NodeMut::<K, V>::new(node.data_mut()).internal_insert_at(size, &old_sep, moved_child);
            NodeMut::<K, V>::new(sibling.data_mut()).internal_remove_at(0);
            NodeMut::<K, V>::new(parent.data_mut()).set_key_at(sep_idx, &new_sep);
            let mut child = self.bpm.fetch_page_write(moved_child)?;
            NodeMut::<K, V>::new(child.data_mut()).set_parent_page_id(node_id);
        }
        Ok(())
    }
}
