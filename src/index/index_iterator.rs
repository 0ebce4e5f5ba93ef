use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::{BufferPoolManager, PinnedPage};
use crate::common::{PageId, Result, INVALID_PAGE_ID};

use super::btree_page::NodeRef;
use super::key::PageCodec;

/// Forward cursor over the leaf chain of a B+-tree.
///
/// Exactly one leaf stays pinned (but not latched) between increments,
/// so the page cannot be evicted under the cursor while writers remain
/// free to latch it. Dropping the iterator releases the pin.
pub struct IndexIterator<K, V> {
    bpm: Arc<BufferPoolManager>,
    page: Option<PinnedPage>,
    page_id: PageId,
    index: usize,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: PageCodec, V: PageCodec> IndexIterator<K, V> {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, index: usize) -> Result<Self> {
        let page = bpm.pin_page(page_id)?;
        Ok(Self {
            bpm,
            page: Some(page),
            page_id,
            index,
            _marker: PhantomData,
        })
    }

    /// The past-the-end iterator.
    pub(crate) fn end(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            page: None,
            page_id: INVALID_PAGE_ID,
            index: 0,
            _marker: PhantomData,
        }
    }

    /// The item under the cursor, or None at the end.
    pub fn entry(&self) -> Option<(K, V)> {
        let page = self.page.as_ref()?;
        page.with_data(|data| {
            let node = NodeRef::<K, V>::new(data);
            (self.index < node.size()).then(|| node.item_at(self.index))
        })
    }

    pub fn is_end(&self) -> bool {
        self.entry().is_none()
    }

    /// Steps to the next item, walking the `next_page_id` chain when the
    /// current leaf is exhausted: the old leaf is unpinned before the
    /// successor is pinned.
    pub fn advance(&mut self) -> Result<()> {
        let Some(page) = self.page.as_ref() else {
            return Ok(());
        };
        self.index += 1;

        let (size, next) = page.with_data(|data| {
            let node = NodeRef::<K, V>::new(data);
            (node.size(), node.next_page_id())
        });
        if self.index < size {
            return Ok(());
        }

        self.page = None;
        self.index = 0;
        if next.is_valid() {
            self.page = Some(self.bpm.pin_page(next)?);
            self.page_id = next;
        } else {
            self.page_id = INVALID_PAGE_ID;
        }
        Ok(())
    }
}

impl<K: PageCodec, V: PageCodec> Iterator for IndexIterator<K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.entry()?;
        match self.advance() {
            Ok(()) => Some(Ok(item)),
            Err(e) => Some(Err(e)),
        }
    }
}

impl<K, V> PartialEq for IndexIterator<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id && self.index == other.index
    }
}

impl<K, V> Eq for IndexIterator<K, V> {}
