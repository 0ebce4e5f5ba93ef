use crate::common::{BurrowError, PageId, Result, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

/// Longest index name a record can carry
pub const MAX_INDEX_NAME_LEN: usize = 32;

// Record layout: name length (1) + name bytes (32) + padding (3) + root id (4)
const NAME_LEN_OFFSET: usize = 0;
const NAME_OFFSET: usize = 1;
const ROOT_ID_OFFSET: usize = 36;
const RECORD_SIZE: usize = 40;

const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// Mutable view over the header page (page id 0), which persists
/// `index name -> root page id` records. Indexes write their root id here
/// on every root change and read it back on reopen.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Zeroes the page. Only meaningful on a freshly allocated file.
    pub fn init(&mut self) {
        self.data.fill(0);
    }

    pub fn record_count(&self) -> usize {
        HeaderPageRef::new(self.data).record_count()
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        HeaderPageRef::new(self.data).get_root_id(name)
    }

    /// Adds a record. Returns false if the name is already present.
    pub fn insert_record(&mut self, name: &str, root_id: PageId) -> Result<bool> {
        if name.len() > MAX_INDEX_NAME_LEN {
            return Err(BurrowError::IndexNameTooLong(name.to_string()));
        }
        if self.find_record(name).is_some() {
            return Ok(false);
        }

        let count = self.record_count();
        if count >= MAX_RECORDS {
            return Err(BurrowError::HeaderPageFull);
        }

        let offset = RECORDS_OFFSET + count * RECORD_SIZE;
        self.data[offset..offset + RECORD_SIZE].fill(0);
        self.data[offset + NAME_LEN_OFFSET] = name.len() as u8;
        self.data[offset + NAME_OFFSET..offset + NAME_OFFSET + name.len()]
            .copy_from_slice(name.as_bytes());
        self.set_root_at(offset, root_id);
        self.set_record_count(count + 1);

        Ok(true)
    }

    /// Overwrites the root id of an existing record. Returns false if the
    /// name is unknown.
    pub fn update_record(&mut self, name: &str, root_id: PageId) -> bool {
        match self.find_record(name) {
            Some(offset) => {
                self.set_root_at(offset, root_id);
                true
            }
            None => false,
        }
    }

    /// Removes a record, compacting the tail over it.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let Some(offset) = self.find_record(name) else {
            return false;
        };
        let count = self.record_count();
        let end = RECORDS_OFFSET + count * RECORD_SIZE;
        self.data.copy_within(offset + RECORD_SIZE..end, offset);
        self.data[end - RECORD_SIZE..end].fill(0);
        self.set_record_count(count - 1);
        true
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        HeaderPageRef::new(self.data).find_record(name)
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn set_root_at(&mut self, record_offset: usize, root_id: PageId) {
        let at = record_offset + ROOT_ID_OFFSET;
        self.data[at..at + 4].copy_from_slice(&root_id.as_i32().to_le_bytes());
    }
}

/// Read-only view over the header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        let bytes: [u8; 4] = self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as usize
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        self.find_record(name).map(|offset| {
            let at = offset + ROOT_ID_OFFSET;
            let bytes: [u8; 4] = self.data[at..at + 4].try_into().unwrap();
            PageId::new(i32::from_le_bytes(bytes))
        })
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        for i in 0..self.record_count() {
            let offset = RECORDS_OFFSET + i * RECORD_SIZE;
            let len = self.data[offset + NAME_LEN_OFFSET] as usize;
            let stored = &self.data[offset + NAME_OFFSET..offset + NAME_OFFSET + len];
            if stored == name.as_bytes() {
                return Some(offset);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);
        page.init();

        assert!(page.insert_record("orders_pk", PageId::new(7)).unwrap());
        assert!(!page.insert_record("orders_pk", PageId::new(8)).unwrap());
        assert_eq!(page.record_count(), 1);
        assert_eq!(page.get_root_id("orders_pk"), Some(PageId::new(7)));
        assert_eq!(page.get_root_id("missing"), None);
    }

    #[test]
    fn test_update() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);
        page.init();

        page.insert_record("idx", PageId::new(1)).unwrap();
        assert!(page.update_record("idx", PageId::new(42)));
        assert_eq!(page.get_root_id("idx"), Some(PageId::new(42)));
        assert!(!page.update_record("other", PageId::new(3)));
    }

    #[test]
    fn test_delete_compacts() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);
        page.init();

        page.insert_record("a", PageId::new(1)).unwrap();
        page.insert_record("b", PageId::new(2)).unwrap();
        page.insert_record("c", PageId::new(3)).unwrap();

        assert!(page.delete_record("b"));
        assert_eq!(page.record_count(), 2);
        assert_eq!(page.get_root_id("a"), Some(PageId::new(1)));
        assert_eq!(page.get_root_id("b"), None);
        assert_eq!(page.get_root_id("c"), Some(PageId::new(3)));
    }

    #[test]
    fn test_name_too_long() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);
        page.init();

        let long = "x".repeat(MAX_INDEX_NAME_LEN + 1);
        assert!(page.insert_record(&long, PageId::new(1)).is_err());
    }

    #[test]
    fn test_readonly_view_matches() {
        let mut data = [0u8; PAGE_SIZE];
        {
            let mut page = HeaderPage::new(&mut data);
            page.init();
            page.insert_record("tree", PageId::new(11)).unwrap();
        }
        let view = HeaderPageRef::new(&data);
        assert_eq!(view.record_count(), 1);
        assert_eq!(view.get_root_id("tree"), Some(PageId::new(11)));
    }
}
