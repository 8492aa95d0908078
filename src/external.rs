//! Interface surface toward collaborators this crate treats as external
//! (spec §1/§6): the page buffer pool, file/disk-space manager, and the
//! heap/B-tree/XASL layer that owns redo/undo callback bodies. This
//! module specifies only the shape those collaborators must present,
//! not their implementation.

use std::sync::{Arc, RwLock};

use crate::{log::Lsa, types::CoreResult};

pub use crate::log::record::PageId;

/// A fetched data page, as the recovery engine needs to see it: an LSN
/// stamp plus a byte-addressable body the registered callback mutates.
/// Everything else about page layout (spec §6's page header fields) is
/// the buffer pool's concern.
pub trait DataPage: Send + Sync {
    fn lsa(&self) -> Lsa;
    fn set_lsa(&mut self, lsa: Lsa);
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
    /// Stamp the page's type before a RCV_IS_NEWPG_LOG callback runs
    /// (spec §4.4.2 edge case). A no-op for pages that don't discriminate
    /// by type.
    fn set_page_type(&mut self, _page_type: u8) {}
}

pub type PageHandle = Arc<RwLock<dyn DataPage>>;

/// What the recovery engine needs from the page buffer pool: fetch a
/// page by identity, or `None` if it doesn't exist (redo simply skips
/// such records, per spec §4.4.2).
pub trait PageStore {
    fn fetch(&mut self, page_id: PageId) -> CoreResult<Option<PageHandle>>;

    /// The write-ahead rule's counterpart: the page buffer must call
    /// this (indirectly, via the log manager) before flushing a dirty
    /// page past disk. Exposed here so test doubles can assert on it.
    fn note_dirty(&mut self, _page_id: PageId, _lsa: Lsa) {}
}

/// A minimal in-memory page store, useful for tests and as a reference
/// implementation of the `PageStore` contract.
pub struct MemPageStore {
    pages: std::collections::HashMap<PageId, PageHandle>,
}

impl MemPageStore {
    pub fn new() -> Self {
        MemPageStore {
            pages: std::collections::HashMap::new(),
        }
    }

    pub fn insert(&mut self, page_id: PageId, page: MemPage) {
        self.pages.insert(page_id, Arc::new(RwLock::new(page)));
    }
}

impl Default for MemPageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for MemPageStore {
    fn fetch(&mut self, page_id: PageId) -> CoreResult<Option<PageHandle>> {
        Ok(self.pages.get(&page_id).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct MemPage {
    pub lsa: Lsa,
    pub data: Vec<u8>,
    pub page_type: u8,
}

impl MemPage {
    pub fn new(size: usize) -> Self {
        MemPage {
            lsa: crate::log::NULL_LSA,
            data: vec![0u8; size],
            page_type: 0,
        }
    }
}

impl DataPage for MemPage {
    fn lsa(&self) -> Lsa {
        self.lsa
    }

    fn set_lsa(&mut self, lsa: Lsa) {
        self.lsa = lsa;
    }

    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn set_page_type(&mut self, page_type: u8) {
        self.page_type = page_type;
    }
}
