use std::collections::HashMap;

use crate::{
    external::DataPage,
    log::record::RecoveryIndex,
    types::{CoreResult, SmallResult},
};

/// Page-type requirement of a recovery index, per the design note: the
/// core must not fetch a page for a logical record, and a new-page
/// record needs its page type stamped before the callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequirement {
    Physical,
    /// Physical, but additionally creates the page — `set_page_type`
    /// runs before the callback (spec §4.4.2's RCV_IS_NEWPG_LOG).
    NewPage,
    /// The callback locates its own target; no page fetch happens.
    Logical,
}

type PhysicalFn = dyn Fn(&mut dyn DataPage, &[u8]) -> SmallResult + Send + Sync;
type LogicalFn = dyn Fn(&[u8]) -> SmallResult + Send + Sync;

enum Callback {
    Physical {
        requirement: PageRequirement,
        redo: Box<PhysicalFn>,
        undo: Box<PhysicalFn>,
    },
    Logical {
        redo: Box<LogicalFn>,
        undo: Box<LogicalFn>,
    },
}

/// The `RV_fun[rcvindex]` table (design note): a tagged polymorphism
/// over recovery indices, represented as a registry of closures keyed by
/// [`RecoveryIndex`] rather than the original's C function-pointer array
/// over ~80 concrete indices — this crate implements the dispatch
/// mechanism, not each index's algebra (spec §1 Non-goals).
#[derive(Default)]
pub struct RecoveryCallbackTable {
    entries: HashMap<RecoveryIndex, Callback>,
}

impl RecoveryCallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_physical(
        &mut self,
        index: RecoveryIndex,
        requirement: PageRequirement,
        redo: impl Fn(&mut dyn DataPage, &[u8]) -> SmallResult + Send + Sync + 'static,
        undo: impl Fn(&mut dyn DataPage, &[u8]) -> SmallResult + Send + Sync + 'static,
    ) {
        self.entries.insert(
            index,
            Callback::Physical {
                requirement,
                redo: Box::new(redo),
                undo: Box::new(undo),
            },
        );
    }

    pub fn register_logical(
        &mut self,
        index: RecoveryIndex,
        redo: impl Fn(&[u8]) -> SmallResult + Send + Sync + 'static,
        undo: impl Fn(&[u8]) -> SmallResult + Send + Sync + 'static,
    ) {
        self.entries.insert(
            index,
            Callback::Logical {
                redo: Box::new(redo),
                undo: Box::new(undo),
            },
        );
    }

    pub fn requirement(&self, index: RecoveryIndex) -> Option<PageRequirement> {
        match self.entries.get(&index)? {
            Callback::Physical { requirement, .. } => Some(*requirement),
            Callback::Logical { .. } => Some(PageRequirement::Logical),
        }
    }

    pub fn invoke_redo(&self, index: RecoveryIndex, page: &mut dyn DataPage, payload: &[u8]) -> SmallResult {
        match self.lookup(index)? {
            Callback::Physical { redo, .. } => redo(page, payload),
            Callback::Logical { .. } => unreachable!("logical callback invoked with a page"),
        }
    }

    pub fn invoke_undo(&self, index: RecoveryIndex, page: &mut dyn DataPage, payload: &[u8]) -> SmallResult {
        match self.lookup(index)? {
            Callback::Physical { undo, .. } => undo(page, payload),
            Callback::Logical { .. } => unreachable!("logical callback invoked with a page"),
        }
    }

    pub fn invoke_logical_redo(&self, index: RecoveryIndex, payload: &[u8]) -> SmallResult {
        match self.lookup(index)? {
            Callback::Logical { redo, .. } => redo(payload),
            Callback::Physical { .. } => unreachable!("physical callback invoked without a page"),
        }
    }

    pub fn invoke_logical_undo(&self, index: RecoveryIndex, payload: &[u8]) -> SmallResult {
        match self.lookup(index)? {
            Callback::Logical { undo, .. } => undo(payload),
            Callback::Physical { .. } => unreachable!("physical callback invoked without a page"),
        }
    }

    fn lookup(&self, index: RecoveryIndex) -> CoreResult<&Callback> {
        self.entries
            .get(&index)
            .ok_or_else(|| crate::error::CoreError::not_found(format!("unregistered recovery index {:?}", index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::MemPage;

    #[test]
    fn physical_redo_dispatches_to_registered_closure() {
        let mut table = RecoveryCallbackTable::new();
        table.register_physical(
            RecoveryIndex(1),
            PageRequirement::Physical,
            |page, payload| {
                page.bytes_mut()[..payload.len()].copy_from_slice(payload);
                Ok(())
            },
            |_page, _payload| Ok(()),
        );

        let mut page = MemPage::new(16);
        table.invoke_redo(RecoveryIndex(1), &mut page, &[9, 9, 9]).unwrap();
        assert_eq!(&page.bytes()[..3], &[9, 9, 9]);
    }

    #[test]
    fn unregistered_index_is_not_found() {
        let table = RecoveryCallbackTable::new();
        let mut page = MemPage::new(16);
        let err = table.invoke_redo(RecoveryIndex(99), &mut page, &[]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn logical_requirement_is_reported() {
        let mut table = RecoveryCallbackTable::new();
        table.register_logical(RecoveryIndex(2), |_| Ok(()), |_| Ok(()));
        assert_eq!(table.requirement(RecoveryIndex(2)), Some(PageRequirement::Logical));
    }
}
