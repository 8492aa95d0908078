use log::{debug, trace};

use crate::{
    external::{PageId, PageStore},
    io::xor_bytes,
    log::{record::RecordBody, LogManager, Lsa},
    recovery::callback::RecoveryCallbackTable,
    transaction::TransactionTable,
    types::CoreResult,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct RedoResult {
    pub records_applied: usize,
    pub records_skipped: usize,
}

/// Forward scan from `start_redo_lsa` to the end of the log (spec
/// §4.4.2), reapplying every physical change whose target page's stamped
/// LSA is behind the record's own LSA. Idempotent by construction: a page
/// already at or past a record's LSA is left untouched.
pub fn run(
    table: &mut TransactionTable,
    log: &mut LogManager,
    callbacks: &RecoveryCallbackTable,
    pages: &mut dyn PageStore,
    start_redo_lsa: Lsa,
) -> CoreResult<RedoResult> {
    let mut cursor_lsa = start_redo_lsa;
    let mut result = RedoResult::default();

    while !log.is_end_of_log(cursor_lsa) {
        let (record, next_lsa) = log.read_record_at(cursor_lsa)?;
        let trid = record.header.trid;

        match &record.body {
            RecordBody::UndoRedo { rcvindex, page_id, redo, .. } => {
                apply_physical(callbacks, pages, *rcvindex, *page_id, redo, record.lsa, &mut result)?;
            }
            RecordBody::DiffUndoRedo { rcvindex, page_id, undo, xor_payload } => {
                let redo = xor_bytes(undo, xor_payload);
                apply_physical(callbacks, pages, *rcvindex, *page_id, &redo, record.lsa, &mut result)?;
            }
            RecordBody::Redo { rcvindex, page_id, redo } => {
                apply_physical(callbacks, pages, *rcvindex, *page_id, redo, record.lsa, &mut result)?;
            }
            RecordBody::ExternRedo { rcvindex, redo } => {
                callbacks.invoke_logical_redo(*rcvindex, redo)?;
                result.records_applied += 1;
            }
            RecordBody::Compensate { rcvindex, page_id, redo, .. } => {
                // A CLR carries its own redo image; reapplying one during
                // redo is a plain physical redo, not the undo callback
                // (the undo pass already ran the undo side when it wrote
                // this COMPENSATE record).
                apply_physical(callbacks, pages, *rcvindex, *page_id, redo, record.lsa, &mut result)?;
            }
            RecordBody::Commit { .. } | RecordBody::Abort => {
                if let Some(index) = table.find_by_trid(trid) {
                    table.free(index);
                }
            }
            _ => {}
        }

        cursor_lsa = next_lsa;
    }

    debug!(
        "redo complete: applied={} skipped={}",
        result.records_applied, result.records_skipped
    );
    Ok(result)
}

fn apply_physical(
    callbacks: &RecoveryCallbackTable,
    pages: &mut dyn PageStore,
    rcvindex: crate::log::RecoveryIndex,
    page_id: PageId,
    redo: &[u8],
    lsa: Lsa,
    result: &mut RedoResult,
) -> CoreResult<()> {
    let handle = match pages.fetch(page_id)? {
        Some(handle) => handle,
        None => {
            trace!("redo skip: page {:?} does not exist", page_id);
            result.records_skipped += 1;
            return Ok(());
        }
    };

    let mut page = handle.write().expect("page lock poisoned");
    if page.lsa() >= lsa {
        trace!("redo skip: page {:?} already at lsa {}", page_id, page.lsa());
        result.records_skipped += 1;
        return Ok(());
    }

    let requirement = callbacks.requirement(rcvindex);
    if requirement == Some(crate::recovery::callback::PageRequirement::NewPage) {
        page.set_page_type(0);
    }

    callbacks.invoke_redo(rcvindex, &mut *page, redo)?;
    page.set_lsa(lsa);
    result.records_applied += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        external::{MemPage, MemPageStore},
        log::{RecoveryIndex, NULL_LSA},
        recovery::callback::PageRequirement,
    };
    use tempfile::NamedTempFile;

    fn log_manager() -> (LogManager, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        (LogManager::open(file.path()).unwrap(), file)
    }

    #[test]
    fn redo_applies_when_page_lsa_is_behind() {
        let (mut log, _f) = log_manager();
        let page_id = PageId { volume_id: 0, page_id: 1 };
        let lsa = log
            .append(
                1,
                NULL_LSA,
                RecordBody::Redo {
                    rcvindex: RecoveryIndex(1),
                    page_id,
                    redo: vec![5, 5, 5],
                },
            )
            .unwrap();
        log.sync().unwrap();

        let mut callbacks = RecoveryCallbackTable::new();
        callbacks.register_physical(
            RecoveryIndex(1),
            PageRequirement::Physical,
            |page, payload| {
                page.bytes_mut()[..payload.len()].copy_from_slice(payload);
                Ok(())
            },
            |_page, _payload| Ok(()),
        );

        let mut pages = MemPageStore::new();
        pages.insert(page_id, MemPage::new(8));

        let mut table = TransactionTable::new();
        let result = run(&mut table, &mut log, &callbacks, &mut pages, lsa).unwrap();
        assert_eq!(result.records_applied, 1);

        let handle = pages.fetch(page_id).unwrap().unwrap();
        let page = handle.read().unwrap();
        assert_eq!(&page.bytes()[..3], &[5, 5, 5]);
        assert_eq!(page.lsa(), lsa);
    }

    #[test]
    fn redo_skips_when_page_already_ahead() {
        let (mut log, _f) = log_manager();
        let page_id = PageId { volume_id: 0, page_id: 1 };
        let lsa = log
            .append(
                1,
                NULL_LSA,
                RecordBody::Redo {
                    rcvindex: RecoveryIndex(1),
                    page_id,
                    redo: vec![5],
                },
            )
            .unwrap();
        log.sync().unwrap();

        let mut callbacks = RecoveryCallbackTable::new();
        callbacks.register_physical(
            RecoveryIndex(1),
            PageRequirement::Physical,
            |_page, _payload| panic!("should not run"),
            |_page, _payload| Ok(()),
        );

        let mut pages = MemPageStore::new();
        let mut page = MemPage::new(8);
        page.lsa = lsa;
        pages.insert(page_id, page);

        let mut table = TransactionTable::new();
        let result = run(&mut table, &mut log, &callbacks, &mut pages, lsa).unwrap();
        assert_eq!(result.records_skipped, 1);
    }

    #[test]
    fn redo_skips_missing_page() {
        let (mut log, _f) = log_manager();
        let page_id = PageId { volume_id: 0, page_id: 99 };
        let lsa = log
            .append(
                1,
                NULL_LSA,
                RecordBody::Redo {
                    rcvindex: RecoveryIndex(1),
                    page_id,
                    redo: vec![1],
                },
            )
            .unwrap();
        log.sync().unwrap();

        let callbacks = RecoveryCallbackTable::new();
        let mut pages = MemPageStore::new();
        let mut table = TransactionTable::new();
        let result = run(&mut table, &mut log, &callbacks, &mut pages, lsa).unwrap();
        assert_eq!(result.records_skipped, 1);
    }

    #[test]
    fn commit_during_redo_frees_descriptor() {
        let (mut log, _f) = log_manager();
        let mut table = TransactionTable::new();
        let mut pages = MemPageStore::new();
        let callbacks = RecoveryCallbackTable::new();

        let index = table
            .allocate_for_recovery(4, NULL_LSA)
            .unwrap();
        assert!(table.get(index).is_some());

        let lsa = log
            .append(4, NULL_LSA, RecordBody::Commit { timestamp_millis: 1 })
            .unwrap();
        log.sync().unwrap();

        run(&mut table, &mut log, &callbacks, &mut pages, lsa).unwrap();
        assert!(table.find_by_trid(4).is_none());
    }
}
