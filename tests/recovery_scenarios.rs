use ariesdb_core::{
    external::{MemPage, MemPageStore, PageId},
    log::{record::RecordBody, LogManager, RecoveryIndex, NULL_LSA},
    recovery::{recover, PageRequirement, RecoveryCallbackTable, StopCondition},
    transaction::TransactionTable,
};
use tempfile::NamedTempFile;

fn log_manager() -> (LogManager, NamedTempFile) {
    let file = NamedTempFile::new().unwrap();
    std::fs::remove_file(file.path()).ok();
    (LogManager::open(file.path()).unwrap(), file)
}

/// A crash right after a RUN_POSTPONE confirms the first of two postponed
/// actions must not redo that first action a second time during recovery's
/// finish-postpones pass, driven end to end through the public `recover`
/// entry point rather than `finish_postpones` directly.
#[test]
fn recover_resumes_a_postponed_commit_without_rerunning_confirmed_postpones() {
    let (mut log, _f) = log_manager();
    let page_a = PageId { volume_id: 0, page_id: 1 };
    let page_b = PageId { volume_id: 0, page_id: 2 };

    // Checkpoint taken before the transaction starts, so its table
    // snapshot is empty and the whole CommittedWithPostpone lifecycle is
    // reconstructed by analysis's own forward scan. redo_lsa points at the
    // checkpoint itself since nothing was dirty yet.
    let redo_lsa = log.append_lsa();
    let chkpt_lsa = log.write_checkpoint(redo_lsa, vec![]).unwrap();

    let postpone_a = log
        .append(
            5,
            NULL_LSA,
            RecordBody::Postpone {
                rcvindex: RecoveryIndex(1),
                page_id: page_a,
                redo: vec![1, 1],
            },
        )
        .unwrap();
    let postpone_b = log
        .append(
            5,
            postpone_a,
            RecordBody::Postpone {
                rcvindex: RecoveryIndex(1),
                page_id: page_b,
                redo: vec![2, 2],
            },
        )
        .unwrap();
    log.append(
        5,
        postpone_b,
        RecordBody::CommitWithPostpone { first_postpone_lsa: postpone_a },
    )
    .unwrap();
    log.append(5, postpone_b, RecordBody::RunPostpone { ref_lsa: postpone_a })
        .unwrap();
    log.sync().unwrap();
    let _ = chkpt_lsa;

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
    pages.insert(page_a, MemPage::new(8));
    pages.insert(page_b, MemPage::new(8));
    pages
        .fetch(page_a)
        .unwrap()
        .unwrap()
        .write()
        .unwrap()
        .bytes_mut()[..2]
        .copy_from_slice(&[9, 9]);

    let mut table = TransactionTable::new();
    let report = recover(&mut table, &mut log, &callbacks, &mut pages, StopCondition::None).unwrap();

    assert_eq!(report.transactions_committed_via_postpone, 1);
    assert!(table.find_by_trid(5).is_none());

    let page_a_handle = pages.fetch(page_a).unwrap().unwrap();
    assert_eq!(&page_a_handle.read().unwrap().bytes()[..2], &[9, 9]);

    let page_b_handle = pages.fetch(page_b).unwrap().unwrap();
    assert_eq!(&page_b_handle.read().unwrap().bytes()[..2], &[2, 2]);
}
