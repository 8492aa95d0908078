use log::{info, warn};

use crate::{
    log::{record::RecordBody, LogManager, Lsa},
    transaction::{TransactionState, TransactionTable},
    types::CoreResult,
};

/// How far the analysis pass should go before declaring the recoverable
/// prefix of the log complete (spec §4.4.1's "media-crash stopat" case).
#[derive(Debug, Clone, Copy)]
pub enum StopCondition {
    None,
    StopAtTimeMillis(u64),
}

impl StopCondition {
    fn is_past(&self, commit_timestamp: u64) -> bool {
        match self {
            StopCondition::None => false,
            StopCondition::StopAtTimeMillis(limit) => commit_timestamp > *limit,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnalysisResult {
    pub start_redo_lsa: Lsa,
    pub did_incom_recovery: bool,
}

/// Forward scan from `chkpt_lsa` (spec §4.4.1). Rebuilds `TransactionTable`
/// state for every transaction active at crash time and determines where
/// the redo pass should begin.
pub fn run(
    table: &mut TransactionTable,
    log: &mut LogManager,
    start_lsa: Lsa,
    stop: StopCondition,
) -> CoreResult<AnalysisResult> {
    let mut cursor_lsa = start_lsa;
    let mut start_redo_lsa = start_lsa;
    let mut did_incom_recovery = false;

    while !log.is_end_of_log(cursor_lsa) {
        let (record, next_lsa) = log.read_record_at(cursor_lsa)?;
        let trid = record.header.trid;

        if let RecordBody::Commit { timestamp_millis } = &record.body {
            if stop.is_past(*timestamp_millis) {
                warn!(
                    "media recovery stopat reached at lsa={} timestamp={}",
                    record.lsa, timestamp_millis
                );
                log.rewind_append_to(record.lsa)?;
                did_incom_recovery = true;

                if let Some(index) = table.find_by_trid(trid) {
                    let prev = record.header.prev_tran_lsa;
                    let tdes = table.get_mut(index).unwrap();
                    tdes.last_lsa = prev;
                    tdes.undo_nxlsa = prev;
                }
                break;
            }
        }

        if trid != 0 {
            let index = table.allocate_for_recovery(trid, record.lsa)?;
            {
                let tdes = table.get_mut(index).unwrap();
                tdes.last_lsa = record.lsa;
                if record.body.is_undoable() {
                    tdes.undo_nxlsa = record.lsa;
                }
            }

            match &record.body {
                RecordBody::Postpone { .. } => {
                    let tdes = table.get_mut(index).unwrap();
                    if tdes.posp_nxlsa.is_null() {
                        tdes.posp_nxlsa = record.lsa;
                    }
                }
                RecordBody::CommitWithPostpone { first_postpone_lsa } => {
                    let tdes = table.get_mut(index).unwrap();
                    tdes.posp_nxlsa = *first_postpone_lsa;
                    tdes.state = TransactionState::CommittedWithPostpone;
                }
                RecordBody::CommitTopopeWithPostpone {
                    first_postpone_lsa,
                    lastparent_lsa,
                } => {
                    let tdes = table.get_mut(index).unwrap();
                    tdes.posp_nxlsa = *first_postpone_lsa;
                    tdes.state = TransactionState::TopopeCommittedWithPostpone;
                    tdes.push_topop(crate::log::record::TopOpFrame {
                        lastparent_lsa: *lastparent_lsa,
                        posp_lsa: *first_postpone_lsa,
                    });
                }
                RecordBody::RunPostpone { ref_lsa } => {
                    table.get_mut(index).unwrap().posp_nxlsa = *ref_lsa;
                }
                RecordBody::Compensate { undo_nxlsa, .. }
                | RecordBody::LogicalCompensate { undo_nxlsa } => {
                    table.get_mut(index).unwrap().undo_nxlsa = *undo_nxlsa;
                }
                RecordBody::Commit { .. } | RecordBody::Abort => {
                    table.free(index);
                }
                RecordBody::TopopeResult { lastparent_lsa, .. } => {
                    let tdes = table.get_mut(index).unwrap();
                    tdes.pop_topop();
                    tdes.state = TransactionState::UnilaterallyAborted;
                    tdes.tail_topresult_lsa = record.lsa;
                    let _ = lastparent_lsa;
                }
                _ => {}
            }
        }

        if let RecordBody::EndChkpt {
            redo_lsa,
            transactions,
        } = &record.body
        {
            // A single analysis pass starts at the latest checkpoint's
            // START_CHKPT, so the only END_CHKPT seen is the one being
            // recovered from.
            table.install_from_checkpoint(transactions)?;
            start_redo_lsa = *redo_lsa;
        }

        if let RecordBody::EndOfLog = &record.body {
            log.set_next_trid(record.header.trid);
            log.rewind_append_to(record.lsa)?;
            break;
        }

        cursor_lsa = next_lsa;
    }

    // Any transaction still `Active` once the scan reaches the end of the
    // log was never committed or aborted by its client; the crash is what
    // ends it, so it becomes a rollback candidate for the undo pass.
    for index in table.live_indices() {
        let tdes = table.get_mut(index).unwrap();
        if tdes.state == TransactionState::Active {
            tdes.state = TransactionState::UnilaterallyAborted;
        }
    }

    info!(
        "analysis complete: start_redo_lsa={} did_incom_recovery={}",
        start_redo_lsa, did_incom_recovery
    );

    Ok(AnalysisResult {
        start_redo_lsa,
        did_incom_recovery,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{record::CheckpointTran, NULL_LSA};
    use tempfile::NamedTempFile;

    fn log_manager() -> (LogManager, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        (LogManager::open(file.path()).unwrap(), file)
    }

    #[test]
    fn unknown_trid_becomes_unilaterally_aborted() {
        let (mut log, _f) = log_manager();
        let lsa = log
            .append(
                7,
                NULL_LSA,
                RecordBody::Redo {
                    rcvindex: crate::log::RecoveryIndex(1),
                    page_id: crate::log::PageId {
                        volume_id: 0,
                        page_id: 1,
                    },
                    redo: vec![1, 2, 3],
                },
            )
            .unwrap();
        log.sync().unwrap();

        let mut table = TransactionTable::new();
        run(&mut table, &mut log, lsa, StopCondition::None).unwrap();

        let index = table.find_by_trid(7).unwrap();
        assert_eq!(table.get(index).unwrap().state, TransactionState::UnilaterallyAborted);
    }

    #[test]
    fn commit_frees_descriptor() {
        let (mut log, _f) = log_manager();
        let lsa = log
            .append(3, NULL_LSA, RecordBody::Commit { timestamp_millis: 1 })
            .unwrap();
        log.sync().unwrap();

        let mut table = TransactionTable::new();
        run(&mut table, &mut log, lsa, StopCondition::None).unwrap();

        assert!(table.find_by_trid(3).is_none());
    }

    #[test]
    fn checkpoint_as_first_record_installs_snapshot() {
        let (mut log, _f) = log_manager();
        let tran = CheckpointTran {
            trid: 1,
            begin_lsa: Lsa::new(500, 0),
            last_lsa: Lsa::new(500, 0),
            undo_nxlsa: Lsa::new(500, 0),
            posp_nxlsa: NULL_LSA,
            savept_lsa: NULL_LSA,
            topops: vec![],
        };
        let chkpt_lsa = log.write_checkpoint(Lsa::new(500, 0), vec![tran]).unwrap();
        let commit_lsa = log
            .append(1, Lsa::new(500, 0), RecordBody::Commit { timestamp_millis: 2 })
            .unwrap();
        log.sync().unwrap();
        let _ = commit_lsa;

        let mut table = TransactionTable::new();
        let result = run(&mut table, &mut log, chkpt_lsa, StopCondition::None).unwrap();

        assert_eq!(result.start_redo_lsa, Lsa::new(500, 0));
        assert!(table.find_by_trid(1).is_none());
    }

    #[test]
    fn stopat_rewinds_append_and_rewinds_active_descriptor() {
        let (mut log, _f) = log_manager();
        let start_lsa = log
            .append(
                9,
                NULL_LSA,
                RecordBody::Redo {
                    rcvindex: crate::log::RecoveryIndex(1),
                    page_id: crate::log::PageId {
                        volume_id: 0,
                        page_id: 1,
                    },
                    redo: vec![1],
                },
            )
            .unwrap();
        let commit_lsa = log
            .append(9, start_lsa, RecordBody::Commit { timestamp_millis: 1_000 })
            .unwrap();
        log.sync().unwrap();

        let mut table = TransactionTable::new();
        let result = run(
            &mut table,
            &mut log,
            start_lsa,
            StopCondition::StopAtTimeMillis(500),
        )
        .unwrap();

        assert!(result.did_incom_recovery);
        assert_eq!(log.append_lsa(), commit_lsa);
        let index = table.find_by_trid(9).unwrap();
        assert_eq!(table.get(index).unwrap().last_lsa, start_lsa);
    }
}
