use log::{debug, trace};

use crate::{
    external::PageStore,
    log::{
        record::{RecordBody, TopOpFrame},
        LogManager, NULL_LSA,
    },
    recovery::callback::RecoveryCallbackTable,
    transaction::{TransactionState, TransactionTable},
    types::CoreResult,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct UndoResult {
    pub transactions_rolled_back: usize,
    pub steps_applied: usize,
}

/// Repeatedly undo the single most-recent not-yet-undone action across all
/// transactions still active at crash (spec §4.4.3): pick the greatest
/// `undo_nxlsa` among live transactions, undo one step of it, repeat until
/// every transaction has reached `NULL_LSA` and been aborted.
pub fn run(
    table: &mut TransactionTable,
    log: &mut LogManager,
    callbacks: &RecoveryCallbackTable,
    pages: &mut dyn PageStore,
) -> CoreResult<UndoResult> {
    let mut result = UndoResult::default();

    loop {
        let index = match pick_next(table) {
            Some(index) => index,
            None => break,
        };

        let trid = table.get(index).unwrap().trid;
        let mut cursor = table.get(index).unwrap().undo_nxlsa;

        loop {
            if cursor.is_null() {
                let abort_lsa = log.append(trid, NULL_LSA, RecordBody::Abort)?;
                log.ensure_durable(abort_lsa)?;
                table.free(index);
                result.transactions_rolled_back += 1;
                break;
            }

            let (record, _) = log.read_record_at(cursor)?;

            match &record.body {
                RecordBody::UndoRedo { rcvindex, page_id, undo, .. }
                | RecordBody::Undo { rcvindex, page_id, undo }
                | RecordBody::DiffUndoRedo { rcvindex, page_id, undo, .. } => {
                    let handle = pages.fetch(*page_id)?;
                    if let Some(handle) = handle {
                        let mut page = handle.write().expect("page lock poisoned");
                        callbacks.invoke_undo(*rcvindex, &mut *page, undo)?;
                        let clr_lsa = log.append(
                            trid,
                            record.header.prev_tran_lsa,
                            RecordBody::Compensate {
                                rcvindex: *rcvindex,
                                page_id: *page_id,
                                undo_nxlsa: record.header.prev_tran_lsa,
                                redo: undo.clone(),
                            },
                        )?;
                        page.set_lsa(clr_lsa);
                    } else {
                        trace!("undo skip: page {:?} does not exist", page_id);
                    }
                    result.steps_applied += 1;
                    table.get_mut(index).unwrap().undo_nxlsa = record.header.prev_tran_lsa;
                    break;
                }
                RecordBody::Compensate { undo_nxlsa, .. } | RecordBody::LogicalCompensate { undo_nxlsa } => {
                    cursor = *undo_nxlsa;
                    table.get_mut(index).unwrap().undo_nxlsa = cursor;
                }
                RecordBody::TopopeResult { lastparent_lsa, .. } => {
                    cursor = *lastparent_lsa;
                    table.get_mut(index).unwrap().undo_nxlsa = cursor;
                }
                _ => {
                    cursor = record.header.prev_tran_lsa;
                    table.get_mut(index).unwrap().undo_nxlsa = cursor;
                }
            }
        }

        // Interrupt is checked between steps, never mid-step: undo_nxlsa
        // above already reflects the step just finished, so a retry after
        // ER_INTERRUPTED resumes exactly where this one stopped.
        if table.get(index).map_or(false, |tdes| tdes.interrupt) {
            return Err(crate::error::CoreError::interrupted());
        }
    }

    debug!(
        "undo complete: transactions_rolled_back={} steps_applied={}",
        result.transactions_rolled_back, result.steps_applied
    );
    Ok(result)
}

/// The transaction with the greatest `undo_nxlsa` among those still
/// needing rollback. `Active`/`WillCommit`/postpone-awaiting states never
/// appear here (those belong to the finish-postpones path); only
/// `Aborted`/`UnilaterallyAborted` descriptors with a real `undo_nxlsa`
/// are candidates.
fn pick_next(table: &TransactionTable) -> Option<usize> {
    table
        .live_indices()
        .into_iter()
        .filter(|&i| {
            let tdes = table.get(i).unwrap();
            matches!(
                tdes.state,
                TransactionState::Aborted | TransactionState::UnilaterallyAborted
            )
        })
        .max_by_key(|&i| table.get(i).unwrap().undo_nxlsa)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FinishPostponeResult {
    pub transactions_committed: usize,
}

/// Resume and complete every transaction left in a postpone-awaiting
/// state by analysis (spec §4.4.4): scan forward from `posp_nxlsa` to
/// `last_lsa`, apply each not-yet-applied POSTPONE via its redo callback,
/// logging a RUN_POSTPONE for each, then write COMMIT and free the
/// descriptor.
pub fn finish_postpones(
    table: &mut TransactionTable,
    log: &mut LogManager,
    callbacks: &RecoveryCallbackTable,
    pages: &mut dyn PageStore,
) -> CoreResult<FinishPostponeResult> {
    let mut result = FinishPostponeResult::default();

    let candidates: Vec<usize> = table
        .live_indices()
        .into_iter()
        .filter(|&i| table.get(i).unwrap().state.awaits_postpones())
        .collect();

    for index in candidates {
        let trid = table.get(index).unwrap().trid;
        let last_lsa = table.get(index).unwrap().last_lsa;
        let posp_nxlsa = table.get(index).unwrap().posp_nxlsa;

        // `posp_nxlsa` is the earliest postpone analysis saw with no
        // RUN_POSTPONE yet *at the time it was scanned* — but a later
        // record in the same forward pass (up to `last_lsa`) may still
        // confirm it as already applied (spec §4.4.4 / scenario S5).
        // A first pass collects every such confirmation before the
        // second pass decides what actually still needs to run.
        let mut already_run = std::collections::HashSet::new();
        let mut scan = posp_nxlsa;
        while scan.is_set() && scan <= last_lsa {
            let (record, next_lsa) = log.read_record_at(scan)?;
            if let RecordBody::RunPostpone { ref_lsa } = &record.body {
                already_run.insert(*ref_lsa);
            }
            scan = next_lsa;
        }

        let mut cursor = posp_nxlsa;
        while cursor.is_set() && cursor <= last_lsa {
            let (record, next_lsa) = log.read_record_at(cursor)?;

            if let RecordBody::Postpone { rcvindex, page_id, redo } = &record.body {
                if !already_run.contains(&record.lsa) {
                    if let Some(handle) = pages.fetch(*page_id)? {
                        let mut page = handle.write().expect("page lock poisoned");
                        callbacks.invoke_redo(*rcvindex, &mut *page, redo)?;
                        let run_lsa = log.append(trid, record.lsa, RecordBody::RunPostpone { ref_lsa: record.lsa })?;
                        page.set_lsa(run_lsa);
                    }
                }
            }

            cursor = next_lsa;
        }

        pop_all_topops(table, index);
        let commit_lsa = log.append(trid, last_lsa, RecordBody::Commit { timestamp_millis: crate::utils::now_millis() })?;
        log.ensure_durable(commit_lsa)?;
        table.free(index);
        result.transactions_committed += 1;
    }

    Ok(result)
}

fn pop_all_topops(table: &mut TransactionTable, index: usize) -> Vec<TopOpFrame> {
    let tdes = table.get_mut(index).unwrap();
    let frames = std::mem::take(&mut tdes.topops);
    tdes.topop_lsa = NULL_LSA;
    frames
}
