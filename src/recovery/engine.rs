use log::info;

use crate::{
    external::PageStore,
    log::{Lsa, LogManager, NULL_LSA},
    recovery::{
        analysis::{self, StopCondition},
        callback::RecoveryCallbackTable,
        redo, undo,
    },
    transaction::TransactionTable,
    types::CoreResult,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryReport {
    pub start_redo_lsa: Lsa,
    pub did_incom_recovery: bool,
    pub records_redone: usize,
    pub records_skipped: usize,
    pub transactions_rolled_back: usize,
    pub transactions_committed_via_postpone: usize,
}

/// Run the three ARIES passes plus finish-postpones, in order, starting
/// from the log's last checkpoint (spec §4.4's overall entry point).
///
/// An empty log (no checkpoint ever written, `chkpt_lsa` still null) is
/// the boundary case spec §8 calls out: recovery is then a no-op — there
/// is nothing to analyze, redo, or undo.
pub fn recover(
    table: &mut TransactionTable,
    log: &mut LogManager,
    callbacks: &RecoveryCallbackTable,
    pages: &mut dyn PageStore,
    stop: StopCondition,
) -> CoreResult<RecoveryReport> {
    let chkpt_lsa = log.chkpt_lsa();
    if chkpt_lsa.is_null() {
        info!("recovery: empty log, nothing to do");
        return Ok(RecoveryReport {
            start_redo_lsa: NULL_LSA,
            ..Default::default()
        });
    }

    let analysis_result = analysis::run(table, log, chkpt_lsa, stop)?;
    info!(
        "recovery: analysis done, start_redo_lsa={}",
        analysis_result.start_redo_lsa
    );

    let redo_result = redo::run(table, log, callbacks, pages, analysis_result.start_redo_lsa)?;
    info!(
        "recovery: redo done, applied={} skipped={}",
        redo_result.records_applied, redo_result.records_skipped
    );

    let postpone_result = undo::finish_postpones(table, log, callbacks, pages)?;
    info!(
        "recovery: finished {} postponed commits",
        postpone_result.transactions_committed
    );

    let undo_result = undo::run(table, log, callbacks, pages)?;
    info!(
        "recovery: undo done, transactions_rolled_back={}",
        undo_result.transactions_rolled_back
    );

    Ok(RecoveryReport {
        start_redo_lsa: analysis_result.start_redo_lsa,
        did_incom_recovery: analysis_result.did_incom_recovery,
        records_redone: redo_result.records_applied,
        records_skipped: redo_result.records_skipped,
        transactions_rolled_back: undo_result.transactions_rolled_back,
        transactions_committed_via_postpone: postpone_result.transactions_committed,
    })
}
