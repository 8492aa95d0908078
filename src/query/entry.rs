use std::sync::{Condvar, Mutex};

use crate::{error::CoreError, log::Trid, types::CoreResult};

use super::tempfile::{PageLocation, TempFileRing};

/// Whether a query is still producing rows or has finished (spec §3/§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Running,
    Completed,
}

/// Id of a prepared XASL cache entry (spec §4.5's `prepare`).
pub type XaslId = u64;

/// Id of a list-file holding a query's result rows.
pub type ListId = u64;

pub type QueryId = u32;

/// A captured query-execution error, surfaced later via `end_query`/
/// `get_query_info` (spec §7's propagation policy).
#[derive(Debug, Clone, Default)]
pub struct QueryError {
    pub error_id: i32,
    pub error_msg: String,
}

/// Mutable fields of a Query Entry guarded by its own lock (spec §3).
/// Split out from `QueryEntry` itself so the condvar can be woken without
/// holding the outer struct by value.
struct QueryEntryState {
    list_id: Option<ListId>,
    temp_files: TempFileRing,
    num_temp: u32,
    query_mode: QueryMode,
    interrupt: bool,
    propagate_interrupt: bool,
    error: Option<QueryError>,
}

/// A single query's execution record (spec §3's QE, §4.5's lifecycle).
/// Chained on its owning transaction's `query_entries` list (LIFO) while
/// live; detached into a `SessionQueryEntry` on holdable-cursor handoff.
pub struct QueryEntry {
    pub query_id: QueryId,
    pub xasl_id: Option<XaslId>,
    pub is_holdable: bool,
    pub tid_of_executor: Trid,
    pub query_flag: u32,

    state: Mutex<QueryEntryState>,
    condvar: Condvar,
}

impl QueryEntry {
    pub fn new(query_id: QueryId, xasl_id: Option<XaslId>, tid_of_executor: Trid, is_holdable: bool, query_flag: u32) -> Self {
        QueryEntry {
            query_id,
            xasl_id,
            is_holdable,
            tid_of_executor,
            query_flag,
            state: Mutex::new(QueryEntryState {
                list_id: None,
                temp_files: TempFileRing::new(),
                num_temp: 0,
                query_mode: QueryMode::Running,
                interrupt: false,
                propagate_interrupt: false,
                error: None,
            }),
            condvar: Condvar::new(),
        }
    }

    pub fn list_id(&self) -> Option<ListId> {
        self.state.lock().unwrap().list_id
    }

    pub fn set_list_id(&self, list_id: ListId) {
        self.state.lock().unwrap().list_id = Some(list_id);
    }

    pub fn query_mode(&self) -> QueryMode {
        self.state.lock().unwrap().query_mode
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.lock().unwrap().interrupt
    }

    pub fn set_error(&self, error_id: i32, error_msg: impl Into<String>) {
        self.state.lock().unwrap().error = Some(QueryError {
            error_id,
            error_msg: error_msg.into(),
        });
    }

    pub fn error(&self) -> Option<QueryError> {
        self.state.lock().unwrap().error.clone()
    }

    pub fn num_temp(&self) -> u32 {
        self.state.lock().unwrap().num_temp
    }

    /// Pull a temp-file descriptor from this entry's ring, allocating a
    /// fresh one from the pool if the ring is empty (spec §4.5's new-page
    /// allocation / pool interplay lives in `TempFileRing`/`QueryManager`).
    pub fn attach_temp_file(&self, descriptor: super::tempfile::TempFileDescriptor) {
        let mut state = self.state.lock().unwrap();
        state.temp_files.push(descriptor);
        state.num_temp += 1;
    }

    /// Mark execution finished, waking any thread parked in `end_query`.
    pub fn mark_completed(&self) {
        let mut state = self.state.lock().unwrap();
        state.query_mode = QueryMode::Completed;
        self.condvar.notify_all();
    }

    /// spec §4.5 `interrupt_query`: set the flag the XASL engine polls.
    pub fn interrupt(&self) {
        let mut state = self.state.lock().unwrap();
        state.interrupt = true;
        self.condvar.notify_all();
    }

    /// spec §4.5 `end_query`: if still running, request interruption and
    /// block on the entry's condvar until the executor marks it completed;
    /// a QE already `Completed` is released immediately by the caller.
    /// Returns the ring of temp-file descriptors to release/preserve and
    /// the transferred `list_id`, consuming the entry's inner state.
    pub fn wait_for_completion(&self) -> CoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.query_mode == QueryMode::Completed {
            return Ok(());
        }
        state.interrupt = true;
        state.propagate_interrupt = true;
        while state.query_mode != QueryMode::Completed {
            state = self.condvar.wait(state).unwrap();
        }
        Ok(())
    }

    /// spec §4.5 page-type discrimination: resolve a logical page index
    /// within the `file_index`-th temp file this entry owns.
    pub fn locate_in_temp_file(&self, file_index: usize, logical_index: usize) -> Option<PageLocation> {
        let state = self.state.lock().unwrap();
        state.temp_files.iter().nth(file_index)?.locate(logical_index)
    }

    /// Detach this entry's result handle and temp-file ring for a
    /// holdable-cursor handoff (spec §4.5). Leaves the entry emptied so a
    /// later `free` on the transaction-owned copy is a no-op.
    pub fn take_for_handoff(&self) -> CoreResult<(ListId, TempFileRing)> {
        let mut state = self.state.lock().unwrap();
        let list_id = state
            .list_id
            .ok_or_else(|| CoreError::semantic("holdable query entry has no list_id to hand off"))?;
        let rings = std::mem::replace(&mut state.temp_files, TempFileRing::new());
        state.list_id = None;
        Ok((list_id, rings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_completion_returns_immediately_once_completed() {
        let qe = QueryEntry::new(1, None, 5, false, 0);
        qe.mark_completed();
        qe.wait_for_completion().unwrap();
        assert!(!qe.is_interrupted());
    }

    #[test]
    fn wait_for_completion_sets_interrupt_when_still_running() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let qe = Arc::new(QueryEntry::new(1, None, 5, false, 0));
        let qe2 = Arc::clone(&qe);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            assert!(qe2.is_interrupted());
            qe2.mark_completed();
        });
        qe.wait_for_completion().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn take_for_handoff_fails_without_list_id() {
        let qe = QueryEntry::new(1, None, 5, true, 0);
        assert!(qe.take_for_handoff().is_err());
    }

    #[test]
    fn take_for_handoff_clears_list_id() {
        let qe = QueryEntry::new(1, None, 5, true, 0);
        qe.set_list_id(42);
        let (list_id, _ring) = qe.take_for_handoff().unwrap();
        assert_eq!(list_id, 42);
        assert!(qe.list_id().is_none());
    }
}
