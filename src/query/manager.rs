use std::{
    collections::HashMap,
    sync::{atomic::{AtomicU32, AtomicU64, Ordering}, Arc},
};

use log::debug;

use crate::{
    error::CoreError,
    log::Trid,
    transaction::TransactionTable,
    types::CoreResult,
};

use super::{
    entry::{ListId, QueryEntry, QueryId, XaslId},
    tempfile::{MembufType, PageLocation, TempFileDescriptor, TempFileFreeLists, TempFileRing},
};

const DEFAULT_MEMBUF_NPAGES: usize = 8;
const DEFAULT_PAGE_SIZE: usize = 4096;

/// Per-transaction query-execution statistics, as `get_pack_tran_table`
/// reports them to a client (spec §7's "packed record").
#[derive(Debug, Clone, Default)]
pub struct QueryExecInfo {
    pub trid: Trid,
    pub num_queries: u32,
    pub num_holdable: u32,
}

/// Owns the XASL prepare cache, the live query-entry table, and the two
/// temp-file free-lists (spec §4.5, C6). One instance lives per database,
/// reached through `Database::global()`.
pub struct QueryManager {
    next_xasl_id: AtomicU64,
    xasl_cache: HashMap<XaslId, Vec<u8>>,
    next_query_id: AtomicU32,
    queries: HashMap<QueryId, Arc<QueryEntry>>,
    free_lists: TempFileFreeLists,
    num_holdable_cursors: AtomicU32,
}

impl QueryManager {
    pub fn new() -> Self {
        QueryManager {
            next_xasl_id: AtomicU64::new(1),
            xasl_cache: HashMap::new(),
            next_query_id: AtomicU32::new(1),
            queries: HashMap::new(),
            free_lists: TempFileFreeLists::new(),
            num_holdable_cursors: AtomicU32::new(0),
        }
    }

    /// spec §4.5 `prepare`: cache an XASL stream, returning a handle.
    pub fn prepare(&mut self, xasl_stream: Vec<u8>) -> XaslId {
        let xasl_id = self.next_xasl_id.fetch_add(1, Ordering::Relaxed);
        self.xasl_cache.insert(xasl_id, xasl_stream);
        xasl_id
    }

    pub fn xasl_stream(&self, xasl_id: XaslId) -> Option<&[u8]> {
        self.xasl_cache.get(&xasl_id).map(Vec::as_slice)
    }

    /// spec §4.5 `execute`: allocate a QE under `trid`, chain it onto the
    /// transaction's entry list (LIFO), and return its id. The caller
    /// (the XASL engine, out of scope here) is responsible for running
    /// the plan and calling `set_list_id`/`mark_completed`.
    pub fn execute(
        &mut self,
        table: &mut TransactionTable,
        tran_index: usize,
        trid: Trid,
        xasl_id: Option<XaslId>,
        is_holdable: bool,
        query_flag: u32,
    ) -> CoreResult<QueryId> {
        let query_id = self.next_query_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(QueryEntry::new(query_id, xasl_id, trid, is_holdable, query_flag));
        self.queries.insert(query_id, entry);

        let tdes = table
            .get_mut(tran_index)
            .ok_or_else(|| CoreError::not_found("unknown transaction index for query execute"))?;
        tdes.push_query_entry(query_id);

        debug!("query {} started under trid {}", query_id, trid);
        Ok(query_id)
    }

    pub fn entry(&self, query_id: QueryId) -> Option<Arc<QueryEntry>> {
        self.queries.get(&query_id).cloned()
    }

    /// spec §4.5 `interrupt_query`.
    pub fn interrupt_query(&self, query_id: QueryId) -> CoreResult<()> {
        let entry = self
            .queries
            .get(&query_id)
            .ok_or_else(|| CoreError::not_found(format!("unknown query id {}", query_id)))?;
        entry.interrupt();
        Ok(())
    }

    /// spec §4.5 `end_query`: wait for the executor to finish (forcing
    /// interruption if it's still running), then release the entry and
    /// return its temp files to the pool (or free them outright past
    /// capacity).
    pub fn end_query(&mut self, table: &mut TransactionTable, tran_index: usize, query_id: QueryId) -> CoreResult<()> {
        let entry = self
            .queries
            .remove(&query_id)
            .ok_or_else(|| CoreError::not_found(format!("unknown query id {}", query_id)))?;
        entry.wait_for_completion()?;

        if let Some(tdes) = table.get_mut(tran_index) {
            tdes.remove_query_entry(query_id);
        }

        // Any temp files still attached belong to this query alone (a
        // holdable handoff already would have detached them via
        // `take_holdable_queries`, leaving nothing here).
        if let Ok((_list_id, ring)) = entry.take_for_handoff() {
            self.return_temp_files(ring);
        }

        Ok(())
    }

    fn return_temp_files(&mut self, ring: TempFileRing) {
        for descriptor in ring.drain() {
            self.free_lists.give_back(descriptor);
        }
    }

    /// spec §4.5's "wait for all queries of this transaction" primitive,
    /// used at commit/abort to drain executors running on worker threads
    /// before the transaction's state is finalized.
    pub fn wait_for_all_queries_of(&self, table: &TransactionTable, tran_index: usize) -> CoreResult<()> {
        let tdes = table
            .get(tran_index)
            .ok_or_else(|| CoreError::not_found("unknown transaction index"))?;
        for &query_id in &tdes.query_entries {
            if let Some(entry) = self.queries.get(&query_id) {
                entry.wait_for_completion()?;
            }
        }
        Ok(())
    }

    /// spec §4.5's holdable-cursor handoff: called at commit, once per
    /// holdable QE still owned by `tran_index`. Detaches the QE's
    /// `list_id` and temp-file ring (renamed out of transaction-owned
    /// scope is the file manager's job, out of scope here) and removes it
    /// from both the transaction's entry list and this manager's table,
    /// so a subsequent `end_query` on an already-handed-off id finds
    /// nothing to free.
    pub fn take_holdable_queries(
        &mut self,
        table: &mut TransactionTable,
        tran_index: usize,
    ) -> CoreResult<Vec<(QueryId, ListId, TempFileRing)>> {
        let query_ids: Vec<QueryId> = table
            .get(tran_index)
            .ok_or_else(|| CoreError::not_found("unknown transaction index"))?
            .query_entries
            .clone();

        let mut handed_off = Vec::new();
        for query_id in query_ids {
            let is_holdable = match self.queries.get(&query_id) {
                Some(entry) => entry.is_holdable,
                None => continue,
            };
            if !is_holdable {
                continue;
            }

            let entry = self.queries.remove(&query_id).expect("checked above");
            entry.wait_for_completion()?;
            let (list_id, ring) = entry.take_for_handoff()?;

            if let Some(tdes) = table.get_mut(tran_index) {
                tdes.remove_query_entry(query_id);
            }
            self.num_holdable_cursors.fetch_add(1, Ordering::Relaxed);
            handed_off.push((query_id, list_id, ring));
        }
        Ok(handed_off)
    }

    /// Called when a holdable cursor is finally released by the session
    /// store (cursor close or session timeout), to keep the gauge honest.
    pub fn release_holdable_cursor(&self) {
        self.num_holdable_cursors.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn num_holdable_cursors(&self) -> u32 {
        self.num_holdable_cursors.load(Ordering::Relaxed)
    }

    /// spec §4.5's page-type discrimination, read side: resolve a logical
    /// page index within a query's temp files to either an in-memory
    /// buffer slice or an on-disk page id the page buffer must fetch.
    pub fn locate_page(&self, query_id: QueryId, file_index: usize, logical_index: usize) -> CoreResult<PageLocation> {
        let entry = self
            .queries
            .get(&query_id)
            .ok_or_else(|| CoreError::not_found(format!("unknown query id {}", query_id)))?;
        entry
            .locate_in_temp_file(file_index, logical_index)
            .ok_or_else(|| CoreError::semantic("query temp-file page index out of range"))
    }

    /// Allocate a fresh temp-file descriptor for a query, pulling from
    /// the shared pool first (spec §4.5's temp-file pool).
    pub fn new_temp_file(&mut self, membuf_type: MembufType) -> TempFileDescriptor {
        self.free_lists.take(DEFAULT_MEMBUF_NPAGES, DEFAULT_PAGE_SIZE, membuf_type)
    }

    pub fn query_exec_info(&self, trid: Trid) -> QueryExecInfo {
        let mut info = QueryExecInfo {
            trid,
            ..Default::default()
        };
        for entry in self.queries.values() {
            if entry.tid_of_executor == trid {
                info.num_queries += 1;
                if entry.is_holdable {
                    info.num_holdable += 1;
                }
            }
        }
        info
    }
}

impl Default for QueryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{ClientInfo, TransactionType};
    use tempfile::NamedTempFile;
    use crate::log::LogManager;

    fn log_manager() -> LogManager {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        LogManager::open(file.path()).unwrap()
    }

    #[test]
    fn execute_chains_query_onto_transaction_entry_list() {
        let mut table = TransactionTable::new();
        let mut log = log_manager();
        let index = table
            .register(1, ClientInfo::default(), TransactionType::Dml, &mut log)
            .unwrap();
        let trid = table.get(index).unwrap().trid;

        let mut qm = QueryManager::new();
        let query_id = qm.execute(&mut table, index, trid, None, false, 0).unwrap();

        assert_eq!(table.get(index).unwrap().query_entries, vec![query_id]);
    }

    #[test]
    fn end_query_waits_and_detaches_from_transaction() {
        let mut table = TransactionTable::new();
        let mut log = log_manager();
        let index = table
            .register(1, ClientInfo::default(), TransactionType::Dml, &mut log)
            .unwrap();
        let trid = table.get(index).unwrap().trid;

        let mut qm = QueryManager::new();
        let query_id = qm.execute(&mut table, index, trid, None, false, 0).unwrap();
        qm.entry(query_id).unwrap().mark_completed();

        qm.end_query(&mut table, index, query_id).unwrap();
        assert!(table.get(index).unwrap().query_entries.is_empty());
        assert!(qm.entry(query_id).is_none());
    }

    #[test]
    fn holdable_handoff_removes_from_transaction_and_bumps_gauge() {
        let mut table = TransactionTable::new();
        let mut log = log_manager();
        let index = table
            .register(1, ClientInfo::default(), TransactionType::Dml, &mut log)
            .unwrap();
        let trid = table.get(index).unwrap().trid;

        let mut qm = QueryManager::new();
        let query_id = qm.execute(&mut table, index, trid, None, true, 0).unwrap();
        let entry = qm.entry(query_id).unwrap();
        entry.set_list_id(99);
        entry.mark_completed();

        let handed = qm.take_holdable_queries(&mut table, index).unwrap();
        assert_eq!(handed.len(), 1);
        assert_eq!(handed[0].1, 99);
        assert_eq!(qm.num_holdable_cursors(), 1);
        assert!(table.get(index).unwrap().query_entries.is_empty());
    }
}
