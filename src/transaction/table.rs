use crate::{
    error::CoreError,
    log::{record::CheckpointTran, LogManager, Lsa, Trid},
    types::CoreResult,
};

use super::{
    descriptor::{ClientInfo, Tdes},
    state::{TransactionState, TransactionType},
    wait_for_graph::WaitForGraph,
};

/// Index 0 is always the system transaction (spec §4.2); never handed
/// out by `register`.
pub const SYSTEM_TRAN_INDEX: usize = 0;

const INITIAL_TABLE_SIZE: usize = 32;
const MAX_TABLE_SIZE: usize = 8192;
const GROWTH_NUMERATOR: usize = 125;
const GROWTH_DENOMINATOR: usize = 100;

/// Fixed-capacity table of transaction descriptors, growing by 25% when
/// full (spec §4.2). Descriptors never move once allocated: growth only
/// appends new slots, so a `tran_index` handed to a caller stays valid
/// for the life of that descriptor.
pub struct TransactionTable {
    descriptors: Vec<Tdes>,
    hint_free_index: usize,
    /// Ascending by `begin_lsa`; holds exactly the indices whose type is
    /// DML/DDL and whose `begin_lsa` is set (spec invariant 3).
    working_list: Vec<usize>,
    wait_for_graph: WaitForGraph,
}

impl TransactionTable {
    pub fn new() -> Self {
        let mut descriptors = Vec::with_capacity(INITIAL_TABLE_SIZE);
        for i in 0..INITIAL_TABLE_SIZE {
            descriptors.push(Tdes::new(i, 0));
        }
        descriptors[SYSTEM_TRAN_INDEX].state = TransactionState::Active;
        descriptors[SYSTEM_TRAN_INDEX].tran_type = TransactionType::Ddl;

        TransactionTable {
            descriptors,
            hint_free_index: 1,
            working_list: Vec::new(),
            wait_for_graph: WaitForGraph::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn get(&self, index: usize) -> Option<&Tdes> {
        self.descriptors.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Tdes> {
        self.descriptors.get_mut(index)
    }

    pub fn wait_for_graph(&self) -> &WaitForGraph {
        &self.wait_for_graph
    }

    pub fn wait_for_graph_mut(&mut self) -> &mut WaitForGraph {
        &mut self.wait_for_graph
    }

    pub fn working_list(&self) -> &[usize] {
        &self.working_list
    }

    /// Register a new client, allocating a free descriptor slot and a
    /// fresh `trid`. Read-only clients skip working-list insertion
    /// entirely (spec §4.2).
    pub fn register(
        &mut self,
        client_id: i32,
        client_info: ClientInfo,
        tran_type: TransactionType,
        log_manager: &mut LogManager,
    ) -> CoreResult<usize> {
        let index = self.find_or_grow_free_slot()?;
        let trid = self.allocate_trid_avoiding_collisions(log_manager);

        let tdes = &mut self.descriptors[index];
        tdes.reset(trid);
        tdes.client_id = client_id;
        tdes.client_info = client_info;
        tdes.tran_type = tran_type;
        tdes.state = TransactionState::Active;

        self.hint_free_index = (index + 1) % self.descriptors.len();
        if self.hint_free_index == SYSTEM_TRAN_INDEX {
            self.hint_free_index = 1;
        }

        Ok(index)
    }

    fn allocate_trid_avoiding_collisions(&self, log_manager: &mut LogManager) -> Trid {
        loop {
            let candidate = log_manager.allocate_trid();
            if !self.descriptors.iter().any(|t| !t.is_free() && t.trid == candidate) {
                return candidate;
            }
        }
    }

    fn find_or_grow_free_slot(&mut self) -> CoreResult<usize> {
        let len = self.descriptors.len();
        for offset in 0..len {
            let index = 1 + (self.hint_free_index - 1 + offset) % (len - 1);
            if self.descriptors[index].is_free() {
                return Ok(index);
            }
        }
        self.grow()?;
        // after growth, the first newly-added slot is free by construction
        Ok(len)
    }

    fn grow(&mut self) -> CoreResult<()> {
        let current = self.descriptors.len();
        if current >= MAX_TABLE_SIZE {
            return Err(CoreError::exhausted("transaction table at capacity"));
        }
        let mut new_len = (current * GROWTH_NUMERATOR) / GROWTH_DENOMINATOR;
        if new_len <= current {
            new_len = current + 1;
        }
        new_len = new_len.min(MAX_TABLE_SIZE);

        for i in current..new_len {
            self.descriptors.push(Tdes::new(i, 0));
        }
        // The wait-for graph and any query-manager-owned per-transaction
        // arrays are keyed by `trid`, not by table index, so they need no
        // structural reallocation here (unlike the original's raw C
        // arrays) — growth is purely additive.
        Ok(())
    }

    /// Called the first time a transaction appends a log record: sets
    /// `begin_lsa` if unset and inserts the index into the working list
    /// in ascending-`begin_lsa` order.
    pub fn note_first_log_record(&mut self, index: usize, lsa: Lsa) {
        let tdes = &mut self.descriptors[index];
        if tdes.begin_lsa.is_set() || !tdes.tran_type.tracks_working_list() {
            return;
        }
        tdes.begin_lsa = lsa;

        let pos = self
            .working_list
            .binary_search_by(|&i| self.descriptors[i].begin_lsa.cmp(&lsa))
            .unwrap_or_else(|p| p);
        self.working_list.insert(pos, index);
    }

    /// Remove an index from the working list (commit/abort).
    pub fn remove_from_working_list(&mut self, index: usize) {
        self.working_list.retain(|&i| i != index);
    }

    /// Free a descriptor's slot back to `Null`, making it allocatable
    /// again. Used by commit/abort and by the recovery engine.
    pub fn free(&mut self, index: usize) {
        self.remove_from_working_list(index);
        self.wait_for_graph.remove_transaction(self.descriptors[index].trid);
        self.descriptors[index].reset(0);
    }

    /// Minimum `begin_lsa` over DML-only working transactions (spec
    /// §4.6). If any DDL transaction is active, callers should use the
    /// current append LSA instead — signalled here by returning `None`.
    pub fn dml_commit_lsa_floor(&self) -> Option<Lsa> {
        let mut floor: Option<Lsa> = None;
        for &index in &self.working_list {
            let tdes = &self.descriptors[index];
            if !tdes.tran_type.is_dml() {
                return None;
            }
            floor = Some(match floor {
                Some(existing) => existing.min(tdes.begin_lsa),
                None => tdes.begin_lsa,
            });
        }
        floor
    }

    pub fn num_interrupts(&self) -> usize {
        self.descriptors.iter().filter(|t| t.interrupt).count()
    }

    pub fn find_by_trid(&self, trid: Trid) -> Option<usize> {
        self.descriptors.iter().position(|t| !t.is_free() && t.trid == trid)
    }

    /// Used by recovery analysis (spec §4.4.1): allocate a descriptor for
    /// a `trid` seen in the log with no in-memory state yet, defaulting
    /// it to `UnilaterallyAborted` (a crash-time rollback, not a client
    /// abort) until further analysis resolves it.
    pub fn allocate_for_recovery(&mut self, trid: Trid, begin_lsa: Lsa) -> CoreResult<usize> {
        if let Some(index) = self.find_by_trid(trid) {
            return Ok(index);
        }
        let index = self.find_or_grow_free_slot()?;
        let tdes = &mut self.descriptors[index];
        tdes.reset(trid);
        tdes.state = TransactionState::UnilaterallyAborted;
        tdes.tran_type = TransactionType::Dml;
        tdes.begin_lsa = begin_lsa;
        Ok(index)
    }

    /// Discard every non-system descriptor and repopulate from a
    /// checkpoint's transaction snapshot (spec §4.4.1's END_CHKPT
    /// handling). Descriptors default to `Active`; later log records in
    /// the same analysis pass refine or free them.
    pub fn install_from_checkpoint(&mut self, transactions: &[CheckpointTran]) -> CoreResult<()> {
        for index in 1..self.descriptors.len() {
            self.descriptors[index].reset(0);
        }
        self.working_list.clear();

        for snapshot in transactions {
            let index = self.find_or_grow_free_slot()?;
            let tdes = &mut self.descriptors[index];
            tdes.reset(snapshot.trid);
            tdes.state = TransactionState::Active;
            tdes.tran_type = TransactionType::Dml;
            tdes.begin_lsa = snapshot.begin_lsa;
            tdes.last_lsa = snapshot.last_lsa;
            tdes.undo_nxlsa = snapshot.undo_nxlsa;
            tdes.posp_nxlsa = snapshot.posp_nxlsa;
            tdes.savept_lsa = snapshot.savept_lsa;
            tdes.topops = snapshot.topops.clone();
            if let Some(frame) = tdes.topops.last() {
                tdes.topop_lsa = frame.lastparent_lsa;
            }
            self.hint_free_index = (index + 1) % self.descriptors.len();

            if snapshot.begin_lsa.is_set() {
                let pos = self
                    .working_list
                    .binary_search_by(|&i| self.descriptors[i].begin_lsa.cmp(&snapshot.begin_lsa))
                    .unwrap_or_else(|p| p);
                self.working_list.insert(pos, index);
            }
        }
        Ok(())
    }

    /// All still-allocated descriptor indices (for recovery's redo/undo
    /// passes, which must visit every transaction the analysis pass left
    /// behind, not just the working list).
    pub fn live_indices(&self) -> Vec<usize> {
        (0..self.descriptors.len())
            .filter(|&i| !self.descriptors[i].is_free())
            .collect()
    }
}

impl Default for TransactionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NULL_LSA;
    use tempfile::NamedTempFile;

    fn log_manager() -> LogManager {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        LogManager::open(file.path()).unwrap()
    }

    #[test]
    fn register_skips_system_slot() {
        let mut table = TransactionTable::new();
        let mut log = log_manager();
        let index = table
            .register(1, ClientInfo::default(), TransactionType::Dml, &mut log)
            .unwrap();
        assert_ne!(index, SYSTEM_TRAN_INDEX);
    }

    #[test]
    fn working_list_stays_sorted_by_begin_lsa() {
        let mut table = TransactionTable::new();
        let mut log = log_manager();
        let a = table
            .register(1, ClientInfo::default(), TransactionType::Dml, &mut log)
            .unwrap();
        let b = table
            .register(2, ClientInfo::default(), TransactionType::Dml, &mut log)
            .unwrap();

        table.note_first_log_record(b, Lsa::new(5, 0));
        table.note_first_log_record(a, Lsa::new(2, 0));

        assert_eq!(table.working_list(), &[a, b]);
    }

    #[test]
    fn read_only_never_enters_working_list() {
        let mut table = TransactionTable::new();
        let mut log = log_manager();
        let index = table
            .register(1, ClientInfo::default(), TransactionType::ReadOnly, &mut log)
            .unwrap();
        table.note_first_log_record(index, Lsa::new(1, 0));
        assert!(table.working_list().is_empty());
    }

    #[test]
    fn table_grows_by_25_percent_when_full() {
        let mut table = TransactionTable::new();
        let mut log = log_manager();
        let starting_len = table.len();
        for _ in 0..starting_len {
            table
                .register(1, ClientInfo::default(), TransactionType::Dml, &mut log)
                .unwrap();
        }
        assert!(table.len() > starting_len);
    }

    #[test]
    fn commit_lsa_floor_is_none_when_ddl_present() {
        let mut table = TransactionTable::new();
        let mut log = log_manager();
        let dml = table
            .register(1, ClientInfo::default(), TransactionType::Dml, &mut log)
            .unwrap();
        let ddl = table
            .register(2, ClientInfo::default(), TransactionType::Ddl, &mut log)
            .unwrap();
        table.note_first_log_record(dml, Lsa::new(1, 0));
        table.note_first_log_record(ddl, Lsa::new(2, 0));
        assert_eq!(table.dml_commit_lsa_floor(), None);
    }

    #[test]
    fn commit_lsa_floor_is_min_begin_lsa_when_all_dml() {
        let mut table = TransactionTable::new();
        let mut log = log_manager();
        let a = table
            .register(1, ClientInfo::default(), TransactionType::Dml, &mut log)
            .unwrap();
        let b = table
            .register(2, ClientInfo::default(), TransactionType::Dml, &mut log)
            .unwrap();
        table.note_first_log_record(a, Lsa::new(3, 0));
        table.note_first_log_record(b, Lsa::new(1, 0));
        assert_eq!(table.dml_commit_lsa_floor(), Some(Lsa::new(1, 0)));
    }

    #[test]
    fn free_resets_slot_and_removes_from_working_list() {
        let mut table = TransactionTable::new();
        let mut log = log_manager();
        let index = table
            .register(1, ClientInfo::default(), TransactionType::Dml, &mut log)
            .unwrap();
        table.note_first_log_record(index, Lsa::new(1, 0));
        table.free(index);
        assert!(table.working_list().is_empty());
        assert_eq!(table.get(index).unwrap().begin_lsa, NULL_LSA);
    }
}
