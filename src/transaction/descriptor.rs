use std::collections::VecDeque;

use crate::log::{record::TopOpFrame, Lsa, Trid, NULL_LSA};

use super::{
    reentrant_lock::ReentrantLock,
    state::{TransactionState, TransactionType},
};

/// How many bind values are retained per descriptor for diagnostics; a
/// bound history, not a correctness requirement.
const BIND_VALUE_HISTORY_CAP: usize = 32;

/// Client-supplied identity attached to a descriptor at registration.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub client_type: u8,
    pub user: String,
    pub program: String,
    pub host: String,
    pub pid: i32,
}

#[derive(Debug, Clone)]
pub struct SavepointEntry {
    pub name: String,
    pub lsa: Lsa,
}

/// A Transaction Descriptor: the table's unit of allocation (spec §3/§4.2).
/// Owned by `TransactionTable` at a fixed index for its lifetime; freed
/// (state reset to `Null`) on commit/abort/recovery-free.
pub struct Tdes {
    pub tran_index: usize,
    pub trid: Trid,
    pub client_id: i32,
    pub client_info: ClientInfo,

    pub state: TransactionState,
    pub tran_type: TransactionType,

    pub begin_lsa: Lsa,
    pub last_lsa: Lsa,
    pub undo_nxlsa: Lsa,
    pub posp_nxlsa: Lsa,
    pub savept_lsa: Lsa,
    pub topop_lsa: Lsa,
    pub tail_topresult_lsa: Lsa,

    /// Nested top-operation stack; grows in steps of 3 (spec §3). A `Vec`
    /// already amortizes growth, the stepped-capacity detail is a C
    /// allocator concern this reimplementation doesn't need to mirror.
    pub topops: Vec<TopOpFrame>,

    pub interrupt: bool,
    pub wait_msecs: i64,
    pub disable_modifications: bool,
    /// Absolute epoch-millisecond deadline, or 0 for none.
    pub query_timeout: u64,
    pub tran_group_id: u32,
    pub tran_shard_key: Vec<u8>,

    pub transient_class_count: u32,
    pub modified_classes: Vec<String>,
    pub savepoints: Vec<SavepointEntry>,
    pub replication_records: Vec<Vec<u8>>,
    bind_value_history: VecDeque<Vec<u8>>,

    /// Query ids chained to this transaction, most recent first (spec
    /// §4.5: "chained on the transaction's entry list (LIFO)").
    pub query_entries: Vec<u32>,

    pub lock: ReentrantLock,
}

impl Tdes {
    pub fn new(tran_index: usize, trid: Trid) -> Self {
        Tdes {
            tran_index,
            trid,
            client_id: -1,
            client_info: ClientInfo::default(),
            state: TransactionState::Null,
            tran_type: TransactionType::Dml,
            begin_lsa: NULL_LSA,
            last_lsa: NULL_LSA,
            undo_nxlsa: NULL_LSA,
            posp_nxlsa: NULL_LSA,
            savept_lsa: NULL_LSA,
            topop_lsa: NULL_LSA,
            tail_topresult_lsa: NULL_LSA,
            topops: Vec::new(),
            interrupt: false,
            wait_msecs: -1,
            disable_modifications: false,
            query_timeout: 0,
            tran_group_id: 0,
            tran_shard_key: Vec::new(),
            transient_class_count: 0,
            modified_classes: Vec::new(),
            savepoints: Vec::new(),
            replication_records: Vec::new(),
            bind_value_history: VecDeque::new(),
            query_entries: Vec::new(),
            lock: ReentrantLock::new(),
        }
    }

    /// Reset a freed slot back to its allocatable shape, keeping the
    /// index and the (now-stale) lock in place. Called on commit/abort
    /// free and by recovery when a descriptor is dropped from the table.
    pub fn reset(&mut self, trid: Trid) {
        self.trid = trid;
        self.client_id = -1;
        self.client_info = ClientInfo::default();
        self.state = TransactionState::Null;
        self.tran_type = TransactionType::Dml;
        self.begin_lsa = NULL_LSA;
        self.last_lsa = NULL_LSA;
        self.undo_nxlsa = NULL_LSA;
        self.posp_nxlsa = NULL_LSA;
        self.savept_lsa = NULL_LSA;
        self.topop_lsa = NULL_LSA;
        self.tail_topresult_lsa = NULL_LSA;
        self.topops.clear();
        self.interrupt = false;
        self.wait_msecs = -1;
        self.disable_modifications = false;
        self.query_timeout = 0;
        self.tran_group_id = 0;
        self.tran_shard_key.clear();
        self.transient_class_count = 0;
        self.modified_classes.clear();
        self.savepoints.clear();
        self.replication_records.clear();
        self.bind_value_history.clear();
        self.query_entries.clear();
    }

    pub fn push_bind_value(&mut self, value: Vec<u8>) {
        if self.bind_value_history.len() == BIND_VALUE_HISTORY_CAP {
            self.bind_value_history.pop_front();
        }
        self.bind_value_history.push_back(value);
    }

    pub fn bind_value_history(&self) -> &VecDeque<Vec<u8>> {
        &self.bind_value_history
    }

    pub fn push_query_entry(&mut self, query_id: u32) {
        self.query_entries.push(query_id);
    }

    pub fn remove_query_entry(&mut self, query_id: u32) {
        self.query_entries.retain(|&id| id != query_id);
    }

    pub fn push_topop(&mut self, frame: TopOpFrame) {
        self.topop_lsa = frame.lastparent_lsa;
        self.topops.push(frame);
    }

    pub fn pop_topop(&mut self) -> Option<TopOpFrame> {
        let frame = self.topops.pop();
        self.topop_lsa = self.topops.last().map(|f| f.lastparent_lsa).unwrap_or(NULL_LSA);
        frame
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, TransactionState::Active)
    }

    pub fn is_free(&self) -> bool {
        matches!(self.state, TransactionState::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_value_history_is_bounded() {
        let mut tdes = Tdes::new(1, 1);
        for i in 0..(BIND_VALUE_HISTORY_CAP + 5) {
            tdes.push_bind_value(vec![i as u8]);
        }
        assert_eq!(tdes.bind_value_history().len(), BIND_VALUE_HISTORY_CAP);
        assert_eq!(tdes.bind_value_history().front().unwrap(), &vec![5u8]);
    }

    #[test]
    fn topop_stack_tracks_lastparent_lsa() {
        let mut tdes = Tdes::new(1, 1);
        tdes.push_topop(TopOpFrame {
            lastparent_lsa: Lsa::new(1, 0),
            posp_lsa: NULL_LSA,
        });
        assert_eq!(tdes.topop_lsa, Lsa::new(1, 0));
        tdes.pop_topop();
        assert_eq!(tdes.topop_lsa, NULL_LSA);
    }

    #[test]
    fn reset_clears_everything_but_keeps_index() {
        let mut tdes = Tdes::new(3, 7);
        tdes.state = TransactionState::Active;
        tdes.begin_lsa = Lsa::new(5, 0);
        tdes.reset(99);
        assert_eq!(tdes.tran_index, 3);
        assert_eq!(tdes.trid, 99);
        assert!(tdes.is_free());
        assert_eq!(tdes.begin_lsa, NULL_LSA);
    }
}
