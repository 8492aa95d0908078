//! Process-wide interrupt counter and shard-group ownership (spec §4.7,
//! C8). The transaction table owns each descriptor's `interrupt` flag;
//! this module owns the cheap, lock-free checks long loops and the page
//! buffer consult before touching a descriptor at all.

use std::{
    collections::HashSet,
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};

use crate::{log::Trid, transaction::TransactionTable};

/// The group id meaning "every shard", always owned (spec §4.7).
pub const GLOBAL_GROUP_ID: u32 = 0;

/// `num_interrupts` (spec invariant 5) kept in lock-step with each
/// descriptor's `interrupt` flag by the two toggle methods below; never
/// read directly off the transaction table so a hot loop can check it
/// without taking the table's lock.
#[derive(Default)]
pub struct InterruptCounter {
    count: AtomicU32,
}

impl InterruptCounter {
    pub fn new() -> Self {
        InterruptCounter { count: AtomicU32::new(0) }
    }

    /// Set a descriptor's `interrupt` flag and increment the counter in
    /// the same call, so the two never observably diverge.
    pub fn raise(&self, table: &mut TransactionTable, tran_index: usize) -> bool {
        if let Some(tdes) = table.get_mut(tran_index) {
            if !tdes.interrupt {
                tdes.interrupt = true;
                self.count.fetch_add(1, Ordering::SeqCst);
                return true;
            }
        }
        false
    }

    pub fn clear(&self, table: &mut TransactionTable, tran_index: usize) -> bool {
        if let Some(tdes) = table.get_mut(tran_index) {
            if tdes.interrupt {
                tdes.interrupt = false;
                self.count.fetch_sub(1, Ordering::SeqCst);
                return true;
            }
        }
        false
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Cheap pre-check: skip the descriptor lookup entirely when nothing
    /// in the whole process is interrupted.
    pub fn any_interrupted(&self) -> bool {
        self.count.load(Ordering::SeqCst) > 0
    }
}

/// Process-wide shard-group ownership bitmap (spec §4.7). A group id
/// beyond the global one is owned iff its bit is set; migration clears a
/// bit only after draining the group's working transactions.
pub struct ShardGroupOwnership {
    owned: std::sync::RwLock<HashSet<u32>>,
}

impl ShardGroupOwnership {
    pub fn new() -> Self {
        ShardGroupOwnership {
            owned: std::sync::RwLock::new(HashSet::new()),
        }
    }

    pub fn check_own(&self, group_id: u32) -> bool {
        group_id == GLOBAL_GROUP_ID || self.owned.read().unwrap().contains(&group_id)
    }

    pub fn acquire(&self, group_id: u32) {
        self.owned.write().unwrap().insert(group_id);
    }

    /// spec §4.7: migration drains the group's working transactions
    /// before the bit clears. `working_trids` is whatever the caller
    /// gathered as "still active under this group" at the moment it
    /// decided to migrate; this call only performs the bit flip, the
    /// draining wait itself lives with the caller (it spans query
    /// completion, not just transaction-table state).
    pub fn release(&self, group_id: u32, working_trids: &[Trid]) {
        if !working_trids.is_empty() {
            return;
        }
        self.owned.write().unwrap().remove(&group_id);
    }
}

impl Default for ShardGroupOwnership {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock-free "now" the log-clock daemon refreshes roughly every 200ms
/// (spec §5's cancellation protocol), so `query_timeout` comparisons
/// never hit the OS clock on a hot poll path.
#[derive(Default)]
pub struct LogClock {
    millis: AtomicU64,
}

impl LogClock {
    pub fn new(initial_millis: u64) -> Self {
        LogClock {
            millis: AtomicU64::new(initial_millis),
        }
    }

    pub fn refresh(&self, now_millis: u64) {
        self.millis.store(now_millis, Ordering::Relaxed);
    }

    pub fn now(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }

    /// `query_timeout == 0` means no deadline (spec §3).
    pub fn is_past_deadline(&self, query_timeout: u64) -> bool {
        query_timeout != 0 && self.now() >= query_timeout
    }
}
