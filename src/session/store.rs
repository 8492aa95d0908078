use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
};

use log::{debug, info};

use crate::{
    error::CoreError,
    query::{QueryId, TempFileRing},
    transaction::TransactionTable,
    types::CoreResult,
};

use super::entry::{Session, SessionId, SessionQueryEntry};

/// spec §4.6: ids wrap at `u32::MAX - 1` back to 1, rechecking membership
/// until an unused value turns up (the original's raw hash table keyed
/// directly by id; a `HashMap` here plays the same role with ordinary
/// collision handling, so only the id-generation wraparound needs
/// reimplementing).
const MAX_SESSION_ID: SessionId = SessionId::MAX - 1;

/// Hash table of live sessions keyed by session id, plus the monotonic
/// (wrapping) id generator (spec §4.6, C7).
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    next_id: AtomicU32,
    timeout_millis: u64,
}

impl SessionStore {
    pub fn new(timeout_millis: u64) -> Self {
        SessionStore {
            sessions: HashMap::new(),
            next_id: AtomicU32::new(1),
            timeout_millis,
        }
    }

    fn allocate_id(&self) -> SessionId {
        loop {
            let candidate = self.next_id.fetch_add(1, Ordering::Relaxed);
            let candidate = if candidate == 0 || candidate > MAX_SESSION_ID {
                self.next_id.store(2, Ordering::Relaxed);
                1
            } else {
                candidate
            };
            if !self.sessions.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub fn create_session(&mut self, related_socket: Option<i32>, now: u64) -> SessionId {
        let session_id = self.allocate_id();
        self.sessions.insert(session_id, Session::new(session_id, related_socket, now));
        debug!("session {} created", session_id);
        session_id
    }

    pub fn get(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    pub fn get_mut(&mut self, session_id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&session_id)
    }

    pub fn touch(&mut self, session_id: SessionId, now: u64) -> CoreResult<()> {
        self.sessions
            .get_mut(&session_id)
            .ok_or_else(|| CoreError::not_found(format!("unknown session {}", session_id)))?
            .touch(now);
        Ok(())
    }

    /// spec §4.5's holdable-cursor handoff, session side: attach a
    /// detached query's result under `session_id`.
    pub fn attach_holdable_query(
        &mut self,
        session_id: SessionId,
        query_id: QueryId,
        list_id: u64,
        temp_files: TempFileRing,
    ) -> CoreResult<()> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| CoreError::not_found(format!("unknown session {}", session_id)))?;
        session.attach_holdable_query(SessionQueryEntry {
            query_id,
            list_id,
            temp_files,
        });
        Ok(())
    }

    /// spec §8 testable property 7: the next rediscovery lookup in the
    /// same session must find the handed-off entry. A miss here is
    /// treated as an explicit error (the Open Question decision recorded
    /// in DESIGN.md), not a silent re-allocation of a fresh cursor.
    pub fn load_query_entry_info(&self, session_id: SessionId, query_id: QueryId) -> CoreResult<&SessionQueryEntry> {
        let session = self
            .sessions
            .get(&session_id)
            .ok_or_else(|| CoreError::not_found(format!("unknown session {}", session_id)))?;
        session
            .find_holdable_query(query_id)
            .ok_or_else(|| CoreError::not_found(format!("query {} not held by session {}", query_id, session_id)))
    }

    /// spec §4.6: the daemon sweep. `active_connections` is the set of
    /// session ids a live connection still claims; anything outside it
    /// whose idle time has elapsed is a reclamation candidate, but a
    /// session a connection still claims resets `marked_deleted` instead
    /// of being removed (the double-check the spec calls for).
    pub fn sweep_timed_out(&mut self, active_connections: &[SessionId], now: u64) -> usize {
        let mut reclaimed = 0;
        let mut to_remove = Vec::new();

        for (&session_id, session) in self.sessions.iter_mut() {
            let idle = now.saturating_sub(session.last_access_time);
            let still_connected = active_connections.contains(&session_id);

            if still_connected {
                session.marked_deleted = false;
                continue;
            }

            if idle >= self.timeout_millis {
                if session.marked_deleted {
                    to_remove.push(session_id);
                } else {
                    session.marked_deleted = true;
                }
            }
        }

        for session_id in to_remove {
            self.sessions.remove(&session_id);
            reclaimed += 1;
        }

        if reclaimed > 0 {
            info!("session timeout sweep reclaimed {} session(s)", reclaimed);
        }
        reclaimed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// spec §4.6's `commit_lsa`: delegate straight to the transaction
    /// table's DML-only working-list floor; `None` (any DDL active) means
    /// the caller should fall back to the log's current append LSA.
    pub fn commit_lsa_floor(&self, table: &TransactionTable) -> Option<crate::log::Lsa> {
        table.dml_commit_lsa_floor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_session_allocates_distinct_ids() {
        let mut store = SessionStore::new(1_000);
        let a = store.create_session(None, 0);
        let b = store.create_session(None, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn sweep_requires_two_passes_before_reclaiming() {
        let mut store = SessionStore::new(100);
        let id = store.create_session(None, 0);

        assert_eq!(store.sweep_timed_out(&[], 200), 0);
        assert!(store.get(id).unwrap().marked_deleted);

        assert_eq!(store.sweep_timed_out(&[], 300), 1);
        assert!(store.get(id).is_none());
    }

    #[test]
    fn reconnecting_resets_marked_deleted() {
        let mut store = SessionStore::new(100);
        let id = store.create_session(None, 0);
        store.sweep_timed_out(&[], 200);
        assert!(store.get(id).unwrap().marked_deleted);

        store.sweep_timed_out(&[id], 250);
        assert!(!store.get(id).unwrap().marked_deleted);
    }

    #[test]
    fn load_query_entry_info_is_explicit_not_found_on_miss() {
        let store = SessionStore::new(1_000);
        let err = store.load_query_entry_info(1, 1).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn attach_then_rediscover_holdable_query() {
        let mut store = SessionStore::new(1_000);
        let id = store.create_session(None, 0);
        store.attach_holdable_query(id, 5, 55, TempFileRing::new()).unwrap();

        let found = store.load_query_entry_info(id, 5).unwrap();
        assert_eq!(found.list_id, 55);
    }
}
