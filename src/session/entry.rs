use crate::query::{ListId, QueryId, TempFileRing};

/// A holdable query's result, detached from its transaction and owned by
/// a session until the cursor is explicitly released or the session
/// times out (spec §3: "detached QE").
pub struct SessionQueryEntry {
    pub query_id: QueryId,
    pub list_id: ListId,
    pub temp_files: TempFileRing,
}

pub type SessionId = u32;

/// spec §3's Session: tracks the connection it rode in on, its holdable
/// cursors, and an idle timeout independent of any single query.
pub struct Session {
    pub session_id: SessionId,
    pub related_socket: Option<i32>,
    pub holdable_queries: Vec<SessionQueryEntry>,
    pub last_access_time: u64,
    pub trace_stats: bool,
    /// Set when a timeout sweep decides to reclaim this session; a
    /// connection that later proves still bound resets it rather than
    /// racing the sweep's actual removal (spec §4.6).
    pub marked_deleted: bool,
}

impl Session {
    pub fn new(session_id: SessionId, related_socket: Option<i32>, now: u64) -> Self {
        Session {
            session_id,
            related_socket,
            holdable_queries: Vec::new(),
            last_access_time: now,
            trace_stats: false,
            marked_deleted: false,
        }
    }

    pub fn touch(&mut self, now: u64) {
        self.last_access_time = now;
        self.marked_deleted = false;
    }

    pub fn attach_holdable_query(&mut self, entry: SessionQueryEntry) {
        self.holdable_queries.push(entry);
    }

    pub fn find_holdable_query(&self, query_id: QueryId) -> Option<&SessionQueryEntry> {
        self.holdable_queries.iter().find(|q| q.query_id == query_id)
    }

    /// Detach and return a holdable cursor the caller is explicitly
    /// releasing (cursor close, not session teardown).
    pub fn take_holdable_query(&mut self, query_id: QueryId) -> Option<SessionQueryEntry> {
        let pos = self.holdable_queries.iter().position(|q| q.query_id == query_id)?;
        Some(self.holdable_queries.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_clears_marked_deleted() {
        let mut session = Session::new(1, None, 100);
        session.marked_deleted = true;
        session.touch(200);
        assert!(!session.marked_deleted);
        assert_eq!(session.last_access_time, 200);
    }

    #[test]
    fn take_holdable_query_detaches_by_id() {
        let mut session = Session::new(1, None, 100);
        session.attach_holdable_query(SessionQueryEntry {
            query_id: 7,
            list_id: 70,
            temp_files: TempFileRing::new(),
        });
        let taken = session.take_holdable_query(7).unwrap();
        assert_eq!(taken.list_id, 70);
        assert!(session.find_holdable_query(7).is_none());
    }
}
