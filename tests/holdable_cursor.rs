use ariesdb_core::{
    log::LogManager,
    query::QueryManager,
    session::SessionStore,
    transaction::{ClientInfo, TransactionTable, TransactionType},
};
use tempfile::NamedTempFile;

fn log_manager() -> LogManager {
    let file = NamedTempFile::new().unwrap();
    std::fs::remove_file(file.path()).ok();
    LogManager::open(file.path()).unwrap()
}

/// spec's holdable-cursor testable property: a query started as holdable
/// survives its owning transaction's commit, and the session that holds it
/// can rediscover it by query id afterward.
#[test]
fn holdable_query_survives_commit_and_is_rediscoverable_by_session() {
    let mut table = TransactionTable::new();
    let mut log = log_manager();
    let tran_index = table
        .register(1, ClientInfo::default(), TransactionType::Dml, &mut log)
        .unwrap();
    let trid = table.get(tran_index).unwrap().trid;

    let mut queries = QueryManager::new();
    let query_id = queries.execute(&mut table, tran_index, trid, None, true, 0).unwrap();

    let entry = queries.entry(query_id).unwrap();
    entry.set_list_id(42);
    entry.mark_completed();

    let mut sessions = SessionStore::new(60_000);
    let session_id = sessions.create_session(None, 0);

    // Commit-time handoff: the query manager detaches the holdable entry
    // from the transaction, the session store takes ownership of it.
    let handed_off = queries.take_holdable_queries(&mut table, tran_index).unwrap();
    assert_eq!(handed_off.len(), 1);
    for (id, list_id, temp_files) in handed_off {
        sessions.attach_holdable_query(session_id, id, list_id, temp_files).unwrap();
    }

    assert!(table.get(tran_index).unwrap().query_entries.is_empty());
    assert_eq!(queries.num_holdable_cursors(), 1);

    // A later request in the same session rediscovers the cursor.
    let found = sessions.load_query_entry_info(session_id, query_id).unwrap();
    assert_eq!(found.list_id, 42);

    // end_query on the now-detached id is a no-op: the query manager no
    // longer tracks it at all.
    assert!(queries.entry(query_id).is_none());
}

/// A non-holdable query is never handed to the session; looking it up
/// there after commit is an explicit not-found, not a silent re-allocation.
#[test]
fn non_holdable_query_is_not_handed_to_the_session() {
    let mut table = TransactionTable::new();
    let mut log = log_manager();
    let tran_index = table
        .register(2, ClientInfo::default(), TransactionType::Dml, &mut log)
        .unwrap();
    let trid = table.get(tran_index).unwrap().trid;

    let mut queries = QueryManager::new();
    let query_id = queries.execute(&mut table, tran_index, trid, None, false, 0).unwrap();
    queries.entry(query_id).unwrap().mark_completed();

    let mut sessions = SessionStore::new(60_000);
    let session_id = sessions.create_session(None, 0);

    let handed_off = queries.take_holdable_queries(&mut table, tran_index).unwrap();
    assert!(handed_off.is_empty());

    let err = sessions.load_query_entry_info(session_id, query_id).unwrap_err();
    assert_eq!(err.kind(), ariesdb_core::ErrorKind::NotFound);
}
