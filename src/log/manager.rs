use std::path::Path;

use log::{debug, trace};

use crate::{
    error::CoreError,
    io::Decodeable,
    types::{CoreResult, SmallResult},
};

use super::{
    lsa::{Lsa, NULL_LSA},
    page_io::{LogPageStore, DEFAULT_LOG_PAGE_SIZE},
    record::{CheckpointTran, LogRecord, RecordBody, RecordHeader, Trid},
};

/// `trid` wraps one below `i16::MAX - 2` (spec §8 boundary behavior);
/// wraparound collision-avoidance against still-live descriptors is the
/// transaction table's job (it calls [`LogManager::allocate_trid`] and
/// re-probes), this is just the raw monotone-with-wrap counter.
const TRID_WRAP_LIMIT: Trid = (i16::MAX - 2) as Trid;

/// Owns the physical log file and is the sole writer of log records;
/// generalizes the teacher's flat append-only `LogManager` to
/// LSA-addressed, page-framed, typed records.
pub struct LogManager {
    store: LogPageStore,
    flushed_lsa: Lsa,
}

impl LogManager {
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        Self::open_with_page_size(path, DEFAULT_LOG_PAGE_SIZE)
    }

    pub fn open_with_page_size<P: AsRef<Path>>(path: P, page_size: usize) -> CoreResult<Self> {
        let store = LogPageStore::open(path, page_size)?;
        Ok(LogManager {
            flushed_lsa: NULL_LSA,
            store,
        })
    }

    pub fn append_lsa(&self) -> Lsa {
        self.store.header().append_lsa
    }

    pub fn chkpt_lsa(&self) -> Lsa {
        self.store.header().chkpt_lsa
    }

    pub fn flushed_lsa(&self) -> Lsa {
        self.flushed_lsa
    }

    /// Used by recovery analysis's END_OF_LOG handling (spec §4.4.1),
    /// which repurposes that marker's header `trid` field to carry the
    /// next allocatable id.
    pub fn set_next_trid(&mut self, trid: Trid) {
        self.store.header_mut().next_trid = trid;
    }

    /// Raw, collision-unaware `trid` allocation with wraparound.
    pub fn allocate_trid(&mut self) -> Trid {
        let header = self.store.header_mut();
        let id = header.next_trid;
        header.next_trid = if id >= TRID_WRAP_LIMIT { 1 } else { id + 1 };
        id
    }

    /// Append a record for `trid`, chaining it to that transaction's
    /// previous record via `prev_tran_lsa`. Returns the record's own LSA.
    pub fn append(&mut self, trid: Trid, prev_tran_lsa: Lsa, body: RecordBody) -> CoreResult<Lsa> {
        let record = LogRecord::new(trid, prev_tran_lsa, body);
        let bytes = record.encode_record();
        let lsa = self.store.append_bytes(&bytes)?;
        trace!("log append trid={} lsa={} kind={:?}", trid, lsa, record.body);
        Ok(lsa)
    }

    /// Enforce WAL: guarantee every record up to `upto` is durable. The
    /// page buffer must call this before flushing a dirty page past disk.
    pub fn ensure_durable(&mut self, upto: Lsa) -> SmallResult {
        if self.flushed_lsa < upto {
            self.store.flush()?;
            self.flushed_lsa = self.store.header().append_lsa;
            debug!("log flushed up to {}", self.flushed_lsa);
        }
        Ok(())
    }

    pub fn sync(&mut self) -> SmallResult {
        self.store.sync()?;
        self.flushed_lsa = self.store.header().append_lsa;
        Ok(())
    }

    pub fn is_end_of_log(&self, lsa: Lsa) -> bool {
        lsa >= self.store.header().append_lsa
    }

    /// Decode the record at `lsa`. Returns the record (with `lsa` and a
    /// derived `forw_lsa` set to the cursor position just past it) and
    /// that forward position, the natural "next record to read" cursor.
    pub fn read_record_at(&mut self, lsa: Lsa) -> CoreResult<(LogRecord, Lsa)> {
        let mut cursor = self.store.cursor(lsa)?;
        let header = RecordHeader::decode_from(&mut cursor);
        let body = RecordBody::decode_from(&mut cursor);
        let forw_lsa = cursor.lsa();
        let record = LogRecord {
            header: RecordHeader {
                forw_lsa,
                ..header
            },
            body,
            lsa,
        };
        Ok((record, forw_lsa))
    }

    /// Append a checkpoint: a START_CHKPT marker followed immediately by
    /// an END_CHKPT carrying the transaction-table snapshot. Updates the
    /// header's `chkpt_lsa` to the START_CHKPT record so the next
    /// recovery begins analysis there. Returns that LSA.
    pub fn write_checkpoint(
        &mut self,
        redo_lsa: Lsa,
        transactions: Vec<CheckpointTran>,
    ) -> CoreResult<Lsa> {
        let start_lsa = self.append(0, NULL_LSA, RecordBody::StartChkpt)?;
        self.append(
            0,
            start_lsa,
            RecordBody::EndChkpt {
                redo_lsa,
                transactions,
            },
        )?;
        self.store.header_mut().chkpt_lsa = start_lsa;
        self.sync()?;
        Ok(start_lsa)
    }

    /// Truncate the log's append position to `lsa`, discarding anything
    /// physically present past it. Used both by END_OF_LOG analysis and
    /// by media-crash `stopat` rewind (spec §4.4.1).
    pub fn rewind_append_to(&mut self, lsa: Lsa) -> SmallResult {
        if lsa > self.store.header().append_lsa {
            return Err(CoreError::fatal("cannot rewind log append position forward"));
        }
        self.store.header_mut().append_lsa = lsa;
        self.sync()
    }
}
