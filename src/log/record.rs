use std::io::Read;

use crate::io::{decode_payload, encode_payload, read_exact, xor_bytes, Decodeable, Encodeable};

use super::lsa::Lsa;

pub type Trid = u32;

/// Identifies a data page targeted by a physical/physiological redo or
/// undo record. Opaque beyond volume+page: the heap/B-tree layer that
/// interprets page contents is an external collaborator (spec §1/§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub volume_id: i16,
    pub page_id: i32,
}

impl Encodeable for PageId {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6);
        buf.extend_from_slice(&self.volume_id.to_le_bytes());
        buf.extend_from_slice(&self.page_id.to_le_bytes());
        buf
    }
}

impl Decodeable for PageId {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        PageId {
            volume_id: i16::decode_from(reader),
            page_id: i32::decode_from(reader),
        }
    }
}

/// Dispatch key into the `RV_fun` callback table (recovery::callback).
/// The real system has ~80 concrete indices (RVHF_*, RVBT_*, RVDK_*, ...);
/// per spec's Non-goals we don't enumerate them, we only specify the
/// dispatch mechanism, so this stays an opaque newtype a registered
/// callback is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecoveryIndex(pub u16);

impl Encodeable for RecoveryIndex {
    fn encode(&self) -> Vec<u8> {
        self.0.encode()
    }
}

impl Decodeable for RecoveryIndex {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        RecoveryIndex(u16::decode_from(reader))
    }
}

/// One transaction's worth of state as captured into an END_CHKPT record.
#[derive(Debug, Clone)]
pub struct CheckpointTran {
    pub trid: Trid,
    pub begin_lsa: Lsa,
    pub last_lsa: Lsa,
    pub undo_nxlsa: Lsa,
    pub posp_nxlsa: Lsa,
    pub savept_lsa: Lsa,
    pub topops: Vec<TopOpFrame>,
}

impl Encodeable for CheckpointTran {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend(self.trid.encode());
        buf.extend(self.begin_lsa.encode());
        buf.extend(self.last_lsa.encode());
        buf.extend(self.undo_nxlsa.encode());
        buf.extend(self.posp_nxlsa.encode());
        buf.extend(self.savept_lsa.encode());
        buf.extend((self.topops.len() as u32).encode());
        for t in &self.topops {
            buf.extend(t.encode());
        }
        buf
    }
}

impl Decodeable for CheckpointTran {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let trid = Trid::decode_from(reader);
        let begin_lsa = Lsa::decode_from(reader);
        let last_lsa = Lsa::decode_from(reader);
        let undo_nxlsa = Lsa::decode_from(reader);
        let posp_nxlsa = Lsa::decode_from(reader);
        let savept_lsa = Lsa::decode_from(reader);
        let n = u32::decode_from(reader);
        let topops = (0..n).map(|_| TopOpFrame::decode_from(reader)).collect();
        CheckpointTran {
            trid,
            begin_lsa,
            last_lsa,
            undo_nxlsa,
            posp_nxlsa,
            savept_lsa,
            topops,
        }
    }
}

/// One nested top-operation stack frame (TDES's bounded stack, spec §3).
#[derive(Debug, Clone, Copy)]
pub struct TopOpFrame {
    pub lastparent_lsa: Lsa,
    pub posp_lsa: Lsa,
}

impl Encodeable for TopOpFrame {
    fn encode(&self) -> Vec<u8> {
        let mut buf = self.lastparent_lsa.encode();
        buf.extend(self.posp_lsa.encode());
        buf
    }
}

impl Decodeable for TopOpFrame {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        TopOpFrame {
            lastparent_lsa: Lsa::decode_from(reader),
            posp_lsa: Lsa::decode_from(reader),
        }
    }
}

/// The type-specific payload of a log record.
///
/// `RecordType` (the 1-byte discriminant stamped on the wire, see
/// `RecordBody::discriminant`) is kept implicit in the enum variant
/// rather than a separate field, so encode/decode can never disagree
/// about which body shape follows the header.
#[derive(Debug, Clone)]
pub enum RecordBody {
    UndoRedo {
        rcvindex: RecoveryIndex,
        page_id: PageId,
        undo: Vec<u8>,
        redo: Vec<u8>,
    },
    /// Stores `undo XOR redo` instead of the full redo image; at redo
    /// time the after-image is reconstructed as `undo XOR xor_payload`.
    DiffUndoRedo {
        rcvindex: RecoveryIndex,
        page_id: PageId,
        undo: Vec<u8>,
        xor_payload: Vec<u8>,
    },
    Undo {
        rcvindex: RecoveryIndex,
        page_id: PageId,
        undo: Vec<u8>,
    },
    Redo {
        rcvindex: RecoveryIndex,
        page_id: PageId,
        redo: Vec<u8>,
    },
    /// Logical: the callback locates its own target, no page fetch.
    ExternRedo {
        rcvindex: RecoveryIndex,
        redo: Vec<u8>,
    },
    Postpone {
        rcvindex: RecoveryIndex,
        page_id: PageId,
        redo: Vec<u8>,
    },
    /// Marks a postpone at `ref_lsa` as applied; used to resume a
    /// finish-postpone scan after a crash mid-commit.
    RunPostpone {
        ref_lsa: Lsa,
    },
    Compensate {
        rcvindex: RecoveryIndex,
        page_id: PageId,
        undo_nxlsa: Lsa,
        redo: Vec<u8>,
    },
    LogicalCompensate {
        undo_nxlsa: Lsa,
    },
    CommitWithPostpone {
        first_postpone_lsa: Lsa,
    },
    CommitTopopeWithPostpone {
        first_postpone_lsa: Lsa,
        lastparent_lsa: Lsa,
    },
    Commit {
        timestamp_millis: u64,
    },
    Abort,
    /// Outcome of a nested top-operation. The real system distinguishes
    /// COMMIT_TOPOPE/ABORT_TOPOPE at the wire level; both resolve to the
    /// same analysis/undo handling ("TOPOPE_RESULT" in spec §4.4.1), so
    /// they share one body shape with a `committed` flag.
    TopopeResult {
        lastparent_lsa: Lsa,
        committed: bool,
    },
    Savepoint {
        name: String,
    },
    StartChkpt,
    EndChkpt {
        redo_lsa: Lsa,
        transactions: Vec<CheckpointTran>,
    },
    Replication {
        bytes: Vec<u8>,
    },
    EndOfLog,
    /// No-op marker, e.g. padding at an archive boundary.
    Dummy(u8),
}

impl RecordBody {
    fn discriminant(&self) -> u8 {
        match self {
            RecordBody::UndoRedo { .. } => 0,
            RecordBody::DiffUndoRedo { .. } => 1,
            RecordBody::Undo { .. } => 2,
            RecordBody::Redo { .. } => 3,
            RecordBody::ExternRedo { .. } => 4,
            RecordBody::Postpone { .. } => 5,
            RecordBody::RunPostpone { .. } => 6,
            RecordBody::Compensate { .. } => 7,
            RecordBody::LogicalCompensate { .. } => 8,
            RecordBody::CommitWithPostpone { .. } => 9,
            RecordBody::CommitTopopeWithPostpone { .. } => 10,
            RecordBody::Commit { .. } => 11,
            RecordBody::Abort => 12,
            RecordBody::TopopeResult { .. } => 13,
            RecordBody::Savepoint { .. } => 14,
            RecordBody::StartChkpt => 15,
            RecordBody::EndChkpt { .. } => 16,
            RecordBody::Replication { .. } => 17,
            RecordBody::EndOfLog => 18,
            RecordBody::Dummy(_) => 19,
        }
    }

    /// True for records whose target is a page the core must fetch
    /// before invoking a callback; false for logical records, where the
    /// callback performs its own lookup (spec §4.4.2, design note).
    pub fn is_physical(&self) -> bool {
        matches!(
            self,
            RecordBody::UndoRedo { .. }
                | RecordBody::DiffUndoRedo { .. }
                | RecordBody::Undo { .. }
                | RecordBody::Redo { .. }
                | RecordBody::Postpone { .. }
                | RecordBody::Compensate { .. }
        )
    }

    pub fn page_id(&self) -> Option<PageId> {
        match self {
            RecordBody::UndoRedo { page_id, .. }
            | RecordBody::DiffUndoRedo { page_id, .. }
            | RecordBody::Undo { page_id, .. }
            | RecordBody::Redo { page_id, .. }
            | RecordBody::Postpone { page_id, .. }
            | RecordBody::Compensate { page_id, .. } => Some(*page_id),
            _ => None,
        }
    }

    /// Whether this record carries an undo image (needed by the undo pass).
    pub fn is_undoable(&self) -> bool {
        matches!(
            self,
            RecordBody::UndoRedo { .. } | RecordBody::DiffUndoRedo { .. } | RecordBody::Undo { .. }
        )
    }
}

impl Encodeable for RecordBody {
    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.discriminant()];
        match self {
            RecordBody::UndoRedo {
                rcvindex,
                page_id,
                undo,
                redo,
            } => {
                buf.extend(rcvindex.encode());
                buf.extend(page_id.encode());
                buf.extend(encode_payload(undo));
                buf.extend(encode_payload(redo));
            }
            RecordBody::DiffUndoRedo {
                rcvindex,
                page_id,
                undo,
                xor_payload,
            } => {
                buf.extend(rcvindex.encode());
                buf.extend(page_id.encode());
                buf.extend(encode_payload(undo));
                buf.extend(encode_payload(xor_payload));
            }
            RecordBody::Undo {
                rcvindex,
                page_id,
                undo,
            } => {
                buf.extend(rcvindex.encode());
                buf.extend(page_id.encode());
                buf.extend(encode_payload(undo));
            }
            RecordBody::Redo {
                rcvindex,
                page_id,
                redo,
            } => {
                buf.extend(rcvindex.encode());
                buf.extend(page_id.encode());
                buf.extend(encode_payload(redo));
            }
            RecordBody::ExternRedo { rcvindex, redo } => {
                buf.extend(rcvindex.encode());
                buf.extend(encode_payload(redo));
            }
            RecordBody::Postpone {
                rcvindex,
                page_id,
                redo,
            } => {
                buf.extend(rcvindex.encode());
                buf.extend(page_id.encode());
                buf.extend(encode_payload(redo));
            }
            RecordBody::RunPostpone { ref_lsa } => buf.extend(ref_lsa.encode()),
            RecordBody::Compensate {
                rcvindex,
                page_id,
                undo_nxlsa,
                redo,
            } => {
                buf.extend(rcvindex.encode());
                buf.extend(page_id.encode());
                buf.extend(undo_nxlsa.encode());
                buf.extend(encode_payload(redo));
            }
            RecordBody::LogicalCompensate { undo_nxlsa } => buf.extend(undo_nxlsa.encode()),
            RecordBody::CommitWithPostpone { first_postpone_lsa } => {
                buf.extend(first_postpone_lsa.encode())
            }
            RecordBody::CommitTopopeWithPostpone {
                first_postpone_lsa,
                lastparent_lsa,
            } => {
                buf.extend(first_postpone_lsa.encode());
                buf.extend(lastparent_lsa.encode());
            }
            RecordBody::Commit { timestamp_millis } => buf.extend(timestamp_millis.encode()),
            RecordBody::Abort => {}
            RecordBody::TopopeResult {
                lastparent_lsa,
                committed,
            } => {
                buf.extend(lastparent_lsa.encode());
                buf.extend(committed.encode());
            }
            RecordBody::Savepoint { name } => buf.extend(name.encode()),
            RecordBody::StartChkpt => {}
            RecordBody::EndChkpt {
                redo_lsa,
                transactions,
            } => {
                buf.extend(redo_lsa.encode());
                buf.extend((transactions.len() as u32).encode());
                for t in transactions {
                    buf.extend(t.encode());
                }
            }
            RecordBody::Replication { bytes } => buf.extend(bytes.encode()),
            RecordBody::EndOfLog => {}
            RecordBody::Dummy(tag) => buf.extend(tag.encode()),
        }
        buf
    }
}

impl Decodeable for RecordBody {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let discriminant = read_exact(reader, 1)[0];
        match discriminant {
            0 => RecordBody::UndoRedo {
                rcvindex: RecoveryIndex::decode_from(reader),
                page_id: PageId::decode_from(reader),
                undo: decode_payload(reader),
                redo: decode_payload(reader),
            },
            1 => RecordBody::DiffUndoRedo {
                rcvindex: RecoveryIndex::decode_from(reader),
                page_id: PageId::decode_from(reader),
                undo: decode_payload(reader),
                xor_payload: decode_payload(reader),
            },
            2 => RecordBody::Undo {
                rcvindex: RecoveryIndex::decode_from(reader),
                page_id: PageId::decode_from(reader),
                undo: decode_payload(reader),
            },
            3 => RecordBody::Redo {
                rcvindex: RecoveryIndex::decode_from(reader),
                page_id: PageId::decode_from(reader),
                redo: decode_payload(reader),
            },
            4 => RecordBody::ExternRedo {
                rcvindex: RecoveryIndex::decode_from(reader),
                redo: decode_payload(reader),
            },
            5 => RecordBody::Postpone {
                rcvindex: RecoveryIndex::decode_from(reader),
                page_id: PageId::decode_from(reader),
                redo: decode_payload(reader),
            },
            6 => RecordBody::RunPostpone {
                ref_lsa: Lsa::decode_from(reader),
            },
            7 => RecordBody::Compensate {
                rcvindex: RecoveryIndex::decode_from(reader),
                page_id: PageId::decode_from(reader),
                undo_nxlsa: Lsa::decode_from(reader),
                redo: decode_payload(reader),
            },
            8 => RecordBody::LogicalCompensate {
                undo_nxlsa: Lsa::decode_from(reader),
            },
            9 => RecordBody::CommitWithPostpone {
                first_postpone_lsa: Lsa::decode_from(reader),
            },
            10 => RecordBody::CommitTopopeWithPostpone {
                first_postpone_lsa: Lsa::decode_from(reader),
                lastparent_lsa: Lsa::decode_from(reader),
            },
            11 => RecordBody::Commit {
                timestamp_millis: u64::decode_from(reader),
            },
            12 => RecordBody::Abort,
            13 => RecordBody::TopopeResult {
                lastparent_lsa: Lsa::decode_from(reader),
                committed: bool::decode_from(reader),
            },
            14 => RecordBody::Savepoint {
                name: String::decode_from(reader),
            },
            15 => RecordBody::StartChkpt,
            16 => {
                let redo_lsa = Lsa::decode_from(reader);
                let n = u32::decode_from(reader);
                let transactions = (0..n).map(|_| CheckpointTran::decode_from(reader)).collect();
                RecordBody::EndChkpt {
                    redo_lsa,
                    transactions,
                }
            }
            17 => RecordBody::Replication {
                bytes: Vec::<u8>::decode_from(reader),
            },
            18 => RecordBody::EndOfLog,
            19 => RecordBody::Dummy(read_exact(reader, 1)[0]),
            other => panic!("invalid log record discriminant: {}", other),
        }
    }
}

/// Fixed header prepended to every record: `{trid, prev_tran_lsa,
/// forw_lsa, back_lsa, type}`. `prev_tran_lsa` chains one transaction's
/// records backward; `forw_lsa` chains the entire log forward.
#[derive(Debug, Clone)]
pub struct RecordHeader {
    pub trid: Trid,
    pub prev_tran_lsa: Lsa,
    pub forw_lsa: Lsa,
    pub back_lsa: Lsa,
}

impl Encodeable for RecordHeader {
    fn encode(&self) -> Vec<u8> {
        let mut buf = self.trid.encode();
        buf.extend(self.prev_tran_lsa.encode());
        buf.extend(self.forw_lsa.encode());
        buf.extend(self.back_lsa.encode());
        buf
    }
}

impl Decodeable for RecordHeader {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        RecordHeader {
            trid: Trid::decode_from(reader),
            prev_tran_lsa: Lsa::decode_from(reader),
            forw_lsa: Lsa::decode_from(reader),
            back_lsa: Lsa::decode_from(reader),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub header: RecordHeader,
    pub body: RecordBody,
    /// This record's own LSA; not stored on the wire (it *is* the file
    /// position it was written at) but carried alongside once read back,
    /// since almost every consumer needs it.
    pub lsa: Lsa,
}

impl LogRecord {
    pub fn new(trid: Trid, prev_tran_lsa: Lsa, body: RecordBody) -> Self {
        LogRecord {
            header: RecordHeader {
                trid,
                prev_tran_lsa,
                forw_lsa: super::lsa::NULL_LSA,
                back_lsa: super::lsa::NULL_LSA,
            },
            body,
            lsa: super::lsa::NULL_LSA,
        }
    }

    pub fn encode_record(&self) -> Vec<u8> {
        let mut buf = self.header.encode();
        buf.extend(self.body.encode());
        buf
    }
}

/// Compute the XOR diff stored by a DIFF_UNDOREDO record.
pub fn diff_undoredo_payload(undo: &[u8], redo: &[u8]) -> Vec<u8> {
    xor_bytes(undo, redo)
}

/// Reconstruct the after-image from a DIFF_UNDOREDO record at redo time.
pub fn reconstruct_redo_image(undo: &[u8], xor_payload: &[u8]) -> Vec<u8> {
    xor_bytes(undo, xor_payload)
}
