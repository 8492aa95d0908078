/// TDES state machine (spec §4.3). Names and legal arrows are drawn
/// directly from the distinction upstream makes between a normal client
/// abort (`ABORTED`) and a crash-time rollback assigned during recovery
/// analysis to a transaction nobody asked to abort (`UNILATERALLY_ABORTED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Null,
    Active,
    Committed,
    WillCommit,
    CommittedWithPostpone,
    TopopeCommittedWithPostpone,
    Aborted,
    UnilaterallyAborted,
    Unknown,
    Recovery,
}

impl TransactionState {
    /// Whether `self -> next` is one of the arrows spec §4.3 draws.
    /// `Recovery` is reachable from any state only at startup — callers
    /// that aren't the recovery engine must not rely on that arrow.
    pub fn can_transition_to(self, next: TransactionState) -> bool {
        use TransactionState::*;
        match (self, next) {
            (_, Recovery) => true,
            (Null, Active) => true,
            (Active, WillCommit) => true,
            (WillCommit, CommittedWithPostpone) => true,
            (CommittedWithPostpone, Committed) => true,
            (Active, TopopeCommittedWithPostpone) => true,
            // `topop_done` restores whatever state enclosed the nested
            // top-op; the descriptor module applies this directly rather
            // than asserting a fixed target here.
            (TopopeCommittedWithPostpone, _) => true,
            (Active, Aborted) => true,
            (Active, UnilaterallyAborted) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }

    /// States in which the descriptor still owns postpones that must run
    /// before the transaction can be considered durable (spec §4.4.4).
    pub fn awaits_postpones(self) -> bool {
        matches!(
            self,
            TransactionState::WillCommit
                | TransactionState::CommittedWithPostpone
                | TransactionState::TopopeCommittedWithPostpone
        )
    }
}

impl Default for TransactionState {
    fn default() -> Self {
        TransactionState::Null
    }
}

/// Whether a transaction is DML, DDL, or read-only (spec §3's `type`
/// field). Read-only transactions skip working-list insertion entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Dml,
    Ddl,
    ReadOnly,
}

impl TransactionType {
    /// Only DML/DDL transactions participate in `working_tran_list`
    /// (spec invariant 3).
    pub fn tracks_working_list(self) -> bool {
        !matches!(self, TransactionType::ReadOnly)
    }

    /// `commit_lsa` (spec §4.6) only considers DML transactions.
    pub fn is_dml(self) -> bool {
        matches!(self, TransactionType::Dml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionState::*;

    #[test]
    fn assign_then_begin_commit_then_postpone_then_committed() {
        assert!(Null.can_transition_to(Active));
        assert!(Active.can_transition_to(WillCommit));
        assert!(WillCommit.can_transition_to(CommittedWithPostpone));
        assert!(CommittedWithPostpone.can_transition_to(Committed));
    }

    #[test]
    fn abort_paths_are_distinct() {
        assert!(Active.can_transition_to(Aborted));
        assert!(Active.can_transition_to(UnilaterallyAborted));
        assert!(!Aborted.can_transition_to(Committed));
    }

    #[test]
    fn illegal_skip_is_rejected() {
        assert!(!Active.can_transition_to(Committed));
        assert!(!Null.can_transition_to(WillCommit));
    }

    #[test]
    fn read_only_skips_working_list() {
        assert!(!TransactionType::ReadOnly.tracks_working_list());
        assert!(TransactionType::Dml.tracks_working_list());
        assert!(TransactionType::Ddl.tracks_working_list());
    }
}
