use std::{error::Error, fmt};

/// Coarse classification of failures surfaced at the module boundary.
///
/// Lets a caller decide *what to do* — retry, surface to the client, or
/// treat recovery as unrecoverable — without string-matching a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Out of memory, out of temp space, per-transaction entry limit hit.
    ResourceExhausted,
    /// Page/log I/O failure, log mount failure, log page corruption.
    Io,
    /// Unknown transaction id, unknown query id, unknown volume/session.
    NotFound,
    /// Interrupted, lock timeout, deadlock victim.
    Concurrency,
    /// Invalid XASL node, invalid temp file, invalid isolation, rejected kill.
    Semantic,
    /// Log inconsistency found during recovery; the process should not continue.
    Fatal,
}

/// The crate-wide error type.
#[derive(Debug, Clone)]
pub struct CoreError {
    kind: ErrorKind,
    details: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        CoreError {
            kind,
            details: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn concurrency(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Concurrency, msg)
    }

    pub fn interrupted() -> Self {
        Self::new(ErrorKind::Concurrency, "ER_INTERRUPTED")
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, msg)
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, msg)
    }

    pub fn semantic(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Semantic, msg)
    }

    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_interrupted(&self) -> bool {
        self.kind == ErrorKind::Concurrency && self.details == "ER_INTERRUPTED"
    }

    /// Print a backtrace without unwinding, for the site where a
    /// fatal/concurrency error is first observed.
    pub fn show_backtrace(&self) {
        let bt = backtrace::Backtrace::new();
        eprintln!("{}: {}\n{:?}", self.kind_label(), self.details, bt);
    }

    fn kind_label(&self) -> &'static str {
        match self.kind {
            ErrorKind::ResourceExhausted => "resource-exhausted",
            ErrorKind::Io => "io",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Concurrency => "concurrency",
            ErrorKind::Semantic => "semantic",
            ErrorKind::Fatal => "fatal",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.kind_label(), self.details)
    }
}

impl Error for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::io(e.to_string())
    }
}
