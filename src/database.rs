use std::path::Path;

use once_cell::sync::OnceCell;

use crate::{
    config::Config,
    error::CoreError,
    interrupt::{InterruptCounter, LogClock, ShardGroupOwnership},
    log::LogManager,
    query::{QueryExecInfo, QueryManager},
    recovery::RecoveryCallbackTable,
    session::SessionStore,
    transaction::TransactionTable,
    types::{CoreResult, Pod},
    utils::HandyRwLock,
};

static DB: OnceCell<Database> = OnceCell::new();

/// The process-wide handle tying together every component this crate
/// specifies (spec §2's data flow): one log, one transaction table, one
/// registered recovery-callback dispatch table, one query manager, one
/// session store. Reached through [`Database::global`], mirroring the
/// teacher's `Database::global()` singleton — generalized from a single
/// `OnceCell<Database>` holding a catalog+buffer-pool pair to one holding
/// this crate's five components.
pub struct Database {
    log: Pod<LogManager>,
    transactions: Pod<TransactionTable>,
    callbacks: Pod<RecoveryCallbackTable>,
    queries: Pod<QueryManager>,
    sessions: Pod<SessionStore>,
    interrupts: InterruptCounter,
    shard_groups: ShardGroupOwnership,
    clock: LogClock,
    config: Config,
}

impl Database {
    /// Open (or create) the log at `log_path` and install the global
    /// instance. Must run exactly once before any `global()` call; unlike
    /// the teacher's infallible `Database::new()`, opening a log file can
    /// fail, so this is a fallible `init` rather than a lazily-computed
    /// `get_or_init` closure.
    pub fn init<P: AsRef<Path>>(log_path: P, config: Config) -> CoreResult<()> {
        let log = LogManager::open(log_path)?;
        let now = crate::utils::now_millis();
        let database = Database {
            log: Pod::new(std::sync::RwLock::new(log)),
            transactions: Pod::new(std::sync::RwLock::new(TransactionTable::new())),
            callbacks: Pod::new(std::sync::RwLock::new(RecoveryCallbackTable::new())),
            queries: Pod::new(std::sync::RwLock::new(QueryManager::new())),
            sessions: Pod::new(std::sync::RwLock::new(SessionStore::new(
                config.session_state_timeout.as_millis() as u64,
            ))),
            interrupts: InterruptCounter::new(),
            shard_groups: ShardGroupOwnership::new(),
            clock: LogClock::new(now),
            config,
        };
        DB.set(database).map_err(|_| CoreError::fatal("database already initialized"))
    }

    pub fn global() -> &'static Database {
        DB.get().expect("Database::init must run before Database::global is called")
    }

    pub fn log(&self) -> &Pod<LogManager> {
        &self.log
    }

    pub fn transactions(&self) -> &Pod<TransactionTable> {
        &self.transactions
    }

    pub fn callbacks(&self) -> &Pod<RecoveryCallbackTable> {
        &self.callbacks
    }

    pub fn queries(&self) -> &Pod<QueryManager> {
        &self.queries
    }

    pub fn sessions(&self) -> &Pod<SessionStore> {
        &self.sessions
    }

    pub fn interrupts(&self) -> &InterruptCounter {
        &self.interrupts
    }

    pub fn shard_groups(&self) -> &ShardGroupOwnership {
        &self.shard_groups
    }

    pub fn clock(&self) -> &LogClock {
        &self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// spec §7's `get_pack_tran_table` boundary operation: one
    /// `QueryExecInfo` per live (non-`Null`) transaction.
    pub fn pack_tran_table(&self) -> Vec<QueryExecInfo> {
        let transactions = self.transactions.rl();
        let queries = self.queries.rl();
        transactions
            .live_indices()
            .into_iter()
            .filter_map(|index| transactions.get(index))
            .map(|tdes| queries.query_exec_info(tdes.trid))
            .collect()
    }
}
