use std::{
    ops::Deref,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// copy from https://github.com/tikv/tikv/blob/b15ea3b1cd766375cb52019e35c195ed797124df/components/tikv_util/src/lib.rs#L171-L186
///
/// A handy shortcut to replace the `RwLock` write/read().unwrap() pattern
/// with `wl`/`rl`.
pub trait HandyRwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T>;
    fn rl(&self) -> RwLockReadGuard<'_, T>;
}

impl<T> HandyRwLock<T> for RwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap()
    }

    fn rl(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap()
    }
}

/// Inspect a lock's contention state without blocking; traced by the
/// daemons right before they take one of `Database`'s locks.
pub fn lock_state<T>(lock: impl Deref<Target = RwLock<T>>) -> String {
    let is_read: bool = lock.try_read().is_err();
    let is_write: bool = lock.try_write().is_err();
    let is_poisoned: bool = lock.is_poisoned();
    format!("[r: {}, w: {}, p: {}]", is_read, is_write, is_poisoned)
}

/// Route log output through `env_logger`, honoring `RUST_LOG`. Safe to call
/// more than once from concurrent test threads; callers guard it with a
/// `Once` so the global logger is only installed a single time per process.
pub fn init_log() {
    use std::io::Write;

    let mut builder = env_logger::Builder::from_default_env();
    builder
        .format_timestamp_secs()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} - {}] [{}:{}] {}",
                record.level(),
                record.target(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();
}

/// Monotonic millisecond clock backed by a process-start `Instant`.
///
/// `query_timeout` and session `last_access_time` are specified as
/// absolute epoch milliseconds refreshed by a background clock every
/// 200ms (see `daemons::log_clock_daemon`); this gives every component a
/// cheap, lock-free way to read "now" without hitting the OS clock on
/// every poll.
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
