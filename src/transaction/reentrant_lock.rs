use std::{
    sync::{Condvar, Mutex},
    thread::{self, ThreadId},
};

/// The per-descriptor reentrant mutex (spec §4.2 / design note): recovery
/// and query-termination paths recursively re-enter descriptor
/// operations, so a plain mutex would deadlock a thread against itself.
///
/// Tracks `(owner, depth)` above a `Mutex`+`Condvar`, per the design
/// note's suggested safe reimplementation.
pub struct ReentrantLock {
    state: Mutex<State>,
    not_busy: Condvar,
}

struct State {
    owner: Option<ThreadId>,
    lock_count: u32,
    n_waiters: u32,
}

pub struct ReentrantGuard<'a> {
    lock: &'a ReentrantLock,
}

impl ReentrantLock {
    pub fn new() -> Self {
        ReentrantLock {
            state: Mutex::new(State {
                owner: None,
                lock_count: 0,
                n_waiters: 0,
            }),
            not_busy: Condvar::new(),
        }
    }

    pub fn acquire(&self) -> ReentrantGuard<'_> {
        let me = thread::current().id();
        let mut guard = self.state.lock().unwrap();

        if guard.owner == Some(me) {
            guard.lock_count += 1;
            return ReentrantGuard { lock: self };
        }

        guard.n_waiters += 1;
        while guard.lock_count > 0 {
            guard = self.not_busy.wait(guard).unwrap();
        }
        guard.n_waiters -= 1;
        guard.owner = Some(me);
        guard.lock_count = 1;

        ReentrantGuard { lock: self }
    }

    fn release(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.lock_count -= 1;
        if guard.lock_count == 0 {
            guard.owner = None;
            self.not_busy.notify_one();
        }
    }

    pub fn n_waiters(&self) -> u32 {
        self.state.lock().unwrap().n_waiters
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().unwrap().owner == Some(thread::current().id())
    }
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Drop for ReentrantGuard<'a> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
