use crate::poller::unix::{
    sigmask_without, sys_block_signal, sys_gettid, sys_restore_sigmask, sys_tgkill,
};

use libc::{c_int, pid_t, sigset_t};
use log::{trace, warn};
use std::fmt;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Publishes which OS thread, if any, is blocked waiting on a poller.
///
/// The latch lets another thread deliver the notification signal to
/// exactly the thread that is blocked, and to nobody otherwise.
///
/// Two locks are involved:
/// - `short` serializes whole `latch()` / `unlatch()` sequences so their
///   transitions never interleave.
/// - `long` guards the published binding. Transitions take it exclusively;
///   [`notify`](Self::notify) takes it shared, so it sees either the old
///   binding or the new one in full. While latched, the blocked thread
///   keeps a shared hold, which keeps the binding stable for notifiers.
///
/// Only one thread may be latched at a time. Latching the same instance
/// from two threads concurrently is a usage error.
pub(crate) struct ThreadLatch {
    signal: c_int,
    short: Mutex<()>,
    long: RwLock<Binding>,
}

/// The thread currently latched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Binding {
    active: bool,
    /// Kernel thread id; meaningful only while `active`.
    tid: pid_t,
}

impl ThreadLatch {
    /// Creates an inactive latch that interrupts waits with `signal`.
    pub(crate) fn new(signal: c_int) -> Self {
        Self {
            signal,
            short: Mutex::new(()),
            long: RwLock::new(Binding::default()),
        }
    }

    /// Binds the calling thread to the latch until the guard is dropped.
    ///
    /// The notification signal is blocked on this thread while latched; the
    /// wait must run with [`LatchGuard::wait_mask`] so the signal can only
    /// land inside it. A signal sent before the wait starts stays pending
    /// and interrupts the wait as soon as it begins.
    pub(crate) fn latch(&self) -> io::Result<LatchGuard<'_>> {
        let _short = lock(&self.short);

        let previous = self.activate()?;
        let hold = self.long.read().unwrap_or_else(PoisonError::into_inner);

        Ok(LatchGuard {
            latch: self,
            hold: Some(hold),
            wait_mask: sigmask_without(&previous, self.signal),
            previous,
        })
    }

    fn activate(&self) -> io::Result<sigset_t> {
        let mut binding = self.write();

        let previous = sys_block_signal(self.signal)?;
        *binding = Binding {
            active: true,
            tid: sys_gettid(),
        };

        Ok(previous)
    }

    fn unlatch(&self, hold: Option<RwLockReadGuard<'_, Binding>>, previous: &sigset_t) {
        let _short = lock(&self.short);

        drop(hold);
        self.deactivate(previous);
    }

    fn deactivate(&self, previous: &sigset_t) {
        let mut binding = self.write();

        if let Err(err) = sys_restore_sigmask(previous) {
            warn!("failed to restore signal mask of thread {}: {}", binding.tid, err);
        }
        *binding = Binding::default();
    }

    /// Interrupts the latched thread's wait by sending it the signal.
    ///
    /// Succeeds without doing anything when no thread is latched, or when
    /// the latched thread is the caller itself.
    pub(crate) fn notify(&self) -> io::Result<()> {
        let binding = self.long.read().unwrap_or_else(PoisonError::into_inner);

        if !binding.active {
            return Ok(());
        }

        if binding.tid == sys_gettid() {
            return Ok(());
        }

        trace!("sending signal {} to thread {}", self.signal, binding.tid);
        sys_tgkill(binding.tid, self.signal)
    }

    /// Returns `true` while a thread is latched.
    pub(crate) fn is_active(&self) -> bool {
        self.long
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
    }

    fn write(&self) -> RwLockWriteGuard<'_, Binding> {
        self.long.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ThreadLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLatch")
            .field("signal", &self.signal)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Keeps the calling thread latched; dropping it unlatches.
pub(crate) struct LatchGuard<'a> {
    latch: &'a ThreadLatch,
    hold: Option<RwLockReadGuard<'a, Binding>>,
    previous: sigset_t,
    wait_mask: sigset_t,
}

impl LatchGuard<'_> {
    /// The signal mask the blocking wait must run with.
    pub(crate) fn wait_mask(&self) -> &sigset_t {
        &self.wait_mask
    }
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.latch.unlatch(self.hold.take(), &self.previous);
    }
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
