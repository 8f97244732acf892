//! Cancellation tokens for interruptible reads.
//!
//! A [`CancellationToken`] is shared between the thread performing a read
//! and any number of threads that may want to abort it. Cancelling the
//! token, or letting its deadline pass, makes every read currently using it
//! return [`Error::Cancelled`](crate::Error::Cancelled) with the token's
//! [`CancelReason`].
//!
//! ```rust,ignore
//! let token = CancellationToken::with_timeout(Duration::from_secs(5));
//! let n = reader.read_with_cancellation(&token, &mut buffer)?;
//! ```

use crate::error::Error;

use crossbeam_channel::{Receiver, Sender, select};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

/// Why a token was cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// [`CancellationToken::cancel`] was called.
    Cancelled,

    /// The token's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => f.write_str("cancelled"),
            CancelReason::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// A cloneable handle used to cancel reads from other threads.
///
/// Clones share the same state: cancelling one cancels all of them.
/// Cancellation is permanent.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    /// First reason recorded wins.
    reason: OnceLock<CancelReason>,

    /// Dropping the sender disconnects `done`, waking every watcher.
    trigger: Mutex<Option<Sender<()>>>,

    done: Receiver<()>,

    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Creates a token that is only cancelled explicitly.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a token that cancels itself at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    /// Creates a token that cancels itself once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (trigger, done) = crossbeam_channel::bounded(0);

        Self {
            inner: Arc::new(Inner {
                reason: OnceLock::new(),
                trigger: Mutex::new(Some(trigger)),
                done,
                deadline,
            }),
        }
    }

    /// Cancels the token.
    ///
    /// Returns `true` if this call performed the cancellation, `false` if
    /// the token was already cancelled or past its deadline.
    pub fn cancel(&self) -> bool {
        self.finish(CancelReason::Cancelled)
    }

    /// Returns `true` once the token is cancelled or its deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Returns why the token was cancelled, if it was.
    pub fn reason(&self) -> Option<CancelReason> {
        if let Some(reason) = self.inner.reason.get() {
            return Some(*reason);
        }

        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.finish(CancelReason::DeadlineExceeded);
                self.inner.reason.get().copied()
            }
            _ => None,
        }
    }

    /// Returns the error a read interrupted by this token reports.
    pub fn error(&self) -> Option<Error> {
        self.reason().map(Error::Cancelled)
    }

    /// The instant at which the token cancels itself, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    fn finish(&self, reason: CancelReason) -> bool {
        let first = self.inner.reason.set(reason).is_ok();

        self.inner
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        first
    }

    /// Blocks until the token fires or `finished` is signalled.
    ///
    /// Returns `true` if the token fired. `finished` completes when its
    /// sender is dropped.
    pub(crate) fn wait(&self, finished: &Receiver<()>) -> bool {
        let timer = match self.inner.deadline {
            Some(deadline) => crossbeam_channel::at(deadline),
            None => crossbeam_channel::never(),
        };

        select! {
            recv(self.inner.done) -> _ => true,
            recv(timer) -> _ => {
                self.finish(CancelReason::DeadlineExceeded);
                true
            }
            recv(finished) -> _ => false,
        }
    }
}

impl Default for CancellationToken {
    /// Creates a token without a deadline.
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn cancel_is_recorded_once() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.error().is_none());

        assert!(token.cancel());
        assert!(!token.clone().cancel());
        assert_eq!(token.reason(), Some(CancelReason::Cancelled));
        assert!(matches!(
            token.error(),
            Some(Error::Cancelled(CancelReason::Cancelled))
        ));
    }

    #[test]
    fn deadline_in_the_past_is_exceeded() {
        let token = CancellationToken::with_deadline(Instant::now());
        assert_eq!(token.reason(), Some(CancelReason::DeadlineExceeded));
        assert!(!token.cancel());
        assert_eq!(token.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn wait_returns_when_cancelled_from_another_thread() {
        let token = CancellationToken::new();
        let (_finished_tx, finished_rx) = crossbeam_channel::bounded::<()>(0);

        let canceller = token.clone();
        let handle = thread::spawn(move || canceller.cancel());

        assert!(token.wait(&finished_rx));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn wait_returns_on_deadline() {
        let token = CancellationToken::with_timeout(Duration::from_millis(20));
        let (_finished_tx, finished_rx) = crossbeam_channel::bounded::<()>(0);

        assert!(token.wait(&finished_rx));
        assert_eq!(token.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn wait_returns_when_finished() {
        let token = CancellationToken::new();
        let (finished_tx, finished_rx) = crossbeam_channel::bounded::<()>(0);
        drop(finished_tx);

        assert!(!token.wait(&finished_rx));
        assert!(!token.is_cancelled());
    }
}
