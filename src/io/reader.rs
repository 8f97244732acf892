use super::extract::{ExtractFd, extract_fd};
use crate::cancel::CancellationToken;
use crate::config;
use crate::error::{Error, Result};
use crate::poller::unix::{sys_close, sys_read, sys_set_nonblocking};
use crate::poller::{Events, Interest, Poller};
use crate::sync::ThreadLatch;

use log::{debug, trace, warn};
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::thread;

/// Descriptor value reported once the reader is closed.
const CLOSED_FD: RawFd = -1;

/// A reader whose blocking reads can be interrupted from other threads.
///
/// A read blocks the calling OS thread until data arrives, the peer hangs
/// up, the reader is [closed](Self::close) from another thread, or, with
/// [`read_with_cancellation`](Self::read_with_cancellation), the supplied
/// token is cancelled. Every outcome is one of:
///
/// - `Ok(n)` with `n` bytes read,
/// - [`Error::EndOfStream`] after close or hangup,
/// - [`Error::Cancelled`] with the token's reason,
/// - any other I/O or setup error.
///
/// The reader is `Sync` so it can be shared (for example in an `Arc`)
/// between the reading thread and the threads that close or cancel it.
/// Only one read may be in flight at a time: concurrent reads on the same
/// reader are not supported.
#[derive(Debug)]
pub struct RawReader {
    /// Descriptor and open flag. Read attempts hold it shared, close holds
    /// it exclusively, so a read never runs on a closed descriptor number.
    state: RwLock<Descriptor>,

    /// Publishes the thread blocked in a read, for close and cancellation.
    latch: ThreadLatch,
}

#[derive(Debug)]
struct Descriptor {
    fd: RawFd,
    open: bool,
}

impl RawReader {
    /// Creates a reader that owns `fd`.
    ///
    /// The descriptor is switched to non-blocking mode. Creating the first
    /// reader also fixes the process-wide notification signal (see
    /// [`set_notify_signal`](crate::set_notify_signal)).
    ///
    /// # Errors
    ///
    /// Fails if the descriptor cannot be made non-blocking or the signal
    /// handler cannot be installed. `fd` is closed in that case.
    pub fn new(fd: OwnedFd) -> Result<Self> {
        let signal = config::prepare()?;
        sys_set_nonblocking(fd.as_raw_fd())?;

        Ok(Self {
            state: RwLock::new(Descriptor {
                fd: fd.into_raw_fd(),
                open: true,
            }),
            latch: ThreadLatch::new(signal),
        })
    }

    /// Creates a reader from a duplicate of `source`'s descriptor.
    ///
    /// `source` is consumed; see [`extract_fd`].
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`extract_fd`] and [`RawReader::new`].
    pub fn extract_from<T: ExtractFd>(source: T) -> Result<Self> {
        Self::new(extract_fd(source)?)
    }

    /// Returns the descriptor, or `-1` once the reader is closed.
    pub fn fd(&self) -> RawFd {
        self.state().fd
    }

    /// Returns `true` once [`close`](Self::close) succeeded.
    pub fn is_closed(&self) -> bool {
        !self.state().open
    }

    /// Closes the reader.
    ///
    /// A read blocked in another thread returns [`Error::EndOfStream`].
    /// Closing an already closed reader does nothing and succeeds.
    ///
    /// # Errors
    ///
    /// Reports a failure of `close(2)` or of the signal delivery. The
    /// reader counts as closed either way.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if !state.open {
            return Ok(());
        }

        // The descriptor is released even when close(2) fails, so it is
        // never closed twice.
        let closed = sys_close(state.fd);
        debug!("closed fd={}", state.fd);

        state.fd = CLOSED_FD;
        state.open = false;

        // Signal only after the descriptor is gone, so the woken read sees it.
        let notified = self.latch.notify();

        closed?;
        notified?;
        Ok(())
    }

    /// Reads into `buffer`, blocking until data or end of stream.
    ///
    /// # Errors
    ///
    /// [`Error::EndOfStream`] if the reader is or becomes closed, or the
    /// peer hangs up; otherwise the underlying I/O error.
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        self.read_inner(None, buffer)
    }

    /// Like [`read`](Self::read), but also returns when `token` is cancelled.
    ///
    /// # Errors
    ///
    /// In addition to the errors of [`read`](Self::read), returns
    /// [`Error::Cancelled`] with the token's reason if cancellation
    /// interrupted the read.
    pub fn read_with_cancellation(
        &self,
        token: &CancellationToken,
        buffer: &mut [u8],
    ) -> Result<usize> {
        self.read_inner(Some(token), buffer)
    }

    fn read_inner(&self, token: Option<&CancellationToken>, buffer: &mut [u8]) -> Result<usize> {
        let cancelled = AtomicBool::new(false);

        let outcome = match token {
            None => self.read_loop(&cancelled, buffer),
            Some(token) => thread::scope(|s| {
                let (finished, finished_rx) = crossbeam_channel::bounded::<()>(0);
                let flag = &cancelled;

                s.spawn(move || self.watch(token, flag, &finished_rx));

                let outcome = self.read_loop(&cancelled, buffer);
                drop(finished);
                outcome
            }),
        };

        match outcome {
            Err(err) if err.is_retryable() => {
                if self.is_closed() {
                    return Err(Error::EndOfStream);
                }

                // The loop only gives up on a retryable error once closed or
                // cancelled, and a cancelled flag implies a token with a reason.
                Err(token
                    .and_then(CancellationToken::error)
                    .unwrap_or(Error::EndOfStream))
            }
            other => other,
        }
    }

    /// Waits for `token` on behalf of one read and interrupts it if fired.
    fn watch(
        &self,
        token: &CancellationToken,
        cancelled: &AtomicBool,
        finished: &crossbeam_channel::Receiver<()>,
    ) {
        if !token.wait(finished) {
            return;
        }

        cancelled.store(true, Ordering::SeqCst);
        debug!("read on fd={} cancelled", self.fd());

        if let Err(err) = self.latch.notify() {
            warn!("failed to interrupt read on fd={}: {}", self.fd(), err);
        }
    }

    fn read_loop(&self, cancelled: &AtomicBool, buffer: &mut [u8]) -> Result<usize> {
        let poller = self.register()?;
        let result = self.poll_read(&poller, cancelled, buffer);

        if let Err(err) = poller.close() {
            warn!("failed to release poller: {err}");
        }

        result
    }

    fn poll_read(
        &self,
        poller: &Poller,
        cancelled: &AtomicBool,
        buffer: &mut [u8],
    ) -> Result<usize> {
        loop {
            match self.attempt(buffer) {
                Err(err) if err.is_retryable() => {}
                other => return other,
            }

            let events = match self.wait(poller, cancelled) {
                Ok(events) => events,
                Err(err) if err.is_retryable() => {
                    if self.is_closed() || cancelled.load(Ordering::SeqCst) {
                        return Err(err);
                    }

                    // Some unrelated signal; the one-shot registration is
                    // still armed since nothing was delivered.
                    trace!("wait interrupted without cause, retrying");
                    continue;
                }
                Err(err) => return Err(err),
            };

            // With data still buffered, read it before reporting the hangup.
            if events.is_hangup() && !events.is_readable() {
                debug!("hangup reported: {events}");
                return Err(Error::EndOfStream);
            }

            self.rearm(poller)?;
        }
    }

    /// One non-blocking read attempt.
    fn attempt(&self, buffer: &mut [u8]) -> Result<usize> {
        let state = self.state();
        if !state.open {
            return Err(Error::EndOfStream);
        }

        let n = sys_read(state.fd, buffer);
        if n < 0 {
            return Err(io::Error::last_os_error().into());
        }

        if n == 0 && !buffer.is_empty() {
            return Err(Error::EndOfStream);
        }

        Ok(n as usize)
    }

    fn register(&self) -> Result<Poller> {
        let state = self.state();
        if !state.open {
            return Err(Error::EndOfStream);
        }

        Poller::new(state.fd, Interest::READ_HANGUP)
    }

    fn rearm(&self, poller: &Poller) -> Result<()> {
        let state = self.state();
        if !state.open {
            return Err(Error::EndOfStream);
        }

        poller.rearm()
    }

    /// Blocks in the poller with this thread latched.
    ///
    /// The close and cancellation checks happen after latching: a notifier
    /// that found the latch inactive has already published its state, and
    /// one that found it active has left the signal pending for the wait.
    fn wait(&self, poller: &Poller, cancelled: &AtomicBool) -> Result<Events> {
        let guard = self.latch.latch()?;

        if cancelled.load(Ordering::SeqCst) || self.is_closed() {
            return Err(io::Error::from(io::ErrorKind::Interrupted).into());
        }

        poller.wait(Some(guard.wait_mask()))
    }

    fn state(&self) -> RwLockReadGuard<'_, Descriptor> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RawReader {
    /// Closes the descriptor if it is still open.
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close reader: {err}");
        }
    }
}

impl AsRawFd for RawReader {
    fn as_raw_fd(&self) -> RawFd {
        self.fd()
    }
}

impl io::Read for &RawReader {
    /// Reads like [`RawReader::read`], reporting end of stream as `Ok(0)`.
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        match RawReader::read(self, buffer) {
            Err(Error::EndOfStream) => Ok(0),
            other => other.map_err(io::Error::from),
        }
    }
}

impl io::Read for RawReader {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buffer)
    }
}
