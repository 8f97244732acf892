//! Linux `epoll`-based single-descriptor poller.
//!
//! Unlike a reactor poller, this one watches exactly one descriptor and
//! is created fresh for every blocking read. Registration is always
//! edge-triggered and one-shot: after each delivered event the caller
//! consumes the readiness and calls [`Poller::rearm`] before waiting again.

use super::common::{Events, Interest};
use crate::error::{ProtocolError, Result};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_MOD, EPOLLET, EPOLLONESHOT, epoll_create1, epoll_ctl,
    epoll_event, epoll_pwait, sigset_t,
};
use log::trace;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::ptr;

/// One `epoll` instance bound to one descriptor and interest set.
#[derive(Debug)]
pub(crate) struct Poller {
    /// Epoll file descriptor, released on drop.
    epoll: OwnedFd,

    /// Descriptor being watched. Also stored in every event's data field.
    fd: RawFd,

    /// Interest bits, without the mode flags.
    interest: Interest,
}

impl Poller {
    /// Creates an epoll instance and registers `fd` with it.
    ///
    /// If registration fails the epoll instance is released before the
    /// error is returned.
    pub(crate) fn new(fd: RawFd, interest: Interest) -> Result<Self> {
        let raw = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error().into());
        }

        // SAFETY: `raw` was just returned by `epoll_create1`.
        let epoll = unsafe { OwnedFd::from_raw_fd(raw) };
        let poller = Self {
            epoll,
            fd,
            interest,
        };

        poller.ctl(EPOLL_CTL_ADD)?;
        Ok(poller)
    }

    /// Re-enables notifications after a one-shot event was delivered.
    pub(crate) fn rearm(&self) -> Result<()> {
        self.ctl(EPOLL_CTL_MOD)
    }

    fn ctl(&self, op: i32) -> Result<()> {
        let mut event = self.event();

        let rc = unsafe { epoll_ctl(self.epoll.as_raw_fd(), op, self.fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(())
    }

    fn event(&self) -> epoll_event {
        epoll_event {
            events: (EPOLLET | EPOLLONESHOT) as u32 | self.interest.bits(),
            u64: self.fd as u64,
        }
    }

    /// Blocks until the descriptor reports readiness or a signal arrives.
    ///
    /// `sigmask`, when given, is the signal mask in effect for the
    /// duration of the wait only (see `epoll_pwait(2)`). An interrupted wait
    /// comes back as an `Interrupted` I/O error for the caller to classify.
    pub(crate) fn wait(&self, sigmask: Option<&sigset_t>) -> Result<Events> {
        trace!(
            "waiting on fd={} for {}",
            self.fd,
            Events(self.interest.bits())
        );

        let mut events = [epoll_event { events: 0, u64: 0 }];
        let mask = sigmask.map_or(ptr::null(), |m| m as *const sigset_t);

        let n = unsafe {
            epoll_pwait(
                self.epoll.as_raw_fd(),
                events.as_mut_ptr(),
                events.len() as i32,
                -1,
                mask,
            )
        };

        if n < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let event = events[0];
        let (bits, data) = (event.events, event.u64);
        trace!("fd={} delivered {} event(s): {}", data, n, Events(bits));

        Ok(validate(self.fd, n, bits, data)?)
    }

    /// Releases the epoll instance, reporting a failed `close(2)`.
    pub(crate) fn close(self) -> io::Result<()> {
        super::unix::sys_close(self.epoll.into_raw_fd())
    }
}

/// Checks a raw `epoll_pwait` result against the single bound descriptor.
///
/// With an infinite timeout and room for one event, anything other than
/// one event carrying our own descriptor means the registration is not
/// what we think it is.
fn validate(fd: RawFd, n: i32, bits: u32, data: u64) -> std::result::Result<Events, ProtocolError> {
    if n != 1 {
        return Err(ProtocolError::EventCount(n));
    }

    let found = data as RawFd;
    if found != fd {
        return Err(ProtocolError::Descriptor {
            expected: fd,
            found,
        });
    }

    Ok(Events(bits))
}
