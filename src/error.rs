//! Error types returned by rawio.

use crate::cancel::CancelReason;

use libc::c_int;
use std::io;
use std::os::fd::RawFd;
use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while setting up or performing a cancellable read.
#[derive(Error, Debug)]
pub enum Error {
    /// The descriptor was closed, or its peer hung up.
    #[error("end of stream")]
    EndOfStream,

    /// The read was interrupted because its cancellation token fired.
    #[error("read cancelled: {0}")]
    Cancelled(CancelReason),

    /// The readiness wait returned something it never should.
    ///
    /// This is not retryable; it indicates the poller and the kernel
    /// disagree about what is registered.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The object handed to [`extract_fd`](crate::extract_fd) exposes no descriptor.
    #[error("no manner to discern file descriptor from object")]
    NoDescriptor,

    /// The requested notification signal cannot be used.
    #[error("invalid notification signal {0}")]
    InvalidSignal(c_int),

    /// The notification signal was already fixed by an earlier call or by use.
    #[error("notification signal already fixed to {0}")]
    SignalFixed(c_int),

    /// Any other OS-level failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Inconsistent results from a readiness wait.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The wait reported a number of events other than one.
    #[error("readiness wait returned {0} events, expected exactly 1")]
    EventCount(i32),

    /// The delivered event belongs to a different descriptor.
    #[error("readiness event for fd {found}, expected fd {expected}")]
    Descriptor { expected: RawFd, found: RawFd },
}

impl Error {
    /// Returns `true` for the end-of-stream condition.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }

    /// Returns `true` if a cancellation token interrupted the operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// Returns `true` for the transient "would block" / "interrupted" conditions.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Io(err) => is_retryable(err),
            _ => false,
        }
    }
}

/// Returns `true` if `err` signals that the operation should simply be tried again.
pub fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            Error::EndOfStream => io::Error::from(io::ErrorKind::UnexpectedEof),
            Error::Protocol(err) => io::Error::new(io::ErrorKind::InvalidData, err),
            Error::NoDescriptor => io::Error::new(io::ErrorKind::Unsupported, err),
            Error::InvalidSignal(_) | Error::SignalFixed(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            Error::Cancelled(_) => io::Error::other(err),
        }
    }
}
