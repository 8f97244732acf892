//! # rawio
//!
//! **rawio** performs blocking reads on raw file descriptors (pipes,
//! sockets, character devices) that another thread can interrupt, either
//! by closing the reader or by cancelling a [`CancellationToken`].
//!
//! A blocked read really blocks its OS thread in `epoll_pwait`. To wake it,
//! another thread sends a signal to exactly that thread. The crate makes
//! the handoff race-free: a signal is either delivered while the reading
//! thread is latched on the wait, or not sent at all, never aimed at a
//! thread that has moved on.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rawio::{CancellationToken, Error, RawReader};
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//!
//! let reader = Arc::new(RawReader::extract_from(stream)?);
//! let token = CancellationToken::with_timeout(Duration::from_secs(1));
//!
//! let mut buffer = [0u8; 1024];
//! match reader.read_with_cancellation(&token, &mut buffer) {
//!     Ok(n) => println!("read {n} bytes"),
//!     Err(Error::EndOfStream) => println!("closed"),
//!     Err(Error::Cancelled(reason)) => println!("gave up: {reason}"),
//!     Err(err) => return Err(err),
//! }
//! ```
//!
//! ## Modules
//!
//! - [`io`] — the reader and descriptor extraction
//! - [`cancel`] — cancellation tokens
//! - [`config`] — the process-wide notification signal
//!
//! ## Platform
//!
//! Linux only: the crate relies on `epoll` and on `tgkill(2)`.

#[cfg(not(target_os = "linux"))]
compile_error!("rawio only supports Linux");

mod error;
mod poller;
mod sync;

pub mod cancel;
pub mod config;
pub mod io;

pub use cancel::{CancelReason, CancellationToken};
pub use config::{DEFAULT_NOTIFY_SIGNAL, notify_signal, set_notify_signal};
pub use error::{Error, ProtocolError, Result, is_retryable};
pub use io::{ExtractFd, RawReader, extract_fd};
