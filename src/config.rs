//! Process-wide configuration of the notification signal.
//!
//! A blocked read is interrupted by sending one signal to the thread that
//! is blocked. Which signal is a process-wide choice: it defaults to
//! [`DEFAULT_NOTIFY_SIGNAL`] and may be changed once with
//! [`set_notify_signal`], before the first [`RawReader`](crate::RawReader)
//! is created. After that the value is fixed.
//!
//! The first reader also makes sure the signal interrupts instead of
//! killing the process: if its disposition is the default or "ignore", a
//! handler that does nothing is installed. A handler the application
//! already installed is left alone.

use crate::error::{Error, Result};

use libc::{SIG_DFL, SIG_IGN, SIGKILL, SIGSTOP, c_int, sigaction, sigemptyset};
use log::debug;
use std::io;
use std::sync::OnceLock;
use std::{mem, ptr};

/// Signal used to interrupt blocked reads unless configured otherwise.
pub const DEFAULT_NOTIFY_SIGNAL: c_int = libc::SIGIO;

/// First real-time signal number; the C library keeps a few of them.
const RESERVED_RT_BASE: c_int = 32;

static NOTIFY_SIGNAL: OnceLock<c_int> = OnceLock::new();

/// Outcome of installing the handler, as an OS error code.
static HANDLER: OnceLock<std::result::Result<(), i32>> = OnceLock::new();

/// Chooses the signal used to interrupt blocked reads.
///
/// # Errors
///
/// Returns [`Error::InvalidSignal`] for signals that cannot be caught or
/// do not exist, and [`Error::SignalFixed`] if a signal was already set or
/// a reader already exists.
pub fn set_notify_signal(signal: c_int) -> Result<()> {
    if signal <= 0 || signal > libc::SIGRTMAX() || signal == SIGKILL || signal == SIGSTOP {
        return Err(Error::InvalidSignal(signal));
    }

    // Real-time signals below SIGRTMIN are reserved by the C library.
    if (RESERVED_RT_BASE..libc::SIGRTMIN()).contains(&signal) {
        return Err(Error::InvalidSignal(signal));
    }

    NOTIFY_SIGNAL
        .set(signal)
        .map_err(|_| Error::SignalFixed(notify_signal()))
}

/// Returns the notification signal, fixing it if it was not yet.
pub fn notify_signal() -> c_int {
    *NOTIFY_SIGNAL.get_or_init(|| DEFAULT_NOTIFY_SIGNAL)
}

/// Fixes the notification signal and installs its handler if needed.
///
/// Called whenever a reader is created; only the first call does work.
pub(crate) fn prepare() -> Result<c_int> {
    let signal = notify_signal();

    let installed = *HANDLER
        .get_or_init(|| install_handler(signal).map_err(|err| err.raw_os_error().unwrap_or(0)));
    installed.map_err(|code| Error::Io(io::Error::from_raw_os_error(code)))?;

    Ok(signal)
}

extern "C" fn interrupt(_: c_int) {}

fn install_handler(signal: c_int) -> io::Result<()> {
    unsafe {
        let mut current: libc::sigaction = mem::zeroed();
        if sigaction(signal, ptr::null(), &mut current) < 0 {
            return Err(io::Error::last_os_error());
        }

        if current.sa_sigaction != SIG_DFL && current.sa_sigaction != SIG_IGN {
            debug!("signal {signal} already handled, keeping existing handler");
            return Ok(());
        }

        // No SA_RESTART: the point is to make the wait fail with EINTR.
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = interrupt as extern "C" fn(c_int) as libc::sighandler_t;
        sigemptyset(&mut action.sa_mask);

        if sigaction(signal, &action, ptr::null_mut()) < 0 {
            return Err(io::Error::last_os_error());
        }
    }

    debug!("installed interrupt handler for signal {signal}");
    Ok(())
}
