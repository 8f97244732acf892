use crate::error::{Error, Result};
use crate::poller::unix::sys_dup;

use std::fs::File;
use std::net::{TcpStream, UdpSocket};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::process::{ChildStderr, ChildStdout};

/// Objects that may expose a descriptor to read from.
///
/// Types without a usable descriptor keep the default implementation,
/// which makes [`extract_fd`] fail with [`Error::NoDescriptor`].
pub trait ExtractFd {
    /// Returns the descriptor to duplicate, if there is one.
    fn extractable_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }
}

macro_rules! extractable {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ExtractFd for $ty {
                fn extractable_fd(&self) -> Option<BorrowedFd<'_>> {
                    Some(self.as_fd())
                }
            }
        )*
    };
}

extractable!(
    File,
    TcpStream,
    UdpSocket,
    UnixStream,
    UnixDatagram,
    ChildStdout,
    ChildStderr,
    OwnedFd,
);

/// Takes an independently owned duplicate of `source`'s descriptor.
///
/// On success `source` is dropped, which closes its own descriptor, and
/// only the returned duplicate stays open. If `source` exposes no
/// descriptor nothing is duplicated and [`Error::NoDescriptor`] is
/// returned; `source` is dropped either way.
///
/// # Errors
///
/// [`Error::NoDescriptor`] as described above, or [`Error::Io`] if the
/// duplication fails.
pub fn extract_fd<T: ExtractFd>(source: T) -> Result<OwnedFd> {
    let Some(fd) = source.extractable_fd() else {
        return Err(Error::NoDescriptor);
    };

    let dup = sys_dup(fd.as_raw_fd())?;
    drop(source);

    Ok(dup)
}
