use libc::{
    F_DUPFD_CLOEXEC, F_GETFL, F_SETFL, O_NONBLOCK, SIG_BLOCK, SIG_SETMASK, c_int, close, fcntl,
    pid_t, pthread_sigmask, read, sigaddset, sigdelset, sigemptyset, sigset_t,
};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::{io, mem, ptr};

/// Reads from a file descriptor into the given buffer.
///
/// Returns the number of bytes read, or a negative value on error.
/// The file descriptor **must** be non-blocking.
pub(crate) fn sys_read(fd: RawFd, buffer: &mut [u8]) -> isize {
    unsafe { read(fd, buffer.as_mut_ptr() as *mut _, buffer.len()) }
}

/// Closes a file descriptor, reporting the failure of `close(2)`.
pub(crate) fn sys_close(fd: RawFd) -> io::Result<()> {
    let rc = unsafe { close(fd) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Sets a file descriptor to non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Duplicates a descriptor; the copy has `FD_CLOEXEC` set.
pub(crate) fn sys_dup(fd: RawFd) -> io::Result<OwnedFd> {
    let dup = unsafe { fcntl(fd, F_DUPFD_CLOEXEC, 0) };
    if dup < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `dup` was just returned by the kernel and is owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(dup) })
}

/// Returns the kernel thread id of the calling thread.
pub(crate) fn sys_gettid() -> pid_t {
    unsafe { libc::syscall(libc::SYS_gettid) as pid_t }
}

/// Sends `signal` to thread `tid` of this process.
pub(crate) fn sys_tgkill(tid: pid_t, signal: c_int) -> io::Result<()> {
    let rc = unsafe { libc::syscall(libc::SYS_tgkill, libc::getpid(), tid, signal) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Blocks `signal` on the calling thread.
///
/// Returns the mask that was in effect before the call.
pub(crate) fn sys_block_signal(signal: c_int) -> io::Result<sigset_t> {
    unsafe {
        let mut set: sigset_t = mem::zeroed();
        let mut previous: sigset_t = mem::zeroed();
        sigemptyset(&mut set);
        sigaddset(&mut set, signal);

        let rc = pthread_sigmask(SIG_BLOCK, &set, &mut previous);
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }

        Ok(previous)
    }
}

/// Restores a signal mask previously returned by [`sys_block_signal`].
pub(crate) fn sys_restore_sigmask(mask: &sigset_t) -> io::Result<()> {
    let rc = unsafe { pthread_sigmask(SIG_SETMASK, mask, ptr::null_mut()) };
    if rc != 0 {
        Err(io::Error::from_raw_os_error(rc))
    } else {
        Ok(())
    }
}

/// Returns a copy of `mask` with `signal` removed.
pub(crate) fn sigmask_without(mask: &sigset_t, signal: c_int) -> sigset_t {
    let mut copy = *mask;
    unsafe { sigdelset(&mut copy, signal) };
    copy
}

/// Reports whether `signal` is a member of `mask`.
#[cfg(test)]
pub(crate) fn sigmask_contains(mask: &sigset_t, signal: c_int) -> bool {
    unsafe { libc::sigismember(mask, signal) == 1 }
}

/// Creates a pipe whose both ends are close-on-exec.
#[cfg(test)]
pub(crate) fn sys_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as c_int; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: both descriptors were just created by `pipe2`.
    unsafe { Ok((OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))) }
}
