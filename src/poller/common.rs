use libc::{
    EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLONESHOT, EPOLLOUT, EPOLLPRI, EPOLLRDHUP,
    EPOLLWAKEUP, c_int,
};
use std::fmt;

/// Readiness a [`Poller`](super::Poller) registers for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
    pub(crate) hangup: bool,
}

impl Interest {
    /// Read readiness plus peer hangup; what a reader waits for.
    pub(crate) const READ_HANGUP: Interest = Interest {
        read: true,
        write: false,
        hangup: true,
    };

    /// Converts the interest to its epoll bits, without mode flags.
    pub(crate) fn bits(self) -> u32 {
        let mut flags = 0;

        if self.read {
            flags |= EPOLLIN;
        }
        if self.write {
            flags |= EPOLLOUT;
        }
        if self.hangup {
            flags |= EPOLLRDHUP;
        }

        flags as u32
    }
}

/// Event bits delivered by a readiness wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) struct Events(pub(crate) u32);

const NAMES: [(c_int, &str); 9] = [
    (EPOLLERR, "EPOLLERR"),
    (EPOLLET, "EPOLLET"),
    (EPOLLHUP, "EPOLLHUP"),
    (EPOLLIN, "EPOLLIN"),
    (EPOLLONESHOT, "EPOLLONESHOT"),
    (EPOLLOUT, "EPOLLOUT"),
    (EPOLLPRI, "EPOLLPRI"),
    (EPOLLRDHUP, "EPOLLRDHUP"),
    (EPOLLWAKEUP, "EPOLLWAKEUP"),
];

impl Events {
    pub(crate) fn has(self, flags: u32) -> bool {
        self.0 & flags != 0
    }

    pub(crate) fn is_readable(self) -> bool {
        self.has(EPOLLIN as u32)
    }

    /// Either side of the descriptor was shut down.
    pub(crate) fn is_hangup(self) -> bool {
        self.has((EPOLLHUP | EPOLLRDHUP) as u32)
    }
}

impl fmt::Display for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;

        for (flag, name) in NAMES {
            if self.has(flag as u32) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }

        Ok(())
    }
}
