//! Single-descriptor readiness polling.
//!
//! This module wraps the OS readiness mechanism used while a read is
//! blocked, together with the thin syscall wrappers the rest of the crate
//! relies on.
//!
//! Only Linux `epoll` is supported: cancellation depends on delivering a
//! signal to one specific kernel thread, which is a Linux facility.

pub(crate) mod common;
pub(crate) mod unix;

mod epoll;

pub(crate) use common::{Events, Interest};
pub(crate) use epoll::Poller;
