//! Synchronization primitives for rawio.
//!
//! The current primitives include:
//! - [`ThreadLatch`] — publishes which OS thread is blocked in a wait, so
//!   another thread can interrupt exactly that wait with a signal.
//!
//! ## Design notes
//!
//! - The latch never spawns threads and never blocks for longer than a
//!   state transition, except for the shared hold kept while latched.
//! - Lock poisoning is ignored: the protected state is a pair of plain
//!   values that is always left consistent.

mod latch;

pub(crate) use latch::ThreadLatch;
