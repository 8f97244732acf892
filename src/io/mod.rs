//! Cancellable reads on raw descriptors.
//!
//! - [`RawReader`] — the reader itself.
//! - [`ExtractFd`] / [`extract_fd`] — obtaining an independently owned
//!   descriptor from an existing file, socket or pipe.

mod extract;
mod reader;

pub use extract::{ExtractFd, extract_fd};
pub use reader::RawReader;
