//! A track-level floppy disk driver for Amiga-style chipsets.
//!
//! A single reader task owns the drive. Callers queue requests to read a raw
//! track into a buffer and block until the disk DMA for it has completed.
//! Nothing above raw MFM words is handled here.

#[macro_use]
mod error;

mod buffer;
mod channel;
mod config;
mod driver;
mod hardware;
mod interrupt;
mod mechanics;
mod reader;
mod signal;
mod transfer;

pub use crate::buffer::TrackBuffer;
pub use crate::config::{FloppyConfig, DEFAULT_QUEUE_CAPACITY};
pub use crate::driver::{FloppyDriver, FloppyHandle};
pub use crate::error::{FloppyError, FloppyResult};
pub use crate::hardware::*;

/// Initialise logging for tests.
#[cfg(test)]
pub fn init_test_logging() {
    use simplelog::{Config, LevelFilter, TestLogger};

    // The logger can only be initialised once, but we don't know the order of
    // tests. Therefore we ignore the result.
    let _ = TestLogger::init(LevelFilter::Trace, Config::default());
}
