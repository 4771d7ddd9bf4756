use std::time::Duration;

use crate::hardware::RAW_TRACK_WORDS;

/// Default capacity of the request channel.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Timings and limits for a driver instance. The defaults are what a real
/// drive needs; tests and the simulator may shorten the idle timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloppyConfig {
    /// Settle after each step pulse.
    pub step_settle_ms: u32,
    /// Settle after changing step direction.
    pub direction_settle_ms: u32,
    /// Settle after every seek, before the transfer starts.
    pub disk_settle_ms: u32,
    /// How long the reader may sit idle before the motor is switched off.
    pub idle_timeout: Duration,
    /// Maximum number of queued requests before callers block.
    pub queue_capacity: usize,
    /// Words transferred per track read.
    pub track_words: usize,
}

impl Default for FloppyConfig {
    fn default() -> Self {
        FloppyConfig {
            step_settle_ms: 3,
            direction_settle_ms: 18,
            disk_settle_ms: 15,
            idle_timeout: Duration::from_millis(1000),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            track_words: RAW_TRACK_WORDS,
        }
    }
}
