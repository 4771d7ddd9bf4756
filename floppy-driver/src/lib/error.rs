use std::fmt;
use std::io;

/// Errors surfaced by the driver's public interface.
#[derive(Debug)]
pub enum FloppyError {
    /// The reader task couldn't be created.
    Spawn(io::Error),
    /// The requested track doesn't exist on the disk.
    InvalidTrack(u16),
    /// The buffer can't hold a whole track.
    BufferTooSmall { needed: usize, actual: usize },
    /// The reader task has been killed (or died).
    DriverStopped,
    /// Homing gave up without the track 0 sensor ever asserting.
    Track0NotFound { steps: u16 },
    Io(io::Error),
}

/// Result type alias.
pub type FloppyResult<T> = Result<T, FloppyError>;

impl fmt::Display for FloppyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloppyError::Spawn(e) => write!(f, "Failed to start floppy reader task: {}", e),
            FloppyError::InvalidTrack(track) => write!(f, "No such track: {}", track),
            FloppyError::BufferTooSmall { needed, actual } =>
                write!(f, "Track buffer holds {} words but {} are needed", actual, needed),
            FloppyError::DriverStopped => write!(f, "Floppy driver is not running"),
            FloppyError::Track0NotFound { steps } =>
                write!(f, "Track 0 not found after {} steps", steps),
            FloppyError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for FloppyError {}

/// Convert IO errors to floppy errors.
impl From<io::Error> for FloppyError {
    fn from(e: io::Error) -> Self {
        FloppyError::Io(e)
    }
}

/// Return an error if the provided condition is false.
macro_rules! assert_or_error {
    ($condition:expr, $error:expr) => {{
        if !$condition {
            return Err($error);
        }
    }}
}
