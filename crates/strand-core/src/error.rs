//! Error types for the strand scheduler and reactor

use core::fmt;
use nix::errno::Errno;

/// Result type for scheduler and reactor operations
pub type StrandResult<T> = Result<T, StrandError>;

/// Errors that can occur in scheduler and reactor operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrandError {
    /// Zero capacity, out-of-range token, release without acquire
    InvalidArgument(&'static str),

    /// Stack region or frame table could not be allocated
    AllocationFailure,

    /// Frame table is full
    CapacityExceeded,

    /// No free token in the reactor pool
    PoolExhausted,

    /// Submission queue rejected the entry
    SubmissionFailure,

    /// io_uring setup/enter failed (errno)
    PrimitiveFailure(i32),

    /// I/O operation completed with a negative result
    Io(Errno),

    /// Suspending operation called outside a task
    NotInTask,

    /// Operation not valid in the executor's current state
    InvalidState,

    /// Rejected configuration
    Config(ConfigError),
}

impl StrandError {
    /// Build from a negative completion result (`-errno`)
    #[inline]
    pub fn from_result(res: i64) -> Self {
        StrandError::Io(Errno::from_raw((-res) as i32))
    }

    /// Build from an `std::io::Error` returned by the ring
    pub fn primitive(e: &std::io::Error) -> Self {
        StrandError::PrimitiveFailure(e.raw_os_error().unwrap_or(-1))
    }

    /// Errno behind this error, if it has one
    pub fn errno(&self) -> Option<Errno> {
        match self {
            StrandError::Io(e) => Some(*e),
            StrandError::PrimitiveFailure(code) => Some(Errno::from_raw(*code)),
            _ => None,
        }
    }
}

impl fmt::Display for StrandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrandError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            StrandError::AllocationFailure => write!(f, "allocation failed"),
            StrandError::CapacityExceeded => write!(f, "frame capacity exceeded"),
            StrandError::PoolExhausted => write!(f, "token pool exhausted"),
            StrandError::SubmissionFailure => write!(f, "submission queue full"),
            StrandError::PrimitiveFailure(code) => {
                write!(f, "io_uring failure: {}", Errno::from_raw(*code))
            }
            StrandError::Io(e) => write!(f, "i/o error: {}", e),
            StrandError::NotInTask => write!(f, "not called from a task"),
            StrandError::InvalidState => write!(f, "invalid executor state"),
            StrandError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StrandError {}

impl From<ConfigError> for StrandError {
    fn from(e: ConfigError) -> Self {
        StrandError::Config(e)
    }
}

impl From<Errno> for StrandError {
    fn from(e: Errno) -> Self {
        StrandError::Io(e)
    }
}

impl From<StrandError> for std::io::Error {
    fn from(e: StrandError) -> Self {
        match e.errno() {
            Some(errno) => std::io::Error::from_raw_os_error(errno as i32),
            None => std::io::Error::other(e),
        }
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = StrandError::CapacityExceeded;
        assert_eq!(format!("{}", e), "frame capacity exceeded");

        let e = StrandError::Config(ConfigError::InvalidValue("frame_count must be > 0"));
        assert_eq!(format!("{}", e), "Invalid config: frame_count must be > 0");
    }

    #[test]
    fn test_from_negative_result() {
        let e = StrandError::from_result(-(Errno::ECONNRESET as i64));
        assert_eq!(e, StrandError::Io(Errno::ECONNRESET));
        assert_eq!(e.errno(), Some(Errno::ECONNRESET));
    }

    #[test]
    fn test_into_io_error() {
        let io: std::io::Error = StrandError::Io(Errno::EPIPE).into();
        assert_eq!(io.raw_os_error(), Some(Errno::EPIPE as i32));

        let io: std::io::Error = StrandError::PoolExhausted.into();
        assert_eq!(io.kind(), std::io::ErrorKind::Other);
    }
}
