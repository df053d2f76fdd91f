//! Error types for the PCM device seam and the playback loop.
//!
//! Device results keep the negative-errno convention of PCM drivers so log
//! lines carry the same codes an operator would see from the driver itself.

use thiserror::Error;

/// Resource temporarily unavailable.
pub const EAGAIN: i32 = -11;
/// Broken pipe; PCM drivers report an xrun with this code.
pub const EPIPE: i32 = -32;
/// Generic I/O failure.
pub const EIO: i32 = -5;
/// File descriptor in bad state (stream already closed).
pub const EBADFD: i32 = -77;
/// Operation timed out.
pub const ETIMEDOUT: i32 = -110;

/// Result of a single device operation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PcmError {
    /// The device cannot take the request right now; retry without changing state.
    #[error("resource temporarily unavailable")]
    WouldBlock,
    /// The device queue ran dry before new data arrived.
    #[error("underrun occurred")]
    Underrun,
    /// Any other failure reported by the device.
    #[error("device error {code}: {message}")]
    Device { code: i32, message: String },
}

impl PcmError {
    /// Build an error from a negative driver code.
    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        match code {
            EAGAIN => PcmError::WouldBlock,
            EPIPE => PcmError::Underrun,
            _ => PcmError::Device {
                code,
                message: message.into(),
            },
        }
    }

    /// Negative errno-style code for logging.
    pub fn code(&self) -> i32 {
        match self {
            PcmError::WouldBlock => EAGAIN,
            PcmError::Underrun => EPIPE,
            PcmError::Device { code, .. } => *code,
        }
    }
}

/// Conditions that end a playback session after setup succeeded.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// A busy-poll loop hit the configured spin bound.
    #[error("iteration {iteration}: device stayed unavailable for {spins} consecutive retries")]
    SpinLimitExceeded { iteration: u64, spins: u64 },
    /// Too many consecutive write passes made no progress.
    #[error("iteration {iteration}: {failures} consecutive writes made no progress (last: {last})")]
    TooManyFailures {
        iteration: u64,
        failures: u32,
        last: String,
    },
}
