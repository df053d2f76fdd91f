//! The device seam used by the playback loop.

use crate::error::PcmError;

/// An opened PCM playback handle with queue semantics.
///
/// Frames are interleaved signed 16-bit little-endian; the frame width is fixed
/// when the device is opened.
pub trait PcmDevice {
    /// Frames the device queue can accept right now.
    fn avail(&mut self) -> Result<usize, PcmError>;

    /// Queue whole frames from `frames`. Returns the number of frames accepted,
    /// which may be fewer than offered.
    fn write_interleaved(&mut self, frames: &[u8]) -> Result<usize, PcmError>;

    /// Reset the device to a writable state after an underrun.
    fn prepare(&mut self) -> Result<(), PcmError>;

    /// Block until everything already queued has been played.
    fn drain(&mut self) -> Result<(), PcmError>;

    /// Release the handle.
    fn close(self) -> Result<(), PcmError>
    where
        Self: Sized;
}
