//! Period geometry, the reusable frame buffer and the per-period write cursor.
//!
//! All byte arithmetic goes through [`Period::bytes_per_frame`], which is derived
//! from the negotiated channel count and sample width.

/// Bytes per sample for signed 16-bit PCM.
pub const SAMPLE_BYTES: usize = 2;

/// Transfer unit negotiated with the device. Immutable after setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Period {
    frame_count: usize,
    bytes_per_frame: usize,
    duration_micros: u64,
}

impl Period {
    /// Period for interleaved S16 audio at `sample_rate`.
    ///
    /// The duration is truncated to whole microseconds, the way drivers report period time.
    pub fn new(frame_count: usize, channels: u16, sample_rate: u32) -> Self {
        let duration_micros = if sample_rate == 0 {
            0
        } else {
            (frame_count as u64).saturating_mul(1_000_000) / u64::from(sample_rate)
        };
        Self {
            frame_count,
            bytes_per_frame: usize::from(channels) * SAMPLE_BYTES,
            duration_micros,
        }
    }

    /// Period with an explicit frame width and duration.
    pub fn with_duration(frame_count: usize, bytes_per_frame: usize, duration_micros: u64) -> Self {
        Self {
            frame_count,
            bytes_per_frame,
            duration_micros,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    pub fn duration_micros(&self) -> u64 {
        self.duration_micros
    }

    /// Size in bytes of one period of audio.
    pub fn byte_len(&self) -> usize {
        self.frame_count * self.bytes_per_frame
    }

    /// Number of loop passes needed to cover `run_seconds` of audio.
    pub fn iterations_for(&self, run_seconds: u32) -> u64 {
        if self.duration_micros == 0 {
            return 0;
        }
        u64::from(run_seconds) * 1_000_000 / self.duration_micros
    }
}

/// One period of raw bytes, allocated once and overwritten every iteration.
pub struct FrameBuffer {
    bytes: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(period: &Period) -> Self {
        Self {
            bytes: vec![0; period.byte_len()],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Silence everything from byte `from` to the end.
    pub fn zero_tail(&mut self, from: usize) {
        if from < self.bytes.len() {
            self.bytes[from..].fill(0);
        }
    }
}

/// Progress through one period while it is handed to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteCursor {
    frames_remaining: usize,
    byte_offset: usize,
    bytes_per_frame: usize,
}

impl WriteCursor {
    pub fn new(period: &Period) -> Self {
        Self {
            frames_remaining: period.frame_count(),
            byte_offset: 0,
            bytes_per_frame: period.bytes_per_frame(),
        }
    }

    pub fn frames_remaining(&self) -> usize {
        self.frames_remaining
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    pub fn is_done(&self) -> bool {
        self.frames_remaining == 0
    }

    /// Bytes of `buffer` not yet accepted by the device.
    pub fn pending<'a>(&self, buffer: &'a [u8]) -> &'a [u8] {
        let end = self.byte_offset + self.frames_remaining * self.bytes_per_frame;
        &buffer[self.byte_offset..end]
    }

    /// Record `frames` accepted by the device. Returns the frames actually consumed,
    /// which never exceeds what was pending.
    pub fn advance(&mut self, frames: usize) -> usize {
        let frames = frames.min(self.frames_remaining);
        self.frames_remaining -= frames;
        self.byte_offset += frames * self.bytes_per_frame;
        frames
    }
}
