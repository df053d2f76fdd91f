//! [`PcmDevice`] backed by a CPAL output stream.
//!
//! Writes land in a [`SampleRing`] sized to `buffer_periods` periods; the CPAL
//! callback drains it. Blocking mode waits for ring space inside the write, while
//! non-blocking mode reports "temporarily unavailable" when the ring is full.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::SessionConfig;
use crate::device::{self, HwParams, HwRequest};
use crate::error::{EBADFD, EIO, ETIMEDOUT, PcmError};
use crate::frame::{Period, SAMPLE_BYTES};
use crate::pcm::PcmDevice;
use crate::playback::{self, DeviceCounters};
use crate::queue::{RingState, SampleRing};

/// Slack added to the expected play-out time when draining.
const DRAIN_SLACK: Duration = Duration::from_secs(1);

/// An opened CPAL playback device and what was negotiated for it.
pub struct OpenedPcm {
    pub pcm: CpalPcm,
    pub period: Period,
    pub device_name: String,
    pub hw: HwParams,
}

/// Select, negotiate and start the output device described by `config`.
pub fn open(host: &cpal::Host, config: &SessionConfig) -> Result<OpenedPcm> {
    let device = device::pick_device(host, config.device.as_deref())?;
    let device_name = device
        .description()
        .map(|d| d.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let hw = device::negotiate(
        &device,
        &HwRequest {
            channels: config.channels,
            sample_rate: config.sample_rate,
            period_frames: config.period_frames,
        },
    )
    .with_context(|| format!("negotiate hw params for {device_name}"))?;

    let period_frames = hw.period_frames as usize;
    let ring = Arc::new(SampleRing::new(
        usize::from(hw.channels()),
        period_frames * config.buffer_periods as usize,
    ));
    let counters = DeviceCounters::default();
    let stream = playback::build_output_stream(
        &device,
        &hw.stream_config,
        hw.sample_format(),
        &ring,
        counters.clone(),
    )
    .with_context(|| format!("build output stream on {device_name}"))?;
    stream.play().context("start output stream")?;

    let period = Period::new(period_frames, hw.channels(), hw.sample_rate());
    let pcm = CpalPcm {
        stream: Some(stream),
        ring: RingPcm::new(ring, hw.sample_rate(), config.nonblocking),
        counters,
    };

    Ok(OpenedPcm {
        pcm,
        period,
        device_name,
        hw,
    })
}

/// PCM queue semantics over a [`SampleRing`], independent of the output stream.
struct RingPcm {
    ring: Arc<SampleRing>,
    sample_rate: u32,
    nonblocking: bool,
    drain_slack: Duration,
    closed: bool,
    scratch: Vec<i16>,
}

impl RingPcm {
    fn new(ring: Arc<SampleRing>, sample_rate: u32, nonblocking: bool) -> Self {
        Self {
            ring,
            sample_rate,
            nonblocking,
            drain_slack: DRAIN_SLACK,
            closed: false,
            scratch: Vec::new(),
        }
    }

    fn avail(&self) -> Result<usize, PcmError> {
        match self.ring.state() {
            RingState::Xrun => Err(PcmError::Underrun),
            _ => Ok(self.ring.free_frames()),
        }
    }

    fn write(&mut self, frames: &[u8]) -> Result<usize, PcmError> {
        if self.closed {
            return Err(PcmError::from_code(EBADFD, "stream closed"));
        }
        if self.ring.state() == RingState::Xrun {
            return Err(PcmError::Underrun);
        }

        self.scratch.clear();
        self.scratch.extend(
            frames
                .chunks_exact(SAMPLE_BYTES)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );

        let written = if self.nonblocking {
            self.ring.push_nonblocking(&self.scratch)
        } else {
            self.ring.push_blocking(&self.scratch)
        };
        self.push_result(written)
    }

    /// Map a push count to a write result; nothing queued is either an xrun or a full queue.
    fn push_result(&self, written: usize) -> Result<usize, PcmError> {
        if written == 0 && !self.scratch.is_empty() {
            return match self.ring.state() {
                RingState::Xrun => Err(PcmError::Underrun),
                _ => Err(PcmError::WouldBlock),
            };
        }
        Ok(written)
    }

    fn prepare(&self) {
        self.ring.prepare();
    }

    /// Play out the queue, waiting at most its duration plus `drain_slack`.
    fn drain(&self) -> Result<(), PcmError> {
        if self.closed {
            return Err(PcmError::from_code(EBADFD, "stream closed"));
        }
        let queued = self.ring.len_frames() as u64;
        let micros = queued * 1_000_000 / u64::from(self.sample_rate.max(1));
        let timeout = Duration::from_micros(micros) + self.drain_slack;

        self.ring.start_drain();
        if !self.ring.wait_drained(timeout) {
            return Err(PcmError::from_code(ETIMEDOUT, "drain timed out"));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

pub struct CpalPcm {
    stream: Option<cpal::Stream>,
    ring: RingPcm,
    counters: DeviceCounters,
}

impl CpalPcm {
    /// Callback counters; stays valid after the device is closed.
    pub fn counters(&self) -> DeviceCounters {
        self.counters.clone()
    }
}

impl PcmDevice for CpalPcm {
    fn avail(&mut self) -> Result<usize, PcmError> {
        self.ring.avail()
    }

    fn write_interleaved(&mut self, frames: &[u8]) -> Result<usize, PcmError> {
        self.ring.write(frames)
    }

    fn prepare(&mut self) -> Result<(), PcmError> {
        self.ring.prepare();
        Ok(())
    }

    fn drain(&mut self) -> Result<(), PcmError> {
        let drained = self.ring.drain();
        if let Some(stream) = self.stream.as_ref() {
            stream
                .pause()
                .map_err(|e| PcmError::from_code(EIO, e.to_string()))?;
        }
        drained
    }

    fn close(mut self) -> Result<(), PcmError> {
        self.ring.close();
        match self.stream.take() {
            Some(stream) => {
                drop(stream);
                Ok(())
            }
            None => Err(PcmError::from_code(EBADFD, "stream already closed")),
        }
    }
}
