//! Playback stage (CPAL output stream).
//!
//! Builds the CPAL output stream and provides the real-time audio callback.
//! The callback:
//! - pulls interleaved `i16` samples from the shared [`SampleRing`] without blocking
//! - converts them to the device sample format
//! - outputs silence for anything the ring could not supply

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::SampleRing;

/// Counters updated by the output callback.
#[derive(Clone, Debug, Default)]
pub struct DeviceCounters {
    /// Frames of real audio handed to the device.
    pub played_frames: Arc<AtomicU64>,
    /// Times the queue ran dry while running.
    pub underrun_events: Arc<AtomicU64>,
    /// Frames output as silence because of an underrun.
    pub underrun_frames: Arc<AtomicU64>,
}

/// Point-in-time copy of [`DeviceCounters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub played_frames: u64,
    pub underrun_events: u64,
    pub underrun_frames: u64,
}

impl DeviceCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            played_frames: self.played_frames.load(Ordering::Relaxed),
            underrun_events: self.underrun_events.load(Ordering::Relaxed),
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
        }
    }
}

/// Build a CPAL output stream that plays audio from `ring`.
///
/// `ring` carries interleaved `i16` samples with the stream's channel count.
///
/// ## Real-time constraints
/// The callback only takes the ring mutex for the copy and never waits on a condition
/// variable. Missing samples are filled with zeros (silence).
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: &Arc<SampleRing>,
    counters: DeviceCounters,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, ring, counters),
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, ring, counters),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, ring, counters),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, ring, counters),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: &Arc<SampleRing>,
    counters: DeviceCounters,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<i16>,
{
    let channels_out = usize::from(config.channels).max(1);
    if channels_out != ring.channels() {
        return Err(anyhow!(
            "stream has {channels_out} channels but the queue carries {}",
            ring.channels()
        ));
    }

    let ring_cb = ring.clone();
    let mut scratch: Vec<i16> = Vec::new();

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0);
            }
            let pull = ring_cb.pull(&mut scratch[..data.len()]);
            render(data, &scratch[..pull.filled]);

            let filled_frames = (pull.filled / channels_out) as u64;
            if filled_frames > 0 {
                counters
                    .played_frames
                    .fetch_add(filled_frames, Ordering::Relaxed);
            }
            if pull.xrun {
                let missing = (data.len() - pull.filled) / channels_out;
                counters.underrun_events.fetch_add(1, Ordering::Relaxed);
                counters
                    .underrun_frames
                    .fetch_add(missing as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Convert `src` into the head of `data` and silence the rest.
fn render<T>(data: &mut [T], src: &[i16])
where
    T: cpal::Sample + cpal::FromSample<i16>,
{
    for (dst, s) in data.iter_mut().zip(src) {
        *dst = <T as cpal::Sample>::from_sample::<i16>(*s);
    }
    for dst in data.iter_mut().skip(src.len()) {
        *dst = <T as cpal::Sample>::from_sample::<i16>(0);
    }
}
