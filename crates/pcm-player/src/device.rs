//! Output device discovery and hardware parameter negotiation.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - negotiating channel count, sample rate, sample format and period size

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Hardware parameters asked of the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HwRequest {
    pub channels: u16,
    pub sample_rate: u32,
    pub period_frames: u32,
}

/// Parameters the device agreed to.
#[derive(Clone, Debug)]
pub struct HwParams {
    pub config: cpal::SupportedStreamConfig,
    pub stream_config: cpal::StreamConfig,
    /// Frames per period (the device may have coerced the request).
    pub period_frames: u32,
}

impl HwParams {
    pub fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.stream_config.channels
    }

    pub fn sample_format(&self) -> cpal::SampleFormat {
        self.config.sample_format()
    }
}

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default device.
///
/// Returns an error if no matching device exists or if the host reports no output devices.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("No output devices")?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Negotiate hardware parameters for interleaved 16-bit playback.
///
/// Only configs with exactly the requested channel count qualify. Among those the
/// rate closest to the request wins (exact when in range), then the sample format
/// closest to `i16`. The period is the requested size clamped to the device's
/// buffer-size range.
pub fn negotiate(device: &cpal::Device, req: &HwRequest) -> Result<HwParams> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query supported output configs")?
        .filter(|r| r.channels() == req.channels)
        .collect();
    if ranges.is_empty() {
        return Err(anyhow!(
            "No supported output config with {} channels",
            req.channels
        ));
    }

    let mut best: Option<(u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), req.sample_rate);
        let distance = rate.abs_diff(req.sample_rate);
        let rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_distance, b_rank, _)) => is_better_candidate(distance, rank, *b_distance, *b_rank),
        };
        if replace {
            best = Some((distance, rank, range.with_sample_rate(rate)));
        }
    }
    let Some((_, _, config)) = best else {
        return Err(anyhow!("No supported output configs"));
    };

    let (period_frames, buffer_size) = pick_period_frames(config.buffer_size(), req.period_frames);
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = buffer_size {
        stream_config.buffer_size = buf;
    }

    Ok(HwParams {
        config,
        stream_config,
        period_frames,
    })
}

/// Print available output devices to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

/// Nearest rate to `target` inside `min..=max`.
fn pick_rate_for_range(min: u32, max: u32, target: u32) -> u32 {
    if target < min {
        min
    } else if target > max {
        max
    } else {
        target
    }
}

/// Lower is closer to the `i16` input format.
fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::F32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn is_better_candidate(distance: u32, format_rank: u8, best_distance: u32, best_rank: u8) -> bool {
    if distance != best_distance {
        distance < best_distance
    } else {
        format_rank < best_rank
    }
}

/// Period size for a requested frame count, plus the buffer size to request from CPAL.
///
/// `Unknown` ranges keep the request and leave CPAL on its default buffer size.
fn pick_period_frames(
    supported: &cpal::SupportedBufferSize,
    requested: u32,
) -> (u32, Option<cpal::BufferSize>) {
    match supported {
        cpal::SupportedBufferSize::Range { min, max } => {
            let chosen = requested.min(*max).max(*min);
            (chosen, Some(cpal::BufferSize::Fixed(chosen)))
        }
        cpal::SupportedBufferSize::Unknown => (requested, None),
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
