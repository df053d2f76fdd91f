use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::Deserialize;

/// Run-wide settings shared by device setup and the playback loop.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Output device by substring match; host default when unset.
    pub device: Option<String>,
    /// Total playback time in seconds.
    pub run_seconds: u32,
    /// Requested sample rate in Hz (the device may pick the nearest supported rate).
    pub sample_rate: u32,
    /// Interleaved channel count of the input stream.
    pub channels: u16,
    /// Requested period size in frames (the device may coerce it).
    pub period_frames: u32,
    /// Device queue depth in periods.
    pub buffer_periods: u32,
    /// Open the device non-blocking; waiting moves into the busy-poll loops.
    pub nonblocking: bool,
    /// Busy-poll policy for "temporarily unavailable" results.
    pub retry: RetryPolicy,
    /// Write passes without progress tolerated in a row before playback is abandoned.
    pub max_consecutive_failures: u32,
    /// What to do with the unread tail of a short read.
    pub short_read: ShortReadPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: None,
            run_seconds: 10,
            sample_rate: 96_000,
            channels: 2,
            period_frames: 1024,
            buffer_periods: 4,
            nonblocking: false,
            retry: RetryPolicy::default(),
            max_consecutive_failures: 64,
            short_read: ShortReadPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Reject values outside the supported ranges.
    pub fn validate(&self) -> Result<()> {
        check_range("run_seconds", self.run_seconds, 1, 86_400)?;
        check_range("sample_rate", self.sample_rate, 8_000, 384_000)?;
        check_range("channels", u32::from(self.channels), 1, 8)?;
        check_range("period_frames", self.period_frames, 16, 65_536)?;
        check_range("buffer_periods", self.buffer_periods, 2, 64)?;
        if self.max_consecutive_failures == 0 {
            return Err(anyhow!("max_consecutive_failures must be at least 1"));
        }
        if self.retry.max_spins == Some(0) {
            return Err(anyhow!("retry.max_spins must be at least 1 when set"));
        }
        Ok(())
    }
}

fn check_range(name: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if value < min || value > max {
        return Err(anyhow!("{name} = {value} is outside {min}..={max}"));
    }
    Ok(())
}

/// Busy-poll bound and pacing for transient device unavailability.
///
/// The default spins without limit or sleep, trading CPU for latency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum consecutive retries of one call; unbounded when `None`.
    pub max_spins: Option<u64>,
    /// Sleep between retries in microseconds; pure spin when `None`.
    pub backoff_us: Option<u64>,
}

impl RetryPolicy {
    /// Whether the `spins`-th consecutive retry of one call is permitted.
    pub fn allows(&self, spins: u64) -> bool {
        self.max_spins.is_none_or(|max| spins <= max)
    }

    pub fn backoff(&self) -> Option<Duration> {
        self.backoff_us.filter(|us| *us > 0).map(Duration::from_micros)
    }
}

/// Handling of the buffer tail left unfilled by a short read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortReadPolicy {
    /// Play the tail as-is (bytes from the previous period).
    #[default]
    Stale,
    /// Overwrite the tail with silence.
    ZeroFill,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SessionConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.run_seconds, 10);
        assert_eq!(cfg.sample_rate, 96_000);
        assert_eq!(cfg.period_frames, 1024);
        assert_eq!(cfg.short_read, ShortReadPolicy::Stale);
        assert_eq!(cfg.retry.max_spins, None);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let cfg = SessionConfig {
            channels: 0,
            ..SessionConfig::default()
        };
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("channels"));

        let cfg = SessionConfig {
            period_frames: 1 << 20,
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = SessionConfig {
            max_consecutive_failures: 0,
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_spin_bound() {
        let cfg = SessionConfig {
            retry: RetryPolicy {
                max_spins: Some(0),
                backoff_us: None,
            },
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn retry_policy_bounds_spins() {
        let unbounded = RetryPolicy::default();
        assert!(unbounded.allows(u64::MAX));
        assert!(unbounded.backoff().is_none());

        let bounded = RetryPolicy {
            max_spins: Some(3),
            backoff_us: Some(250),
        };
        assert!(bounded.allows(3));
        assert!(!bounded.allows(4));
        assert_eq!(bounded.backoff(), Some(Duration::from_micros(250)));
    }
}
