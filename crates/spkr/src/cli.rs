//! Command-line interface definitions.
//!
//! This module contains the `clap`-powered CLI surface area (args + defaults).
//! Every tuning flag is optional so values from `--config` survive unless overridden.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "spkr", version, about = "Play raw S16LE PCM from stdin for a fixed time")]
pub struct Args {
    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// TOML config file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Total run time in seconds [default: 10]
    #[arg(long)]
    pub seconds: Option<u32>,

    /// Sample rate in Hz; the device may pick the nearest supported rate [default: 96000]
    #[arg(long)]
    pub rate: Option<u32>,

    /// Interleaved channels in the input stream [default: 2]
    #[arg(long)]
    pub channels: Option<u16>,

    /// Period size in frames; the device may coerce it [default: 1024]
    #[arg(long)]
    pub period_frames: Option<u32>,

    /// Device queue depth in periods [default: 4]
    #[arg(long)]
    pub buffer_periods: Option<u32>,

    /// Open the device non-blocking (busy-polls while the device queue is full)
    #[arg(long)]
    pub nonblock: bool,

    /// Give up after this many consecutive "temporarily unavailable" retries
    #[arg(long)]
    pub max_spins: Option<u64>,

    /// Sleep between busy-poll retries, in microseconds
    #[arg(long)]
    pub spin_backoff_us: Option<u64>,

    /// Consecutive write passes without progress tolerated before aborting [default: 64]
    #[arg(long)]
    pub max_failures: Option<u32>,

    /// Zero-fill the unread tail of a short read instead of replaying stale bytes
    #[arg(long)]
    pub zero_fill: bool,
}
