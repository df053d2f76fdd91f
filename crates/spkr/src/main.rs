//! spkr — streams raw interleaved S16LE audio from stdin to an output device for a
//! fixed duration.
//!
//! ## Loop
//! Each iteration reads one period from stdin and writes it to the device, retrying
//! in place on "temporarily unavailable" and preparing the device after an underrun.
//! The iteration count is the run time divided by the negotiated period time; end of
//! input stops early. The device is drained and closed on every exit path.
//!
//! Exit status is 1 when the device cannot be opened or configured, or when playback
//! is abandoned after repeated device failures.

mod cli;
mod config;
mod runtime;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,spkr=info,pcm_player=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let _ = ctrlc::set_handler(|| {
        tracing::warn!("interrupted");
        std::process::exit(130);
    });

    let cfg = config::resolve(&args)?;
    runtime::run_play(&cfg)?;
    Ok(())
}
