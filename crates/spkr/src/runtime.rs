//! Runtime helpers: device listing and the timed playback run.

use anyhow::{Context, Result};
use pcm_player::backend;
use pcm_player::config::SessionConfig;
use pcm_player::session::{Session, SessionReport};
use pcm_player::{device, source};

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Open the device, play stdin for the configured time, and tear down.
pub fn run_play(config: &SessionConfig) -> Result<SessionReport> {
    let host = cpal::default_host();
    let opened = backend::open(&host, config).context("unable to open pcm device")?;
    let counters = opened.pcm.counters();

    tracing::info!(device = %opened.device_name, "output device");
    tracing::info!(
        sample_format = ?opened.hw.sample_format(),
        rate_hz = opened.hw.sample_rate(),
        channels = opened.hw.channels(),
        period_frames = opened.period.frame_count(),
        period_us = opened.period.duration_micros(),
        buffer_size = ?opened.hw.stream_config.buffer_size,
        "negotiated hw params"
    );
    if opened.hw.sample_rate() != config.sample_rate {
        tracing::warn!(
            requested_hz = config.sample_rate,
            actual_hz = opened.hw.sample_rate(),
            "device coerced sample rate"
        );
    }

    let period_frames = opened.period.frame_count();
    let rate_hz = opened.hw.sample_rate();
    let session = Session::new(opened.pcm, source::stdin(), opened.period, config);
    tracing::info!(
        run_seconds = config.run_seconds,
        period_frames,
        rate_hz,
        loops = session.remaining_iterations(),
        nonblocking = config.nonblocking,
        "starting playback"
    );

    let report = session.run()?;
    let device_stats = counters.snapshot();
    tracing::info!(
        end_reason = ?report.end_reason,
        iterations = report.iterations_played,
        planned = report.iterations_planned,
        short_reads = report.short_reads,
        sub_writes = report.sink.sub_writes,
        busy_retries = report.sink.busy_retries,
        underruns = report.sink.underruns,
        short_writes = report.sink.short_writes,
        write_failures = report.sink.failures,
        played_frames = device_stats.played_frames,
        device_underrun_events = device_stats.underrun_events,
        device_underrun_frames = device_stats.underrun_frames,
        "playback finished"
    );
    Ok(report)
}
