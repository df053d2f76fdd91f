//! Configuration loading and resolution.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, command-line flags.

use std::path::Path;

use anyhow::{Context, Result};
use pcm_player::config::{SessionConfig, ShortReadPolicy};

use crate::cli::Args;

/// Load a session config from a TOML file. Missing keys keep their defaults.
pub fn load(path: &Path) -> Result<SessionConfig> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
    parse(&raw).with_context(|| format!("parse config {:?}", path))
}

fn parse(raw: &str) -> Result<SessionConfig> {
    Ok(toml::from_str::<SessionConfig>(raw)?)
}

/// Build the validated session config for this run.
pub fn resolve(args: &Args) -> Result<SessionConfig> {
    let mut cfg = match &args.config {
        Some(path) => load(path)?,
        None => SessionConfig::default(),
    };
    apply_overrides(&mut cfg, args);
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn apply_overrides(cfg: &mut SessionConfig, args: &Args) {
    if let Some(device) = &args.device {
        cfg.device = Some(device.clone());
    }
    if let Some(v) = args.seconds {
        cfg.run_seconds = v;
    }
    if let Some(v) = args.rate {
        cfg.sample_rate = v;
    }
    if let Some(v) = args.channels {
        cfg.channels = v;
    }
    if let Some(v) = args.period_frames {
        cfg.period_frames = v;
    }
    if let Some(v) = args.buffer_periods {
        cfg.buffer_periods = v;
    }
    if args.nonblock {
        cfg.nonblocking = true;
    }
    if args.max_spins.is_some() {
        cfg.retry.max_spins = args.max_spins;
    }
    if args.spin_backoff_us.is_some() {
        cfg.retry.backoff_us = args.spin_backoff_us;
    }
    if let Some(v) = args.max_failures {
        cfg.max_consecutive_failures = v;
    }
    if args.zero_fill {
        cfg.short_read = ShortReadPolicy::ZeroFill;
    }
}
