//! Paced raw-PCM playback: a fixed-iteration read → write loop over a device with
//! partial-write, "temporarily unavailable" and underrun semantics.
//!
//! - [`source`] reads one period of bytes per iteration
//! - [`sink`] hands a period to a [`pcm::PcmDevice`], recovering in place
//! - [`session`] drives the loop and tears the device down once
//! - [`backend`] implements the device on top of a CPAL output stream

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod pcm;
pub mod playback;
pub mod queue;
pub mod session;
pub mod sink;
pub mod source;

#[cfg(test)]
mod testing;
