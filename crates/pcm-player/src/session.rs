//! Session driver: the fixed-iteration read → write loop and ordered teardown.

use crate::config::{SessionConfig, ShortReadPolicy};
use crate::error::PlaybackError;
use crate::frame::{FrameBuffer, Period};
use crate::pcm::PcmDevice;
use crate::sink::{PlaybackSink, SubmitStats};
use crate::source::FrameSource;

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// Every planned iteration ran.
    Exhausted,
    /// The source reported end of stream.
    EndOfStream,
    /// The source failed; treated like end of stream.
    ReadError,
}

/// Summary of a finished session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub iterations_planned: u64,
    pub iterations_played: u64,
    pub short_reads: u64,
    pub end_reason: EndReason,
    pub sink: SubmitStats,
}

/// Owns the device (through the sink), the source, and the frame buffer for one run.
pub struct Session<D, S> {
    sink: PlaybackSink<D>,
    source: S,
    buffer: FrameBuffer,
    remaining_iterations: u64,
    short_read: ShortReadPolicy,
}

impl<D: PcmDevice, S: FrameSource> Session<D, S> {
    pub fn new(device: D, source: S, period: Period, config: &SessionConfig) -> Self {
        Self {
            sink: PlaybackSink::new(
                device,
                period,
                config.retry,
                config.max_consecutive_failures,
            ),
            source,
            buffer: FrameBuffer::new(&period),
            remaining_iterations: period.iterations_for(config.run_seconds),
            short_read: config.short_read,
        }
    }

    pub fn remaining_iterations(&self) -> u64 {
        self.remaining_iterations
    }

    /// Run the loop to completion, then drain, close and free.
    ///
    /// Teardown happens exactly once whichever way the loop ends, including a fatal
    /// playback error.
    pub fn run(mut self) -> Result<SessionReport, PlaybackError> {
        let mut report = SessionReport {
            iterations_planned: self.remaining_iterations,
            iterations_played: 0,
            short_reads: 0,
            end_reason: EndReason::Exhausted,
            sink: SubmitStats::default(),
        };
        let outcome = self.pump(&mut report);

        let Session { sink, buffer, .. } = self;
        teardown(sink.into_device(), buffer);

        report.end_reason = outcome?;
        Ok(report)
    }

    fn pump(&mut self, report: &mut SessionReport) -> Result<EndReason, PlaybackError> {
        let mut iteration = 0u64;
        while self.remaining_iterations > 0 {
            self.remaining_iterations -= 1;
            iteration += 1;

            let want = self.buffer.len();
            let read = match self.source.fill(self.buffer.as_mut_slice()) {
                Ok(n) => n,
                Err(err) => {
                    tracing::error!(iteration, error = %err, "read from input failed");
                    return Ok(EndReason::ReadError);
                }
            };
            if read == 0 {
                tracing::warn!(iteration, "end of file on input");
                return Ok(EndReason::EndOfStream);
            }
            if read < want {
                tracing::warn!(iteration, bytes = read, expected = want, "short read");
                report.short_reads += 1;
                if self.short_read == ShortReadPolicy::ZeroFill {
                    self.buffer.zero_tail(read);
                }
            }

            let stats = self.sink.submit_period(self.buffer.as_slice(), iteration)?;
            report.sink.merge(&stats);
            report.iterations_played += 1;
        }
        Ok(EndReason::Exhausted)
    }
}

fn teardown<D: PcmDevice>(mut device: D, buffer: FrameBuffer) {
    if let Err(err) = device.drain() {
        tracing::warn!(code = err.code(), error = %err, "drain failed");
    }
    if let Err(err) = device.close() {
        tracing::warn!(code = err.code(), error = %err, "close failed");
    }
    drop(buffer);
    tracing::debug!("session torn down");
}
