//! Playback sink: hands one period to the device, however many sub-writes it takes.
//!
//! Per period the sink waits for the device to report availability, then writes
//! from a [`WriteCursor`] until every frame has been accepted:
//! - "temporarily unavailable" retries the same call under the [`RetryPolicy`]
//! - an underrun is logged, the device is prepared, and the same frames are retried
//! - any other error is logged and retried without advancing
//! - a short write is logged and the remainder goes out on the next pass
//!
//! Passes that accept nothing count toward `max_consecutive_failures`, except
//! underruns the device recovered from; going past it ends playback with
//! [`PlaybackError::TooManyFailures`] instead of spinning forever.

use crate::config::RetryPolicy;
use crate::error::{PcmError, PlaybackError};
use crate::frame::{Period, WriteCursor};
use crate::pcm::PcmDevice;

/// Counters for the work done submitting one or more periods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubmitStats {
    /// Writes that accepted at least one frame.
    pub sub_writes: u64,
    /// Busy-poll retries on "temporarily unavailable".
    pub busy_retries: u64,
    pub underruns: u64,
    pub short_writes: u64,
    /// Writes that failed with an unclassified error or accepted nothing.
    pub failures: u64,
    pub frames_written: u64,
}

impl SubmitStats {
    pub fn merge(&mut self, other: &SubmitStats) {
        self.sub_writes += other.sub_writes;
        self.busy_retries += other.busy_retries;
        self.underruns += other.underruns;
        self.short_writes += other.short_writes;
        self.failures += other.failures;
        self.frames_written += other.frames_written;
    }
}

pub struct PlaybackSink<D> {
    device: D,
    period: Period,
    retry: RetryPolicy,
    max_consecutive_failures: u32,
}

impl<D: PcmDevice> PlaybackSink<D> {
    pub fn new(device: D, period: Period, retry: RetryPolicy, max_consecutive_failures: u32) -> Self {
        Self {
            device,
            period,
            retry,
            max_consecutive_failures,
        }
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Write one full period from `buffer` to the device.
    ///
    /// `iteration` only labels log lines and errors.
    pub fn submit_period(&mut self, buffer: &[u8], iteration: u64) -> Result<SubmitStats, PlaybackError> {
        debug_assert_eq!(buffer.len(), self.period.byte_len());
        let mut stats = SubmitStats::default();
        let available = self.await_availability(iteration, &mut stats)?;

        let mut cursor = WriteCursor::new(&self.period);
        let mut stalled: u32 = 0;
        while !cursor.is_done() {
            let requested = cursor.frames_remaining();
            tracing::debug!(
                iteration,
                frames_to_write = requested,
                frames_available = ?available,
                byte_offset = cursor.byte_offset(),
                "writing frames"
            );

            let last = match self.write_with_retry(cursor.pending(buffer), iteration, &mut stats)? {
                Ok(written) => {
                    if written != requested {
                        tracing::warn!(iteration, written, requested, "short write");
                        stats.short_writes += 1;
                    }
                    if written > 0 {
                        let consumed = cursor.advance(written);
                        stats.sub_writes += 1;
                        stats.frames_written += consumed as u64;
                        stalled = 0;
                        continue;
                    }
                    stats.failures += 1;
                    "device accepted no frames".to_string()
                }
                Err(PcmError::Underrun) => {
                    tracing::warn!(iteration, code = PcmError::Underrun.code(), "underrun occurred");
                    stats.underruns += 1;
                    match self.device.prepare() {
                        // Recovered; the same frames go out on the next pass.
                        Ok(()) => continue,
                        Err(err) => {
                            tracing::warn!(iteration, code = err.code(), error = %err, "prepare after underrun failed");
                            stats.failures += 1;
                            format!("prepare after underrun failed: {err}")
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(iteration, code = err.code(), error = %err, "error from write");
                    stats.failures += 1;
                    err.to_string()
                }
            };

            stalled += 1;
            if stalled > self.max_consecutive_failures {
                return Err(PlaybackError::TooManyFailures {
                    iteration,
                    failures: stalled,
                    last,
                });
            }
        }

        Ok(stats)
    }

    /// Poll the available-space query until it stops reporting "temporarily unavailable".
    ///
    /// Only the retryable case is handled; other errors are logged and left for the
    /// write path to surface.
    fn await_availability(
        &mut self,
        iteration: u64,
        stats: &mut SubmitStats,
    ) -> Result<Option<usize>, PlaybackError> {
        let mut spins = 0u64;
        loop {
            match self.device.avail() {
                Ok(frames) => return Ok(Some(frames)),
                Err(PcmError::WouldBlock) => {
                    spins += 1;
                    stats.busy_retries += 1;
                    self.pace(iteration, spins)?;
                }
                Err(err) => {
                    tracing::warn!(iteration, code = err.code(), error = %err, "availability query failed");
                    return Ok(None);
                }
            }
        }
    }

    /// Issue one write, repeating it while the device reports "temporarily unavailable".
    fn write_with_retry(
        &mut self,
        pending: &[u8],
        iteration: u64,
        stats: &mut SubmitStats,
    ) -> Result<Result<usize, PcmError>, PlaybackError> {
        let mut spins = 0u64;
        loop {
            match self.device.write_interleaved(pending) {
                Err(PcmError::WouldBlock) => {
                    spins += 1;
                    stats.busy_retries += 1;
                    self.pace(iteration, spins)?;
                }
                other => return Ok(other),
            }
        }
    }

    fn pace(&self, iteration: u64, spins: u64) -> Result<(), PlaybackError> {
        if !self.retry.allows(spins) {
            return Err(PlaybackError::SpinLimitExceeded { iteration, spins });
        }
        match self.retry.backoff() {
            Some(delay) => std::thread::sleep(delay),
            None => std::hint::spin_loop(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EIO;
    use crate::testing::{Call, ScriptedPcm, count, writes};

    fn period() -> Period {
        Period::with_duration(4, 4, 1_000)
    }

    fn buffer() -> Vec<u8> {
        (0..16).collect()
    }

    fn sink(device: ScriptedPcm) -> PlaybackSink<ScriptedPcm> {
        PlaybackSink::new(device, period(), RetryPolicy::default(), 8)
    }

    #[test]
    fn split_write_advances_cursor_by_frame_width() {
        let device = ScriptedPcm::new(4).with_writes([Ok(2), Ok(2)]);
        let log = device.log();
        let buf = buffer();
        let stats = sink(device).submit_period(&buf, 1).unwrap();

        let sent = writes(&log.borrow());
        assert_eq!(sent, vec![buf[0..16].to_vec(), buf[8..16].to_vec()]);
        assert_eq!(stats.sub_writes, 2);
        assert_eq!(stats.short_writes, 1);
        assert_eq!(stats.frames_written, 4);
    }

    #[test]
    fn would_block_is_retried_without_state_change() {
        let device = ScriptedPcm::new(4).with_writes([
            Err(PcmError::WouldBlock),
            Err(PcmError::WouldBlock),
            Err(PcmError::WouldBlock),
            Ok(4),
        ]);
        let log = device.log();
        let buf = buffer();
        let stats = sink(device).submit_period(&buf, 1).unwrap();

        let sent = writes(&log.borrow());
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|w| w == &buf));
        assert_eq!(stats.busy_retries, 3);
        assert_eq!(stats.sub_writes, 1);
        assert_eq!(stats.frames_written, 4);
    }

    #[test]
    fn underrun_prepares_and_retries_same_frames() {
        let device = ScriptedPcm::new(4).with_writes([Ok(1), Err(PcmError::Underrun), Ok(3)]);
        let log = device.log();
        let buf = buffer();
        let stats = sink(device).submit_period(&buf, 3).unwrap();

        let calls = log.borrow();
        assert_eq!(count(&calls, &Call::Prepare), 1);
        let sent = writes(&calls);
        assert_eq!(sent, vec![buf.clone(), buf[4..].to_vec(), buf[4..].to_vec()]);
        assert_eq!(stats.underruns, 1);
        assert_eq!(stats.frames_written, 4);
    }

    #[test]
    fn underrun_once_then_full_write() {
        let device = ScriptedPcm::new(4).with_writes([Err(PcmError::Underrun), Ok(4)]);
        let log = device.log();
        let stats = sink(device).submit_period(&buffer(), 1).unwrap();

        let calls = log.borrow();
        assert_eq!(
            calls.iter().filter(|c| !matches!(c, Call::Avail)).count(),
            3,
            "write, prepare, write"
        );
        assert_eq!(calls[2], Call::Prepare);
        assert_eq!(stats.underruns, 1);
        assert_eq!(stats.sub_writes, 1);
    }

    #[test]
    fn repeated_underruns_recover_past_failure_threshold() {
        let device = ScriptedPcm::new(4).with_writes([
            Err(PcmError::Underrun),
            Err(PcmError::Underrun),
            Err(PcmError::Underrun),
            Ok(4),
        ]);
        let log = device.log();
        let buf = buffer();
        let mut sink = PlaybackSink::new(device, period(), RetryPolicy::default(), 2);
        let stats = sink.submit_period(&buf, 1).unwrap();

        let calls = log.borrow();
        assert_eq!(count(&calls, &Call::Prepare), 3);
        assert!(writes(&calls).iter().all(|w| w == &buf));
        assert_eq!(stats.underruns, 3);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.frames_written, 4);
    }

    #[test]
    fn failed_prepare_counts_toward_threshold() {
        let underruns = (0..10).map(|_| Err(PcmError::Underrun));
        let device = ScriptedPcm::new(4)
            .with_writes(underruns)
            .failing_prepare(PcmError::from_code(EIO, "Input/output error"));
        let mut sink = PlaybackSink::new(device, period(), RetryPolicy::default(), 2);

        let err = sink.submit_period(&buffer(), 4).unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::TooManyFailures {
                iteration: 4,
                failures: 3,
                ..
            }
        ));
    }

    #[test]
    fn unclassified_error_is_retried() {
        let device = ScriptedPcm::new(4).with_writes([
            Err(PcmError::from_code(EIO, "Input/output error")),
            Ok(4),
        ]);
        let log = device.log();
        let stats = sink(device).submit_period(&buffer(), 1).unwrap();

        assert_eq!(writes(&log.borrow()).len(), 2);
        assert_eq!(count(&log.borrow(), &Call::Prepare), 0);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.frames_written, 4);
    }

    #[test]
    fn persistent_failure_is_fatal_after_threshold() {
        let failing = (0..10).map(|_| Err(PcmError::from_code(EIO, "Input/output error")));
        let device = ScriptedPcm::new(4).with_writes(failing);
        let log = device.log();
        let mut sink = PlaybackSink::new(device, period(), RetryPolicy::default(), 3);

        let err = sink.submit_period(&buffer(), 5).unwrap_err();
        match err {
            PlaybackError::TooManyFailures {
                iteration,
                failures,
                ..
            } => {
                assert_eq!(iteration, 5);
                assert_eq!(failures, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(writes(&log.borrow()).len(), 4);
    }

    #[test]
    fn progress_resets_failure_count() {
        let device = ScriptedPcm::new(4).with_writes([
            Err(PcmError::from_code(EIO, "io")),
            Ok(1),
            Err(PcmError::from_code(EIO, "io")),
            Ok(0),
            Ok(3),
        ]);
        let mut sink = PlaybackSink::new(device, period(), RetryPolicy::default(), 2);
        let stats = sink.submit_period(&buffer(), 1).unwrap();
        assert_eq!(stats.failures, 3);
        assert_eq!(stats.frames_written, 4);
    }

    #[test]
    fn spin_limit_bounds_busy_poll() {
        let busy = (0..10).map(|_| Err(PcmError::WouldBlock));
        let device = ScriptedPcm::new(4).with_writes(busy);
        let retry = RetryPolicy {
            max_spins: Some(2),
            backoff_us: None,
        };
        let mut sink = PlaybackSink::new(device, period(), retry, 8);

        let err = sink.submit_period(&buffer(), 9).unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::SpinLimitExceeded {
                iteration: 9,
                spins: 3
            }
        ));
    }

    #[test]
    fn availability_poll_retries_would_block() {
        let device = ScriptedPcm::new(4).with_avail([
            Err(PcmError::WouldBlock),
            Err(PcmError::WouldBlock),
            Ok(16),
        ]);
        let log = device.log();
        let stats = sink(device).submit_period(&buffer(), 1).unwrap();

        assert_eq!(count(&log.borrow(), &Call::Avail), 3);
        assert_eq!(stats.busy_retries, 2);
    }

    #[test]
    fn availability_error_falls_through_to_write() {
        let device = ScriptedPcm::new(4)
            .with_avail([Err(PcmError::Underrun)])
            .with_writes([Err(PcmError::Underrun), Ok(4)]);
        let log = device.log();
        let stats = sink(device).submit_period(&buffer(), 1).unwrap();

        assert_eq!(count(&log.borrow(), &Call::Avail), 1);
        assert_eq!(count(&log.borrow(), &Call::Prepare), 1);
        assert_eq!(stats.frames_written, 4);
    }

    #[test]
    fn six_byte_frames_offset_correctly() {
        let period = Period::new(4, 3, 48_000);
        let device = ScriptedPcm::new(6).with_writes([Ok(1), Ok(3)]);
        let log = device.log();
        let buf: Vec<u8> = (0..24).collect();
        let mut sink = PlaybackSink::new(device, period, RetryPolicy::default(), 8);
        sink.submit_period(&buf, 1).unwrap();

        let sent = writes(&log.borrow());
        assert_eq!(sent[1], buf[6..].to_vec());
    }
}
