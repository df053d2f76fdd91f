//! Bounded device queue of interleaved `i16` samples.
//!
//! [`SampleRing`] sits between the session thread (producer) and the CPAL output
//! callback (consumer) and carries the run state a PCM driver would track:
//! - `Prepared`: accepting data, the callback outputs silence without draining
//! - `Running`: the callback drains; running dry latches an xrun
//! - `Xrun`: writes are refused until [`SampleRing::prepare`]
//! - `Draining`: the callback plays out what is left, then returns to `Prepared`
//!
//! State lives under the same mutex as the samples so the callback and the writer
//! always agree on it.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Run state of the device queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingState {
    Prepared,
    Running,
    Xrun,
    Draining,
}

/// What one callback pull produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pull {
    /// Samples copied into the output slice.
    pub filled: usize,
    /// The queue ran dry while running.
    pub xrun: bool,
}

pub struct SampleRing {
    channels: usize,
    capacity_samples: usize,
    inner: Mutex<RingInner>,
    cv: Condvar,
}

struct RingInner {
    queue: VecDeque<i16>,
    state: RingState,
}

impl SampleRing {
    /// Queue holding up to `capacity_frames` frames of `channels` interleaved samples.
    pub fn new(channels: usize, capacity_frames: usize) -> Self {
        let channels = channels.max(1);
        let capacity_samples = capacity_frames.max(1) * channels;
        Self {
            channels,
            capacity_samples,
            inner: Mutex::new(RingInner {
                queue: VecDeque::with_capacity(capacity_samples),
                state: RingState::Prepared,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Queued frames (best-effort snapshot).
    pub fn len_frames(&self) -> usize {
        let g = self.inner.lock().unwrap();
        g.queue.len() / self.channels
    }

    /// Frames that fit right now.
    pub fn free_frames(&self) -> usize {
        let g = self.inner.lock().unwrap();
        (self.capacity_samples - g.queue.len()) / self.channels
    }

    pub fn state(&self) -> RingState {
        self.inner.lock().unwrap().state
    }

    /// Queue as many whole frames from `samples` as fit, without waiting.
    ///
    /// Returns frames accepted; `0` when full or in xrun.
    pub fn push_nonblocking(&self, samples: &[i16]) -> usize {
        let mut g = self.inner.lock().unwrap();
        if g.state == RingState::Xrun {
            return 0;
        }
        let free = (self.capacity_samples - g.queue.len()) / self.channels;
        let frames = free.min(samples.len() / self.channels);
        if frames == 0 {
            return 0;
        }
        g.queue.extend(&samples[..frames * self.channels]);
        if g.state == RingState::Prepared {
            g.state = RingState::Running;
        }
        frames
    }

    /// Queue all whole frames from `samples`, waiting for space as the callback drains.
    ///
    /// Returns early with the frames queued so far if an xrun is latched while waiting.
    pub fn push_blocking(&self, samples: &[i16]) -> usize {
        let total = samples.len() / self.channels;
        let mut pushed = 0;
        let mut g = self.inner.lock().unwrap();
        while pushed < total {
            if g.state == RingState::Xrun {
                break;
            }
            let free = (self.capacity_samples - g.queue.len()) / self.channels;
            if free == 0 {
                g = self.cv.wait(g).unwrap();
                continue;
            }
            let frames = free.min(total - pushed);
            let start = pushed * self.channels;
            g.queue
                .extend(&samples[start..start + frames * self.channels]);
            pushed += frames;
            if g.state == RingState::Prepared {
                g.state = RingState::Running;
            }
        }
        pushed
    }

    /// Consumer side: fill `out` from the queue.
    ///
    /// Outside `Running`/`Draining` nothing is taken. Running dry latches an xrun;
    /// draining dry returns the queue to `Prepared`.
    pub fn pull(&self, out: &mut [i16]) -> Pull {
        let mut g = self.inner.lock().unwrap();
        let state = g.state;
        if state != RingState::Running && state != RingState::Draining {
            return Pull {
                filled: 0,
                xrun: false,
            };
        }

        let take = out.len().min(g.queue.len());
        for (dst, src) in out[..take].iter_mut().zip(g.queue.drain(..take)) {
            *dst = src;
        }

        let mut xrun = false;
        if take < out.len() || g.queue.is_empty() {
            match state {
                RingState::Running if take < out.len() => {
                    g.state = RingState::Xrun;
                    xrun = true;
                }
                RingState::Draining => g.state = RingState::Prepared,
                _ => {}
            }
        }

        drop(g);
        self.cv.notify_all();
        Pull { filled: take, xrun }
    }

    /// Drop queued samples and clear a latched xrun.
    pub fn prepare(&self) {
        let mut g = self.inner.lock().unwrap();
        g.queue.clear();
        g.state = RingState::Prepared;
        drop(g);
        self.cv.notify_all();
    }

    /// Stop accepting the "ran dry" condition as an xrun and let the queue play out.
    pub fn start_drain(&self) {
        let mut g = self.inner.lock().unwrap();
        let queued = !g.queue.is_empty();
        let next = match g.state {
            RingState::Running | RingState::Prepared if queued => RingState::Draining,
            RingState::Running | RingState::Xrun => RingState::Prepared,
            other => other,
        };
        g.state = next;
        drop(g);
        self.cv.notify_all();
    }

    /// Wait until a drain started by [`SampleRing::start_drain`] finishes.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.inner.lock().unwrap();
        while g.state == RingState::Draining {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, (deadline - now).min(Duration::from_millis(50)))
                .unwrap();
            g = ng;
        }
        true
    }
}
