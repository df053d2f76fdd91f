//! Scripted PCM device for loop tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::PcmError;
use crate::pcm::PcmDevice;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Avail,
    Write(Vec<u8>),
    Prepare,
    Drain,
    Close,
}

/// Replays queued results; once a script runs out every call succeeds in full.
pub struct ScriptedPcm {
    bytes_per_frame: usize,
    avail: VecDeque<Result<usize, PcmError>>,
    writes: VecDeque<Result<usize, PcmError>>,
    prepare_error: Option<PcmError>,
    calls: Rc<RefCell<Vec<Call>>>,
}

impl ScriptedPcm {
    pub fn new(bytes_per_frame: usize) -> Self {
        Self {
            bytes_per_frame,
            avail: VecDeque::new(),
            writes: VecDeque::new(),
            prepare_error: None,
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_writes(mut self, writes: impl IntoIterator<Item = Result<usize, PcmError>>) -> Self {
        self.writes.extend(writes);
        self
    }

    pub fn with_avail(mut self, avail: impl IntoIterator<Item = Result<usize, PcmError>>) -> Self {
        self.avail.extend(avail);
        self
    }

    /// Make every `prepare` call fail with `err`.
    pub fn failing_prepare(mut self, err: PcmError) -> Self {
        self.prepare_error = Some(err);
        self
    }

    pub fn log(&self) -> Rc<RefCell<Vec<Call>>> {
        self.calls.clone()
    }
}

pub fn writes(calls: &[Call]) -> Vec<Vec<u8>> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::Write(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .collect()
}

pub fn count(calls: &[Call], wanted: &Call) -> usize {
    calls.iter().filter(|c| *c == wanted).count()
}

impl PcmDevice for ScriptedPcm {
    fn avail(&mut self) -> Result<usize, PcmError> {
        self.calls.borrow_mut().push(Call::Avail);
        self.avail.pop_front().unwrap_or(Ok(4096))
    }

    fn write_interleaved(&mut self, frames: &[u8]) -> Result<usize, PcmError> {
        self.calls.borrow_mut().push(Call::Write(frames.to_vec()));
        self.writes
            .pop_front()
            .unwrap_or(Ok(frames.len() / self.bytes_per_frame))
    }

    fn prepare(&mut self) -> Result<(), PcmError> {
        self.calls.borrow_mut().push(Call::Prepare);
        match &self.prepare_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn drain(&mut self) -> Result<(), PcmError> {
        self.calls.borrow_mut().push(Call::Drain);
        Ok(())
    }

    fn close(self) -> Result<(), PcmError> {
        self.calls.borrow_mut().push(Call::Close);
        Ok(())
    }
}
