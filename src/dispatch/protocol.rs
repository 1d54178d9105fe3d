// Copyright @yucwang 2026

//! Messages exchanged between the control thread and sample workers.
//!
//! Every buffer crosses the boundary by value through a channel, so the
//! sending side cannot touch it once it is sent.

use std::fmt;

use crate::core::error::{DispatchError, LostReason};
use crate::math::buffer::{buffer_len, SampleBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Size of the sample a worker is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkRequest {
    width: u32,
    height: u32,
}

impl WorkRequest {
    pub fn new(width: u32, height: u32) -> Result<Self, DispatchError> {
        if width == 0 || height == 0 || buffer_len(width, height).is_err() {
            return Err(DispatchError::InvalidRequest { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of floats a conforming response carries.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * crate::math::constants::CHANNELS
    }
}

/// Main to worker, once per dispatch.
#[derive(Debug)]
pub(crate) struct Job {
    pub request: RequestId,
    pub work: WorkRequest,
}

/// Worker to main, at most once per job.
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Completed {
        worker: WorkerId,
        request: RequestId,
        buffer: SampleBuffer,
    },
    Failed {
        worker: WorkerId,
        request: RequestId,
        reason: LostReason,
    },
}
