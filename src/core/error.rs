// Copyright @yucwang 2026

use std::fmt;

use crate::dispatch::protocol::RequestId;

/// Failures of the accumulation state itself. None of them mutate the state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulateError {
    #[error("sample buffer has {actual} values, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no samples have been accumulated yet")]
    NoSamplesYet,

    #[error("cannot allocate a {width}x{height} sample buffer")]
    AllocationFailure { width: u32, height: u32 },
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("invalid work request {width}x{height}: dimensions must be positive")]
    InvalidRequest { width: u32, height: u32 },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Why a pending request will never produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LostReason {
    /// The sample source panicked on the worker; the worker is gone.
    Panicked(String),
    /// The worker thread ended without reporting.
    Terminated,
    /// The worker returned a buffer of the wrong size.
    MalformedResult { expected: usize, actual: usize },
    /// The caller cancelled the request.
    Cancelled,
    /// The dispatcher was shut down with the request still pending.
    ShutDown,
}

impl fmt::Display for LostReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LostReason::Panicked(msg) => write!(f, "sample source panicked: {}", msg),
            LostReason::Terminated => write!(f, "worker terminated"),
            LostReason::MalformedResult { expected, actual } => {
                write!(f, "worker returned {} values, expected {}", actual, expected)
            }
            LostReason::Cancelled => write!(f, "cancelled"),
            LostReason::ShutDown => write!(f, "dispatcher shut down"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("request {request} lost: {reason}")]
pub struct WorkerLost {
    pub request: RequestId,
    pub reason: LostReason,
}

#[derive(thiserror::Error, Debug)]
pub enum PresentError {
    #[error("image buffer does not match {width}x{height}")]
    Shape { width: u32, height: u32 },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("exr error: {0}")]
    Exr(#[from] exr::error::Error),

    #[error(transparent)]
    Accumulate(#[from] AccumulateError),
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("invalid render settings: {0}")]
    Settings(String),

    #[error(transparent)]
    Accumulate(#[from] AccumulateError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Present(#[from] PresentError),

    #[error("giving up after {retries} retries, last failure: {last}")]
    RetriesExhausted { retries: u32, last: WorkerLost },
}
