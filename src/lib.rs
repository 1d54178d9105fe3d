// Copyright @yucwang 2021

//! Progressive rendering: noisy sample buffers produced on a worker pool are
//! averaged into a running estimate that is presented while it converges.

pub extern crate nalgebra as na;

pub mod core;
pub mod dispatch;
pub mod io;
pub mod math;
pub mod presenters;
pub mod renderers;
pub mod sources;

pub use crate::core::accumulator::Accumulator;
pub use crate::core::error::{AccumulateError, DispatchError, LostReason, PresentError, RenderError, WorkerLost};
pub use crate::core::presenter::Presenter;
pub use crate::core::sample_source::SampleSource;
pub use crate::dispatch::{Completion, Dispatcher, DispatcherConfig, RequestId, RequestState, ShutdownMode, WorkRequest};
pub use crate::math::buffer::{DisplayImage, SampleBuffer};
