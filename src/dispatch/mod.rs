// Copyright @yucwang 2026

pub mod dispatcher;
pub mod protocol;
mod worker;

pub use dispatcher::{Completion, Dispatcher, DispatcherConfig, RequestState, ShutdownMode};
pub use protocol::{RequestId, WorkRequest, WorkerId};
