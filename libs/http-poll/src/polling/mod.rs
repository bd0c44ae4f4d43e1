//! Long polling over an injected [`RequestSender`](crate::RequestSender).

mod config;
mod engine;
mod handler;
mod types;

pub use config::{
    Callbacks, DataCallback, EndCallback, ErrorCallback, PollMode, PollingConfig,
    PollingConfigBuilder,
};
pub use engine::PollingEngine;
pub use handler::PollEventHandler;
pub use types::{AttemptOutcome, EndOfStream, EndReason, PollAttempt, PollData};
