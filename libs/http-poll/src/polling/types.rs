use std::fmt;
use std::time::Duration;

use crate::sse::SseEvent;

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
    Cancelled,
}

/// One iteration of the polling loop, reported to
/// [`PollEventHandler::attempt_completed`](super::PollEventHandler::attempt_completed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollAttempt {
    /// 1-based ordinal within the session
    pub index: u32,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// [`PollMode::UntilData`](super::PollMode::UntilData) received its data
    Completed,
    RetriesExhausted,
    Timeout,
    Cancelled,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Completed => "completed",
            EndReason::RetriesExhausted => "retries exhausted",
            EndReason::Timeout => "timeout",
            EndReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Passed to the end-of-stream callback and returned from
/// [`PollingEngine::run`](super::PollingEngine::run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfStream {
    pub reason: EndReason,
    /// Attempts started during the session
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Data handed to the data callback.
#[derive(Debug, Clone, PartialEq)]
pub enum PollData<T> {
    /// One event of a `text/event-stream` response
    Event(SseEvent),
    /// A decoded one-shot body
    Value(T),
}

impl<T> PollData<T> {
    pub fn as_event(&self) -> Option<&SseEvent> {
        match self {
            PollData::Event(event) => Some(event),
            PollData::Value(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            PollData::Value(value) => Some(value),
            PollData::Event(_) => None,
        }
    }
}
