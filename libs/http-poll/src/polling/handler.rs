use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

use super::types::PollAttempt;
use crate::error::PollError;
use crate::request::Request;

/// Hooks into the polling loop, run in addition to the plain callbacks.
///
/// Every hook has a no-op default. Errors returned from a hook end the
/// session with [`PollError::Callback`].
#[async_trait]
pub trait PollEventHandler: Send + Sync {
    /// Called with the request about to be sent; may rewrite it.
    async fn pre_send(&self, _attempt: u32, _request: &mut Request) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called with the status and headers of every response before its body
    /// is read.
    async fn post_receive(
        &self,
        _attempt: u32,
        _status: StatusCode,
        _headers: &HeaderMap,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the error callback for a failed attempt.
    ///
    /// Returns the delay before the next attempt; `default_delay` is what
    /// the configured backoff would wait.
    async fn on_failure(
        &self,
        _attempt: u32,
        _error: &PollError,
        default_delay: Duration,
    ) -> anyhow::Result<Duration> {
        Ok(default_delay)
    }

    async fn attempt_completed(&self, _attempt: &PollAttempt) {}
}

#[async_trait]
impl<H: PollEventHandler + ?Sized> PollEventHandler for std::sync::Arc<H> {
    async fn pre_send(&self, attempt: u32, request: &mut Request) -> anyhow::Result<()> {
        (**self).pre_send(attempt, request).await
    }

    async fn post_receive(
        &self,
        attempt: u32,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> anyhow::Result<()> {
        (**self).post_receive(attempt, status, headers).await
    }

    async fn on_failure(
        &self,
        attempt: u32,
        error: &PollError,
        default_delay: Duration,
    ) -> anyhow::Result<Duration> {
        (**self).on_failure(attempt, error, default_delay).await
    }

    async fn attempt_completed(&self, attempt: &PollAttempt) {
        (**self).attempt_completed(attempt).await;
    }
}
