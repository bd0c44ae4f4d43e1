//! The long-polling state machine.
//!
//! A session is a strictly sequential series of attempts. Each attempt sends
//! the configured request through the injected [`RequestSender`], then either
//! parses a `text/event-stream` body event by event or decodes a one-shot
//! body through the [`ClientContext`]. Failures are reported and retried
//! after a backoff until the consecutive-failure budget runs out. The
//! session deadline and the cancellation token are observed at every
//! suspension point: while sending, reading, and waiting.

use http::StatusCode;
use http::header::HeaderValue;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{PollMode, PollingConfig};
use super::types::{AttemptOutcome, EndOfStream, EndReason, PollAttempt, PollData};
use crate::context::ClientContext;
use crate::error::PollError;
use crate::response::Response;
use crate::sse::SseEventStream;
use crate::transport::RequestSender;

const LAST_EVENT_ID: &str = "last-event-id";

/// Result of an attempt that did not fail.
enum Step {
    /// A one-shot body was decoded and dispatched; poll again immediately.
    Data,
    /// Nothing to dispatch (204 or empty body); wait before polling again.
    Idle,
    /// An event stream ended; reconnect after the retry interval.
    StreamEnded { events: usize },
}

enum Halt {
    Interrupted(EndReason),
    Failed(PollError),
}

impl From<PollError> for Halt {
    fn from(err: PollError) -> Self {
        Halt::Failed(err)
    }
}

/// Mutable state of one session.
struct Session {
    started: Instant,
    deadline: Option<Instant>,
    attempts: u32,
    failures: u32,
    interval: Duration,
    last_event_id: Option<String>,
}

impl Session {
    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Runs polling sessions against a shared [`ClientContext`].
#[derive(Debug, Clone)]
pub struct PollingEngine {
    context: Arc<ClientContext>,
}

impl PollingEngine {
    pub fn new(context: Arc<ClientContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    /// Run one session until it ends.
    ///
    /// Cancellation, the session deadline, exhausted retries and (in
    /// [`PollMode::UntilData`]) the first data all end the session through
    /// the end-of-stream callback and return `Ok`.
    ///
    /// # Errors
    /// - [`PollError::Configuration`] raised while decoding, after it has been
    ///   reported to the error callback;
    /// - [`PollError::Callback`] when a callback or handler hook fails.
    pub async fn run<T, S>(
        &self,
        config: &PollingConfig<T>,
        sender: &S,
        cancel: &CancellationToken,
    ) -> Result<EndOfStream, PollError>
    where
        T: DeserializeOwned + Send + 'static,
        S: RequestSender + ?Sized,
    {
        let started = Instant::now();
        let mut session = Session {
            started,
            deadline: config.timeout().map(|timeout| started + timeout),
            attempts: 0,
            failures: 0,
            interval: config.retry_interval(),
            last_event_id: None,
        };
        info!(
            method = %config.method(),
            uri = config.uri(),
            mode = ?config.mode(),
            "starting poll session"
        );

        loop {
            if cancel.is_cancelled() {
                return finish(config, &session, EndReason::Cancelled);
            }
            if session.deadline_passed() {
                return finish(config, &session, EndReason::Timeout);
            }

            session.attempts += 1;
            let attempt = session.attempts;
            let attempt_started = Instant::now();

            let result = self.attempt(config, sender, cancel, &mut session).await;
            let outcome = match &result {
                Ok(_) => AttemptOutcome::Success,
                Err(Halt::Failed(_)) => AttemptOutcome::Failure,
                Err(Halt::Interrupted(_)) => AttemptOutcome::Cancelled,
            };

            let wait = match result {
                Ok(step) => {
                    session.failures = 0;
                    completed(config, attempt, outcome, attempt_started).await;
                    let dispatched = match step {
                        Step::Data => true,
                        Step::Idle => false,
                        Step::StreamEnded { events } => events > 0,
                    };
                    if dispatched && config.mode() == PollMode::UntilData {
                        return finish(config, &session, EndReason::Completed);
                    }
                    match step {
                        Step::Data => None,
                        Step::Idle | Step::StreamEnded { .. } => Some(session.interval),
                    }
                }
                Err(Halt::Interrupted(reason)) => {
                    completed(config, attempt, outcome, attempt_started).await;
                    return finish(config, &session, reason);
                }
                Err(Halt::Failed(PollError::Callback(err))) => {
                    warn!(attempt, error = %err, "callback failed, ending poll session");
                    return Err(PollError::Callback(err));
                }
                Err(Halt::Failed(error)) => {
                    let delay = self
                        .handle_failure(config, &mut session, attempt, &error)
                        .await?;
                    completed(config, attempt, outcome, attempt_started).await;
                    if error.is_fatal() {
                        return Err(error);
                    }
                    if config
                        .max_retries()
                        .is_some_and(|max| session.failures >= max)
                    {
                        warn!(attempt, failures = session.failures, "too many consecutive failures");
                        return finish(config, &session, EndReason::RetriesExhausted);
                    }
                    Some(delay)
                }
            };

            if let Some(delay) = wait {
                debug!(attempt, ?delay, "waiting before next poll");
                if let Err(reason) = guarded(cancel, session.deadline, sleep(delay)).await {
                    return finish(config, &session, reason);
                }
            }
        }
    }

    /// Report a failed attempt and compute the delay before the next one.
    async fn handle_failure<T>(
        &self,
        config: &PollingConfig<T>,
        session: &mut Session,
        attempt: u32,
        error: &PollError,
    ) -> Result<Duration, PollError> {
        session.failures += 1;
        warn!(
            attempt,
            consecutive_failures = session.failures,
            elapsed_ms = session.elapsed_ms(),
            error = %error,
            "poll attempt failed"
        );

        config
            .callbacks()
            .error(attempt, error)
            .map_err(PollError::Callback)?;

        let default_delay = config.backoff(session.interval, session.failures);
        match config.handler() {
            Some(handler) => handler
                .on_failure(attempt, error, default_delay)
                .await
                .map_err(PollError::Callback),
            None => Ok(default_delay),
        }
    }

    async fn attempt<T, S>(
        &self,
        config: &PollingConfig<T>,
        sender: &S,
        cancel: &CancellationToken,
        session: &mut Session,
    ) -> Result<Step, Halt>
    where
        T: DeserializeOwned + Send + 'static,
        S: RequestSender + ?Sized,
    {
        let attempt = session.attempts;
        let mut request = config.request();
        if let Some(id) = &session.last_event_id
            && let Ok(value) = HeaderValue::from_str(id)
        {
            request.headers_mut().insert(LAST_EVENT_ID, value);
        }
        if let Some(handler) = config.handler() {
            handler
                .pre_send(attempt, &mut request)
                .await
                .map_err(PollError::Callback)?;
        }

        debug!(attempt, uri = request.uri(), "sending poll request");
        let response = guarded(cancel, session.deadline, sender.send(request))
            .await
            .map_err(Halt::Interrupted)??;

        if let Some(handler) = config.handler() {
            handler
                .post_receive(attempt, response.status(), response.headers())
                .await
                .map_err(PollError::Callback)?;
        }

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            debug!(attempt, "no content");
            return Ok(Step::Idle);
        }
        if !status.is_success() {
            let body = guarded(cancel, session.deadline, response.bytes())
                .await
                .map_err(Halt::Interrupted)?
                .unwrap_or_default();
            return Err(PollError::Status { status, body }.into());
        }

        if response.is_event_stream() {
            let events = self
                .stream_events(config, cancel, session, response.into_sse_stream())
                .await?;
            return Ok(Step::StreamEnded { events });
        }

        self.decode_once(config, cancel, session, response).await
    }

    async fn decode_once<T>(
        &self,
        config: &PollingConfig<T>,
        cancel: &CancellationToken,
        session: &Session,
        response: Response,
    ) -> Result<Step, Halt>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let status = response.status();
        let headers = response.headers().clone();
        let body = guarded(cancel, session.deadline, response.bytes())
            .await
            .map_err(Halt::Interrupted)??;
        if body.is_empty() {
            debug!(attempt = session.attempts, "empty body");
            return Ok(Step::Idle);
        }

        let value: T = self
            .context
            .decode_body(status, &headers, &body, config.unwrap_envelope())?;
        config
            .callbacks()
            .data(session.attempts, PollData::Value(value))
            .map_err(PollError::Callback)?;
        Ok(Step::Data)
    }

    async fn stream_events<T>(
        &self,
        config: &PollingConfig<T>,
        cancel: &CancellationToken,
        session: &mut Session,
        mut events: SseEventStream,
    ) -> Result<usize, Halt> {
        let attempt = session.attempts;
        let mut dispatched = 0;
        while let Some(event) = guarded(cancel, session.deadline, events.next_event())
            .await
            .map_err(Halt::Interrupted)??
        {
            if let Some(id) = event.id() {
                session.last_event_id = (!id.is_empty()).then(|| id.to_owned());
            }
            // The interval never drops to zero.
            if let Some(retry) = event.retry().filter(|retry| !retry.is_zero()) {
                debug!(attempt, ?retry, "server set retry interval");
                session.interval = retry;
            }
            config
                .callbacks()
                .data(attempt, PollData::Event(event))
                .map_err(PollError::Callback)?;
            dispatched += 1;
        }
        debug!(attempt, events = dispatched, "event stream ended");
        Ok(dispatched)
    }
}

/// Race `fut` against cancellation and the session deadline.
async fn guarded<F: Future>(
    cancel: &CancellationToken,
    deadline: Option<Instant>,
    fut: F,
) -> Result<F::Output, EndReason> {
    let expiry = async {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(EndReason::Cancelled),
        () = expiry => Err(EndReason::Timeout),
        output = fut => Ok(output),
    }
}

async fn completed<T>(
    config: &PollingConfig<T>,
    index: u32,
    outcome: AttemptOutcome,
    started: Instant,
) {
    if let Some(handler) = config.handler() {
        let attempt = PollAttempt {
            index,
            outcome,
            elapsed: started.elapsed(),
        };
        handler.attempt_completed(&attempt).await;
    }
}

fn finish<T>(
    config: &PollingConfig<T>,
    session: &Session,
    reason: EndReason,
) -> Result<EndOfStream, PollError> {
    let end = EndOfStream {
        reason,
        attempts: session.attempts,
        elapsed: session.started.elapsed(),
    };
    info!(
        reason = %reason,
        attempts = end.attempts,
        elapsed_ms = session.elapsed_ms(),
        "poll session ended"
    );
    config.callbacks().end(&end).map_err(PollError::Callback)?;
    Ok(end)
}
