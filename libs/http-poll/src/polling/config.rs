use bytes::Bytes;
use http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::handler::PollEventHandler;
use super::types::{EndOfStream, PollData};
use crate::body::Body;
use crate::error::PollError;
use crate::request::Request;
use crate::settings::PollingSettings;

/// When a session ends on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollMode {
    /// Keep polling until cancelled, timed out or out of retries
    #[default]
    Continuous,
    /// End with [`EndReason::Completed`](super::EndReason::Completed) after
    /// the first attempt that dispatched data
    UntilData,
}

pub type DataCallback<T> = Arc<dyn Fn(u32, PollData<T>) -> anyhow::Result<()> + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(u32, &PollError) -> anyhow::Result<()> + Send + Sync>;
pub type EndCallback = Arc<dyn Fn(&EndOfStream) -> anyhow::Result<()> + Send + Sync>;

/// Plain callbacks of a session. Unset callbacks are no-ops.
pub struct Callbacks<T> {
    on_data: Option<DataCallback<T>>,
    on_error: Option<ErrorCallback>,
    on_end: Option<EndCallback>,
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self {
            on_data: None,
            on_error: None,
            on_end: None,
        }
    }
}

impl<T> Clone for Callbacks<T> {
    fn clone(&self) -> Self {
        Self {
            on_data: self.on_data.clone(),
            on_error: self.on_error.clone(),
            on_end: self.on_end.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Callbacks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_data", &self.on_data.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_end", &self.on_end.is_some())
            .finish()
    }
}

impl<T> Callbacks<T> {
    pub(crate) fn data(&self, attempt: u32, data: PollData<T>) -> anyhow::Result<()> {
        self.on_data.as_ref().map_or(Ok(()), |f| f(attempt, data))
    }

    pub(crate) fn error(&self, attempt: u32, error: &PollError) -> anyhow::Result<()> {
        self.on_error.as_ref().map_or(Ok(()), |f| f(attempt, error))
    }

    pub(crate) fn end(&self, end: &EndOfStream) -> anyhow::Result<()> {
        self.on_end.as_ref().map_or(Ok(()), |f| f(end))
    }
}

/// Buffered copy of the polled request, re-instantiated for every attempt.
#[derive(Debug, Clone)]
struct RequestTemplate {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Option<Duration>,
}

impl TryFrom<Request> for RequestTemplate {
    type Error = PollError;

    fn try_from(request: Request) -> Result<Self, Self::Error> {
        let method = request.method().clone();
        let uri = request.uri().to_owned();
        let headers = request.headers().clone();
        let timeout = request.timeout();
        let body = match request.into_body() {
            Body::Empty => None,
            Body::Bytes(bytes) => Some(bytes),
            Body::Stream(_) => {
                return Err(PollError::Configuration(
                    "polling requests need a buffered body; streams cannot be re-sent".into(),
                ));
            }
        };
        Ok(Self {
            method,
            uri,
            headers,
            body,
            timeout,
        })
    }
}

impl RequestTemplate {
    fn instantiate(&self) -> Request {
        Request::from_parts(
            self.method.clone(),
            self.uri.clone(),
            self.headers.clone(),
            self.body.clone().map_or(Body::Empty, Body::Bytes),
            self.timeout,
        )
    }
}

/// A validated polling session description.
///
/// Owned by the caller and only borrowed by the engine.
pub struct PollingConfig<T> {
    request: RequestTemplate,
    retry_interval: Duration,
    max_retry_interval: Option<Duration>,
    backoff_factor: u32,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    mode: PollMode,
    unwrap_envelope: bool,
    callbacks: Callbacks<T>,
    handler: Option<Arc<dyn PollEventHandler>>,
}

impl<T> std::fmt::Debug for PollingConfig<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingConfig")
            .field("request", &self.request)
            .field("retry_interval", &self.retry_interval)
            .field("max_retry_interval", &self.max_retry_interval)
            .field("backoff_factor", &self.backoff_factor)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("mode", &self.mode)
            .field("unwrap_envelope", &self.unwrap_envelope)
            .field("callbacks", &self.callbacks)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl<T> PollingConfig<T> {
    pub fn builder() -> PollingConfigBuilder<T> {
        PollingConfigBuilder::default()
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn uri(&self) -> &str {
        &self.request.uri
    }

    /// Fresh copy of the configured request.
    pub fn request(&self) -> Request {
        self.request.instantiate()
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn max_retry_interval(&self) -> Option<Duration> {
        self.max_retry_interval
    }

    pub fn backoff_factor(&self) -> u32 {
        self.backoff_factor
    }

    /// Bound on the whole session, across attempts
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Consecutive failed attempts tolerated; `None` retries forever
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    pub fn mode(&self) -> PollMode {
        self.mode
    }

    pub fn unwrap_envelope(&self) -> bool {
        self.unwrap_envelope
    }

    pub fn callbacks(&self) -> &Callbacks<T> {
        &self.callbacks
    }

    pub fn handler(&self) -> Option<&dyn PollEventHandler> {
        self.handler.as_deref()
    }

    /// Delay after the `failures`-th consecutive failure, starting from `base`.
    ///
    /// `base × factor^(failures - 1)`, capped at `max_retry_interval` (but
    /// never below `base`).
    pub fn backoff(&self, base: Duration, failures: u32) -> Duration {
        let multiplier = self
            .backoff_factor
            .saturating_pow(failures.saturating_sub(1));
        let delay = base.saturating_mul(multiplier);
        self.max_retry_interval
            .map_or(delay, |cap| delay.min(cap.max(base)))
    }
}

/// Builder for [`PollingConfig`]
pub struct PollingConfigBuilder<T> {
    request: Option<Request>,
    retry_interval: Duration,
    max_retry_interval: Option<Duration>,
    backoff_factor: u32,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    mode: PollMode,
    unwrap_envelope: bool,
    callbacks: Callbacks<T>,
    handler: Option<Arc<dyn PollEventHandler>>,
}

impl<T> Default for PollingConfigBuilder<T> {
    fn default() -> Self {
        Self::from_settings(&PollingSettings::default())
    }
}

impl<T> PollingConfigBuilder<T> {
    /// Start from loaded settings.
    pub fn from_settings(settings: &PollingSettings) -> Self {
        Self {
            request: None,
            retry_interval: settings.retry_interval,
            max_retry_interval: settings.max_retry_interval,
            backoff_factor: settings.backoff_factor,
            timeout: settings.timeout,
            max_retries: settings.max_retries,
            mode: settings.mode,
            unwrap_envelope: settings.unwrap_envelope,
            callbacks: Callbacks::default(),
            handler: None,
        }
    }

    #[must_use]
    pub fn request(mut self, request: Request) -> Self {
        self.request = Some(request);
        self
    }

    #[must_use]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    #[must_use]
    pub fn max_retry_interval(mut self, interval: Duration) -> Self {
        self.max_retry_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn backoff_factor(mut self, factor: u32) -> Self {
        self.backoff_factor = factor;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Retry failed attempts without limit.
    #[must_use]
    pub fn unbounded_retries(mut self) -> Self {
        self.max_retries = None;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: PollMode) -> Self {
        self.mode = mode;
        self
    }

    /// Decode one-shot bodies through the context's envelope.
    #[must_use]
    pub fn unwrap_envelope(mut self, unwrap: bool) -> Self {
        self.unwrap_envelope = unwrap;
        self
    }

    #[must_use]
    pub fn on_data<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, PollData<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.on_data = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, &PollError) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_end<F>(mut self, f: F) -> Self
    where
        F: Fn(&EndOfStream) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.on_end = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn handler<H: PollEventHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    /// [`PollError::Configuration`] when the request is missing or has a
    /// streaming body, the retry interval is zero, `max_retries` is zero,
    /// the backoff factor is zero, or the maximum retry interval is shorter
    /// than the retry interval.
    pub fn build(self) -> Result<PollingConfig<T>, PollError> {
        let request = self
            .request
            .ok_or_else(|| PollError::Configuration("polling request is required".into()))?;
        if self.retry_interval.is_zero() {
            return Err(PollError::Configuration(
                "retry interval must be greater than zero".into(),
            ));
        }
        if self.max_retries == Some(0) {
            return Err(PollError::Configuration(
                "max retries must be greater than zero when bounded".into(),
            ));
        }
        if self.backoff_factor == 0 {
            return Err(PollError::Configuration(
                "backoff factor must be at least 1".into(),
            ));
        }
        if let Some(max) = self.max_retry_interval
            && max < self.retry_interval
        {
            return Err(PollError::Configuration(format!(
                "max retry interval {max:?} is shorter than retry interval {:?}",
                self.retry_interval
            )));
        }

        Ok(PollingConfig {
            request: RequestTemplate::try_from(request)?,
            retry_interval: self.retry_interval,
            max_retry_interval: self.max_retry_interval,
            backoff_factor: self.backoff_factor,
            timeout: self.timeout,
            max_retries: self.max_retries,
            mode: self.mode,
            unwrap_envelope: self.unwrap_envelope,
            callbacks: self.callbacks,
            handler: self.handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::builder().uri("http://localhost/poll").build().unwrap()
    }

    #[test]
    fn test_defaults_come_from_settings() {
        let config = PollingConfig::<String>::builder().request(request()).build().unwrap();
        let settings = PollingSettings::default();
        assert_eq!(config.retry_interval(), settings.retry_interval);
        assert_eq!(config.max_retries(), settings.max_retries);
        assert_eq!(config.mode(), PollMode::Continuous);
        assert_eq!(config.uri(), "http://localhost/poll");
        assert_eq!(config.method(), Method::GET);
    }

    #[test]
    fn test_validation() {
        let cases: Vec<(&str, PollingConfigBuilder<String>)> = vec![
            ("missing request", PollingConfig::builder()),
            (
                "zero interval",
                PollingConfig::builder()
                    .request(request())
                    .retry_interval(Duration::ZERO),
            ),
            (
                "zero retries",
                PollingConfig::builder().request(request()).max_retries(0),
            ),
            (
                "zero factor",
                PollingConfig::builder().request(request()).backoff_factor(0),
            ),
            (
                "cap below interval",
                PollingConfig::builder()
                    .request(request())
                    .retry_interval(Duration::from_secs(2))
                    .max_retry_interval(Duration::from_secs(1)),
            ),
        ];
        for (name, builder) in cases {
            let err = builder.build().unwrap_err();
            assert!(matches!(err, PollError::Configuration(_)), "{name}: {err:?}");
        }
    }

    #[test]
    fn test_streaming_body_is_rejected() {
        let stream = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"x"))]);
        let request = Request::builder()
            .uri("http://localhost/poll")
            .body(Body::Stream(Box::pin(stream)))
            .build()
            .unwrap();
        let err = PollingConfig::<String>::builder().request(request).build().unwrap_err();
        assert!(err.to_string().contains("buffered body"));
    }

    #[test]
    fn test_request_is_reinstantiated() {
        let request = Request::builder()
            .uri("http://localhost/poll")
            .header("x-cursor", "9")
            .unwrap()
            .body("filter")
            .build()
            .unwrap();
        let config = PollingConfig::<String>::builder().request(request).build().unwrap();
        let first = config.request();
        let second = config.request();
        assert_eq!(first.headers()["x-cursor"], "9");
        assert!(matches!(second.body(), Body::Bytes(b) if b.as_ref() == b"filter"));
    }

    #[test]
    fn test_backoff() {
        let config = PollingConfig::<String>::builder()
            .request(request())
            .retry_interval(Duration::from_millis(100))
            .backoff_factor(2)
            .max_retry_interval(Duration::from_millis(500))
            .build()
            .unwrap();
        let base = config.retry_interval();
        let delays: Vec<_> = (1..=5).map(|n| config.backoff(base, n)).collect();
        assert_eq!(
            delays,
            [100, 200, 400, 500, 500].map(Duration::from_millis)
        );

        // A server-sent interval above the cap is kept as is.
        assert_eq!(
            config.backoff(Duration::from_secs(2), 3),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_constant_backoff_by_default() {
        let config = PollingConfig::<String>::builder()
            .request(request())
            .retry_interval(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(config.backoff(config.retry_interval(), 7), Duration::from_millis(250));
    }
}
