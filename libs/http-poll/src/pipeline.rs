//! Ordered preparation of a [`Request`] from declaration metadata.
//!
//! Each stage is a pure function from a request and the metadata to a new
//! request. Stages run in registration order; the first failing stage aborts
//! the pipeline.

use http::header::ACCEPT;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tracing::trace;
use url::Url;

use crate::error::PollError;
use crate::request::Request;

/// Per-declaration defaults applied to every request issued from it.
#[derive(Debug, Clone, Default)]
pub struct DeclarationMetadata {
    base_url: Option<Url>,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    accept: Option<HeaderValue>,
    timeout: Option<Duration>,
}

impl DeclarationMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// [`PollError::Configuration`] if `base_url` is not an absolute URL.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, PollError> {
        let url = Url::parse(base_url)
            .map_err(|e| PollError::Configuration(format!("invalid base URL '{base_url}': {e}")))?;
        self.base_url = Some(url);
        Ok(self)
    }

    /// Header added to requests that do not already carry it.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_accept(mut self, accept: HeaderValue) -> Self {
        self.accept = Some(accept);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn accept(&self) -> Option<&HeaderValue> {
        self.accept.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// A single preparation step.
pub type RequestStage = fn(Request, &DeclarationMetadata) -> Result<Request, PollError>;

/// Resolve a relative URI against the base URL. Absolute URIs pass through.
///
/// # Errors
/// [`PollError::Configuration`] if the joined URL does not parse.
pub fn apply_base_url(request: Request, metadata: &DeclarationMetadata) -> Result<Request, PollError> {
    if Url::parse(request.uri()).is_ok() {
        return Ok(request);
    }
    let Some(base) = metadata.base_url() else {
        return Ok(request);
    };
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        request.uri().trim_start_matches('/')
    );
    let url = Url::parse(&joined)
        .map_err(|e| PollError::Configuration(format!("cannot resolve '{joined}': {e}")))?;
    Ok(request.with_uri(url))
}

/// Add declaration headers the request does not set itself.
///
/// # Errors
/// Never fails.
pub fn apply_default_headers(
    mut request: Request,
    metadata: &DeclarationMetadata,
) -> Result<Request, PollError> {
    for name in metadata.headers().keys() {
        if request.headers().contains_key(name) {
            continue;
        }
        for value in metadata.headers().get_all(name) {
            request.headers_mut().append(name.clone(), value.clone());
        }
    }
    Ok(request)
}

/// Append the declaration's query parameters.
///
/// # Errors
/// [`PollError::Configuration`] if there are parameters to add but the URI is
/// still relative.
pub fn apply_query(request: Request, metadata: &DeclarationMetadata) -> Result<Request, PollError> {
    if metadata.query().is_empty() {
        return Ok(request);
    }
    let mut url = Url::parse(request.uri()).map_err(|e| {
        PollError::Configuration(format!(
            "cannot add query parameters to '{}': {e}",
            request.uri()
        ))
    })?;
    url.query_pairs_mut().extend_pairs(metadata.query());
    Ok(request.with_uri(url))
}

/// Set `Accept` unless the request already negotiates one.
///
/// # Errors
/// Never fails.
pub fn apply_accept(mut request: Request, metadata: &DeclarationMetadata) -> Result<Request, PollError> {
    if let Some(accept) = metadata.accept()
        && !request.headers().contains_key(ACCEPT)
    {
        request.headers_mut().insert(ACCEPT, accept.clone());
    }
    Ok(request)
}

/// Fall back to the declaration timeout.
///
/// # Errors
/// Never fails.
pub fn apply_timeout(request: Request, metadata: &DeclarationMetadata) -> Result<Request, PollError> {
    if request.timeout().is_some() {
        return Ok(request);
    }
    let timeout = metadata.timeout();
    Ok(request.with_timeout(timeout))
}

/// Ordered list of [`RequestStage`]s.
#[derive(Clone)]
pub struct RequestPipeline {
    stages: Vec<(&'static str, RequestStage)>,
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|(name, _)| name))
            .finish()
    }
}

impl Default for RequestPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl RequestPipeline {
    /// Base URL, default headers, query, `Accept`, timeout.
    pub fn standard() -> Self {
        Self::empty()
            .with_stage("base_url", apply_base_url)
            .with_stage("default_headers", apply_default_headers)
            .with_stage("query", apply_query)
            .with_stage("accept", apply_accept)
            .with_stage("timeout", apply_timeout)
    }

    pub fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage; it runs after every stage already present.
    #[must_use]
    pub fn with_stage(mut self, name: &'static str, stage: RequestStage) -> Self {
        self.stages.push((name, stage));
        self
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|(name, _)| *name)
    }

    /// Run every stage in order.
    ///
    /// # Errors
    /// The first stage error, unchanged.
    pub fn apply(&self, request: Request, metadata: &DeclarationMetadata) -> Result<Request, PollError> {
        self.stages.iter().try_fold(request, |request, (name, stage)| {
            trace!(stage = name, uri = request.uri(), "applying request stage");
            stage(request, metadata)
        })
    }
}
