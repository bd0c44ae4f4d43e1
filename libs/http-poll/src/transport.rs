use async_trait::async_trait;
use futures::TryStreamExt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::body::Body;
use crate::error::PollError;
use crate::request::Request;
use crate::response::Response;

/// Executes one resolved request.
///
/// The polling engine only talks to the network through this trait, so tests
/// and hosts can substitute their own execution layer. Any async closure
/// `Fn(Request) -> Future<Output = Result<Response, PollError>>` implements it.
#[async_trait]
pub trait RequestSender: Send + Sync {
    /// # Errors
    /// [`PollError::Transport`] for connection-level failures.
    async fn send(&self, request: Request) -> Result<Response, PollError>;
}

#[async_trait]
impl<F, Fut> RequestSender for F
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, PollError>> + Send + 'static,
{
    async fn send(&self, request: Request) -> Result<Response, PollError> {
        (self)(request).await
    }
}

/// [`RequestSender`] backed by a shared `reqwest::Client`.
///
/// Response bodies are streamed, which lets SSE responses be parsed as they
/// arrive.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport whose client applies `timeout` to every request.
    ///
    /// # Errors
    /// [`PollError::Configuration`] if the client cannot be built.
    pub fn new(timeout: Option<Duration>) -> Result<Self, PollError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| PollError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { http_client })
    }

    /// Wrap an already configured client.
    pub fn from_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl RequestSender for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response, PollError> {
        let mut req_builder = self
            .http_client
            .request(request.method().clone(), request.uri());

        for (name, value) in request.headers() {
            req_builder = req_builder.header(name, value);
        }

        // Must be read before the body consumes the request
        if let Some(timeout) = request.timeout() {
            req_builder = req_builder.timeout(timeout);
        }

        req_builder = match request.into_body() {
            Body::Empty => req_builder,
            Body::Bytes(bytes) => req_builder.body(bytes),
            Body::Stream(stream) => req_builder.body(reqwest::Body::wrap_stream(stream)),
        };

        let resp = req_builder.send().await?;

        let status = resp.status();
        let headers = resp.headers().clone();
        debug!(%status, url = %resp.url(), "received response");

        let stream = resp.bytes_stream().map_err(PollError::from);
        Ok(Response::new(status, headers, Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method, StatusCode};
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_closure_sender() {
        let sender = |request: Request| async move {
            assert_eq!(request.uri(), "/ping");
            Ok::<_, PollError>(Response::from_bytes(StatusCode::OK, HeaderMap::new(), "pong"))
        };
        let request = Request::builder().uri("/ping").build().unwrap();
        let response = sender.send(request).await.unwrap();
        assert_eq!(response.text().await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_reqwest_transport_forwards_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/submit")
                    .header("x-request-id", "42")
                    .body("payload");
                then.status(202)
                    .header("content-type", "text/plain")
                    .body("accepted");
            })
            .await;

        let transport = ReqwestTransport::new(Some(Duration::from_secs(5))).unwrap();
        let request = Request::builder()
            .method(Method::POST)
            .uri(server.url("/submit"))
            .header("x-request-id", "42")
            .unwrap()
            .body("payload")
            .build()
            .unwrap();

        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.media_type().unwrap().essence(), "text/plain");
        assert_eq!(response.text().await.unwrap(), "accepted");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let transport = ReqwestTransport::new(Some(Duration::from_secs(1))).unwrap();
        let request = Request::builder()
            .uri("http://127.0.0.1:1/unreachable")
            .build()
            .unwrap();
        let err = transport.send(request).await.unwrap_err();
        assert!(matches!(err, PollError::Transport(_)), "got {err:?}");
    }
}
