//! Response processing and streaming engine for HTTP clients.
//!
//! A caller describes one logical operation ("poll this endpoint until the
//! stream ends", "decode this response into a typed value") and the crate
//! takes care of:
//!
//! - retry, backoff, session deadline and cancellation ([`PollingEngine`]);
//! - incremental `text/event-stream` framing ([`SseParser`], [`SseEventStream`]);
//! - content-type driven decoding ([`ConverterRegistry`]), including
//!   unwrapping `{success, data}` API envelopes ([`JsonSerializationContext`]).
//!
//! The network is reached only through a [`RequestSender`]; [`ReqwestTransport`]
//! is the provided implementation.
//!
//! # Examples
//!
//! ## Long polling
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use http_poll::{
//!     ClientContext, PollData, PollingConfig, PollingEngine, ReqwestTransport, Request,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PollingConfig::<serde_json::Value>::builder()
//!     .request(Request::builder().uri("http://localhost:8080/v1/updates").build()?)
//!     .retry_interval(Duration::from_secs(2))
//!     .max_retries(5)
//!     .on_data(|attempt, data| {
//!         if let PollData::Value(value) = data {
//!             println!("attempt {attempt}: {value}");
//!         }
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let engine = PollingEngine::new(Arc::new(ClientContext::new()));
//! let transport = ReqwestTransport::new(Some(Duration::from_secs(60)))?;
//! let end = engine.run(&config, &transport, &CancellationToken::new()).await?;
//! println!("session ended: {}", end.reason);
//! # Ok(())
//! # }
//! ```
//!
//! ## One-shot decoding through an envelope
//!
//! ```no_run
//! use http_poll::{ClientContext, EnvelopeDescriptor, ReqwestTransport, Request, RequestSender};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = ClientContext::builder()
//!     .envelope(EnvelopeDescriptor::default())
//!     .build();
//! let transport = ReqwestTransport::new(None)?;
//!
//! let response = transport
//!     .send(Request::builder().uri("http://localhost:8080/v1/users/1").build()?)
//!     .await?;
//! let user: User = context.decode(response, true).await?;
//! println!("{} {}", user.id, user.name);
//! # Ok(())
//! # }
//! ```
//!
//! ## SSE streaming
//!
//! ```no_run
//! use http_poll::{ReqwestTransport, Request, RequestSender};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ReqwestTransport::new(None)?;
//! let request = Request::builder()
//!     .uri("http://localhost:8080/v1/events")
//!     .header("accept", "text/event-stream")?
//!     .build()?;
//!
//! let mut sse = transport.send(request).await?.into_sse_stream();
//! while let Some(event) = sse.next_event().await? {
//!     println!("{:?}: {}", event.event(), event.data());
//! }
//! # Ok(())
//! # }
//! ```

mod body;
mod context;
mod convert;
mod envelope;
mod error;
mod pipeline;
mod polling;
mod request;
mod response;
mod settings;
mod sse;
mod transport;

pub use body::{Body, BoxStream};
pub use context::{ClientContext, ClientContextBuilder, ResponseValidator};
pub use convert::{
    ConverterDescriptor, ConverterRegistry, CustomDecoder, Format, MediaType, Predicate,
    TargetKind,
};
pub use envelope::{
    DecodeType, EnvelopeAccessor, EnvelopeDescriptor, Extractor, JsonOptions,
    JsonSerializationContext,
};
pub use error::{BoxError, PollError};
pub use pipeline::{
    DeclarationMetadata, RequestPipeline, RequestStage, apply_accept, apply_base_url,
    apply_default_headers, apply_query, apply_timeout,
};
pub use polling::{
    AttemptOutcome, Callbacks, DataCallback, EndCallback, EndOfStream, EndReason, ErrorCallback,
    PollAttempt, PollData, PollEventHandler, PollMode, PollingConfig, PollingConfigBuilder,
    PollingEngine,
};
pub use request::{Request, RequestBuilder};
pub use response::Response;
pub use settings::{ENV_PREFIX, PollingSettings};
pub use sse::{SseEvent, SseEventStream, SseParser};
pub use transport::{ReqwestTransport, RequestSender};

// Re-export commonly used types from dependencies
pub use http::{Method, StatusCode};
pub use tokio_util::sync::CancellationToken;
