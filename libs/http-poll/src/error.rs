use std::io;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use thiserror::Error;

/// Boxed error type used for transport and decoder causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while sending, decoding or polling.
///
/// Polling treats the variants differently: transport, status, decode and
/// validation failures are retried; configuration and callback failures end
/// the session; cancellation and deadline expiry end it through the
/// end-of-stream callback.
#[derive(Debug, Error)]
pub enum PollError {
    /// The injected send function failed (connect, TLS, I/O, HTTP-layer timeout).
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The server answered with a non-success status.
    #[error("HTTP error: status={status}")]
    Status { status: StatusCode, body: Bytes },

    /// The body could not be converted into the requested type.
    #[error("cannot decode {target_type} from '{content_type}': {source}")]
    Decode {
        target_type: &'static str,
        content_type: String,
        #[source]
        source: BoxError,
    },

    /// Static misconfiguration: invalid polling parameters or envelope setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A response validator rejected a decoded response.
    #[error("response validation failed: {detail}")]
    Validation { detail: String },

    /// For [`RequestSender`](crate::RequestSender) implementations that observe
    /// their own cancellation. The polling engine ends a cancelled session with
    /// [`EndReason::Cancelled`](crate::EndReason::Cancelled) instead.
    #[error("polling cancelled")]
    Cancelled,

    /// For senders enforcing their own deadline. An expired session timeout
    /// ends with [`EndReason::Timeout`](crate::EndReason::Timeout).
    #[error("deadline of {timeout:?} exceeded")]
    DeadlineExceeded { timeout: Duration },

    /// A caller-supplied callback or handler hook returned an error.
    #[error("callback failed: {0}")]
    Callback(#[source] anyhow::Error),

    /// Local I/O failure raised by a sender, e.g. while reading a request
    /// body from disk. Retried like a transport error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PollError {
    pub(crate) fn decode(
        target_type: &'static str,
        content_type: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        PollError::Decode {
            target_type,
            content_type: content_type.into(),
            source: source.into(),
        }
    }

    /// Whether a polling session may recover from this error by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PollError::Transport(_)
                | PollError::Status { .. }
                | PollError::Decode { .. }
                | PollError::Validation { .. }
                | PollError::Io(_)
        )
    }

    /// Whether this error ends a polling session and is returned to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PollError::Configuration(_) | PollError::Callback(_))
    }
}

impl From<reqwest::Error> for PollError {
    fn from(err: reqwest::Error) -> Self {
        PollError::Transport(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(PollError::Transport("connection reset".into()).is_retryable());
        assert!(
            PollError::Status {
                status: StatusCode::BAD_GATEWAY,
                body: Bytes::new(),
            }
            .is_retryable()
        );
        assert!(PollError::decode("u32", "application/json", "bad digit").is_retryable());
        assert!(!PollError::Configuration("x".into()).is_retryable());
        assert!(!PollError::Cancelled.is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PollError::Configuration("bad envelope".into()).is_fatal());
        assert!(PollError::Callback(anyhow::anyhow!("boom")).is_fatal());
        assert!(!PollError::Transport("reset".into()).is_fatal());
        assert!(!PollError::DeadlineExceeded { timeout: Duration::from_secs(1) }.is_fatal());
    }

    #[test]
    fn test_sender_io_error_is_retryable() {
        let err = PollError::from(io::Error::new(io::ErrorKind::NotFound, "body.json"));
        assert!(matches!(err, PollError::Io(_)));
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_decode_error_display() {
        let err = PollError::decode("my::Model", "text/xml", "missing field `id`");
        assert_eq!(
            err.to_string(),
            "cannot decode my::Model from 'text/xml': missing field `id`"
        );
    }
}
