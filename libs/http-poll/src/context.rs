use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

use crate::convert::{ConverterRegistry, MediaType};
use crate::envelope::{EnvelopeDescriptor, JsonOptions, JsonSerializationContext};
use crate::error::PollError;
use crate::response::Response;

/// Hook run after a one-shot response body has been decoded.
///
/// A rejection surfaces as [`PollError::Validation`] carrying the returned text.
pub trait ResponseValidator: Send + Sync {
    /// # Errors
    /// A human-readable reason for rejecting the response.
    fn validate(&self, status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Result<(), String>;
}

impl<F> ResponseValidator for F
where
    F: Fn(StatusCode, &HeaderMap, &[u8]) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Result<(), String> {
        self(status, headers, body)
    }
}

/// Decoding services shared by every call a host makes.
///
/// Built once by the host, shared behind an `Arc` and dropped with it.
#[derive(Clone, Default)]
pub struct ClientContext {
    registry: ConverterRegistry,
    envelope: Option<EnvelopeDescriptor>,
    json: JsonOptions,
    validator: Option<Arc<dyn ResponseValidator>>,
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("registry", &self.registry)
            .field("envelope", &self.envelope)
            .field("json", &self.json)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl ClientContext {
    /// Default registry, no envelope, default JSON options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ClientContextBuilder {
        ClientContextBuilder::default()
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn envelope(&self) -> Option<&EnvelopeDescriptor> {
        self.envelope.as_ref()
    }

    pub fn json_options(&self) -> JsonOptions {
        self.json
    }

    /// Read a one-shot response and decode it as `T`.
    ///
    /// With `unwrap` set and an envelope configured, the body is read as the
    /// envelope and its data property returned.
    ///
    /// # Errors
    /// - [`PollError::Status`] for a non-success status;
    /// - [`PollError::Decode`] / [`PollError::Configuration`] from decoding;
    /// - [`PollError::Validation`] if the validator rejects the response.
    pub async fn decode<T>(&self, response: Response, unwrap: bool) -> Result<T, PollError>
    where
        T: DeserializeOwned + 'static,
    {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(PollError::Status { status, body });
        }
        self.decode_body(status, &headers, &body, unwrap)
    }

    /// Decode an already buffered body.
    ///
    /// # Errors
    /// See [`ClientContext::decode`]; the status is not checked here.
    pub fn decode_body<T>(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        unwrap: bool,
    ) -> Result<T, PollError>
    where
        T: DeserializeOwned + 'static,
    {
        let media_type = MediaType::from_headers(headers);
        let context = JsonSerializationContext::<T>::resolve(self.envelope.as_ref(), self.json, unwrap)?;
        debug!(
            decode_type = %context.decode_type(),
            content_type = %crate::convert::describe(media_type.as_ref()),
            len = body.len(),
            "decoding response"
        );
        let value = context.decode(&self.registry, media_type.as_ref(), body)?;

        if let Some(validator) = &self.validator {
            validator
                .validate(status, headers, body)
                .map_err(|detail| PollError::Validation { detail })?;
        }
        Ok(value)
    }
}

/// Builder for [`ClientContext`]
#[derive(Default)]
pub struct ClientContextBuilder {
    registry: Option<ConverterRegistry>,
    envelope: Option<EnvelopeDescriptor>,
    json: JsonOptions,
    validator: Option<Arc<dyn ResponseValidator>>,
}

impl ClientContextBuilder {
    #[must_use]
    pub fn registry(mut self, registry: ConverterRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Envelope unwrapped by calls that request it.
    #[must_use]
    pub fn envelope(mut self, envelope: EnvelopeDescriptor) -> Self {
        self.envelope = Some(envelope);
        self
    }

    #[must_use]
    pub fn json_options(mut self, json: JsonOptions) -> Self {
        self.json = json;
        self
    }

    #[must_use]
    pub fn validator<V: ResponseValidator + 'static>(mut self, validator: V) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn build(self) -> ClientContext {
        ClientContext {
            registry: self.registry.unwrap_or_default(),
            envelope: self.envelope,
            json: self.json,
            validator: self.validator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderValue;
    use http::header::CONTENT_TYPE;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Model {
        id: u32,
        name: String,
    }

    fn json_response(status: StatusCode, body: &'static str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        Response::from_bytes(status, headers, Bytes::from_static(body.as_bytes()))
    }

    #[tokio::test]
    async fn test_decode_direct() {
        let context = ClientContext::new();
        let model: Model = context
            .decode(json_response(StatusCode::OK, r#"{"id":1,"name":"x"}"#), false)
            .await
            .unwrap();
        assert_eq!(model, Model { id: 1, name: "x".into() });
    }

    #[tokio::test]
    async fn test_decode_enveloped() {
        let context = ClientContext::builder()
            .envelope(EnvelopeDescriptor::new("ApiResult", "Data"))
            .build();
        let body = r#"{"success":true,"data":{"id":1,"name":"x"}}"#;

        let model: Model = context.decode(json_response(StatusCode::OK, body), true).await.unwrap();
        assert_eq!(model, Model { id: 1, name: "x".into() });

        let err = context
            .decode::<Model>(json_response(StatusCode::OK, body), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let context = ClientContext::new();
        let err = context
            .decode::<Model>(json_response(StatusCode::NOT_FOUND, r#"{"error":"gone"}"#), false)
            .await
            .unwrap_err();
        let PollError::Status { status, body } = err else {
            panic!("expected status error, got {err:?}");
        };
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, Bytes::from_static(br#"{"error":"gone"}"#));
    }

    #[tokio::test]
    async fn test_validator_rejection() {
        let context = ClientContext::builder()
            .validator(|_: StatusCode, headers: &HeaderMap, _: &[u8]| {
                if headers.contains_key("x-request-id") {
                    Ok(())
                } else {
                    Err("missing x-request-id".to_owned())
                }
            })
            .build();
        let err = context
            .decode::<Model>(json_response(StatusCode::OK, r#"{"id":1,"name":"x"}"#), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Validation { detail } if detail == "missing x-request-id"));
    }

    #[test]
    fn test_decode_body_text_target() {
        let context = ClientContext::new();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        let text: String = context
            .decode_body(StatusCode::OK, &headers, b"raw payload", false)
            .unwrap();
        assert_eq!(text, "raw payload");
    }
}
