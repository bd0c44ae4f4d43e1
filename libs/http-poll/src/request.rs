use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::Duration;

use crate::body::Body;
use crate::convert::{ConverterRegistry, MediaType};
use crate::error::PollError;

/// Resolved request description: method, URI, headers, body and timeout.
///
/// The URI is either absolute or a path that a [`RequestPipeline`](crate::RequestPipeline)
/// resolves against a base URL.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Body,
    timeout: Option<Duration>,
}

impl Request {
    /// Create a new request builder
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Take the request body
    pub fn into_body(self) -> Body {
        self.body
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Same request with a different URI.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Same request with a different per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn from_parts(
        method: Method,
        uri: String,
        headers: HeaderMap,
        body: Body,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            timeout,
        }
    }
}

/// Builder for [`Request`]
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    uri: Option<String>,
    headers: HeaderMap,
    body: Body,
    timeout: Option<Duration>,
}

impl RequestBuilder {
    /// Set the HTTP method (defaults to `GET`)
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the absolute URL or relative path
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Add a header
    ///
    /// # Errors
    /// [`PollError::Configuration`] if the name or value is not valid HTTP.
    pub fn header<K, V>(mut self, key: K, value: V) -> Result<Self, PollError>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
        K::Error: std::fmt::Display,
        V::Error: std::fmt::Display,
    {
        let key = key
            .try_into()
            .map_err(|e| PollError::Configuration(format!("invalid header name: {e}")))?;
        let value = value
            .try_into()
            .map_err(|e| PollError::Configuration(format!("invalid header value: {e}")))?;
        self.headers.insert(key, value);
        Ok(self)
    }

    /// Set the body to a JSON-serialized value and add the Content-Type header
    ///
    /// # Errors
    /// [`PollError::Configuration`] if the value cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, PollError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| PollError::Configuration(format!("cannot serialize JSON body: {e}")))?;
        self.body = Body::from(bytes);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// Encode `value` through the registry for `content_type` and set the header.
    ///
    /// # Errors
    /// [`PollError::Configuration`] if the content type is malformed or no
    /// writer can encode the value.
    pub fn encode<T: Serialize + ?Sized + 'static>(
        mut self,
        registry: &ConverterRegistry,
        value: &T,
        content_type: &str,
    ) -> Result<Self, PollError> {
        let media_type = MediaType::parse(content_type).ok_or_else(|| {
            PollError::Configuration(format!("invalid content type '{content_type}'"))
        })?;
        self.body = Body::from(registry.encode(value, Some(&media_type))?);
        let value = HeaderValue::from_str(content_type)
            .map_err(|e| PollError::Configuration(format!("invalid header value: {e}")))?;
        self.headers.insert(CONTENT_TYPE, value);
        Ok(self)
    }

    /// Set the request body
    #[must_use]
    pub fn body<B: Into<Body>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Set request timeout
    #[must_use]
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Build the request
    ///
    /// # Errors
    /// [`PollError::Configuration`] if no URI was set.
    pub fn build(self) -> Result<Request, PollError> {
        let method = self.method.unwrap_or(Method::GET);
        let uri = self
            .uri
            .ok_or_else(|| PollError::Configuration("request URI is required".into()))?;

        Ok(Request {
            method,
            uri,
            headers: self.headers,
            body: self.body,
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_builder_defaults_to_get() {
        let request = Request::builder().uri("/events").build().unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.uri(), "/events");
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_missing_uri_is_configuration_error() {
        let err = Request::builder().build().unwrap_err();
        assert!(matches!(err, PollError::Configuration(_)));
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let err = Request::builder().header("bad header", "x").unwrap_err();
        assert!(err.to_string().contains("invalid header name"));
    }

    #[test]
    fn test_encode_xml_body() {
        #[derive(Serialize)]
        struct Ping {
            seq: u32,
        }

        let registry = ConverterRegistry::new();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/ping")
            .encode(&registry, &Ping { seq: 7 }, "application/xml")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.headers()[CONTENT_TYPE], "application/xml");
        let Body::Bytes(bytes) = request.body() else {
            panic!("expected buffered body");
        };
        assert_eq!(bytes, &Bytes::from_static(b"<Ping><seq>7</seq></Ping>"));
    }
}
