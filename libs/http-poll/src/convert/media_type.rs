use std::fmt;

use http::HeaderMap;
use http::header::CONTENT_TYPE;
use mime::Mime;

/// A negotiated media type: lower-cased `type/subtype[+suffix]` with every
/// parameter stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    mime: Mime,
}

impl MediaType {
    /// Parse a `Content-Type` value. Parameters (`charset`, ...) are dropped.
    ///
    /// Returns `None` when the value is not a media type at all.
    pub fn parse(raw: &str) -> Option<Self> {
        let parsed: Mime = raw.trim().parse().ok()?;
        let essence = parsed.essence_str().to_ascii_lowercase();
        let mime = essence.parse().ok()?;
        Some(Self { mime })
    }

    /// Media type of the `Content-Type` header, if present and well formed.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
    }

    pub fn essence(&self) -> &str {
        self.mime.essence_str()
    }

    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    /// `application/json`, `text/json` or any `+json` suffix.
    pub fn is_json(&self) -> bool {
        (self.mime.subtype() == mime::JSON && self.is_application_or_text())
            || self.mime.suffix() == Some(mime::JSON)
    }

    /// `application/xml`, `text/xml` or any `+xml` suffix.
    pub fn is_xml(&self) -> bool {
        (self.mime.subtype() == mime::XML && self.is_application_or_text())
            || self.mime.suffix() == Some(mime::XML)
    }

    fn is_application_or_text(&self) -> bool {
        self.mime.type_() == mime::APPLICATION || self.mime.type_() == mime::TEXT
    }

    pub fn is_event_stream(&self) -> bool {
        self.mime.essence_str() == mime::TEXT_EVENT_STREAM.essence_str()
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.essence())
    }
}

/// Renders an optional media type for diagnostics.
pub(crate) fn describe(media_type: Option<&MediaType>) -> String {
    media_type.map_or_else(|| "<none>".to_owned(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_parameters_are_stripped() {
        let media = MediaType::parse("Application/JSON; charset=UTF-8").unwrap();
        assert_eq!(media.essence(), "application/json");
        assert!(media.is_json());
        assert!(!media.is_xml());
    }

    #[test]
    fn test_xml_family() {
        for raw in ["application/xml", "text/xml", "application/xml-patch+xml", "image/svg+xml"] {
            let media = MediaType::parse(raw).unwrap();
            assert!(media.is_xml(), "{raw} should be XML");
            assert!(!media.is_json(), "{raw} should not be JSON");
        }
    }

    #[test]
    fn test_json_suffix() {
        let media = MediaType::parse("application/problem+json").unwrap();
        assert!(media.is_json());
    }

    #[test]
    fn test_event_stream() {
        let media = MediaType::parse("text/event-stream; charset=utf-8").unwrap();
        assert!(media.is_event_stream());
        assert!(!MediaType::parse("text/plain").unwrap().is_event_stream());
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(MediaType::parse("not a media type").is_none());
        assert!(MediaType::parse("").is_none());
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(MediaType::from_headers(&headers).is_none());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/xml; charset=utf-8"));
        assert_eq!(
            MediaType::from_headers(&headers).unwrap().essence(),
            "text/xml"
        );
    }
}
