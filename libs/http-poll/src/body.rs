use bytes::Bytes;
use futures::stream::Stream;
use std::io;
use std::pin::Pin;

pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Request body.
///
/// Only buffered bodies can be re-sent, so polling configurations reject
/// [`Body::Stream`].
pub enum Body {
    /// Empty body
    Empty,
    /// Buffered bytes
    Bytes(Bytes),
    /// Streaming body, sent once
    Stream(BoxStream<Result<Bytes, io::Error>>),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => write!(f, "Body::Empty"),
            Body::Bytes(bytes) => f.debug_tuple("Body::Bytes").field(&bytes.len()).finish(),
            Body::Stream(_) => write!(f, "Body::Stream(..)"),
        }
    }
}

impl Body {
    /// Create a body from bytes
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Body::Bytes(bytes.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Empty
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Bytes(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_buffer() {
        assert!(matches!(Body::from("ping"), Body::Bytes(b) if b.as_ref() == b"ping"));
        assert!(matches!(Body::from(vec![1u8, 2]), Body::Bytes(b) if b.as_ref() == [1, 2]));
        assert!(Body::default().is_empty());
    }

    #[test]
    fn test_debug_hides_contents() {
        let stream = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"x"))]);
        assert_eq!(format!("{:?}", Body::Stream(Box::pin(stream))), "Body::Stream(..)");
        assert_eq!(format!("{:?}", Body::from("secret")), "Body::Bytes(6)");
    }
}
