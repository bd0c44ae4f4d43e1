use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::de::value::{Error as ValueError, SeqDeserializer, StringDeserializer};
use serde::Serialize;
use tracing::trace;

use super::media_type::{MediaType, describe};
use crate::error::{BoxError, PollError};

/// What the caller asked a body to become.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Any serde type other than the opaque ones below.
    Structured,
    /// `String`: the body as UTF-8 text.
    Text,
    /// `Bytes` or `Vec<u8>`: the body untouched.
    Bytes,
}

impl TargetKind {
    /// Derives the kind from the runtime type.
    pub fn of<T: ?Sized + 'static>() -> Self {
        let id = TypeId::of::<T>();
        if id == TypeId::of::<String>() || id == TypeId::of::<str>() {
            TargetKind::Text
        } else if id == TypeId::of::<Bytes>() || id == TypeId::of::<Vec<u8>>() {
            TargetKind::Bytes
        } else {
            TargetKind::Structured
        }
    }
}

/// Decoder producing a JSON value tree, used by [`Format::Custom`].
pub type CustomDecoder = Arc<dyn Fn(&[u8]) -> Result<serde_json::Value, BoxError> + Send + Sync>;

/// Wire format a converter reads and writes.
#[derive(Clone)]
pub enum Format {
    Json,
    Xml,
    /// Raw text or bytes, chosen by the target type.
    Opaque,
    /// Caller-supplied decoder into a JSON value tree; decode-only.
    Custom(CustomDecoder),
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => write!(f, "Format::Json"),
            Format::Xml => write!(f, "Format::Xml"),
            Format::Opaque => write!(f, "Format::Opaque"),
            Format::Custom(_) => write!(f, "Format::Custom(..)"),
        }
    }
}

impl Format {
    fn decode<T: DeserializeOwned + 'static>(&self, body: &[u8]) -> Result<T, BoxError> {
        match self {
            Format::Json => Ok(serde_json::from_slice(body)?),
            Format::Xml => Ok(quick_xml::de::from_reader(body)?),
            Format::Opaque => decode_opaque(body),
            Format::Custom(decoder) => Ok(serde_json::from_value(decoder(body)?)?),
        }
    }

    fn encode<T: Serialize + ?Sized + 'static>(&self, value: &T) -> Result<Bytes, BoxError> {
        match self {
            Format::Json => Ok(Bytes::from(serde_json::to_vec(value)?)),
            Format::Xml => Ok(Bytes::from(quick_xml::se::to_string(value)?)),
            Format::Opaque => encode_opaque(value),
            Format::Custom(_) => Err("custom converters cannot encode".into()),
        }
    }

    fn can_encode(&self) -> bool {
        !matches!(self, Format::Custom(_))
    }
}

fn decode_opaque<T: DeserializeOwned + 'static>(body: &[u8]) -> Result<T, BoxError> {
    if TargetKind::of::<T>() == TargetKind::Bytes {
        let bytes = SeqDeserializer::<_, ValueError>::new(body.iter().copied());
        return Ok(T::deserialize(bytes)?);
    }
    let text = std::str::from_utf8(body)?.to_owned();
    Ok(T::deserialize(StringDeserializer::<ValueError>::new(text))?)
}

fn encode_opaque<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, BoxError> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(text) => Ok(Bytes::from(text)),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(Bytes::from)
            .ok_or_else(|| "opaque bodies must be text or a byte sequence".into()),
        _ => Err("opaque bodies must be text or a byte sequence".into()),
    }
}

/// Decides whether a converter handles a (target kind, media type) pair.
pub type Predicate = Arc<dyn Fn(TargetKind, Option<&MediaType>) -> bool + Send + Sync>;

/// One entry of the [`ConverterRegistry`].
#[derive(Clone)]
pub struct ConverterDescriptor {
    name: &'static str,
    format: Format,
    can_handle: Predicate,
}

impl fmt::Debug for ConverterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterDescriptor")
            .field("name", &self.name)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl ConverterDescriptor {
    pub fn new<P>(name: &'static str, format: Format, can_handle: P) -> Self
    where
        P: Fn(TargetKind, Option<&MediaType>) -> bool + Send + Sync + 'static,
    {
        Self {
            name,
            format,
            can_handle: Arc::new(can_handle),
        }
    }

    /// Structured targets with an XML-family media type.
    pub fn xml() -> Self {
        Self::new("xml", Format::Xml, |target, media| {
            target == TargetKind::Structured && media.is_some_and(MediaType::is_xml)
        })
    }

    /// Every structured target; the catch-all for structured decoding.
    pub fn json() -> Self {
        Self::new("json", Format::Json, |target, _| {
            target == TargetKind::Structured
        })
    }

    /// Raw text or bytes; matches everything.
    pub fn opaque() -> Self {
        Self::new("opaque", Format::Opaque, |_, _| true)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn can_handle(&self, target: TargetKind, media_type: Option<&MediaType>) -> bool {
        (self.can_handle)(target, media_type)
    }

    /// Decode `body` into `T`.
    ///
    /// # Errors
    /// [`PollError::Decode`] carrying the target type, the media type and the
    /// decoder's cause.
    pub fn decode<T: DeserializeOwned + 'static>(
        &self,
        media_type: Option<&MediaType>,
        body: &[u8],
    ) -> Result<T, PollError> {
        self.format
            .decode(body)
            .map_err(|e| PollError::decode(type_name::<T>(), describe(media_type), e))
    }

    /// Encode `value` in this converter's format.
    ///
    /// # Errors
    /// [`PollError::Configuration`] when the value cannot be written in this format.
    pub fn encode<T: Serialize + ?Sized + 'static>(&self, value: &T) -> Result<Bytes, PollError> {
        self.format.encode(value).map_err(|e| {
            PollError::Configuration(format!(
                "cannot encode {} with the '{}' converter: {e}",
                type_name::<T>(),
                self.name
            ))
        })
    }
}

/// Ordered set of converters; the first one whose predicate matches wins.
///
/// The opaque converter is held apart from the registered list and always
/// answers last, so resolution cannot come back empty.
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    converters: Vec<ConverterDescriptor>,
    fallback: ConverterDescriptor,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterRegistry {
    /// XML, then JSON, then the opaque fallback.
    pub fn new() -> Self {
        Self::empty().with_defaults()
    }

    /// Only the opaque fallback.
    pub fn empty() -> Self {
        Self {
            converters: Vec::new(),
            fallback: ConverterDescriptor::opaque(),
        }
    }

    /// Append a converter. Earlier registrations take priority.
    #[must_use]
    pub fn register(mut self, converter: ConverterDescriptor) -> Self {
        self.converters.push(converter);
        self
    }

    /// Append the built-in XML and JSON converters.
    #[must_use]
    pub fn with_defaults(self) -> Self {
        self.register(ConverterDescriptor::xml())
            .register(ConverterDescriptor::json())
    }

    /// Converter names in resolution order, fallback included.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.converters
            .iter()
            .chain(std::iter::once(&self.fallback))
            .map(ConverterDescriptor::name)
    }

    /// First converter able to read `target` from `media_type`.
    pub fn resolve(
        &self,
        target: TargetKind,
        media_type: Option<&MediaType>,
    ) -> &ConverterDescriptor {
        self.converters
            .iter()
            .find(|c| c.can_handle(target, media_type))
            .unwrap_or(&self.fallback)
    }

    /// First converter able to write a value of kind `source` as `media_type`.
    pub fn resolve_writer(
        &self,
        source: TargetKind,
        media_type: Option<&MediaType>,
    ) -> &ConverterDescriptor {
        self.converters
            .iter()
            .filter(|c| c.format.can_encode())
            .find(|c| c.can_handle(source, media_type))
            .unwrap_or(&self.fallback)
    }

    /// Resolve a converter for `T` and decode `body` with it.
    ///
    /// # Errors
    /// [`PollError::Decode`] when the chosen converter fails.
    pub fn decode<T: DeserializeOwned + 'static>(
        &self,
        media_type: Option<&MediaType>,
        body: &[u8],
    ) -> Result<T, PollError> {
        let converter = self.resolve(TargetKind::of::<T>(), media_type);
        trace!(
            converter = converter.name(),
            content_type = %describe(media_type),
            target = type_name::<T>(),
            "decoding body"
        );
        converter.decode(media_type, body)
    }

    /// Encode `value` for a request body of the given media type.
    ///
    /// # Errors
    /// [`PollError::Configuration`] when the value cannot be written.
    pub fn encode<T: Serialize + ?Sized + 'static>(
        &self,
        value: &T,
        media_type: Option<&MediaType>,
    ) -> Result<Bytes, PollError> {
        self.resolve_writer(TargetKind::of::<T>(), media_type)
            .encode(value)
    }
}
