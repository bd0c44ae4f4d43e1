//! Unwrapping of `{success, data}`-shaped API envelopes.
//!
//! When unwrapping is enabled for a call, the body is decoded as the
//! configured container and the named data property is pulled out of it as
//! the caller's type. The accessor doing that is built once per
//! (target type, descriptor) pair and shared process-wide.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::convert::{ConverterRegistry, MediaType, TargetKind, describe};
use crate::error::PollError;

/// Shape of the generic API envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvelopeDescriptor {
    container: String,
    data_property: String,
    success_property: Option<String>,
    message_property: Option<String>,
}

impl Default for EnvelopeDescriptor {
    /// `ApiResult { success, message, data }`.
    fn default() -> Self {
        Self::new("ApiResult", "data")
            .with_success_property("success")
            .with_message_property("message")
    }
}

impl EnvelopeDescriptor {
    /// Envelope named `container` carrying the payload under `data_property`.
    pub fn new(container: impl Into<String>, data_property: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            data_property: data_property.into(),
            success_property: None,
            message_property: None,
        }
    }

    /// Boolean property that, when `false`, marks the envelope as a failure.
    #[must_use]
    pub fn with_success_property(mut self, name: impl Into<String>) -> Self {
        self.success_property = Some(name.into());
        self
    }

    /// Property holding the failure message reported with a `false` success flag.
    #[must_use]
    pub fn with_message_property(mut self, name: impl Into<String>) -> Self {
        self.message_property = Some(name.into());
        self
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn data_property(&self) -> &str {
        &self.data_property
    }

    pub fn success_property(&self) -> Option<&str> {
        self.success_property.as_deref()
    }

    pub fn message_property(&self) -> Option<&str> {
        self.message_property.as_deref()
    }
}

/// Serializer options resolved for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JsonOptions {
    /// Decode an empty body as JSON `null`.
    pub empty_body_as_null: bool,
    /// Match envelope property names ignoring ASCII case.
    pub case_insensitive_properties: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            empty_body_as_null: false,
            case_insensitive_properties: true,
        }
    }
}

/// The type a body is actually decoded as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeType {
    Direct {
        target: &'static str,
    },
    Enveloped {
        container: String,
        target: &'static str,
    },
}

impl fmt::Display for DecodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeType::Direct { target } => f.write_str(target),
            DecodeType::Enveloped { container, target } => write!(f, "{container}<{target}>"),
        }
    }
}

/// Reads the data property of a decoded envelope as `T`.
pub struct EnvelopeAccessor<T> {
    container: String,
    data_property: String,
    success_property: Option<String>,
    message_property: Option<String>,
    case_insensitive: bool,
    convert: fn(Value) -> Result<T, serde_json::Error>,
}

impl<T> fmt::Debug for EnvelopeAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeAccessor")
            .field("container", &self.container)
            .field("data_property", &self.data_property)
            .field("success_property", &self.success_property)
            .field("message_property", &self.message_property)
            .field("case_insensitive", &self.case_insensitive)
            .finish_non_exhaustive()
    }
}

impl<T: DeserializeOwned + 'static> EnvelopeAccessor<T> {
    fn new(descriptor: &EnvelopeDescriptor, options: JsonOptions) -> Self {
        Self {
            container: descriptor.container.clone(),
            data_property: descriptor.data_property.clone(),
            success_property: descriptor.success_property.clone(),
            message_property: descriptor.message_property.clone(),
            case_insensitive: options.case_insensitive_properties,
            convert: serde_json::from_value::<T>,
        }
    }

    /// Pull the payload out of a decoded envelope.
    ///
    /// # Errors
    /// - [`PollError::Configuration`] if `envelope` is not an object, i.e. not
    ///   an instance of the configured container;
    /// - [`PollError::Decode`] if the envelope reports failure or its data
    ///   property does not decode as `T`.
    pub fn extract(&self, envelope: Value, media_type: Option<&MediaType>) -> Result<T, PollError> {
        let Value::Object(mut fields) = envelope else {
            return Err(PollError::Configuration(format!(
                "payload is not a {} envelope: expected an object, found {}",
                self.container,
                json_kind(&envelope)
            )));
        };

        if let Some(success) = self.success_property.as_deref()
            && let Some(key) = self.key_of(&fields, success)
            && fields.get(&key) == Some(&Value::Bool(false))
        {
            let message = self
                .message_property
                .as_deref()
                .and_then(|name| self.key_of(&fields, name))
                .and_then(|key| fields.get(&key).and_then(Value::as_str).map(str::to_owned))
                .unwrap_or_else(|| "no message".to_owned());
            return Err(PollError::decode(
                type_name::<T>(),
                describe(media_type),
                format!("{} reported failure: {message}", self.container),
            ));
        }

        let data = self
            .key_of(&fields, &self.data_property)
            .and_then(|key| fields.remove(&key))
            .unwrap_or(Value::Null);
        (self.convert)(data)
            .map_err(|e| PollError::decode(type_name::<T>(), describe(media_type), e))
    }

    fn key_of(&self, fields: &Map<String, Value>, name: &str) -> Option<String> {
        if fields.contains_key(name) {
            return Some(name.to_owned());
        }
        if !self.case_insensitive {
            return None;
        }
        fields.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct AccessorKey {
    target: TypeId,
    descriptor: EnvelopeDescriptor,
    case_insensitive: bool,
}

type ErasedAccessor = Arc<dyn Any + Send + Sync>;

// Write-once per key; a racing writer loses to whoever inserted first.
static ACCESSORS: LazyLock<DashMap<AccessorKey, ErasedAccessor>> = LazyLock::new(DashMap::new);

fn accessor_for<T: DeserializeOwned + 'static>(
    descriptor: &EnvelopeDescriptor,
    options: JsonOptions,
) -> Result<Arc<EnvelopeAccessor<T>>, PollError> {
    let key = AccessorKey {
        target: TypeId::of::<T>(),
        descriptor: descriptor.clone(),
        case_insensitive: options.case_insensitive_properties,
    };

    let cached = ACCESSORS.get(&key).map(|entry| Arc::clone(entry.value()));
    let erased = if let Some(erased) = cached {
        erased
    } else {
        debug!(
            container = %descriptor.container,
            target = type_name::<T>(),
            "building envelope accessor"
        );
        let built: ErasedAccessor = Arc::new(EnvelopeAccessor::<T>::new(descriptor, options));
        Arc::clone(ACCESSORS.entry(key).or_insert(built).value())
    };

    erased.downcast::<EnvelopeAccessor<T>>().map_err(|_| {
        PollError::Configuration(format!(
            "cached accessor for {}<{}> has an unexpected type",
            descriptor.container,
            type_name::<T>()
        ))
    })
}

/// How a value is pulled out of the decoded body.
pub enum Extractor<T> {
    Identity,
    Envelope(Arc<EnvelopeAccessor<T>>),
}

impl<T> fmt::Debug for Extractor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extractor::Identity => write!(f, "Extractor::Identity"),
            Extractor::Envelope(accessor) => f.debug_tuple("Extractor::Envelope").field(accessor).finish(),
        }
    }
}

/// Everything needed to turn one response body into a `T`.
///
/// Built once per response and immutable afterwards.
#[derive(Debug)]
pub struct JsonSerializationContext<T> {
    decode_type: DecodeType,
    options: JsonOptions,
    extractor: Extractor<T>,
}

impl<T: DeserializeOwned + 'static> JsonSerializationContext<T> {
    /// Resolve the decode type and extractor for `T`.
    ///
    /// The envelope applies only when one is configured and `unwrap` is set.
    ///
    /// # Errors
    /// [`PollError::Configuration`] if the cached accessor cannot be reused.
    pub fn resolve(
        envelope: Option<&EnvelopeDescriptor>,
        options: JsonOptions,
        unwrap: bool,
    ) -> Result<Self, PollError> {
        let target = type_name::<T>();
        match envelope.filter(|_| unwrap) {
            Some(descriptor) => Ok(Self {
                decode_type: DecodeType::Enveloped {
                    container: descriptor.container.clone(),
                    target,
                },
                options,
                extractor: Extractor::Envelope(accessor_for::<T>(descriptor, options)?),
            }),
            None => Ok(Self {
                decode_type: DecodeType::Direct { target },
                options,
                extractor: Extractor::Identity,
            }),
        }
    }

    pub fn decode_type(&self) -> &DecodeType {
        &self.decode_type
    }

    pub fn options(&self) -> JsonOptions {
        self.options
    }

    pub fn extractor(&self) -> &Extractor<T> {
        &self.extractor
    }

    /// Decode `body` as the resolved type and extract the caller's value.
    ///
    /// # Errors
    /// [`PollError::Decode`] on malformed bodies, [`PollError::Configuration`]
    /// when an enveloped body is not an instance of the container.
    pub fn decode(
        &self,
        registry: &ConverterRegistry,
        media_type: Option<&MediaType>,
        body: &[u8],
    ) -> Result<T, PollError> {
        if body.is_empty()
            && self.options.empty_body_as_null
            && TargetKind::of::<T>() == TargetKind::Structured
        {
            return serde_json::from_value(Value::Null)
                .map_err(|e| PollError::decode(type_name::<T>(), describe(media_type), e));
        }

        match &self.extractor {
            Extractor::Identity => registry.decode(media_type, body),
            Extractor::Envelope(accessor) => {
                let envelope: Value = registry.decode(media_type, body)?;
                accessor.extract(envelope, media_type)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Model {
        id: u32,
        name: String,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct Ticket {
        seq: u64,
    }

    const PAYLOAD: &[u8] = br#"{"success":true,"data":{"id":1,"name":"x"}}"#;

    fn json() -> MediaType {
        MediaType::parse("application/json").unwrap()
    }

    fn api_result() -> EnvelopeDescriptor {
        EnvelopeDescriptor::new("ApiResult", "Data")
    }

    #[test]
    fn test_unwrapped_round_trip() {
        let registry = ConverterRegistry::new();
        let ctx = JsonSerializationContext::<Model>::resolve(
            Some(&api_result()),
            JsonOptions::default(),
            true,
        )
        .unwrap();
        assert!(matches!(ctx.extractor(), Extractor::Envelope(_)));
        assert!(ctx.decode_type().to_string().starts_with("ApiResult<"));

        let model = ctx.decode(&registry, Some(&json()), PAYLOAD).unwrap();
        assert_eq!(model, Model { id: 1, name: "x".into() });
    }

    #[test]
    fn test_disabled_unwrap_changes_decode_type() {
        let registry = ConverterRegistry::new();
        let ctx = JsonSerializationContext::<Model>::resolve(
            Some(&api_result()),
            JsonOptions::default(),
            false,
        )
        .unwrap();
        assert!(matches!(ctx.extractor(), Extractor::Identity));
        assert!(matches!(ctx.decode_type(), DecodeType::Direct { .. }));

        let err = ctx.decode(&registry, Some(&json()), PAYLOAD).unwrap_err();
        assert!(matches!(err, PollError::Decode { .. }), "got {err:?}");
    }

    #[test]
    fn test_no_descriptor_means_identity() {
        let ctx =
            JsonSerializationContext::<Model>::resolve(None, JsonOptions::default(), true).unwrap();
        assert!(matches!(ctx.extractor(), Extractor::Identity));
    }

    #[test]
    fn test_accessor_is_memoized() {
        let descriptor = EnvelopeDescriptor::new("Memo", "payload");
        let first =
            JsonSerializationContext::<Ticket>::resolve(Some(&descriptor), JsonOptions::default(), true)
                .unwrap();
        let second =
            JsonSerializationContext::<Ticket>::resolve(Some(&descriptor), JsonOptions::default(), true)
                .unwrap();
        let (Extractor::Envelope(a), Extractor::Envelope(b)) = (first.extractor(), second.extractor())
        else {
            panic!("expected envelope extractors");
        };
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_concurrent_resolution_shares_one_accessor() {
        let descriptor = EnvelopeDescriptor::new("Raced", "value");
        let accessors: Vec<Arc<EnvelopeAccessor<u64>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| accessor_for::<u64>(&descriptor, JsonOptions::default()).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(accessors.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_non_object_is_configuration_error() {
        let registry = ConverterRegistry::new();
        let ctx = JsonSerializationContext::<Model>::resolve(
            Some(&api_result()),
            JsonOptions::default(),
            true,
        )
        .unwrap();
        let err = ctx.decode(&registry, Some(&json()), b"[1,2,3]").unwrap_err();
        assert!(matches!(err, PollError::Configuration(_)), "got {err:?}");
    }

    #[test]
    fn test_failure_flag_carries_message() {
        let registry = ConverterRegistry::new();
        let ctx = JsonSerializationContext::<Model>::resolve(
            Some(&EnvelopeDescriptor::default()),
            JsonOptions::default(),
            true,
        )
        .unwrap();
        let err = ctx
            .decode(
                &registry,
                Some(&json()),
                br#"{"success":false,"message":"quota exceeded","data":null}"#,
            )
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"), "got {err}");
    }

    #[test]
    fn test_case_sensitive_lookup() {
        let registry = ConverterRegistry::new();
        let options = JsonOptions {
            case_insensitive_properties: false,
            ..JsonOptions::default()
        };
        let ctx =
            JsonSerializationContext::<Option<Model>>::resolve(Some(&api_result()), options, true)
                .unwrap();
        // "Data" does not match "data" exactly, so the payload reads as absent.
        assert_eq!(ctx.decode(&registry, Some(&json()), PAYLOAD).unwrap(), None);
    }

    #[test]
    fn test_empty_body_as_null() {
        let registry = ConverterRegistry::new();
        let options = JsonOptions {
            empty_body_as_null: true,
            ..JsonOptions::default()
        };
        let ctx = JsonSerializationContext::<Option<Model>>::resolve(None, options, false).unwrap();
        assert_eq!(ctx.decode(&registry, Some(&json()), b"").unwrap(), None);

        let strict =
            JsonSerializationContext::<Option<Model>>::resolve(None, JsonOptions::default(), false)
                .unwrap();
        assert!(strict.decode(&registry, Some(&json()), b"").is_err());
    }

    #[test]
    fn test_envelope_without_success_flag() {
        let registry = ConverterRegistry::new();
        let ctx = JsonSerializationContext::<Ticket>::resolve(
            Some(&EnvelopeDescriptor::new("ApiResult", "data")),
            JsonOptions::default(),
            true,
        )
        .unwrap();
        let json_body = br#"{"data":{"seq":42}}"#;
        assert_eq!(ctx.decode(&registry, Some(&json()), json_body).unwrap(), Ticket { seq: 42 });
    }
}
