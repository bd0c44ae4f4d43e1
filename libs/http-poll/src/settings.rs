//! Polling defaults loaded from YAML and the environment.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults;
//! 2. an optional YAML file;
//! 3. `HTTP_POLL_*` environment variables (`HTTP_POLL_RETRY_INTERVAL=250ms`).
//!
//! Durations are humantime strings (`"500ms"`, `"2m"`); a bare number is
//! read as milliseconds.

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::PollError;
use crate::polling::PollMode;

/// Prefix of the environment variables read by [`PollingSettings::load`].
pub const ENV_PREFIX: &str = "HTTP_POLL_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    #[serde(with = "duration")]
    pub retry_interval: Duration,
    #[serde(with = "optional_duration", skip_serializing_if = "Option::is_none")]
    pub max_retry_interval: Option<Duration>,
    pub backoff_factor: u32,
    /// Bound on a whole session
    #[serde(with = "optional_duration", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    pub mode: PollMode,
    pub unwrap_envelope: bool,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(1),
            max_retry_interval: None,
            backoff_factor: 1,
            timeout: None,
            max_retries: Some(5),
            mode: PollMode::Continuous,
            unwrap_envelope: false,
        }
    }
}

impl PollingSettings {
    /// The provider chain without extracting it.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load settings from defaults, `path` and the environment.
    ///
    /// # Errors
    /// [`PollError::Configuration`] if `path` does not exist or a value is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, PollError> {
        if let Some(path) = path
            && !path.is_file()
        {
            return Err(PollError::Configuration(format!(
                "settings file '{}' not found",
                path.display()
            )));
        }
        let settings: Self = Self::figment(path)
            .extract()
            .map_err(|e| PollError::Configuration(format!("invalid polling settings: {e}")))?;
        debug!(?settings, "loaded polling settings");
        Ok(settings)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Millis(u64),
    Text(String),
}

impl RawDuration {
    fn into_duration<E: serde::de::Error>(self) -> Result<Duration, E> {
        match self {
            RawDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
            RawDuration::Text(text) => humantime::parse_duration(text.trim())
                .map_err(|e| E::custom(format!("invalid duration '{text}': {e}"))),
        }
    }
}

mod duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    use super::RawDuration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        RawDuration::deserialize(deserializer)?.into_duration()
    }
}

mod optional_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    use super::RawDuration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.collect_str(&humantime::format_duration(*value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<RawDuration>::deserialize(deserializer)?
            .map(RawDuration::into_duration)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NO_ENV: [(&str, Option<&str>); 0] = [];

    #[test]
    fn test_defaults() {
        temp_env::with_vars(NO_ENV, || {
            let settings = PollingSettings::load(None).unwrap();
            assert_eq!(settings, PollingSettings::default());
            assert_eq!(settings.retry_interval, Duration::from_secs(1));
            assert_eq!(settings.max_retries, Some(5));
        });
    }

    #[test]
    fn test_yaml_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "retry_interval: 2s\nmax_retries: 3\nmode: until_data\ntimeout: 1m 30s\nunwrap_envelope: true"
        )
        .unwrap();

        temp_env::with_vars([("HTTP_POLL_RETRY_INTERVAL", Some("750ms")), ("HTTP_POLL_BACKOFF_FACTOR", Some("2"))], || {
            let settings = PollingSettings::load(Some(file.path())).unwrap();
            assert_eq!(settings.retry_interval, Duration::from_millis(750));
            assert_eq!(settings.backoff_factor, 2);
            assert_eq!(settings.max_retries, Some(3));
            assert_eq!(settings.mode, PollMode::UntilData);
            assert_eq!(settings.timeout, Some(Duration::from_secs(90)));
            assert!(settings.unwrap_envelope);
        });
    }

    #[test]
    fn test_bare_number_is_milliseconds() {
        temp_env::with_vars([("HTTP_POLL_TIMEOUT", Some("1500"))], || {
            let settings = PollingSettings::load(None).unwrap();
            assert_eq!(settings.timeout, Some(Duration::from_millis(1500)));
        });
    }

    #[test]
    fn test_invalid_duration() {
        temp_env::with_vars([("HTTP_POLL_RETRY_INTERVAL", Some("soon"))], || {
            let err = PollingSettings::load(None).unwrap_err();
            assert!(matches!(err, PollError::Configuration(_)), "got {err:?}");
        });
    }

    #[test]
    fn test_missing_file() {
        temp_env::with_vars(NO_ENV, || {
            let err = PollingSettings::load(Some(Path::new("/nonexistent/poll.yaml"))).unwrap_err();
            assert!(err.to_string().contains("not found"));
        });
    }

    #[test]
    fn test_durations_serialize_as_text() {
        let value = serde_json::to_value(PollingSettings::default()).unwrap();
        assert_eq!(value["retry_interval"], "1s");
        assert!(value.get("timeout").is_none());
    }
}
