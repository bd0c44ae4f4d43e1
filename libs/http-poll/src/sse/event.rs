use serde::de::DeserializeOwned;
use std::any::type_name;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::PollError;

/// A Server-Sent Event.
///
/// `data` lines are kept as fragments and joined with `\n` on first access;
/// the joined string is cached until the next fragment arrives. Fields other
/// than `event`, `data` and `id` are kept in arrival order, duplicates included.
#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    event: Option<String>,
    id: Option<String>,
    data: Vec<String>,
    fields: Vec<(String, String)>,
    rendered: OnceLock<String>,
}

impl SseEvent {
    /// Event name (`event:`), if the frame set one
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Event id (`id:`), if the frame set one
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Data fragments joined by newlines; empty when the frame had no `data:` line.
    pub fn data(&self) -> &str {
        self.rendered.get_or_init(|| self.data.join("\n"))
    }

    pub fn data_lines(&self) -> &[String] {
        &self.data
    }

    /// Last value recorded for a custom field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Reconnection delay from the `retry:` field, in milliseconds.
    pub fn retry(&self) -> Option<Duration> {
        self.field("retry")
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    /// True while no field at all has been seen.
    pub fn is_empty(&self) -> bool {
        self.event.is_none() && self.id.is_none() && self.data.is_empty() && self.fields.is_empty()
    }

    /// Decode the data as JSON.
    ///
    /// # Errors
    /// [`PollError::Decode`] if the data is not a valid `T`.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, PollError> {
        serde_json::from_str(self.data())
            .map_err(|e| PollError::decode(type_name::<T>(), "text/event-stream", e))
    }

    pub(crate) fn set_event(&mut self, event: &str) {
        self.event = Some(event.to_owned());
    }

    pub(crate) fn set_id(&mut self, id: &str) {
        self.id = Some(id.to_owned());
    }

    pub(crate) fn push_data(&mut self, fragment: &str) {
        self.data.push(fragment.to_owned());
        self.rendered.take();
    }

    pub(crate) fn push_field(&mut self, name: &str, value: &str) {
        self.fields.push((name.to_owned(), value.to_owned()));
    }
}

impl PartialEq for SseEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event == other.event
            && self.id == other.id
            && self.data == other.data
            && self.fields == other.fields
    }
}

impl Eq for SseEvent {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_data_is_invalidated() {
        let mut event = SseEvent::default();
        assert_eq!(event.data(), "");
        event.push_data("a");
        assert_eq!(event.data(), "a");
        event.push_data("b");
        assert_eq!(event.data(), "a\nb");
    }

    #[test]
    fn test_field_lookup_returns_last() {
        let mut event = SseEvent::default();
        event.push_field("tag", "one");
        event.push_field("tag", "two");
        assert_eq!(event.field("tag"), Some("two"));
        assert_eq!(event.fields().len(), 2);
        assert_eq!(event.field("missing"), None);
    }

    #[test]
    fn test_retry() {
        let mut event = SseEvent::default();
        event.push_field("retry", "1500");
        assert_eq!(event.retry(), Some(Duration::from_millis(1500)));
        event.push_field("retry", "soon");
        assert_eq!(event.retry(), None);
    }

    #[test]
    fn test_decode_json() {
        #[derive(serde::Deserialize)]
        struct Tick {
            seq: u32,
        }

        let mut event = SseEvent::default();
        event.push_data(r#"{"seq":9}"#);
        assert_eq!(event.decode_json::<Tick>().unwrap().seq, 9);

        let garbage = SseEvent::default();
        assert!(matches!(
            garbage.decode_json::<Tick>(),
            Err(PollError::Decode { .. })
        ));
    }
}
