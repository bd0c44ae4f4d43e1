//! Incremental `text/event-stream` parser.

use bytes::{Buf, BytesMut};
use std::any::type_name;

use super::event::SseEvent;
use crate::error::PollError;

const CR: u8 = b'\r';
const LF: u8 = b'\n';
const BOM: &[u8] = b"\xEF\xBB\xBF";
const CONTENT_TYPE: &str = "text/event-stream";

/// Stateful SSE frame parser.
///
/// Bytes may be fed in arbitrary chunks; lines split across chunks are
/// buffered until their terminator arrives. One parser per stream.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: BytesMut,
    current: SseEvent,
    bom_checked: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one line, terminator excluded.
    ///
    /// Returns the completed event when `line` is blank and the frame saw at
    /// least one field.
    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "event" => self.current.set_event(value),
            "data" => self.current.push_data(value),
            "id" => self.current.set_id(value),
            _ => self.current.push_field(name, value),
        }
        None
    }

    /// Feed a chunk of the stream; completed events are appended to `events`.
    ///
    /// # Errors
    /// [`PollError::Decode`] if a line is not valid UTF-8.
    pub fn feed(&mut self, chunk: &[u8], events: &mut impl Extend<SseEvent>) -> Result<(), PollError> {
        self.buffer.extend_from_slice(chunk);

        if !self.bom_checked {
            if self.buffer.len() < BOM.len() && BOM.starts_with(&self.buffer) {
                return Ok(());
            }
            if self.buffer.starts_with(BOM) {
                self.buffer.advance(BOM.len());
            }
            self.bom_checked = true;
        }

        while let Some((line_end, rem_start)) = find_eol(&self.buffer) {
            let line = self.buffer.split_to(line_end);
            self.buffer.advance(rem_start - line_end);
            if let Some(event) = self.push_line(as_utf8(&line)?) {
                events.extend(Some(event));
            }
        }
        Ok(())
    }

    /// End of stream: flush the unterminated last line and the partial frame.
    ///
    /// # Errors
    /// [`PollError::Decode`] if the buffered tail is not valid UTF-8.
    pub fn finish(&mut self) -> Result<Option<SseEvent>, PollError> {
        let rest = std::mem::take(&mut self.buffer);
        let mut completed = None;
        if !rest.is_empty() {
            let line = rest.strip_suffix(&[CR]).unwrap_or(&rest[..]);
            completed = self.push_line(as_utf8(line)?);
        }
        Ok(completed.or_else(|| self.dispatch()))
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.current);
        (!event.is_empty()).then_some(event)
    }
}

fn as_utf8(line: &[u8]) -> Result<&str, PollError> {
    std::str::from_utf8(line).map_err(|e| PollError::decode(type_name::<SseEvent>(), CONTENT_TYPE, e))
}

/// Returns `(line_end, remainder_start)`, or `None` when more data is needed,
/// including a trailing CR that may be the first half of a CRLF.
fn find_eol(bytes: &[u8]) -> Option<(usize, usize)> {
    let pos = bytes.iter().position(|&b| b == CR || b == LF)?;
    if bytes[pos] == LF {
        return Some((pos, pos + 1));
    }
    match bytes.get(pos + 1) {
        None => None,
        Some(&LF) => Some((pos, pos + 2)),
        Some(_) => Some((pos, pos + 1)),
    }
}
