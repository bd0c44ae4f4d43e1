use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;

use super::event::SseEvent;
use super::parser::SseParser;
use crate::body::BoxStream;
use crate::error::PollError;

/// Stream of Server-Sent Events parsed from a byte stream
pub struct SseEventStream {
    inner: BoxStream<Result<Bytes, PollError>>,
    parser: SseParser,
    pending: VecDeque<SseEvent>,
    finished: bool,
}

impl std::fmt::Debug for SseEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseEventStream")
            .field("parser", &self.parser)
            .field("pending", &self.pending.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl SseEventStream {
    /// Create a new SSE event stream from a byte stream
    pub fn new(stream: BoxStream<Result<Bytes, PollError>>) -> Self {
        Self {
            inner: stream,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Read the next SSE event from the stream
    ///
    /// Returns `Ok(None)` once the underlying stream has ended and every
    /// buffered frame has been handed out.
    ///
    /// # Errors
    /// Errors of the byte stream, or [`PollError::Decode`] on invalid UTF-8.
    pub async fn next_event(&mut self) -> Result<Option<SseEvent>, PollError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.parser.feed(&chunk, &mut self.pending)?,
                Some(Err(e)) => return Err(e),
                None => {
                    self.finished = true;
                    self.pending.extend(self.parser.finish()?);
                }
            }
        }
    }

    /// Adapt into a `Stream` of events.
    pub fn into_stream(self) -> BoxStream<Result<SseEvent, PollError>> {
        Box::pin(futures::stream::try_unfold(self, |mut sse| async move {
            let next = sse.next_event().await?;
            Ok::<_, PollError>(next.map(|event| (event, sse)))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use futures::stream;

    fn chunks(parts: &[&'static str]) -> BoxStream<Result<Bytes, PollError>> {
        let items: Vec<Result<Bytes, PollError>> = parts.iter().map(|&p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_sse_stream() {
        let mut sse = SseEventStream::new(chunks(&["data: event 1\n\n", "data: event 2\n\n"]));

        let event1 = sse.next_event().await.unwrap().unwrap();
        assert_eq!(event1.data(), "event 1");

        let event2 = sse.next_event().await.unwrap().unwrap();
        assert_eq!(event2.data(), "event 2");

        assert!(sse.next_event().await.unwrap().is_none());
        assert!(sse.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_several_events_in_one_chunk() {
        let sse = SseEventStream::new(chunks(&["data: a\n\ndata: b\n\nda", "ta: c\n\n"]));
        let events: Vec<_> = sse.into_stream().try_collect().await.unwrap();
        let data: Vec<_> = events.iter().map(SseEvent::data).collect();
        assert_eq!(data, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_unterminated_frame_at_end() {
        let mut sse = SseEventStream::new(chunks(&["id: 3\ndata: last"]));
        let event = sse.next_event().await.unwrap().unwrap();
        assert_eq!(event.id(), Some("3"));
        assert_eq!(event.data(), "last");
        assert!(sse.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_is_forwarded() {
        let items = vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err(PollError::Transport("reset".into())),
        ];
        let mut sse = SseEventStream::new(Box::pin(stream::iter(items)));
        assert_eq!(sse.next_event().await.unwrap().unwrap().data(), "a");
        assert!(matches!(sse.next_event().await, Err(PollError::Transport(_))));
    }
}
