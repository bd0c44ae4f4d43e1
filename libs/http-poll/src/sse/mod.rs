//! Server-Sent Events framing.

mod event;
mod parser;
mod stream;

pub use event::SseEvent;
pub use parser::SseParser;
pub use stream::SseEventStream;
