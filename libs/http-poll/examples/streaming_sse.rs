//! Server-Sent Events (SSE) streaming example
//!
//! Shows both ways of consuming `text/event-stream`:
//! - reading a single response event by event;
//! - handing the endpoint to the polling engine, which reconnects with
//!   `Last-Event-ID` and honors `retry:` hints.
//!
//! To run this example:
//! ```bash
//! export SSE_URL="http://localhost:8080/v1/events"
//! cargo run --example streaming_sse
//! ```

use std::sync::Arc;
use std::time::Duration;

use http_poll::{
    CancellationToken, ClientContext, PollData, PollingConfig, PollingEngine, ReqwestTransport,
    Request, RequestSender,
};

fn sse_request(url: &str) -> Result<Request, http_poll::PollError> {
    Request::builder()
        .uri(url)
        .header("accept", "text/event-stream")?
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::var("SSE_URL").unwrap_or_else(|_| "http://localhost:8080/v1/events".to_owned());
    let transport = ReqwestTransport::new(None)?;

    println!("=== Example 1: Single stream ===\n");

    let response = transport.send(sse_request(&url)?).await?;
    println!("status: {}", response.status());

    let mut sse = response.into_sse_stream();
    let mut count = 0;
    while let Some(event) = sse.next_event().await? {
        count += 1;
        println!(
            "#{count} event={} id={} data={}",
            event.event().unwrap_or("message"),
            event.id().unwrap_or("-"),
            event.data()
        );
        if event.data() == "[DONE]" {
            break;
        }
    }

    println!("\n=== Example 2: Reconnecting stream for 30s ===\n");

    let config = PollingConfig::<serde_json::Value>::builder()
        .request(sse_request(&url)?)
        .retry_interval(Duration::from_secs(1))
        .timeout(Duration::from_secs(30))
        .on_data(|attempt, data| {
            if let PollData::Event(event) = data {
                println!("[connection {attempt}] {}", event.data());
            }
            Ok(())
        })
        .build()?;

    let engine = PollingEngine::new(Arc::new(ClientContext::new()));
    let end = engine.run(&config, &transport, &CancellationToken::new()).await?;
    println!("\nsession ended: {} ({} connections)", end.reason, end.attempts);

    Ok(())
}
