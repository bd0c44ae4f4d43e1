//! Long-polling example
//!
//! Polls an endpoint returning JSON (or `204 No Content` while nothing is
//! pending) and prints every value received. Polling parameters come from an
//! optional YAML file and `HTTP_POLL_*` environment variables.
//!
//! To run this example:
//! ```bash
//! export POLL_URL="http://localhost:8080/v1/updates"
//! export HTTP_POLL_RETRY_INTERVAL=2s   # Optional
//! export HTTP_POLL_TIMEOUT=1m          # Optional
//! cargo run --example long_poll -- poll.yaml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use http_poll::{
    CancellationToken, ClientContext, PollData, PollingConfigBuilder, PollingEngine,
    PollingSettings, ReqwestTransport, Request,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    let settings = PollingSettings::load(path.as_deref())?;
    let url = std::env::var("POLL_URL").unwrap_or_else(|_| "http://localhost:8080/v1/updates".to_owned());

    println!("=== Polling {url} ===");
    println!("settings: {settings:?}\n");

    let config = PollingConfigBuilder::<serde_json::Value>::from_settings(&settings)
        .request(
            Request::builder()
                .uri(url)
                .header("accept", "application/json")?
                .build()?,
        )
        .on_data(|attempt, data| {
            if let PollData::Value(value) = data {
                println!("[attempt {attempt}] {value}");
            }
            Ok(())
        })
        .on_error(|attempt, error| {
            eprintln!("[attempt {attempt}] failed: {error}");
            Ok(())
        })
        .on_end(|end| {
            println!(
                "\nsession ended: {} after {} attempts in {:?}",
                end.reason, end.attempts, end.elapsed
            );
            Ok(())
        })
        .build()?;

    let engine = PollingEngine::new(Arc::new(ClientContext::new()));
    let transport = ReqwestTransport::new(Some(Duration::from_secs(60)))?;
    engine.run(&config, &transport, &CancellationToken::new()).await?;

    Ok(())
}
