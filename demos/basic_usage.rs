//! Minimal end-to-end usage: configure, generate, inspect status.
//!
//! Run with a real key:
//! `GEMINI_API_KEY=AIza... cargo run --example basic_usage`

use genai_pipeline::{
    EnvCredentialStore, GenerationParams, GenerationServiceBuilder,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genai_pipeline=info".into()),
        )
        .init();

    let service = Arc::new(
        GenerationServiceBuilder::new()
            .with_credential_store(Arc::new(EnvCredentialStore::new("GEMINI_API_KEY")))
            .build()?,
    );

    if !service.is_configured() {
        anyhow::bail!("set GEMINI_API_KEY to run this demo");
    }

    let monitor = service.clone().start_health_monitor();

    let params = GenerationParams::new("Write a two-sentence product update for a task app")
        .temperature(0.8)
        .max_output_tokens(256);

    let text = service
        .generate_streaming(&params, |chunk| {
            if !chunk.done {
                print!("{}", chunk.text);
            }
        })
        .await?;
    println!("\n---\nfull response ({} chars)", text.len());

    let status = service.system_status();
    println!(
        "circuit: {} | cache entries: {} | active streams: {}",
        status.circuit.state.as_str(),
        status.cache.entries,
        status.active_streams
    );

    service.shutdown();
    monitor.abort();
    Ok(())
}
