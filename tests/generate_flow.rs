//! End-to-end pipeline tests against a mock upstream.

use genai_pipeline::resilience::circuit_breaker::CircuitBreakerConfig;
use genai_pipeline::streaming::StreamingConfig;
use genai_pipeline::telemetry::InMemorySink;
use genai_pipeline::{
    CircuitState, GenerationParams, GenerationServiceBuilder, RetryPolicy, ServiceConfig,
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TEST_KEY: &str = "AIzaIntegrationTestKey";

fn test_config(base_url: &str) -> ServiceConfig {
    ServiceConfig::new()
        .with_base_url(base_url)
        .with_candidate_models(vec!["test-model".to_string()])
        .with_retry(
            RetryPolicy::new()
                .with_max_retries(2)
                .with_base_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(4)),
        )
        .with_breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(3)
                .with_cooldown(Duration::from_secs(60)),
        )
        .with_streaming(StreamingConfig::new().with_chunk_delay(Duration::from_millis(1)))
}

fn success_body(text: &str) -> String {
    json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    })
    .to_string()
}

/// Matches only the one-token validation/health probe.
fn probe_matcher() -> Matcher {
    Matcher::PartialJson(json!({
        "contents": [{ "parts": [{ "text": "ping" }] }]
    }))
}

#[tokio::test]
async fn test_generate_success_then_cache_hit() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/models/test-model:generateContent")
        .match_header("x-goog-api-key", TEST_KEY)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(success_body("Generated launch copy.\n\n- point one\n- point two"))
        .expect(2) // one configure probe + one generation
        .create_async()
        .await;

    let service = GenerationServiceBuilder::new()
        .with_config(test_config(&server.url()))
        .build()
        .unwrap();

    assert!(!service.is_configured());
    assert!(service.configure(TEST_KEY).await.unwrap());
    assert!(service.is_configured());

    let params = GenerationParams::new("launch post");
    let first = service.generate(&params).await.unwrap();
    assert!(first.contains("Generated launch copy"));

    // Second identical request is served from the cache.
    let second = service.generate(&params).await.unwrap();
    assert_eq!(second, first);
    mock.assert_async().await;

    let status = service.system_status();
    assert_eq!(status.cache.hits, 1);
    assert_eq!(status.cache.entries, 1);
    assert_eq!(status.circuit.state, CircuitState::Closed);

    let metrics = service.performance_metrics();
    assert_eq!(metrics.failed_requests, 0);
    assert!(metrics.total_requests >= 1);
}

#[tokio::test]
async fn test_upstream_storm_falls_back_then_opens_breaker() {
    let mut server = Server::new_async().await;
    let probe = server
        .mock("POST", "/models/test-model:generateContent")
        .match_body(probe_matcher())
        .with_status(200)
        .with_body(success_body("pong"))
        .create_async()
        .await;
    // Three generate calls, two retried attempts each.
    let storm = server
        .mock("POST", "/models/test-model:generateContent")
        .match_body(Matcher::PartialJson(json!({
            "contents": [{ "parts": [{ "text": "fresh topic" }] }]
        })))
        .with_status(500)
        .with_body(r#"{"error":{"message":"internal"}}"#)
        .expect(6)
        .create_async()
        .await;

    let sink = Arc::new(InMemorySink::new(128));
    let service = GenerationServiceBuilder::new()
        .with_config(test_config(&server.url()))
        .with_observability_sink(sink.clone())
        .build()
        .unwrap();
    service.configure(TEST_KEY).await.unwrap();

    let params = GenerationParams::new("fresh topic");
    for _ in 0..3 {
        // Nothing cached for this request: the template fallback answers.
        let text = service.generate(&params).await.unwrap();
        assert!(text.contains("starting points"), "expected template fallback");
    }

    // Breaker is open now; the next call never reaches the upstream.
    assert_eq!(service.system_status().circuit.state, CircuitState::Open);
    let text = service.generate(&params).await.unwrap();
    assert!(text.contains("starting points"));
    storm.assert_async().await;
    probe.assert_async().await;

    // Fallback activations were reported to the sink.
    assert_eq!(sink.events_named("generate.fallback").len(), 4);
}

#[tokio::test]
async fn test_stale_cache_serves_as_first_fallback() {
    let mut server = Server::new_async().await;
    let flappy = server
        .mock("POST", "/models/test-model:generateContent")
        .with_status(200)
        .with_body(success_body("original cached answer"))
        .expect(2) // configure probe + first generation
        .create_async()
        .await;

    let mut config = test_config(&server.url());
    // Entries expire almost immediately but stay eligible for fallback.
    config.cache = genai_pipeline::CacheConfig::new().with_base_ttl(Duration::from_millis(10));
    let service = GenerationServiceBuilder::new()
        .with_config(config)
        .build()
        .unwrap();
    service.configure(TEST_KEY).await.unwrap();

    let params = GenerationParams::new("flaky request");
    let first = service.generate(&params).await.unwrap();
    assert_eq!(first, "original cached answer");
    tokio::time::sleep(Duration::from_millis(20)).await;
    flappy.remove_async().await;

    let outage = server
        .mock("POST", "/models/test-model:generateContent")
        .with_status(503)
        .with_body(r#"{"error":{"message":"overloaded"}}"#)
        .create_async()
        .await;

    // TTL has lapsed, upstream is down: the stale entry is served instead of
    // the template.
    let fallback = service.generate(&params).await.unwrap();
    assert_eq!(fallback, "original cached answer");
    drop(outage);
}

#[tokio::test]
async fn test_streaming_delivers_chunks_and_completes() {
    let mut server = Server::new_async().await;
    let text = "one two three four five six seven eight nine ten \
                eleven twelve thirteen fourteen fifteen sixteen";
    let _mock = server
        .mock("POST", "/models/test-model:generateContent")
        .with_status(200)
        .with_body(success_body(text))
        .create_async()
        .await;

    let service = GenerationServiceBuilder::new()
        .with_config(test_config(&server.url()))
        .build()
        .unwrap();
    service.configure(TEST_KEY).await.unwrap();

    let chunks = Arc::new(Mutex::new(Vec::new()));
    let sink = chunks.clone();
    let full = service
        .generate_streaming(&GenerationParams::new("stream me"), move |chunk| {
            sink.lock().unwrap().push(chunk);
        })
        .await
        .unwrap();
    assert_eq!(full, text);

    let seen = chunks.lock().unwrap();
    let assembled: String = seen.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(assembled, text);
    assert!(seen.last().unwrap().done);
    assert_eq!(seen.last().unwrap().progress, 100);
    assert_eq!(service.system_status().active_streams, 0);
}

#[tokio::test]
async fn test_cancel_streaming_counts_and_stops() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/models/test-model:generateContent")
        .with_status(200)
        .with_body(success_body(&"word ".repeat(400)))
        .create_async()
        .await;

    let mut config = test_config(&server.url());
    config.streaming = StreamingConfig::new().with_chunk_delay(Duration::from_millis(25));
    let service = Arc::new(
        GenerationServiceBuilder::new()
            .with_config(config)
            .build()
            .unwrap(),
    );
    service.configure(TEST_KEY).await.unwrap();

    let emitted = Arc::new(Mutex::new(0usize));
    let counter = emitted.clone();
    let svc = service.clone();
    let handle = tokio::spawn(async move {
        svc.generate_streaming(&GenerationParams::new("cancel me"), move |_| {
            *counter.lock().unwrap() += 1;
        })
        .await
    });

    // Let a few chunks through, then cancel every live session.
    tokio::time::sleep(Duration::from_millis(80)).await;
    let cancelled = service.cancel_streaming(None);
    assert_eq!(cancelled, 1);

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(genai_pipeline::Error::Cancelled)));

    let count_at_cancel = *emitted.lock().unwrap();
    assert!(count_at_cancel > 0);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(*emitted.lock().unwrap(), count_at_cancel);
}

#[tokio::test]
async fn test_empty_prompt_fails_fast_without_network() {
    let mut server = Server::new_async().await;
    let probe = server
        .mock("POST", "/models/test-model:generateContent")
        .with_status(200)
        .with_body(success_body("pong"))
        .expect(1) // only the configure probe
        .create_async()
        .await;

    let service = GenerationServiceBuilder::new()
        .with_config(test_config(&server.url()))
        .build()
        .unwrap();
    service.configure(TEST_KEY).await.unwrap();

    let err = service
        .generate(&GenerationParams::new("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, genai_pipeline::Error::Validation { .. }));
    probe.assert_async().await;
}

#[tokio::test]
async fn test_clear_cache_reports_removed_entries() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/models/test-model:generateContent")
        .with_status(200)
        .with_body(success_body("cached"))
        .create_async()
        .await;

    let service = GenerationServiceBuilder::new()
        .with_config(test_config(&server.url()))
        .build()
        .unwrap();
    service.configure(TEST_KEY).await.unwrap();

    service.generate(&GenerationParams::new("a")).await.unwrap();
    service.generate(&GenerationParams::new("b")).await.unwrap();
    assert_eq!(service.clear_cache(false), 2);
    assert_eq!(service.system_status().cache.entries, 0);
}
