//! # genai-pipeline
//!
//! 弹性生成式文本请求管道：在不可靠、限流的上游 API 之上保持可用的结果。
//!
//! Resilient request pipeline for generative-text APIs that keeps returning
//! usable results despite transient failures, model deprecations, and quota
//! limits.
//!
//! ## Overview
//!
//! Third-party generative-text APIs fail in practice: transient 5xx storms,
//! rate limits, deprecated model identifiers, slow responses. This crate wraps
//! a single upstream HTTP contract in a layered pipeline so that callers
//! always receive a renderable result:
//!
//! ```text
//! caller → ResponseCache ── hit ──────────────────────────→ (stream) result
//!              │ miss
//!              ▼
//!         CircuitBreaker( RetryExecutor( credential-gated HTTP call ) )
//!              │ unrecovered failure
//!              ▼
//!         FallbackChain: cached (<1h) → template → unavailable sentinel
//! ```
//!
//! A background [`health::HealthMonitor`] probes the same guarded path and
//! publishes metrics and alerts to an [`telemetry::ObservabilitySink`].
//!
//! ## Key Features
//!
//! - **Circuit breaking**: [`resilience::circuit_breaker::CircuitBreaker`]
//!   with a single-probe half-open gate
//! - **Bounded retry**: capped exponential backoff with explicit
//!   retryable-error classification
//! - **Ordered fallbacks**: callers always get a renderable value
//! - **Lazy credential validation**: API keys probed against prioritized
//!   candidate models, cached for a validity window
//! - **Adaptive caching**: quality-scored TTLs, score-based eviction,
//!   periodic expiry sweep
//! - **Simulated streaming**: cancellable word-balanced chunk delivery of a
//!   completed response
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use genai_pipeline::{GenerationParams, GenerationServiceBuilder};
//!
//! #[tokio::main]
//! async fn main() -> genai_pipeline::Result<()> {
//!     let service = GenerationServiceBuilder::new().build()?;
//!     service.configure("AIza...").await?;
//!
//!     let text = service
//!         .generate(&GenerationParams::new("Write a short product update"))
//!         .await?;
//!     println!("{text}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`service`] | The [`GenerationService`] facade and its builder |
//! | [`resilience`] | Circuit breaker, retry executor, fallback chain |
//! | [`cache`] | Quality-aware adaptive response cache |
//! | [`credentials`] | Credential stores and lazy model-probing validation |
//! | [`streaming`] | Cancellable simulated progressive delivery |
//! | [`health`] | Metrics recording and the periodic health prober |
//! | [`telemetry`] | Observability sink abstraction |
//! | [`transport`] | Upstream HTTP contract |
//! | [`types`] | Request/response types |

pub mod cache;
pub mod credentials;
pub mod health;
pub mod resilience;
pub mod service;
pub mod streaming;
pub mod telemetry;
pub mod transport;
pub mod types;

/// Error type for the library
pub mod error;
pub use error::Error;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

// Re-export main types for convenience
pub use cache::{CacheConfig, CacheStats};
pub use credentials::{CredentialStore, EnvCredentialStore, KeyringCredentialStore, MemoryCredentialStore};
pub use health::HealthMetrics;
pub use resilience::circuit_breaker::{CircuitBreakerConfig, CircuitState};
pub use resilience::retry::RetryPolicy;
pub use service::{GenerationService, GenerationServiceBuilder, ServiceConfig, SystemStatus};
pub use streaming::{StreamChunk, StreamOutcome};
pub use telemetry::ObservabilitySink;
pub use types::{GenerationParams, GenerationResponse};
