use crate::cache::{CacheConfig, CacheKeyGenerator, ResponseCache};
use crate::credentials::{CredentialStore, CredentialValidator, MemoryCredentialStore};
use crate::health::{HealthMonitorConfig, MetricsRecorder};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::resilience::fallback::FallbackChain;
use crate::resilience::retry::{RetryExecutor, RetryPolicy};
use crate::service::core::GenerationService;
use crate::service::fallbacks::{CachedResultFallback, SentinelFallback, TemplateFallback};
use crate::streaming::{StreamingConfig, StreamingDeliverer};
use crate::telemetry::{noop_sink, ObservabilitySink};
use crate::transport::{HttpTransport, DEFAULT_BASE_URL};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tunables for one service instance.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Send the API key as a `key=` query parameter instead of a header.
    pub api_key_in_query: bool,
    /// Model identifiers to probe during credential validation, in priority
    /// order. Identifiers rotate upstream, so several candidates are kept.
    pub candidate_models: Vec<String>,
    pub validation_interval: Duration,
    /// Maximum age of a cached result the fallback chain may serve.
    pub cached_fallback_max_age: Duration,
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub streaming: StreamingConfig,
    pub health: HealthMonitorConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_in_query: false,
            candidate_models: vec![
                "gemini-1.5-pro".to_string(),
                "gemini-1.5-flash".to_string(),
                "gemini-pro".to_string(),
            ],
            validation_interval: Duration::from_secs(24 * 60 * 60),
            cached_fallback_max_age: Duration::from_secs(60 * 60),
            breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
            streaming: StreamingConfig::default(),
            health: HealthMonitorConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_candidate_models(mut self, models: Vec<String>) -> Self {
        self.candidate_models = models;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_streaming(mut self, streaming: StreamingConfig) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_health(mut self, health: HealthMonitorConfig) -> Self {
        self.health = health;
        self
    }
}

/// Builder wiring a [`GenerationService`] with injected collaborators.
///
/// Everything has a sensible default: an in-memory credential store and a
/// no-op observability sink. Tests inject their own.
pub struct GenerationServiceBuilder {
    config: ServiceConfig,
    store: Option<Arc<dyn CredentialStore>>,
    sink: Option<Arc<dyn ObservabilitySink>>,
}

impl Default for GenerationServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
            store: None,
            sink: None,
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the upstream base URL (mock servers in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_observability_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<GenerationService> {
        let config = self.config;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let sink = self.sink.unwrap_or_else(noop_sink);

        let transport = Arc::new(HttpTransport::new(
            config.base_url.clone(),
            config.api_key_in_query,
        )?);
        let validator = Arc::new(CredentialValidator::new(
            transport.clone(),
            store.clone(),
            config.candidate_models.clone(),
            config.validation_interval,
        ));
        let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));
        let retry = RetryExecutor::new(config.retry.clone());
        let cache = Arc::new(ResponseCache::new(config.cache.clone()));
        let keys = CacheKeyGenerator::new();
        let metrics = Arc::new(MetricsRecorder::new());
        let shutdown = CancellationToken::new();
        let deliverer = Arc::new(StreamingDeliverer::new(
            config.streaming.clone(),
            shutdown.clone(),
        ));

        let mut fallbacks = FallbackChain::new();
        fallbacks.add_fallback(Arc::new(CachedResultFallback::new(
            cache.clone(),
            keys.clone(),
            config.cached_fallback_max_age,
        )));
        fallbacks.add_fallback(Arc::new(TemplateFallback));
        fallbacks.add_fallback(Arc::new(SentinelFallback));

        spawn_cache_sweeper(cache.clone(), sink.clone(), shutdown.clone());

        Ok(GenerationService {
            config,
            transport,
            store,
            sink,
            validator,
            breaker,
            retry,
            fallbacks,
            cache,
            keys,
            deliverer,
            metrics,
            shutdown,
        })
    }
}

/// Background sweep purging strictly expired entries regardless of the
/// capacity cap. Requires a running runtime; builders used outside one simply
/// skip the sweeper.
fn spawn_cache_sweeper(
    cache: Arc<ResponseCache>,
    sink: Arc<dyn ObservabilitySink>,
    shutdown: CancellationToken,
) {
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            tracing::debug!("no tokio runtime; cache sweeper not started");
            return;
        }
    };
    handle.spawn(async move {
        let mut ticker = tokio::time::interval(cache.sweep_interval());
        // The first tick fires immediately; there is nothing to sweep yet.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = cache.sweep();
                    if purged > 0 {
                        tracing::debug!(purged, "cache sweep purged expired entries");
                        let _ = sink
                            .report("cache.sweep", serde_json::json!({ "purged": purged }))
                            .await;
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}
