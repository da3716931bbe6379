use crate::cache::{score_quality, CacheKeyGenerator, CacheStats, ResponseCache};
use crate::credentials::{CredentialStore, CredentialValidator};
use crate::health::{HealthMetrics, HealthMonitor, MetricsRecorder};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerSnapshot};
use crate::resilience::fallback::FallbackChain;
use crate::resilience::retry::RetryExecutor;
use crate::service::builder::ServiceConfig;
use crate::streaming::{StreamChunk, StreamOutcome, StreamingDeliverer};
use crate::telemetry::ObservabilitySink;
use crate::transport::HttpTransport;
use crate::types::GenerationParams;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of the service for dashboards and debugging.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub configured: bool,
    pub credential_validated: bool,
    pub circuit: CircuitBreakerSnapshot,
    pub cache: CacheStats,
    pub active_streams: usize,
}

/// Resilient generation service.
///
/// One instance per process is the expected deployment; all internal state
/// (breaker, cache, metrics, sessions) is shared and mutex-protected, so an
/// instance can be wrapped in an `Arc` and called from many tasks at once.
pub struct GenerationService {
    pub(crate) config: ServiceConfig,
    pub(crate) transport: Arc<HttpTransport>,
    pub(crate) store: Arc<dyn CredentialStore>,
    pub(crate) sink: Arc<dyn ObservabilitySink>,
    pub(crate) validator: Arc<CredentialValidator>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) retry: RetryExecutor,
    pub(crate) fallbacks: FallbackChain,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) keys: CacheKeyGenerator,
    pub(crate) deliverer: Arc<StreamingDeliverer>,
    pub(crate) metrics: Arc<MetricsRecorder>,
    pub(crate) shutdown: CancellationToken,
}

impl GenerationService {
    /// Validate and persist an API key.
    ///
    /// The key is probed against the candidate models before it is stored;
    /// an invalid key never reaches the credential store.
    pub async fn configure(&self, api_key: &str) -> Result<bool> {
        let validated = self.validator.validate_key(api_key).await?;
        self.store.set(api_key)?;
        tracing::info!(model = %validated.model, "service configured");
        let _ = self
            .sink
            .report("credentials.configured", json!({ "model": validated.model }))
            .await;
        Ok(true)
    }

    pub fn is_configured(&self) -> bool {
        self.store.get().is_some()
    }

    /// Generate text for `params`, going through cache, breaker, retry and,
    /// when everything else failed, the fallback chain.
    pub async fn generate(&self, params: &GenerationParams) -> Result<String> {
        let cancel = self.shutdown.child_token();
        self.resolve_text(params, &cancel).await
    }

    /// Like [`generate`](Self::generate), but delivers the result
    /// progressively through `on_chunk` under a cancellable session.
    ///
    /// Returns the full text once delivery completes; a cancelled session
    /// resolves to [`Error::Cancelled`], aborting the upstream call if it is
    /// still in flight.
    pub async fn generate_streaming<F>(&self, params: &GenerationParams, on_chunk: F) -> Result<String>
    where
        F: FnMut(StreamChunk) + Send,
    {
        let session = self.deliverer.open_session();
        let cancel = session.cancellation_token();
        let text = match self.resolve_text(params, &cancel).await {
            Ok(text) => text,
            Err(err) => {
                self.deliverer.close_session(session.id());
                return Err(err);
            }
        };
        match self.deliverer.deliver(&session, &text, on_chunk).await {
            StreamOutcome::Complete => Ok(text),
            StreamOutcome::Cancelled => Err(Error::Cancelled),
        }
    }

    /// Cancel one streaming session, or all of them when `session_id` is
    /// `None`. Returns the number of sessions cancelled.
    pub fn cancel_streaming(&self, session_id: Option<&str>) -> usize {
        match session_id {
            Some(id) => self.deliverer.cancel(id),
            None => self.deliverer.cancel_all(),
        }
    }

    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            configured: self.is_configured(),
            credential_validated: self.validator.is_validated(),
            circuit: self.breaker.snapshot(),
            cache: self.cache.stats(),
            active_streams: self.deliverer.active_sessions(),
        }
    }

    pub fn performance_metrics(&self) -> HealthMetrics {
        self.metrics.snapshot(self.breaker.state())
    }

    /// Clear cached responses: expired-only when `selective`, everything
    /// otherwise. Returns the number of entries removed.
    pub fn clear_cache(&self, selective: bool) -> usize {
        let removed = self.cache.clear(selective);
        tracing::info!(removed, selective, "cache cleared");
        removed
    }

    /// Start the periodic health prober. It runs until
    /// [`shutdown`](Self::shutdown) is called.
    pub fn start_health_monitor(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let breaker = self.breaker.clone();
        let monitor = HealthMonitor::new(
            self.config.health.clone(),
            self.sink.clone(),
            self.metrics.clone(),
            Arc::new(move || breaker.state()),
        );
        let shutdown = self.shutdown.clone();
        let service = self;
        monitor.spawn(
            move || {
                let service = service.clone();
                async move { service.health_probe().await }
            },
            shutdown,
        )
    }

    /// Stop background tasks and cancel every live streaming session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn resolve_text(
        &self,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if params.prompt.trim().is_empty() {
            return Err(Error::validation("prompt is empty"));
        }

        let key = self.keys.generate(params);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(key = %key, "cache hit");
            return Ok(hit);
        }

        match self.generate_guarded(params, cancel).await {
            Ok(text) => {
                let quality = score_quality(&text);
                self.cache.put(key, &text, quality);
                let _ = self
                    .sink
                    .report(
                        "cache.store",
                        json!({ "quality": quality, "chars": text.len() }),
                    )
                    .await;
                Ok(text)
            }
            Err(err) if err.is_fail_fast() => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "primary pipeline failed; trying fallbacks");
                let result = self.fallbacks.execute_with_fallbacks(params, &err).await?;
                let _ = self
                    .sink
                    .report(
                        "generate.fallback",
                        json!({ "strategy": result.strategy, "cause": err.user_message() }),
                    )
                    .await;
                Ok(result.text)
            }
        }
    }

    /// The breaker-guarded, retried, credential-gated upstream call. Shared
    /// by user traffic and the health prober.
    async fn generate_guarded(
        &self,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.breaker
            .execute(|| async move {
                self.retry
                    .execute_with_retry("generate", || async move {
                        let cred = self.validator.validated_api_key().await?;
                        let started = Instant::now();
                        let result = self
                            .transport
                            .generate(&cred.model, &cred.api_key, params, cancel)
                            .await;
                        match &result {
                            Ok(resp) => self.metrics.record_success(resp.latency),
                            Err(Error::Cancelled) => {}
                            Err(_) => self.metrics.record_failure(started.elapsed()),
                        }
                        result.map(|resp| resp.text)
                    })
                    .await
            })
            .await
    }

    /// One health-probe round trip through the guarded path. Skipped while
    /// unconfigured so an idle instance does not spam warnings.
    pub(crate) async fn health_probe(&self) -> Result<()> {
        if !self.is_configured() {
            tracing::debug!("health probe skipped; service not configured");
            return Ok(());
        }
        self.breaker
            .execute(|| async move {
                let cred = self.validator.validated_api_key().await?;
                let started = Instant::now();
                match self.transport.probe(&cred.model, &cred.api_key).await {
                    Ok(status) if (200..300).contains(&status) => {
                        self.metrics.record_success(started.elapsed());
                        Ok(())
                    }
                    Ok(status) => {
                        self.metrics.record_failure(started.elapsed());
                        Err(Error::upstream(status, "health probe returned non-success"))
                    }
                    Err(err) => {
                        self.metrics.record_failure(started.elapsed());
                        Err(err)
                    }
                }
            })
            .await
    }
}
