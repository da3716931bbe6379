//! 健康监控模块:滚动指标与周期性探测。
//!
//! # Health Monitoring Module
//!
//! A shared [`MetricsRecorder`] accumulates rolling request counts and a
//! smoothed response-time average from every guarded call, real traffic and
//! probes alike. The [`HealthMonitor`] drives a fixed-interval probe through
//! the same circuit-breaker-guarded path as real traffic, then evaluates the
//! aggregate and raises alerts to the observability sink when the failure
//! rate crosses the threshold or the breaker is open.

use crate::resilience::circuit_breaker::CircuitState;
use crate::telemetry::ObservabilitySink;
use crate::Result;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Smoothing factor for the response-time EMA.
const EMA_ALPHA: f64 = 0.2;

/// Rolling service health aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct HealthMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Exponential moving average of observed latencies.
    pub average_response_time_ms: f64,
    pub uptime_percent: f64,
    pub failure_rate_percent: f64,
    pub circuit_state: CircuitState,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    successful: u64,
    failed: u64,
    ema_ms: Option<f64>,
}

/// Mutex-protected recorder shared by the service call path and the prober.
#[derive(Default)]
pub struct MetricsRecorder {
    inner: Mutex<Counters>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe_latency(counters: &mut Counters, latency: Duration) {
        let ms = latency.as_secs_f64() * 1000.0;
        counters.ema_ms = Some(match counters.ema_ms {
            Some(prev) => prev + EMA_ALPHA * (ms - prev),
            None => ms,
        });
    }

    pub fn record_success(&self, latency: Duration) {
        let mut c = self.lock();
        c.total += 1;
        c.successful += 1;
        Self::observe_latency(&mut c, latency);
    }

    pub fn record_failure(&self, latency: Duration) {
        let mut c = self.lock();
        c.total += 1;
        c.failed += 1;
        Self::observe_latency(&mut c, latency);
    }

    pub fn snapshot(&self, circuit_state: CircuitState) -> HealthMetrics {
        let c = self.lock();
        let (uptime, failure_rate) = if c.total == 0 {
            (100.0, 0.0)
        } else {
            (
                c.successful as f64 / c.total as f64 * 100.0,
                c.failed as f64 / c.total as f64 * 100.0,
            )
        };
        HealthMetrics {
            total_requests: c.total,
            successful_requests: c.successful,
            failed_requests: c.failed,
            average_response_time_ms: c.ema_ms.unwrap_or(0.0),
            uptime_percent: uptime,
            failure_rate_percent: failure_rate,
            circuit_state,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    pub probe_interval: Duration,
    /// Alert when `failure_rate_percent` exceeds this value.
    pub failure_rate_alert_threshold: f64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            failure_rate_alert_threshold: 50.0,
        }
    }
}

impl HealthMonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_failure_rate_alert_threshold(mut self, threshold: f64) -> Self {
        self.failure_rate_alert_threshold = threshold;
        self
    }
}

/// Fixed-interval prober and alerter.
///
/// The probe closure is expected to run through the same guarded path as
/// real traffic (breaker + metrics recording); the monitor itself only
/// drives the schedule and evaluates the aggregate.
pub struct HealthMonitor {
    cfg: HealthMonitorConfig,
    sink: Arc<dyn ObservabilitySink>,
    recorder: Arc<MetricsRecorder>,
    circuit_state: Arc<dyn Fn() -> CircuitState + Send + Sync>,
}

impl HealthMonitor {
    pub fn new(
        cfg: HealthMonitorConfig,
        sink: Arc<dyn ObservabilitySink>,
        recorder: Arc<MetricsRecorder>,
        circuit_state: Arc<dyn Fn() -> CircuitState + Send + Sync>,
    ) -> Self {
        Self {
            cfg,
            sink,
            recorder,
            circuit_state,
        }
    }

    pub fn spawn<P, Fut>(self, probe: P, shutdown: CancellationToken) -> tokio::task::JoinHandle<()>
    where
        P: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = self.cfg.probe_interval.as_secs(),
                "health monitor starting"
            );
            let mut ticker = tokio::time::interval(self.cfg.probe_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick(&probe).await;
                    }
                    _ = shutdown.cancelled() => {
                        tracing::info!("health monitor shutting down");
                        break;
                    }
                }
            }
        })
    }

    async fn tick<P, Fut>(&self, probe: &P)
    where
        P: Fn() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if let Err(err) = probe().await {
            tracing::warn!(error = %err, "health probe failed");
        }

        let state = (self.circuit_state)();
        let snapshot = self.recorder.snapshot(state);

        if snapshot.total_requests > 0
            && snapshot.failure_rate_percent > self.cfg.failure_rate_alert_threshold
        {
            tracing::warn!(
                failure_rate = snapshot.failure_rate_percent,
                "failure rate above alert threshold"
            );
            let _ = self
                .sink
                .report(
                    "health.alert",
                    json!({
                        "reason": "failure_rate",
                        "failure_rate_percent": snapshot.failure_rate_percent,
                    }),
                )
                .await;
        }
        if state == CircuitState::Open {
            let _ = self
                .sink
                .report("health.alert", json!({ "reason": "circuit_open" }))
                .await;
        }

        if let Ok(data) = serde_json::to_value(&snapshot) {
            let _ = self.sink.report("health.metrics", data).await;
        }
    }
}
