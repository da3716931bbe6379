//! 弹性模式模块：熔断、重试与降级链。
//!
//! # Resilience Primitives Module
//!
//! Resilience patterns that keep the pipeline returning usable results when
//! the upstream API degrades:
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Circuit breaker with a single-probe half-open gate |
//! | [`retry`] | Bounded retry with capped exponential backoff |
//! | [`fallback`] | Ordered fallback strategies tried after primary failure |
//!
//! The breaker wraps the whole retry loop: one exhausted retry sequence counts
//! as one breaker failure. Fallbacks run outside both, only for errors that
//! are not fail-fast (see [`crate::Error`] classification).

pub mod circuit_breaker;
pub mod fallback;
pub mod retry;
