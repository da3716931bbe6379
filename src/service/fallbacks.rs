//! Canonical fallback strategies, in the order the service registers them:
//! a recent cached result, then a templated generic response, then an
//! unavailable sentinel so callers always receive a renderable value.

use crate::cache::{CacheKeyGenerator, ResponseCache};
use crate::resilience::fallback::FallbackStrategy;
use crate::types::GenerationParams;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Sentinel payload returned when every other strategy has declined.
pub const UNAVAILABLE_MESSAGE: &str =
    "The generation service is temporarily unavailable. Please try again shortly.";

/// Serve a cached result for the same normalized request, even past its TTL,
/// as long as it is younger than `max_age`.
pub struct CachedResultFallback {
    cache: Arc<ResponseCache>,
    keys: CacheKeyGenerator,
    max_age: Duration,
}

impl CachedResultFallback {
    pub fn new(cache: Arc<ResponseCache>, keys: CacheKeyGenerator, max_age: Duration) -> Self {
        Self {
            cache,
            keys,
            max_age,
        }
    }
}

#[async_trait]
impl FallbackStrategy for CachedResultFallback {
    fn name(&self) -> &'static str {
        "cached_result"
    }

    async fn attempt(&self, params: &GenerationParams) -> Result<Option<String>> {
        let key = self.keys.generate(params);
        Ok(self.cache.get_if_younger(&key, self.max_age))
    }
}

/// Templated generic response carrying the request topic, so the caller gets
/// something usable rather than an error page.
pub struct TemplateFallback;

fn topic_snippet(prompt: &str) -> String {
    let normalized = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= 60 {
        normalized
    } else {
        let head: String = normalized.chars().take(60).collect();
        format!("{head}…")
    }
}

#[async_trait]
impl FallbackStrategy for TemplateFallback {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn attempt(&self, params: &GenerationParams) -> Result<Option<String>> {
        let topic = topic_snippet(&params.prompt);
        Ok(Some(format!(
            "We couldn't generate a tailored response right now.\n\n\
             A few starting points for \"{topic}\":\n\
             - Open with the single most important point.\n\
             - Keep sentences short and concrete.\n\
             - Close with a clear call to action.\n\n\
             Please retry in a moment for a tailored result."
        )))
    }
}

/// Last resort: a fixed, renderable unavailable payload. Never declines.
pub struct SentinelFallback;

#[async_trait]
impl FallbackStrategy for SentinelFallback {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn attempt(&self, _params: &GenerationParams) -> Result<Option<String>> {
        Ok(Some(UNAVAILABLE_MESSAGE.to_string()))
    }
}
