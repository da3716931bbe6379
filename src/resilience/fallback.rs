use crate::types::GenerationParams;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// One alternative way to produce a renderable result after the primary
/// pipeline has failed.
///
/// `attempt` returns `Ok(Some(text))` on success, `Ok(None)` when the
/// strategy does not apply to this request (e.g. nothing cached), and `Err`
/// on a hard failure. Both `None` and `Err` advance the chain.
#[async_trait]
pub trait FallbackStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, params: &GenerationParams) -> Result<Option<String>>;
}

/// A successful fallback, tagged with the strategy that produced it.
#[derive(Debug, Clone)]
pub struct FallbackResult {
    pub text: String,
    pub strategy: &'static str,
}

/// Ordered chain of fallback strategies.
///
/// Strategies run strictly in registration order; the first success wins.
/// When every strategy declines or fails, [`Error::AllFallbacksExhausted`]
/// is returned.
#[derive(Default)]
pub struct FallbackChain {
    strategies: Vec<Arc<dyn FallbackStrategy>>,
}

impl FallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fallback(&mut self, strategy: Arc<dyn FallbackStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub async fn execute_with_fallbacks(
        &self,
        params: &GenerationParams,
        source: &Error,
    ) -> Result<FallbackResult> {
        for strategy in &self.strategies {
            match strategy.attempt(params).await {
                Ok(Some(text)) => {
                    tracing::info!(
                        strategy = strategy.name(),
                        source = %source,
                        "fallback produced a result"
                    );
                    return Ok(FallbackResult {
                        text,
                        strategy: strategy.name(),
                    });
                }
                Ok(None) => {
                    tracing::debug!(strategy = strategy.name(), "fallback declined");
                }
                Err(err) => {
                    tracing::warn!(strategy = strategy.name(), error = %err, "fallback failed");
                }
            }
        }
        Err(Error::AllFallbacksExhausted {
            attempted: self.strategies.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        name: &'static str,
        order: Arc<Vec<AtomicUsize>>,
        slot: usize,
        counter: Arc<AtomicUsize>,
        result: Option<&'static str>,
    }

    #[async_trait]
    impl FallbackStrategy for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(&self, _params: &GenerationParams) -> Result<Option<String>> {
            let seq = self.counter.fetch_add(1, Ordering::SeqCst);
            self.order[self.slot].store(seq + 1, Ordering::SeqCst);
            Ok(self.result.map(str::to_string))
        }
    }

    fn recorder_chain(results: &[Option<&'static str>]) -> (FallbackChain, Arc<Vec<AtomicUsize>>) {
        let order: Arc<Vec<AtomicUsize>> =
            Arc::new((0..results.len()).map(|_| AtomicUsize::new(0)).collect());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut chain = FallbackChain::new();
        for (slot, result) in results.iter().enumerate() {
            chain.add_fallback(Arc::new(Recorder {
                name: "recorder",
                order: order.clone(),
                slot,
                counter: counter.clone(),
                result: *result,
            }));
        }
        (chain, order)
    }

    #[tokio::test]
    async fn test_strict_registration_order_first_success_wins() {
        let (chain, order) = recorder_chain(&[None, Some("second"), Some("third")]);
        let out = chain
            .execute_with_fallbacks(&GenerationParams::new("p"), &Error::upstream(500, "x"))
            .await
            .unwrap();
        assert_eq!(out.text, "second");
        // first two ran in order, third never ran
        assert_eq!(order[0].load(Ordering::SeqCst), 1);
        assert_eq!(order[1].load(Ordering::SeqCst), 2);
        assert_eq!(order[2].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_declining_exhausts_chain() {
        let (chain, _) = recorder_chain(&[None, None]);
        let err = chain
            .execute_with_fallbacks(&GenerationParams::new("p"), &Error::upstream(500, "x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::AllFallbacksExhausted { attempted: 2 }
        ));
    }

    #[tokio::test]
    async fn test_empty_chain_exhausts_immediately() {
        let chain = FallbackChain::new();
        let err = chain
            .execute_with_fallbacks(&GenerationParams::new("p"), &Error::upstream(500, "x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::AllFallbacksExhausted { attempted: 0 }
        ));
    }
}
