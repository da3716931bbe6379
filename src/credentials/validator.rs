use super::store::CredentialStore;
use crate::transport::HttpTransport;
use crate::{Error, Result};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Expected key prefix for the upstream provider.
const KEY_PREFIX: &str = "AIza";

/// A key that passed the candidate-model walk, bound to the model that
/// accepted it.
#[derive(Debug, Clone)]
pub struct ValidatedCredential {
    pub api_key: String,
    pub model: String,
    pub validated_at: Instant,
}

/// Lazily validates an API key against prioritized candidate models.
///
/// Validation is cached for a validity window rather than run on a timer;
/// the first call after the window expires pays for revalidation.
pub struct CredentialValidator {
    transport: Arc<HttpTransport>,
    store: Arc<dyn CredentialStore>,
    candidate_models: Vec<String>,
    validation_interval: Duration,
    state: Mutex<Option<ValidatedCredential>>,
}

impl CredentialValidator {
    pub fn new(
        transport: Arc<HttpTransport>,
        store: Arc<dyn CredentialStore>,
        candidate_models: Vec<String>,
        validation_interval: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            candidate_models,
            validation_interval,
            state: Mutex::new(None),
        }
    }

    /// Reject malformed keys before spending a network call.
    fn check_format(api_key: &str) -> Result<()> {
        if api_key.trim().is_empty() {
            return Err(Error::validation("API key is empty"));
        }
        if !api_key.starts_with(KEY_PREFIX) {
            return Err(Error::validation(format!(
                "API key does not start with the expected '{KEY_PREFIX}' prefix"
            )));
        }
        Ok(())
    }

    /// Walk the candidate models in priority order.
    ///
    /// 404 means the model identifier is unavailable (rotated or deprecated),
    /// not that the key is bad; 400/401/403 is a hard rejection of the key
    /// and stops the walk.
    pub async fn validate_key(&self, api_key: &str) -> Result<ValidatedCredential> {
        Self::check_format(api_key)?;

        for model in &self.candidate_models {
            let status = self.transport.probe(model, api_key).await?;
            match status {
                s if (200..300).contains(&s) => {
                    let validated = ValidatedCredential {
                        api_key: api_key.to_string(),
                        model: model.clone(),
                        validated_at: Instant::now(),
                    };
                    tracing::info!(model = %model, "credentials validated");
                    *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(validated.clone());
                    return Ok(validated);
                }
                404 => {
                    tracing::debug!(model = %model, "candidate model unavailable; trying next");
                }
                400 | 401 | 403 => {
                    tracing::warn!(model = %model, status, "API key rejected");
                    return Err(Error::validation(format!(
                        "API key rejected by the provider (HTTP {status})"
                    )));
                }
                s => {
                    // 429/5xx: the probe itself hit a transient failure, so
                    // nothing can be concluded about the key.
                    return Err(Error::upstream(s, "credential probe failed transiently"));
                }
            }
        }

        Err(Error::validation(
            "no candidate model accepted the API key",
        ))
    }

    /// Validate whatever key the store currently holds.
    pub async fn validate_credentials(&self) -> Result<ValidatedCredential> {
        let api_key = self
            .store
            .get()
            .ok_or_else(|| Error::configuration("no API key configured"))?;
        self.validate_key(&api_key).await
    }

    /// Return the cached credential while inside the validity window,
    /// revalidating lazily once it has lapsed.
    pub async fn validated_api_key(&self) -> Result<ValidatedCredential> {
        let cached = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(v) = cached {
            if v.validated_at.elapsed() < self.validation_interval {
                return Ok(v);
            }
            tracing::debug!("credential validity window lapsed; revalidating");
        }
        self.validate_credentials().await
    }

    pub fn is_validated(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|v| v.validated_at.elapsed() < self.validation_interval)
            .unwrap_or(false)
    }

    pub fn invalidate(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
