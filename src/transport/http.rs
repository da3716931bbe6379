use crate::types::{GenerationParams, GenerationResponse};
use crate::{Error, Result};
use serde_json::{json, Value};
use std::env;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Default upstream endpoint for the generative-text API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// HTTP transport for the upstream generateContent contract.
///
/// Requests carry an explicit 30s timeout (env-overridable); a timeout is
/// surfaced as [`Error::Timeout`] so the retry and breaker layers account for
/// it like any other failure. Every call races against a cancellation token
/// so that cancelling a streaming session also aborts the in-flight request.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    key_in_query: bool,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, key_in_query: bool) -> Result<Self> {
        // Minimal production-friendly defaults (env-overridable).
        let timeout_secs = env::var("GENAI_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(
                env::var("GENAI_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            key_in_query,
        })
    }

    fn request(&self, model: &str, api_key: &str, body: &Value) -> reqwest::RequestBuilder {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let req = self.client.post(&url).json(body);
        if self.key_in_query {
            req.query(&[("key", api_key)])
        } else {
            req.header("x-goog-api-key", api_key)
        }
    }

    fn compile_body(params: &GenerationParams) -> Value {
        json!({
            "contents": [{ "parts": [{ "text": params.prompt }] }],
            "generationConfig": {
                "temperature": params.temperature.unwrap_or(0.7),
                "maxOutputTokens": params.max_output_tokens.unwrap_or(1024),
                "topP": params.top_p.unwrap_or(0.95),
                "topK": params.top_k.unwrap_or(40),
            },
            "safetySettings": [],
        })
    }

    fn map_send_error(err: reqwest::Error, started: Instant) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        } else {
            Error::Transport(err)
        }
    }

    /// Pull the provider's error message out of an error body, falling back
    /// to the raw body when it is not the documented JSON shape.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    "no response body".to_string()
                } else {
                    trimmed.chars().take(200).collect()
                }
            })
    }

    fn extract_text(body: &Value) -> Result<String> {
        body.pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::upstream(200, "response contained no candidate text"))
    }

    /// Execute one generation call. Single attempt; retry and breaker policy
    /// live in the caller.
    pub async fn generate(
        &self,
        model: &str,
        api_key: &str,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse> {
        let body = Self::compile_body(params);
        let started = Instant::now();

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            resp = self.request(model, api_key, &body).send() => {
                resp.map_err(|e| Self::map_send_error(e, started))?
            }
        };

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(model, status, "upstream call failed");
            return Err(Error::upstream(status, Self::error_message(&text)));
        }

        let json: Value = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            json = resp.json() => json.map_err(|e| Self::map_send_error(e, started))?,
        };
        let text = Self::extract_text(&json)?;
        Ok(GenerationResponse {
            text,
            model: model.to_string(),
            latency: started.elapsed(),
        })
    }

    /// Issue a minimal one-token request and return the HTTP status.
    ///
    /// Used by credential validation (candidate-model walk) and the health
    /// prober; interpretation of the status is the caller's concern.
    pub async fn probe(&self, model: &str, api_key: &str) -> Result<u16> {
        let body = json!({
            "contents": [{ "parts": [{ "text": "ping" }] }],
            "generationConfig": { "maxOutputTokens": 1 },
        });
        let started = Instant::now();
        let resp = self
            .request(model, api_key, &body)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, started))?;
        Ok(resp.status().as_u16())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
