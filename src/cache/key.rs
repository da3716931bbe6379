//! Cache key generation.

use crate::types::GenerationParams;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Stable hash of a normalized request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derives deterministic cache keys from request parameters.
///
/// Free text is case-folded and whitespace-collapsed before hashing, and the
/// fields are canonicalized through a `BTreeMap` so the digest is independent
/// of field order. Identical requests therefore share an entry while any
/// sampling-knob change produces a new one.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn generate(&self, params: &GenerationParams) -> CacheKey {
        let mut parts: BTreeMap<&str, String> = BTreeMap::new();
        parts.insert("prompt", normalize_text(&params.prompt));
        if let Some(t) = params.temperature {
            parts.insert("temperature", format!("{t:.2}"));
        }
        if let Some(m) = params.max_output_tokens {
            parts.insert("max_output_tokens", m.to_string());
        }
        if let Some(p) = params.top_p {
            parts.insert("top_p", format!("{p:.2}"));
        }
        if let Some(k) = params.top_k {
            parts.insert("top_k", k.to_string());
        }
        if let Some(ref salt) = self.salt {
            parts.insert("salt", salt.clone());
        }

        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        CacheKey(hash)
    }
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
