//! 凭证模块:API 密钥存储与按候选模型的惰性校验。
//!
//! # Credentials Module
//!
//! Durable credential storage and lazy validation against prioritized
//! candidate models.
//!
//! Upstream model identifiers rotate and deprecate independently of whether
//! an API key is valid, so validation probes real model endpoints instead of
//! trusting a single hardcoded identifier: a 404 means "try the next
//! candidate", not "bad key".
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CredentialStore`] | Pluggable get/set/remove key storage |
//! | [`MemoryCredentialStore`] | In-process store for tests and defaults |
//! | [`KeyringCredentialStore`] | OS keychain-backed store |
//! | [`EnvCredentialStore`] | Read-only environment-variable store |
//! | [`CredentialValidator`] | Candidate-model probing with a validity window |

mod store;
mod validator;

pub use store::{CredentialStore, EnvCredentialStore, KeyringCredentialStore, MemoryCredentialStore};
pub use validator::{CredentialValidator, ValidatedCredential};
