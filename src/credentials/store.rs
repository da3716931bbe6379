use crate::{Error, Result};
use std::sync::{PoisonError, RwLock};

/// Durable storage for the upstream API key.
///
/// The pipeline never assumes where the key lives; injecting a store keeps
/// the service testable and portable across deployment targets.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<String>;

    fn set(&self, api_key: &str) -> Result<()>;

    fn remove(&self) -> Result<()>;
}

/// In-process store. Default for tests and short-lived tools.
#[derive(Default)]
pub struct MemoryCredentialStore {
    key: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            key: RwLock::new(Some(api_key.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<String> {
        self.key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, api_key: &str) -> Result<()> {
        *self.key.write().unwrap_or_else(PoisonError::into_inner) = Some(api_key.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.key.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// OS keychain-backed store.
pub struct KeyringCredentialStore {
    entry: keyring::Entry,
}

impl KeyringCredentialStore {
    pub fn new(service: &str, user: &str) -> Result<Self> {
        let entry = keyring::Entry::new(service, user)
            .map_err(|e| Error::configuration(format!("keyring unavailable: {e}")))?;
        Ok(Self { entry })
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self) -> Option<String> {
        self.entry.get_password().ok()
    }

    fn set(&self, api_key: &str) -> Result<()> {
        self.entry
            .set_password(api_key)
            .map_err(|e| Error::configuration(format!("keyring write failed: {e}")))
    }

    fn remove(&self) -> Result<()> {
        match self.entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::configuration(format!("keyring delete failed: {e}"))),
        }
    }
}

/// Environment-variable store. Read-only: `set`/`remove` fail so callers
/// cannot silently believe they persisted anything.
pub struct EnvCredentialStore {
    var: String,
}

impl EnvCredentialStore {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialStore for EnvCredentialStore {
    fn get(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|v| !v.is_empty())
    }

    fn set(&self, _api_key: &str) -> Result<()> {
        Err(Error::configuration(format!(
            "credential store backed by ${} is read-only",
            self.var
        )))
    }

    fn remove(&self) -> Result<()> {
        Err(Error::configuration(format!(
            "credential store backed by ${} is read-only",
            self.var
        )))
    }
}
