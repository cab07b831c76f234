use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

/// Current bearer token: persisted, settable, observable.
///
/// Changes fan out over a watch channel so surfaces gated on authentication
/// can react. [`TokenStore::refresh_from_storage`] is the hook for external
/// storage-change notifications (another tab or process updated the backend).
pub struct TokenStore {
    service_name: String,
    account: String,
    backend: TokenBackend,
    tx: Arc<watch::Sender<Option<SecretString>>>,
}

impl Clone for TokenStore {
    fn clone(&self) -> Self {
        Self {
            service_name: self.service_name.clone(),
            account: self.account.clone(),
            backend: self.backend.clone(),
            tx: Arc::clone(&self.tx),
        }
    }
}

#[derive(Clone)]
enum TokenBackend {
    Keyring,
    Memory(Arc<Mutex<HashMap<String, String>>>),
}

impl TokenStore {
    pub fn new(service_name: impl Into<String>, account: impl Into<String>) -> AppResult<Self> {
        Self::with_backend(service_name.into(), account.into(), TokenBackend::Keyring)
    }

    /// Volatile backend for tests and headless tooling.
    pub fn in_memory() -> Self {
        Self::with_backend(
            "in-memory".to_string(),
            "access-token".to_string(),
            TokenBackend::Memory(Arc::new(Mutex::new(HashMap::new()))),
        )
        .expect("in-memory backend cannot fail to read")
    }

    fn with_backend(service_name: String, account: String, backend: TokenBackend) -> AppResult<Self> {
        let store = Self {
            service_name,
            account,
            backend,
            tx: Arc::new(watch::channel(None).0),
        };
        let seeded = store.read_backend()?;
        if seeded.is_some() {
            debug!(
                target: "token_store",
                service = %store.service_name,
                "restored persisted bearer token"
            );
        }
        store.tx.send_replace(seeded);
        Ok(store)
    }

    /// A second store over the same backend with its own subscribers; models
    /// another tab observing the same persisted token.
    pub fn sibling(&self) -> AppResult<Self> {
        Self::with_backend(
            self.service_name.clone(),
            self.account.clone(),
            self.backend.clone(),
        )
    }

    pub fn current(&self) -> Option<SecretString> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SecretString>> {
        self.tx.subscribe()
    }

    pub fn set(&self, token: SecretString) -> AppResult<()> {
        self.write_backend(Some(token.expose_secret()))?;
        self.tx.send_replace(Some(token));
        info!(target: "token_store", service = %self.service_name, "bearer token updated");
        Ok(())
    }

    pub fn clear(&self) -> AppResult<()> {
        self.write_backend(None)?;
        self.tx.send_replace(None);
        info!(target: "token_store", service = %self.service_name, "bearer token cleared");
        Ok(())
    }

    /// Re-reads the backend and notifies subscribers when the value changed
    /// underneath us.
    pub fn refresh_from_storage(&self) -> AppResult<()> {
        let stored = self.read_backend()?;
        self.tx.send_if_modified(|current| {
            let unchanged = match (current.as_ref(), stored.as_ref()) {
                (None, None) => true,
                (Some(a), Some(b)) => a.expose_secret() == b.expose_secret(),
                _ => false,
            };
            if unchanged {
                false
            } else {
                *current = stored.clone();
                true
            }
        });
        Ok(())
    }

    fn read_backend(&self) -> AppResult<Option<SecretString>> {
        match &self.backend {
            TokenBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, &self.account)?;
                match entry.get_password() {
                    Ok(value) => Ok(Some(SecretString::from(value))),
                    Err(keyring::Error::NoEntry) => Ok(None),
                    Err(err) => Err(AppError::from(err)),
                }
            }
            TokenBackend::Memory(store) => Ok(store
                .lock()
                .get(&self.account)
                .cloned()
                .map(SecretString::from)),
        }
    }

    fn write_backend(&self, value: Option<&str>) -> AppResult<()> {
        match &self.backend {
            TokenBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, &self.account)?;
                match value {
                    Some(token) => entry.set_password(token)?,
                    None => match entry.delete_password() {
                        Ok(()) | Err(keyring::Error::NoEntry) => {}
                        Err(err) => return Err(AppError::from(err)),
                    },
                }
                Ok(())
            }
            TokenBackend::Memory(store) => {
                let mut guard = store.lock();
                match value {
                    Some(token) => {
                        guard.insert(self.account.clone(), token.to_string());
                    }
                    None => {
                        guard.remove(&self.account);
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear_round_trip() {
        let store = TokenStore::in_memory();
        assert!(store.current().is_none());

        store.set(SecretString::from("jwt-token".to_string())).unwrap();
        assert_eq!(store.current().unwrap().expose_secret(), "jwt-token");

        store.clear().unwrap();
        assert!(store.current().is_none());
    }

    #[test]
    fn subscribers_observe_changes() {
        let store = TokenStore::in_memory();
        let mut rx = store.subscribe();

        store.set(SecretString::from("fresh".to_string())).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().as_ref().unwrap().expose_secret(),
            "fresh"
        );

        store.clear().unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
    }

    #[test]
    fn sibling_sees_persisted_value_after_refresh() {
        let first = TokenStore::in_memory();
        let second = first.sibling().unwrap();
        assert!(second.current().is_none());

        first.set(SecretString::from("shared".to_string())).unwrap();

        // The other tab only learns about it from the storage notification.
        assert!(second.current().is_none());
        second.refresh_from_storage().unwrap();
        assert_eq!(second.current().unwrap().expose_secret(), "shared");
    }

    #[test]
    fn refresh_without_change_does_not_notify() {
        let store = TokenStore::in_memory();
        store.set(SecretString::from("stable".to_string())).unwrap();
        let mut rx = store.subscribe();
        let _ = rx.borrow_and_update();

        store.refresh_from_storage().unwrap();
        assert!(!rx.has_changed().unwrap());
    }
}
