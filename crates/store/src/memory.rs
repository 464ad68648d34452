//! In-memory credential store backed by a `BTreeMap` behind a `Mutex`.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use subproxy_types::{Credential, CredentialSet, CredentialStore, ProviderKey, traits::Result};

/// An in-memory [`CredentialStore`] implementation for testing and ephemeral use.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    data: Mutex<CredentialSet>,
}

impl InMemoryCredentialStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `credential` under `key`.
    #[must_use]
    pub fn with(key: ProviderKey, credential: Credential) -> Self {
        let store = Self::new();
        store.data().insert(key, credential);
        store
    }

    fn data(&self) -> MutexGuard<'_, CredentialSet> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, key: &ProviderKey) -> Result<Option<Credential>> {
        Ok(self.data().get(key).cloned())
    }

    async fn set(&self, key: &ProviderKey, credential: &Credential) -> Result<()> {
        self.data().insert(key.clone(), credential.clone());
        Ok(())
    }

    async fn remove(&self, key: &ProviderKey) -> Result<()> {
        self.data().remove(key);
        Ok(())
    }

    async fn get_all(&self) -> Result<CredentialSet> {
        Ok(self.data().clone())
    }
}
