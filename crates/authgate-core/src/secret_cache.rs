//! In-memory cache for secrets held outside the secure store.
//!
//! Values are never persisted and are zeroized when removed or purged.

use parking_lot::RwLock;
use std::collections::HashMap;
use zeroize::Zeroizing;

/// Non-essential cached secrets (session tokens, decrypted previews)
#[derive(Default)]
pub struct SecretCache {
    entries: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl SecretCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache a secret, replacing any previous value
    pub fn insert(&self, key: impl Into<String>, value: Vec<u8>) {
        self.entries.write().insert(key.into(), Zeroizing::new(value));
    }

    /// Copy of a cached secret
    pub fn get(&self, key: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.entries
            .read()
            .get(key)
            .map(|value| Zeroizing::new(value.to_vec()))
    }

    /// Drop one secret
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Number of cached secrets
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop everything. Returns how many secrets were purged.
    pub fn purge(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        count
    }
}
