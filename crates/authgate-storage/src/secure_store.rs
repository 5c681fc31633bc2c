//! Key-addressed secure storage
//!
//! Wraps a [`TrustStoreProvider`] with overwrite semantics, the minimum
//! accessibility tier for secrets, and per-key serialization. Operations on
//! distinct keys run concurrently. A read that presents a challenge is bounded
//! by the challenge timeout so a stuck prompt never pins its key.

use crate::keystore::{
    status, AccessControl, AccessibilityTier, ItemAttributes, KeystoreResult, TrustStoreProvider,
};
use authgate_core::{Error, Result, DEFAULT_CHALLENGE_TIMEOUT_SECS};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use zeroize::Zeroizing;

/// Outcome of a write or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOutcome {
    /// Operation succeeded
    pub success: bool,
    /// Trust store status code
    pub status: i32,
}

impl StoreOutcome {
    fn from_result<T>(result: &KeystoreResult<T>) -> Self {
        Self {
            success: result.is_success(),
            status: result.status(),
        }
    }

    fn invalid_parameter() -> Self {
        Self {
            success: false,
            status: status::PARAM,
        }
    }
}

/// Secure item store
pub struct SecureStore {
    provider: Arc<dyn TrustStoreProvider>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    read_timeout: Option<Duration>,
}

impl SecureStore {
    /// Create store over a trust store provider
    pub fn new(provider: Arc<dyn TrustStoreProvider>) -> Self {
        Self {
            provider,
            locks: Mutex::new(HashMap::new()),
            read_timeout: Some(Duration::from_secs(DEFAULT_CHALLENGE_TIMEOUT_SECS)),
        }
    }

    /// Bound reads by `limit` (`None` waits for the trust store indefinitely)
    pub fn with_read_timeout(mut self, limit: Option<Duration>) -> Self {
        self.read_timeout = limit;
        self
    }

    /// Underlying provider
    pub fn provider(&self) -> Arc<dyn TrustStoreProvider> {
        self.provider.clone()
    }

    fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the lock entry once nobody else holds or waits on it
    fn release_key_lock(&self, key: &str, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.locks.lock();
        // One reference in the map, one held here
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(key);
        }
    }

    /// Store `payload` under `key`, replacing any existing item.
    ///
    /// Tiers weaker than unlocked-device-only are raised. A gated item is
    /// bound to the biometric set enrolled at write time.
    pub async fn put(
        &self,
        key: &str,
        payload: &[u8],
        tier: AccessibilityTier,
        biometric_gated: bool,
    ) -> StoreOutcome {
        if key.is_empty() {
            return StoreOutcome::invalid_parameter();
        }

        let lock = self.key_lock(key);
        let outcome = {
            let _guard = lock.lock().await;

            let deleted = self.provider.delete(key).await;
            if !matches!(deleted, KeystoreResult::Success(()) | KeystoreResult::NotFound) {
                tracing::warn!("Failed to remove existing item {}: status {}", key, deleted.status());
                StoreOutcome::from_result(&deleted)
            } else {
                let attributes = ItemAttributes {
                    key: key.to_string(),
                    tier: tier.for_secret(),
                    access_control: biometric_gated.then_some(AccessControl::BiometryCurrentSet),
                };
                let added = self.provider.add(attributes, payload).await;
                if added.is_success() {
                    tracing::debug!("Stored item {} (gated={})", key, biometric_gated);
                } else {
                    tracing::warn!("Failed to store item {}: status {}", key, added.status());
                }
                StoreOutcome::from_result(&added)
            }
        };
        self.release_key_lock(key, lock);
        outcome
    }

    /// Read the payload under `key`.
    ///
    /// A gated item presents a fresh challenge with `reason`; without a reason
    /// it fails with `AuthRequired`. A binding invalidated by an enrollment
    /// change fails with `AuthFailed`, and a challenge outlasting the read
    /// timeout with `TimedOut`.
    pub async fn get(&self, key: &str, reason: Option<&str>) -> Result<Zeroizing<Vec<u8>>> {
        if key.is_empty() {
            return Err(Error::TrustStoreError(status::PARAM));
        }

        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            let read = self.provider.copy_matching(key, reason);
            match self.read_timeout {
                Some(limit) => match tokio::time::timeout(limit, read).await {
                    Ok(found) => found.into_result(),
                    Err(_) => {
                        tracing::info!("Read of {} timed out after {:?}", key, limit);
                        Err(Error::TimedOut)
                    }
                },
                None => read.await.into_result(),
            }
        };
        self.release_key_lock(key, lock);

        match &result {
            Err(Error::UserCancelled) => tracing::debug!("Read of {} cancelled by user", key),
            Err(Error::NotFound) => tracing::debug!("No item under {}", key),
            Err(e) => tracing::warn!("Read of {} failed: {}", key, e),
            Ok(_) => {}
        }
        result
    }

    /// Remove the item under `key`
    pub async fn delete(&self, key: &str) -> StoreOutcome {
        if key.is_empty() {
            return StoreOutcome::invalid_parameter();
        }

        let lock = self.key_lock(key);
        let outcome = {
            let _guard = lock.lock().await;
            StoreOutcome::from_result(&self.provider.delete(key).await)
        };
        self.release_key_lock(key, lock);
        outcome
    }

    /// Whether an item exists under `key`. Never prompts.
    pub async fn contains(&self, key: &str) -> bool {
        !key.is_empty() && self.provider.contains(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software_keystore::SoftwareKeystore;
    use authgate_core::testing::FakeChallengeProvider;
    use authgate_core::BiometryKind;

    fn store() -> (Arc<FakeChallengeProvider>, SecureStore) {
        let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
        let keystore = Arc::new(SoftwareKeystore::new(provider.clone()));
        (provider, SecureStore::new(keystore))
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (_, store) = store();
        let outcome = store
            .put("api_token", b"abc123", AccessibilityTier::default(), false)
            .await;
        assert_eq!(outcome, StoreOutcome { success: true, status: 0 });

        let payload = store.get("api_token", None).await.unwrap();
        assert_eq!(payload.as_slice(), b"abc123");
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_, store) = store();
        store.put("k", b"old", AccessibilityTier::default(), false).await;
        let outcome = store.put("k", b"new", AccessibilityTier::default(), false).await;

        assert!(outcome.success);
        assert_eq!(store.get("k", None).await.unwrap().as_slice(), b"new");
    }

    #[tokio::test]
    async fn test_missing_key() {
        let (_, store) = store();
        assert_eq!(store.get("absent", None).await, Err(Error::NotFound));
        assert_eq!(store.delete("absent").await.status, -25300);
        assert!(!store.contains("absent").await);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let (_, store) = store();
        let outcome = store.put("", b"x", AccessibilityTier::default(), false).await;
        assert_eq!(outcome.status, -50);
        assert_eq!(store.get("", None).await, Err(Error::TrustStoreError(-50)));
    }

    #[tokio::test]
    async fn test_gated_read_without_reason() {
        let (provider, store) = store();
        store.put("seed", b"v", AccessibilityTier::default(), true).await;

        assert_eq!(store.get("seed", None).await, Err(Error::AuthRequired));
        assert_eq!(provider.challenge_count(), 0);
    }

    #[tokio::test]
    async fn test_gated_read_cancelled() {
        let (provider, store) = store();
        store.put("seed", b"v", AccessibilityTier::default(), true).await;
        provider.push_outcome(Err(authgate_core::ChallengeFailure::UserCancelled));

        assert_eq!(store.get("seed", Some("Reveal")).await, Err(Error::UserCancelled));
        assert!(store.contains("seed").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_challenge_times_out_and_frees_key() {
        let (provider, store) = store();
        store.put("seed", b"v", AccessibilityTier::default(), true).await;
        provider.hang_next();

        assert_eq!(store.get("seed", Some("Reveal")).await, Err(Error::TimedOut));

        let put = tokio::time::timeout(
            Duration::from_secs(3600),
            store.put("seed", b"w", AccessibilityTier::default(), true),
        )
        .await;
        assert!(put.unwrap().success);
        assert_eq!(store.get("seed", Some("Reveal")).await.unwrap().as_slice(), b"w");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_follows_configuration() {
        let (provider, store) = store();
        let store = store.with_read_timeout(Some(Duration::from_secs(5)));
        store.put("seed", b"v", AccessibilityTier::default(), true).await;
        provider.hang_next();

        let started = tokio::time::Instant::now();
        assert_eq!(store.get("seed", Some("Reveal")).await, Err(Error::TimedOut));
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_lock_entries_released() {
        let (_, store) = store();
        store.put("a", b"1", AccessibilityTier::default(), false).await;
        store.get("a", None).await.unwrap();
        store.delete("a").await;
        assert!(store.locks.lock().is_empty());
    }
}
