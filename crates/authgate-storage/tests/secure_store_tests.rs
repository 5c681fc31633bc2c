//! Secure storage tests
//!
//! Tests cover:
//! - Round trip and overwrite through the software keystore
//! - Fail-closed biometric binding after an enrollment change
//! - Per-key serialization and cross-key concurrency
//! - Enrollment baseline persisted in the state database

use authgate_core::testing::FakeChallengeProvider;
use authgate_core::{
    AuthPolicy, AuthPolicyEngine, BiometryKind, Error, SecurityEvent, SecurityLifecycleController,
};
use authgate_storage::{
    AccessibilityTier, SecureStore, SoftwareKeystore, StateDatabase, StoreOutcome,
};
use std::sync::Arc;
use tempfile::TempDir;

fn store() -> (Arc<FakeChallengeProvider>, Arc<SecureStore>) {
    let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
    let keystore = Arc::new(SoftwareKeystore::new(provider.clone()));
    (provider, Arc::new(SecureStore::new(keystore)))
}

// =============================================================================
// Round Trip
// =============================================================================

#[tokio::test]
async fn test_ungated_round_trip() {
    let (provider, store) = store();

    let outcome = store
        .put("session", b"abc123", AccessibilityTier::WhenUnlockedThisDeviceOnly, false)
        .await;
    assert_eq!(outcome, StoreOutcome { success: true, status: 0 });

    let payload = store.get("session", None).await.unwrap();
    assert_eq!(payload.as_slice(), b"abc123");
    assert_eq!(provider.challenge_count(), 0);
}

#[tokio::test]
async fn test_weak_tier_still_stores() {
    let (_, store) = store();
    let outcome = store
        .put("session", b"v", AccessibilityTier::AfterFirstUnlockThisDeviceOnly, false)
        .await;
    assert!(outcome.success);
    assert!(store.contains("session").await);
}

#[tokio::test]
async fn test_delete_then_get() {
    let (_, store) = store();
    store.put("k", b"v", AccessibilityTier::default(), false).await;

    assert!(store.delete("k").await.success);
    assert_eq!(store.get("k", None).await, Err(Error::NotFound));
}

// =============================================================================
// Biometric Binding
// =============================================================================

#[tokio::test]
async fn test_gated_read_prompts_with_reason() {
    let (provider, store) = store();
    store.put("seed", b"v", AccessibilityTier::default(), true).await;

    let payload = store.get("seed", Some("Show recovery phrase")).await.unwrap();
    assert_eq!(payload.as_slice(), b"v");
    assert_eq!(provider.challenge_count(), 1);
    assert_eq!(provider.last_request().unwrap().reason, "Show recovery phrase");
}

#[tokio::test]
async fn test_enrollment_change_never_returns_payload() {
    let (provider, store) = store();
    store.put("seed", b"v", AccessibilityTier::default(), true).await;

    provider.enroll_new_biometric();

    let result = store.get("seed", Some("Show recovery phrase")).await;
    assert!(matches!(
        result,
        Err(Error::AuthFailed) | Err(Error::TrustStoreError(_))
    ));

    // Rewriting under the new set restores access
    store.put("seed", b"v2", AccessibilityTier::default(), true).await;
    let payload = store.get("seed", Some("Show recovery phrase")).await.unwrap();
    assert_eq!(payload.as_slice(), b"v2");
}

#[tokio::test]
async fn test_locked_out_passes_through() {
    let (provider, store) = store();
    store.put("seed", b"v", AccessibilityTier::default(), true).await;
    provider.push_outcome(Err(authgate_core::ChallengeFailure::LockedOut));

    assert_eq!(store.get("seed", Some("Reveal")).await, Err(Error::LockedOut));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_same_key_reads_are_serialized() {
    let (provider, store) = store();
    store.put("seed", b"v", AccessibilityTier::default(), true).await;
    let release = provider.pause_next();

    let first = {
        let store = store.clone();
        tokio::spawn(async move { store.get("seed", Some("First")).await })
    };
    while provider.challenge_count() == 0 {
        tokio::task::yield_now().await;
    }

    let second = {
        let store = store.clone();
        tokio::spawn(async move { store.get("seed", Some("Second")).await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    // Second read is queued behind the key lock, not at the prompt
    assert_eq!(provider.challenge_count(), 1);

    release.notify_one();
    assert_eq!(first.await.unwrap().unwrap().as_slice(), b"v");
    assert_eq!(second.await.unwrap().unwrap().as_slice(), b"v");
    assert_eq!(provider.challenge_count(), 2);
}

#[tokio::test]
async fn test_distinct_keys_do_not_block() {
    let (provider, store) = store();
    store.put("seed", b"gated", AccessibilityTier::default(), true).await;
    store.put("token", b"plain", AccessibilityTier::default(), false).await;
    let release = provider.pause_next();

    let gated = {
        let store = store.clone();
        tokio::spawn(async move { store.get("seed", Some("Reveal")).await })
    };
    while provider.challenge_count() == 0 {
        tokio::task::yield_now().await;
    }

    // Pending prompt on one key does not hold up another
    assert_eq!(store.get("token", None).await.unwrap().as_slice(), b"plain");

    release.notify_one();
    assert_eq!(gated.await.unwrap().unwrap().as_slice(), b"gated");
}

// =============================================================================
// Persisted Enrollment Baseline
// =============================================================================

#[tokio::test]
async fn test_enrollment_change_detected_across_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("security_state.db");
    let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));

    {
        let db = Arc::new(StateDatabase::open(&path).unwrap());
        let controller = SecurityLifecycleController::new(
            Arc::new(AuthPolicyEngine::new(provider.clone())),
            db,
            AuthPolicy::default(),
        );
        assert!(controller.unlock("Sign in").await.succeeded);
    }

    provider.enroll_new_biometric();

    let db = Arc::new(StateDatabase::open(&path).unwrap());
    let controller = SecurityLifecycleController::new(
        Arc::new(AuthPolicyEngine::new(provider.clone())),
        db.clone(),
        AuthPolicy::default(),
    );
    let mut events = controller.subscribe();
    controller.on_foreground(1);

    assert!(matches!(
        events.try_recv().unwrap(),
        SecurityEvent::EnrollmentChanged { .. }
    ));
    let stored = db.load_enrollment_snapshot().unwrap().unwrap();
    assert_eq!(Some(stored.state), authgate_core::ChallengeProvider::current_domain_state(&*provider));
}
