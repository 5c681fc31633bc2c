//! Software trust store
//!
//! Stands in for the hardware keystore on targets without native integration
//! and in tests. Items live in memory, encrypted under per-item keys derived
//! from a device master key.
//!
//! Biometric gating is enforced by the key derivation: a gated item's key also
//! covers the enrolled-set fingerprint captured when it was written. A read
//! runs a fresh challenge and derives the key from the fingerprint returned by
//! that same evaluation, so after an enrollment change decryption fails and
//! the item reads as `AuthFailed`.
//!
//! Read challenges pass through a [`ChallengeGate`]. Share the policy engine's
//! gate with [`SoftwareKeystore::with_challenge_gate`] so a gated read never
//! overlaps an authentication prompt.

use crate::keystore::{
    AccessControl, AccessibilityTier, ItemAttributes, KeystoreCapabilities, KeystoreResult,
    Platform, TrustStoreProvider,
};
use crate::security::{generate_salt, EncryptionAlgorithm, MasterKey};
use async_trait::async_trait;
use authgate_core::{ChallengeFailure, ChallengeGate, ChallengeProvider, ChallengeRequest};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use zeroize::Zeroizing;

struct StoredItem {
    tier: AccessibilityTier,
    access_control: Option<AccessControl>,
    salt: [u8; 32],
    ciphertext: Vec<u8>,
}

/// In-memory keystore with enrollment-bound item keys
pub struct SoftwareKeystore {
    master: MasterKey,
    provider: Arc<dyn ChallengeProvider>,
    gate: Arc<ChallengeGate>,
    items: RwLock<HashMap<String, StoredItem>>,
    device_locked: AtomicBool,
}

impl SoftwareKeystore {
    /// Keystore with a fresh random device key
    pub fn new(provider: Arc<dyn ChallengeProvider>) -> Self {
        Self::with_master_key(
            provider,
            MasterKey::generate(EncryptionAlgorithm::ChaCha20Poly1305),
        )
    }

    /// Keystore with an existing device key
    pub fn with_master_key(provider: Arc<dyn ChallengeProvider>, master: MasterKey) -> Self {
        Self {
            master,
            provider,
            gate: Arc::new(ChallengeGate::new()),
            items: RwLock::new(HashMap::new()),
            device_locked: AtomicBool::new(false),
        }
    }

    /// Present read challenges through `gate`
    pub fn with_challenge_gate(mut self, gate: Arc<ChallengeGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Simulate the device screen lock
    pub fn set_device_locked(&self, locked: bool) {
        self.device_locked.store(locked, Ordering::SeqCst);
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Keystore holds nothing
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn passcode_set(&self) -> bool {
        self.provider
            .probe()
            .map(|report| report.passcode_set)
            .unwrap_or(false)
    }

    fn open_item(
        &self,
        key: &str,
        binding: Option<&[u8]>,
    ) -> KeystoreResult<Zeroizing<Vec<u8>>> {
        let items = self.items.read();
        let item = match items.get(key) {
            Some(item) => item,
            None => return KeystoreResult::NotFound,
        };

        let item_key = self.master.derive_item_key(&item.salt, binding);
        match item_key.decrypt(&item.ciphertext) {
            Ok(payload) => KeystoreResult::Success(payload),
            Err(e) => {
                tracing::warn!("Item {} failed to open: {}", key, e);
                KeystoreResult::AuthFailed
            }
        }
    }
}

#[async_trait]
impl TrustStoreProvider for SoftwareKeystore {
    fn capabilities(&self) -> KeystoreCapabilities {
        KeystoreCapabilities {
            has_secure_hardware: false,
            supports_biometric_binding: true,
            platform: Platform::current(),
        }
    }

    async fn add(&self, attributes: ItemAttributes, payload: &[u8]) -> KeystoreResult<()> {
        if attributes.tier == AccessibilityTier::WhenPasscodeSetThisDeviceOnly
            && !self.passcode_set()
        {
            return KeystoreResult::NotAvailable;
        }

        let binding = match attributes.access_control {
            Some(AccessControl::BiometryCurrentSet) => {
                match self.provider.current_domain_state() {
                    Some(state) => Some(state),
                    None => return KeystoreResult::NotAvailable,
                }
            }
            None => None,
        };

        let salt = generate_salt();
        let item_key = self
            .master
            .derive_item_key(&salt, binding.as_ref().map(|state| state.as_bytes()));
        let ciphertext = match item_key.encrypt(payload) {
            Ok(ciphertext) => ciphertext,
            Err(e) => {
                tracing::warn!("Failed to encrypt item {}: {}", attributes.key, e);
                return KeystoreResult::Status(crate::keystore::status::PARAM);
            }
        };

        let mut items = self.items.write();
        if items.contains_key(&attributes.key) {
            return KeystoreResult::DuplicateItem;
        }
        items.insert(
            attributes.key,
            StoredItem {
                tier: attributes.tier,
                access_control: attributes.access_control,
                salt,
                ciphertext,
            },
        );
        KeystoreResult::Success(())
    }

    async fn copy_matching(
        &self,
        key: &str,
        prompt: Option<&str>,
    ) -> KeystoreResult<Zeroizing<Vec<u8>>> {
        let (tier, access_control) = match self.items.read().get(key) {
            Some(item) => (item.tier, item.access_control),
            None => return KeystoreResult::NotFound,
        };

        if tier.requires_unlocked_device() && self.device_locked.load(Ordering::SeqCst) {
            return KeystoreResult::InteractionNotAllowed;
        }

        match access_control {
            None => self.open_item(key, None),
            Some(AccessControl::BiometryCurrentSet) => {
                let reason = match prompt {
                    Some(reason) if !reason.trim().is_empty() => reason,
                    _ => return KeystoreResult::InteractionNotAllowed,
                };
                let _permit = match self.gate.try_begin() {
                    Some(permit) => permit,
                    None => {
                        tracing::debug!("Read of {} rejected: challenge already in flight", key);
                        return KeystoreResult::Busy;
                    }
                };

                let evaluation = self
                    .provider
                    .evaluate(ChallengeRequest::biometric_only(reason))
                    .await;
                match evaluation.outcome {
                    Ok(()) => match evaluation.domain_state {
                        Some(state) => self.open_item(key, Some(state.as_bytes())),
                        None => KeystoreResult::AuthFailed,
                    },
                    Err(ChallengeFailure::UserCancelled) => KeystoreResult::Cancelled,
                    Err(ChallengeFailure::SystemCancelled) => KeystoreResult::InteractionNotAllowed,
                    Err(ChallengeFailure::LockedOut) => KeystoreResult::LockedOut,
                    Err(ChallengeFailure::BiometryUnavailable) => KeystoreResult::NotAvailable,
                    Err(ChallengeFailure::PasscodeNotSet) => KeystoreResult::NotAvailable,
                    Err(ChallengeFailure::AuthenticationFailed) => KeystoreResult::AuthFailed,
                    Err(ChallengeFailure::Other(message)) => {
                        tracing::warn!("Challenge for item {} failed: {}", key, message);
                        KeystoreResult::AuthFailed
                    }
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> KeystoreResult<()> {
        match self.items.write().remove(key) {
            Some(_) => KeystoreResult::Success(()),
            None => KeystoreResult::NotFound,
        }
    }

    async fn contains(&self, key: &str) -> bool {
        self.items.read().contains_key(key)
    }
}
