//! Secure storage for AuthGate
//!
//! Trust store abstraction, software keystore, encrypted item storage and the
//! SQLite state database.
//!
//! ## Security Features
//!
//! - **Item Encryption**: AES-256-GCM or ChaCha20-Poly1305 with a versioned header
//! - **Biometric Binding**: gated item keys cover the enrolled-set fingerprint,
//!   so an enrollment change makes the item unreadable
//! - **Accessibility Tiers**: secrets are never weaker than unlocked-device-only
//! - **Per-key Serialization**: same-key operations never interleave

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod database;
pub mod error;
pub mod keystore;
pub mod migrations;
pub mod secure_store;
pub mod security;
pub mod software_keystore;

pub use database::StateDatabase;
pub use error::{Error, Result};
pub use keystore::{
    AccessControl, AccessibilityTier, ItemAttributes, KeystoreCapabilities, KeystoreResult,
    Platform, TrustStoreProvider,
};
pub use secure_store::{SecureStore, StoreOutcome};
pub use security::{generate_salt, EncryptionAlgorithm, MasterKey};
pub use software_keystore::SoftwareKeystore;
