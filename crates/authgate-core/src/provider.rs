//! Platform provider abstraction
//!
//! The host registers one [`ChallengeProvider`] that fronts the platform's
//! biometric sensor and policy evaluator. Everything else in this crate talks to
//! the hardware only through this trait, so tests substitute fakes.

use crate::capability::BiometryKind;
use crate::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque fingerprint of the enrolled biometric set
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainState(Vec<u8>);

impl DomainState {
    /// Wrap raw platform bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Base64 form used across the host boundary
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Parse the base64 host form
    pub fn from_base64(encoded: &str) -> Result<Self> {
        STANDARD
            .decode(encoded)
            .map(Self)
            .map_err(|e| Error::PolicyMisconfigured(format!("invalid domain state: {}", e)))
    }
}

impl fmt::Debug for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainState({} bytes)", self.0.len())
    }
}

/// Raw answer from the platform capability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Sensor type present on the device
    pub biometry: BiometryKind,
    /// Biometric policy can be evaluated (sensor present and enrolled)
    pub biometrics_enrolled: bool,
    /// Device-owner policy can be evaluated (passcode configured)
    pub passcode_set: bool,
    /// Error text from the biometric policy check, if it failed
    pub biometric_error: Option<String>,
}

/// One challenge presented to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRequest {
    /// Localized reason shown in the system prompt
    pub reason: String,
    /// Whether the passcode fallback button is offered
    pub allow_passcode_fallback: bool,
    /// Fallback button title; empty hides the button
    pub fallback_label: String,
    /// Cancel button title; `None` keeps the platform default
    pub cancel_label: Option<String>,
    /// Window in which a prior unlock may be reused without prompting
    pub reuse_window: Duration,
}

impl ChallengeRequest {
    /// Biometric-only request with platform default labels
    pub fn biometric_only(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            allow_passcode_fallback: false,
            fallback_label: String::new(),
            cancel_label: None,
            reuse_window: Duration::ZERO,
        }
    }
}

/// Ways a challenge can end without success
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeFailure {
    /// User tapped cancel
    UserCancelled,
    /// System interrupted the prompt
    SystemCancelled,
    /// Too many failed attempts
    LockedOut,
    /// Sensor missing, disabled, or nothing enrolled
    BiometryUnavailable,
    /// No device passcode
    PasscodeNotSet,
    /// Presented biometric did not match
    AuthenticationFailed,
    /// Anything else the platform reports
    Other(String),
}

impl From<ChallengeFailure> for Error {
    fn from(failure: ChallengeFailure) -> Self {
        match failure {
            ChallengeFailure::UserCancelled => Error::UserCancelled,
            ChallengeFailure::SystemCancelled => Error::SystemCancelled,
            ChallengeFailure::LockedOut => Error::LockedOut,
            ChallengeFailure::BiometryUnavailable => Error::BiometryUnavailable,
            ChallengeFailure::PasscodeNotSet => Error::PasscodeNotSet,
            ChallengeFailure::AuthenticationFailed => Error::AuthFailed,
            ChallengeFailure::Other(message) => Error::Unknown(message),
        }
    }
}

/// Result of a single policy evaluation.
///
/// `domain_state` is read by the provider inside the same evaluation that
/// produced `outcome`, never afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Success or the failure reason
    pub outcome: std::result::Result<(), ChallengeFailure>,
    /// Enrolled-set fingerprint captured with the evaluation
    pub domain_state: Option<DomainState>,
}

impl Evaluation {
    /// Successful evaluation
    pub fn success(domain_state: Option<DomainState>) -> Self {
        Self {
            outcome: Ok(()),
            domain_state,
        }
    }

    /// Failed evaluation
    pub fn failure(failure: ChallengeFailure) -> Self {
        Self {
            outcome: Err(failure),
            domain_state: None,
        }
    }

    /// Whether the user was authenticated
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Capability and challenge provider
///
/// Implementations bridge to the native biometric API (LocalAuthentication,
/// BiometricPrompt). Only one challenge UI can exist at a time on the platform;
/// callers serialize through [`crate::AuthPolicyEngine`].
#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    /// Query sensors, enrollment and passcode. Must not prompt.
    fn probe(&self) -> Result<ProbeReport>;

    /// Current enrolled-set fingerprint, if biometrics are enrolled. Must not prompt.
    fn current_domain_state(&self) -> Option<DomainState>;

    /// Present the challenge and wait for it to resolve
    async fn evaluate(&self, request: ChallengeRequest) -> Evaluation;
}
