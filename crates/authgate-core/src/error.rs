//! Error taxonomy for authentication and secure storage
//!
//! Every operation in this workspace returns one of these kinds instead of
//! panicking. The classification helpers tell the host how to react.

use serde::{Deserialize, Serialize};

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// AuthGate errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum Error {
    /// No usable biometric factor is enrolled on this device
    #[error("Authentication capability unavailable")]
    CapabilityUnavailable,

    /// Caller supplied an invalid policy or argument
    #[error("Policy misconfigured: {0}")]
    PolicyMisconfigured(String),

    /// User dismissed the challenge
    #[error("Authentication cancelled by user")]
    UserCancelled,

    /// System dismissed the challenge (app switch, incoming call)
    #[error("Authentication cancelled by system")]
    SystemCancelled,

    /// Too many failed attempts
    #[error("Biometry locked out")]
    LockedOut,

    /// Biometric hardware missing or disabled
    #[error("Biometry unavailable")]
    BiometryUnavailable,

    /// Device has no passcode configured
    #[error("Device passcode not set")]
    PasscodeNotSet,

    /// Platform trust store returned a non-success status
    #[error("Trust store error: status {0}")]
    TrustStoreError(i32),

    /// No item stored under the requested key
    #[error("Not found")]
    NotFound,

    /// Item requires a fresh authentication that could not be presented
    #[error("Authentication required")]
    AuthRequired,

    /// Authentication did not succeed or the item binding is stale
    #[error("Authentication failed")]
    AuthFailed,

    /// Another challenge is already in flight on this engine
    #[error("Authentication already in progress")]
    Busy,

    /// Challenge did not resolve within the policy timeout
    #[error("Authentication timed out")]
    TimedOut,

    /// Persisted state could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Platform reported something we do not model
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Caller may re-prompt without changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::TimedOut)
    }

    /// Never retried automatically.
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, Self::TrustStoreError(_) | Self::CapabilityUnavailable)
    }

    /// Whether this outcome should be surfaced and logged as a fault.
    ///
    /// A user cancelling a prompt is a normal terminal outcome.
    pub fn is_fault(&self) -> bool {
        !matches!(self, Self::UserCancelled)
    }

    /// Stable kind name used across the host boundary
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CapabilityUnavailable => "CapabilityUnavailable",
            Self::PolicyMisconfigured(_) => "PolicyMisconfigured",
            Self::UserCancelled => "UserCancelled",
            Self::SystemCancelled => "SystemCancelled",
            Self::LockedOut => "LockedOut",
            Self::BiometryUnavailable => "BiometryUnavailable",
            Self::PasscodeNotSet => "PasscodeNotSet",
            Self::TrustStoreError(_) => "TrustStoreError",
            Self::NotFound => "NotFound",
            Self::AuthRequired => "AuthRequired",
            Self::AuthFailed => "AuthFailed",
            Self::Busy => "Busy",
            Self::TimedOut => "TimedOut",
            Self::Persistence(_) => "Persistence",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Trust store status code, if this error carries one
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::TrustStoreError(code) => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(Error::Busy.is_retryable());
        assert!(Error::TimedOut.is_retryable());
        assert!(!Error::AuthFailed.is_retryable());

        assert!(Error::TrustStoreError(-25293).is_hard_failure());
        assert!(Error::CapabilityUnavailable.is_hard_failure());
        assert!(!Error::Busy.is_hard_failure());
    }

    #[test]
    fn test_user_cancel_is_not_a_fault() {
        assert!(!Error::UserCancelled.is_fault());
        assert!(Error::SystemCancelled.is_fault());
        assert!(Error::LockedOut.is_fault());
    }

    #[test]
    fn test_kind_and_status() {
        assert_eq!(Error::TrustStoreError(-25300).kind(), "TrustStoreError");
        assert_eq!(Error::TrustStoreError(-25300).status_code(), Some(-25300));
        assert_eq!(Error::NotFound.status_code(), None);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&Error::TrustStoreError(-50)).unwrap();
        assert_eq!(json, r#"{"kind":"TrustStoreError","detail":-50}"#);

        let back: Error = serde_json::from_str(r#"{"kind":"Busy"}"#).unwrap();
        assert_eq!(back, Error::Busy);
    }
}
