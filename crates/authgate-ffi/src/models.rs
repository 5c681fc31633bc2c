//! FFI data models
//!
//! All types that cross the FFI boundary must be FRB-compatible: plain
//! structs and enums of strings, integers, booleans and byte vectors.
//! Domain state bytes cross as base64.

use authgate_core::{
    AuthCapability, AuthPolicy, AuthResult, Error, LifecycleState, SecurityEvent,
    TrustAssessment,
};
use authgate_storage::StoreOutcome;
use serde::{Deserialize, Serialize};

/// Available authentication factors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityInfo {
    /// "face", "fingerprint", "other" or "none"
    pub kind: String,
    /// Biometrics enrolled and usable
    pub enrolled: bool,
    /// Device passcode configured
    pub passcode_set: bool,
}

impl From<AuthCapability> for CapabilityInfo {
    fn from(capability: AuthCapability) -> Self {
        Self {
            kind: capability.kind.as_str().to_string(),
            enrolled: capability.enrolled,
            passcode_set: capability.passcode_set,
        }
    }
}

/// Authentication policy supplied by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPolicyInput {
    /// Offer the device passcode as fallback
    pub allow_passcode_fallback: bool,
    /// Fallback button title
    pub fallback_label: Option<String>,
    /// Cancel button title
    pub cancel_label: Option<String>,
    /// Reuse window in seconds (max 300)
    pub reuse_window_seconds: u64,
    /// Challenge timeout in seconds
    pub timeout_seconds: Option<u64>,
}

impl From<AuthPolicyInput> for AuthPolicy {
    fn from(input: AuthPolicyInput) -> Self {
        AuthPolicy {
            allow_passcode_fallback: input.allow_passcode_fallback,
            fallback_label: input.fallback_label,
            cancel_label: input.cancel_label,
            reuse_window_secs: input.reuse_window_seconds,
            timeout_secs: input.timeout_seconds,
        }
    }
}

/// Authentication outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// User authenticated
    pub success: bool,
    /// Base64 enrolled-set snapshot captured with the evaluation
    pub domain_state: Option<String>,
    /// Error kind name
    pub error_kind: Option<String>,
    /// Human-readable error
    pub error_message: Option<String>,
}

impl AuthResponse {
    /// Failure without running a challenge
    pub fn from_error(error: Error) -> Self {
        Self {
            success: false,
            domain_state: None,
            error_kind: Some(error.kind().to_string()),
            error_message: Some(error.to_string()),
        }
    }
}

impl From<AuthResult> for AuthResponse {
    fn from(result: AuthResult) -> Self {
        Self {
            success: result.succeeded,
            domain_state: result.domain_state.as_ref().map(|state| state.to_base64()),
            error_kind: result.error.as_ref().map(|e| e.kind().to_string()),
            error_message: result.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Write or delete outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreResponse {
    /// Operation succeeded
    pub success: bool,
    /// Trust store status code (0 on success)
    pub status: i32,
}

impl From<StoreOutcome> for StoreResponse {
    fn from(outcome: StoreOutcome) -> Self {
        Self {
            success: outcome.success,
            status: outcome.status,
        }
    }
}

/// Read outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResponse {
    /// Payload returned
    pub success: bool,
    /// Stored bytes
    pub payload: Option<Vec<u8>>,
    /// Error kind name
    pub error_kind: Option<String>,
    /// Trust store status code when the failure carries one
    pub status: Option<i32>,
}

impl LoadResponse {
    /// Successful read
    pub fn ok(payload: Vec<u8>) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error_kind: None,
            status: None,
        }
    }

    /// Failed read
    pub fn from_error(error: Error) -> Self {
        Self {
            success: false,
            payload: None,
            error_kind: Some(error.kind().to_string()),
            status: error.status_code(),
        }
    }
}

/// Device trust verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTrustInfo {
    /// Biometrics enrolled
    pub has_biometric: bool,
    /// Device passcode set
    pub has_passcode: bool,
    /// Tamper indicators found
    pub jailbroken: bool,
    /// Overall verdict
    pub trusted: bool,
    /// Descriptions of the positive indicators
    pub indicators: Vec<String>,
}

impl From<TrustAssessment> for DeviceTrustInfo {
    fn from(assessment: TrustAssessment) -> Self {
        Self {
            has_biometric: assessment.has_biometric,
            has_passcode: assessment.has_passcode,
            jailbroken: assessment.jailbroken,
            trusted: assessment.trusted,
            indicators: assessment.indicators.iter().map(|i| i.describe()).collect(),
        }
    }
}

/// Security state of the app session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityState {
    /// Visible and unlocked
    Foreground,
    /// In background
    Background,
    /// Waiting for re-authentication
    Locked,
}

impl From<LifecycleState> for SecurityState {
    fn from(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Foreground => Self::Foreground,
            LifecycleState::Background => Self::Background,
            LifecycleState::Locked => Self::Locked,
        }
    }
}

/// Outbound security event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityEventInfo {
    /// Background timeout exceeded; show the lock screen
    ReauthRequired {
        /// Seconds spent in background
        elapsed_seconds: u64,
    },
    /// Enrolled biometric set changed
    EnrollmentChanged {
        /// Base64 last-known snapshot
        previous: String,
        /// Base64 current snapshot
        current: String,
    },
}

impl From<SecurityEvent> for SecurityEventInfo {
    fn from(event: SecurityEvent) -> Self {
        match event {
            SecurityEvent::ReauthRequired { elapsed_secs } => Self::ReauthRequired {
                elapsed_seconds: elapsed_secs,
            },
            SecurityEvent::EnrollmentChanged { previous, current } => Self::EnrollmentChanged {
                previous: previous.state.to_base64(),
                current: current.state.to_base64(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authgate_core::{DomainState, EnrollmentSnapshot};

    #[test]
    fn test_auth_response_encodes_state() {
        let response = AuthResponse::from(AuthResult::success(Some(DomainState::new(vec![
            0xde, 0xad, 0xbe, 0xef,
        ]))));
        assert!(response.success);
        assert_eq!(response.domain_state.as_deref(), Some("3q2+7w=="));
        assert!(response.error_kind.is_none());

        let response = AuthResponse::from(AuthResult::failure(Error::UserCancelled));
        assert_eq!(response.error_kind.as_deref(), Some("UserCancelled"));
    }

    #[test]
    fn test_load_response_status() {
        let response = LoadResponse::from_error(Error::TrustStoreError(-25291));
        assert_eq!(response.error_kind.as_deref(), Some("TrustStoreError"));
        assert_eq!(response.status, Some(-25291));
        assert!(response.payload.is_none());
    }

    #[test]
    fn test_event_conversion() {
        let event = SecurityEventInfo::from(SecurityEvent::EnrollmentChanged {
            previous: EnrollmentSnapshot::new(DomainState::new(b"a".to_vec())),
            current: EnrollmentSnapshot::new(DomainState::new(b"b".to_vec())),
        });
        assert_eq!(
            event,
            SecurityEventInfo::EnrollmentChanged {
                previous: "YQ==".to_string(),
                current: "Yg==".to_string(),
            }
        );
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_string(&SecurityEventInfo::ReauthRequired {
            elapsed_seconds: 400,
        })
        .unwrap();
        assert_eq!(json, r#"{"ReauthRequired":{"elapsed_seconds":400}}"#);

        let state: SecurityState = serde_json::from_str(r#""Locked""#).unwrap();
        assert_eq!(state, SecurityState::Locked);
    }
}
