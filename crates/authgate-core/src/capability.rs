//! Authentication capability probe

use crate::provider::ChallengeProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Biometric sensor type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometryKind {
    /// Face recognition (Face ID)
    Face,
    /// Fingerprint sensor (Touch ID)
    Fingerprint,
    /// Other biometric (iris, optic)
    Other,
    /// No biometric sensor
    None,
}

impl BiometryKind {
    /// Host-facing name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::Fingerprint => "fingerprint",
            Self::Other => "other",
            Self::None => "none",
        }
    }
}

/// Available authentication factors. Produced fresh on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCapability {
    /// Sensor type
    pub kind: BiometryKind,
    /// Biometrics enrolled and usable
    pub enrolled: bool,
    /// Device passcode configured
    pub passcode_set: bool,
    /// Probe failure folded into the result
    pub probe_error: Option<String>,
}

/// Capability probe over the registered provider
#[derive(Clone)]
pub struct CapabilityProbe {
    provider: Arc<dyn ChallengeProvider>,
}

impl CapabilityProbe {
    /// Create probe
    pub fn new(provider: Arc<dyn ChallengeProvider>) -> Self {
        Self { provider }
    }

    /// Query the platform. Never fails and never caches.
    pub fn query(&self) -> AuthCapability {
        match self.provider.probe() {
            Ok(report) => {
                let enrolled = report.biometrics_enrolled && report.biometric_error.is_none();
                AuthCapability {
                    kind: report.biometry,
                    enrolled,
                    passcode_set: report.passcode_set,
                    probe_error: report.biometric_error,
                }
            }
            // Nothing is known about the device; report no factors
            Err(e) => {
                tracing::debug!("Capability probe failed: {}", e);
                AuthCapability {
                    kind: BiometryKind::None,
                    enrolled: false,
                    passcode_set: false,
                    probe_error: Some(e.to_string()),
                }
            }
        }
    }
}
