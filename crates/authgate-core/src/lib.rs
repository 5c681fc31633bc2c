//! On-device authentication core for AuthGate
//!
//! Policy-driven biometric authentication, enrollment change detection, device
//! trust heuristics and the foreground/background/locked security state
//! machine. Platform APIs are reached only through injectable providers.
//!
//! ## Components
//!
//! - **Capability probe**: available factors (face, fingerprint, passcode)
//! - **Policy engine**: one challenge at a time, enrollment snapshot captured
//!   with the evaluation
//! - **Enrollment monitor**: byte comparison of enrolled-set fingerprints
//! - **Device trust**: tamper artifacts, sandbox write probe, debugger
//! - **Lifecycle controller**: background timeout, privacy overlay, lock and
//!   unlock, memory-pressure purge

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod capability;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod lifecycle;
pub mod policy;
pub mod privacy_overlay;
pub mod provider;
pub mod secret_cache;
pub mod trust;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use capability::{AuthCapability, BiometryKind, CapabilityProbe};
pub use config::SecurityConfig;
pub use enrollment::{
    has_changed, EnrollmentChange, EnrollmentMonitor, EnrollmentSnapshot, MemorySnapshotStore,
    SnapshotPersistence,
};
pub use error::{Error, Result};
pub use lifecycle::{
    Clock, Delivery, LifecycleEvent, LifecycleState, SecurityEvent, SecurityLifecycleController,
    SystemClock,
};
pub use policy::{
    AuthPolicy, AuthPolicyEngine, AuthResult, ChallengeGate, ChallengePermit,
    DEFAULT_CHALLENGE_TIMEOUT_SECS,
    DEFAULT_FALLBACK_LABEL, MAX_REUSE_WINDOW_SECS,
};
pub use privacy_overlay::{OverlayReason, PrivacyOverlay};
pub use provider::{
    ChallengeFailure, ChallengeProvider, ChallengeRequest, DomainState, Evaluation, ProbeReport,
};
pub use secret_cache::SecretCache;
pub use trust::{
    DeviceProbe, DeviceTrustAssessor, HostDeviceProbe, TamperChecks, TamperFindings,
    TamperIndicator, TrustAssessment,
};
