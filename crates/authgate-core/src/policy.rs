//! Policy-driven authentication
//!
//! [`AuthPolicyEngine`] runs exactly one platform challenge at a time under a
//! caller-supplied [`AuthPolicy`]. The enrolled-set snapshot returned on success
//! comes from the same evaluation as the outcome.

use crate::capability::CapabilityProbe;
use crate::provider::{ChallengeProvider, ChallengeRequest, DomainState};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Longest reuse window the platform accepts
pub const MAX_REUSE_WINDOW_SECS: u64 = 300;

/// Default challenge timeout
pub const DEFAULT_CHALLENGE_TIMEOUT_SECS: u64 = 60;

/// Fallback button title when none is supplied
pub const DEFAULT_FALLBACK_LABEL: &str = "Use Passcode";

/// Authentication policy, supplied per call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthPolicy {
    /// Offer the device passcode as fallback
    pub allow_passcode_fallback: bool,
    /// Fallback button title
    pub fallback_label: Option<String>,
    /// Cancel button title
    pub cancel_label: Option<String>,
    /// Reuse window in seconds; also the background security timeout
    pub reuse_window_secs: u64,
    /// Challenge timeout in seconds (`None` waits for the platform)
    pub timeout_secs: Option<u64>,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            allow_passcode_fallback: true,
            fallback_label: None,
            cancel_label: None,
            reuse_window_secs: MAX_REUSE_WINDOW_SECS,
            timeout_secs: Some(DEFAULT_CHALLENGE_TIMEOUT_SECS),
        }
    }
}

impl AuthPolicy {
    /// Set reuse window
    pub fn with_reuse_window_secs(mut self, secs: u64) -> Self {
        self.reuse_window_secs = secs;
        self
    }

    /// Set challenge timeout
    pub fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Biometric only, no passcode button
    pub fn without_passcode_fallback(mut self) -> Self {
        self.allow_passcode_fallback = false;
        self
    }

    /// Reuse window as a duration
    pub fn reuse_window(&self) -> Duration {
        Duration::from_secs(self.reuse_window_secs)
    }

    /// Challenge timeout as a duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Check the policy is something the platform can honour
    pub fn validate(&self) -> Result<()> {
        if self.reuse_window_secs > MAX_REUSE_WINDOW_SECS {
            return Err(Error::PolicyMisconfigured(format!(
                "reuse window {}s exceeds maximum of {}s",
                self.reuse_window_secs, MAX_REUSE_WINDOW_SECS
            )));
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::PolicyMisconfigured(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.allow_passcode_fallback
            && matches!(self.fallback_label.as_deref(), Some(label) if label.trim().is_empty())
        {
            return Err(Error::PolicyMisconfigured(
                "fallback label must not be empty when passcode fallback is allowed".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the platform request for `reason`
    pub fn challenge_request(&self, reason: &str) -> ChallengeRequest {
        let fallback_label = if self.allow_passcode_fallback {
            self.fallback_label
                .clone()
                .unwrap_or_else(|| DEFAULT_FALLBACK_LABEL.to_string())
        } else {
            String::new()
        };

        ChallengeRequest {
            reason: reason.to_string(),
            allow_passcode_fallback: self.allow_passcode_fallback,
            fallback_label,
            cancel_label: self.cancel_label.clone(),
            reuse_window: self.reuse_window(),
        }
    }
}

/// Outcome of one authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    /// User authenticated
    pub succeeded: bool,
    /// Failure kind when not succeeded
    pub error: Option<Error>,
    /// Enrolled-set snapshot captured with a successful evaluation
    pub domain_state: Option<DomainState>,
}

impl AuthResult {
    /// Successful result
    pub fn success(domain_state: Option<DomainState>) -> Self {
        Self {
            succeeded: true,
            error: None,
            domain_state,
        }
    }

    /// Failed result
    pub fn failure(error: Error) -> Self {
        Self {
            succeeded: false,
            error: Some(error),
            domain_state: None,
        }
    }

    /// Convert into a `Result`
    pub fn into_result(self) -> Result<Option<DomainState>> {
        match self.error {
            None if self.succeeded => Ok(self.domain_state),
            Some(error) => Err(error),
            None => Err(Error::Unknown("authentication did not succeed".to_string())),
        }
    }
}

/// Admits one platform challenge at a time.
///
/// The policy engine owns one; trust stores that prompt on their own share it
/// through [`AuthPolicyEngine::challenge_gate`] so the two never overlap.
#[derive(Debug, Default)]
pub struct ChallengeGate {
    in_flight: AtomicBool,
}

impl ChallengeGate {
    /// Open gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a challenge is currently pending
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claim the gate, or `None` while another challenge is pending
    pub fn try_begin(&self) -> Option<ChallengePermit<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ChallengePermit {
                flag: &self.in_flight,
            })
    }
}

/// Clears the in-flight flag when the challenge ends or the caller gives up
pub struct ChallengePermit<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ChallengePermit<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Authentication policy engine
pub struct AuthPolicyEngine {
    provider: Arc<dyn ChallengeProvider>,
    probe: CapabilityProbe,
    gate: Arc<ChallengeGate>,
}

impl AuthPolicyEngine {
    /// Create engine over a provider
    pub fn new(provider: Arc<dyn ChallengeProvider>) -> Self {
        Self {
            probe: CapabilityProbe::new(provider.clone()),
            provider,
            gate: Arc::new(ChallengeGate::new()),
        }
    }

    /// Underlying provider
    pub fn provider(&self) -> Arc<dyn ChallengeProvider> {
        self.provider.clone()
    }

    /// Capability probe sharing this engine's provider
    pub fn capability_probe(&self) -> &CapabilityProbe {
        &self.probe
    }

    /// Gate guarding this engine's challenges
    pub fn challenge_gate(&self) -> Arc<ChallengeGate> {
        self.gate.clone()
    }

    /// Whether a challenge is currently pending
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Run one challenge.
    ///
    /// Returns `Busy` immediately if another challenge is pending on this
    /// engine, and `CapabilityUnavailable` without prompting when nothing is
    /// enrolled.
    pub async fn authenticate(&self, reason: &str, policy: &AuthPolicy) -> AuthResult {
        let _permit = match self.gate.try_begin() {
            Some(guard) => guard,
            None => {
                tracing::debug!("Authentication rejected: challenge already in flight");
                return AuthResult::failure(Error::Busy);
            }
        };

        if reason.trim().is_empty() {
            return AuthResult::failure(Error::PolicyMisconfigured(
                "reason must not be empty".to_string(),
            ));
        }
        if let Err(e) = policy.validate() {
            tracing::warn!("Rejected authentication policy: {}", e);
            return AuthResult::failure(e);
        }

        let capability = self.probe.query();
        if !capability.enrolled {
            tracing::debug!(
                "Biometrics not enrolled (kind={}), skipping challenge",
                capability.kind.as_str()
            );
            return AuthResult::failure(Error::CapabilityUnavailable);
        }

        let request = policy.challenge_request(reason);
        let evaluation = match policy.timeout() {
            Some(limit) => {
                match tokio::time::timeout(limit, self.provider.evaluate(request)).await {
                    Ok(evaluation) => evaluation,
                    Err(_) => {
                        tracing::info!("Authentication timed out after {:?}", limit);
                        return AuthResult::failure(Error::TimedOut);
                    }
                }
            }
            None => self.provider.evaluate(request).await,
        };

        match evaluation.outcome {
            Ok(()) => {
                tracing::info!("Authentication succeeded");
                AuthResult::success(evaluation.domain_state)
            }
            Err(failure) => {
                let error = Error::from(failure);
                if error.is_fault() {
                    tracing::warn!("Authentication failed: {}", error);
                } else {
                    tracing::debug!("Authentication ended: {}", error);
                }
                AuthResult::failure(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::BiometryKind;
    use crate::provider::ChallengeFailure;
    use crate::testing::FakeChallengeProvider;

    fn engine() -> (Arc<FakeChallengeProvider>, AuthPolicyEngine) {
        let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
        let engine = AuthPolicyEngine::new(provider.clone());
        (provider, engine)
    }

    #[test]
    fn test_policy_validation() {
        assert!(AuthPolicy::default().validate().is_ok());
        assert!(AuthPolicy::default()
            .with_reuse_window_secs(301)
            .validate()
            .is_err());
        assert!(AuthPolicy::default()
            .with_timeout_secs(Some(0))
            .validate()
            .is_err());

        let blank_label = AuthPolicy {
            fallback_label: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            blank_label.validate(),
            Err(Error::PolicyMisconfigured(_))
        ));
        assert!(blank_label.without_passcode_fallback().validate().is_ok());
    }

    #[test]
    fn test_challenge_request_labels() {
        let request = AuthPolicy::default().challenge_request("Unlock");
        assert_eq!(request.fallback_label, DEFAULT_FALLBACK_LABEL);
        assert_eq!(request.reuse_window, Duration::from_secs(300));

        let request = AuthPolicy::default()
            .without_passcode_fallback()
            .challenge_request("Unlock");
        assert!(request.fallback_label.is_empty());
        assert!(!request.allow_passcode_fallback);
    }

    #[tokio::test]
    async fn test_success_carries_snapshot() {
        let (provider, engine) = engine();
        let result = engine.authenticate("Sign in", &AuthPolicy::default()).await;

        assert!(result.succeeded);
        assert_eq!(result.domain_state, provider.current_domain_state());
        assert_eq!(provider.last_request().unwrap().reason, "Sign in");
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn test_not_enrolled_skips_challenge() {
        let (provider, engine) = engine();
        provider.set_enrolled(false);

        let result = engine.authenticate("Sign in", &AuthPolicy::default()).await;
        assert_eq!(result.error, Some(Error::CapabilityUnavailable));
        assert_eq!(provider.challenge_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_reason_rejected() {
        let (provider, engine) = engine();
        let result = engine.authenticate("   ", &AuthPolicy::default()).await;
        assert!(matches!(result.error, Some(Error::PolicyMisconfigured(_))));
        assert_eq!(provider.challenge_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_mapped() {
        let (provider, engine) = engine();
        provider.push_outcome(Err(ChallengeFailure::UserCancelled));
        provider.push_outcome(Err(ChallengeFailure::LockedOut));

        let policy = AuthPolicy::default();
        let first = engine.authenticate("Sign in", &policy).await;
        assert_eq!(first.error, Some(Error::UserCancelled));
        assert!(first.domain_state.is_none());

        let second = engine.authenticate("Sign in", &policy).await;
        assert_eq!(second.error, Some(Error::LockedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_result() {
        let (provider, engine) = engine();
        provider.hang_next();

        let policy = AuthPolicy::default().with_timeout_secs(Some(5));
        let result = engine.authenticate("Sign in", &policy).await;
        assert_eq!(result.error, Some(Error::TimedOut));
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn test_shared_gate_rejects_engine() {
        let (provider, engine) = engine();
        let gate = engine.challenge_gate();

        let permit = gate.try_begin().unwrap();
        assert!(engine.is_busy());
        assert!(gate.try_begin().is_none());

        let result = engine.authenticate("Sign in", &AuthPolicy::default()).await;
        assert_eq!(result.error, Some(Error::Busy));
        assert_eq!(provider.challenge_count(), 0);

        drop(permit);
        assert!(engine.authenticate("Sign in", &AuthPolicy::default()).await.succeeded);
    }

    #[tokio::test]
    async fn test_into_result() {
        let ok = AuthResult::success(None).into_result();
        assert_eq!(ok, Ok(None));
        let err = AuthResult::failure(Error::Busy).into_result();
        assert_eq!(err, Err(Error::Busy));
    }
}
