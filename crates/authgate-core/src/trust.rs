//! Device trust assessment
//!
//! Heuristic tamper detection. This is a signal for the host application, not a
//! security boundary: a modified device can hide every artifact checked here.

use crate::capability::CapabilityProbe;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files left behind by common jailbreak tooling
pub const DEFAULT_ARTIFACT_PATHS: &[&str] = &[
    "/Applications/Cydia.app",
    "/Library/MobileSubstrate/MobileSubstrate.dylib",
    "/bin/bash",
    "/usr/sbin/sshd",
    "/etc/apt",
    "/private/var/lib/apt/",
];

/// Location outside the app sandbox used for the write probe
pub const DEFAULT_SANDBOX_PROBE_PATH: &str = "/private/jailbreak_test.txt";

/// Positive tamper finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TamperIndicator {
    /// Known tooling artifact exists
    ArtifactPresent {
        /// Artifact location
        path: PathBuf,
    },
    /// App could write outside its sandbox
    SandboxEscape {
        /// Probe location
        path: PathBuf,
    },
    /// Process is being traced
    DebuggerAttached,
}

impl TamperIndicator {
    /// Short description for logs and the host
    pub fn describe(&self) -> String {
        match self {
            Self::ArtifactPresent { path } => format!("artifact present: {}", path.display()),
            Self::SandboxEscape { path } => format!("sandbox escape: {}", path.display()),
            Self::DebuggerAttached => "debugger attached".to_string(),
        }
    }
}

/// Access to the device for tamper checks
pub trait DeviceProbe: Send + Sync {
    /// Path exists
    fn exists(&self, path: &Path) -> bool;
    /// Attempt a write
    fn try_write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    /// Remove a file written by the probe
    fn remove(&self, path: &Path) -> io::Result<()>;
    /// Process is being traced.
    ///
    /// Hosts that can query the kernel (`P_TRACED` on Apple platforms) answer
    /// this from their own probe implementation.
    fn debugger_attached(&self) -> bool;
}

/// Real filesystem and process probe.
///
/// Debugger detection reads `TracerPid` on Linux and Android. Elsewhere it
/// always reports `false`, an accepted false negative; supply a host
/// [`DeviceProbe`] to cover those targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostDeviceProbe;

impl DeviceProbe for HostDeviceProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn try_write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn debugger_attached(&self) -> bool {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            std::fs::read_to_string("/proc/self/status")
                .ok()
                .and_then(|status| {
                    status
                        .lines()
                        .find_map(|line| line.strip_prefix("TracerPid:"))
                        .map(|pid| pid.trim() != "0")
                })
                .unwrap_or(false)
        }

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            false
        }
    }
}

/// Which checks run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TamperChecks {
    /// Artifact paths to look for
    pub artifact_paths: Vec<PathBuf>,
    /// Sandbox write probe location (`None` disables the probe)
    pub sandbox_probe_path: Option<PathBuf>,
    /// Check for an attached debugger
    pub check_debugger: bool,
    /// Running in a simulator; all checks are skipped
    pub simulator: bool,
}

impl Default for TamperChecks {
    fn default() -> Self {
        Self {
            artifact_paths: DEFAULT_ARTIFACT_PATHS.iter().map(PathBuf::from).collect(),
            sandbox_probe_path: Some(PathBuf::from(DEFAULT_SANDBOX_PROBE_PATH)),
            check_debugger: true,
            simulator: false,
        }
    }
}

/// Accumulated findings for one evaluation.
///
/// `jailbroken` is the OR of every recorded indicator and can only move from
/// `false` to `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TamperFindings {
    indicators: Vec<TamperIndicator>,
    jailbroken: bool,
}

impl TamperFindings {
    /// Record a positive indicator
    pub fn record(&mut self, indicator: TamperIndicator) {
        self.jailbroken = true;
        self.indicators.push(indicator);
    }

    /// Any indicator was positive
    pub fn jailbroken(&self) -> bool {
        self.jailbroken
    }

    /// Positive indicators in check order
    pub fn indicators(&self) -> &[TamperIndicator] {
        &self.indicators
    }

    fn into_indicators(self) -> Vec<TamperIndicator> {
        self.indicators
    }
}

/// Overall trust verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAssessment {
    /// Biometrics enrolled
    pub has_biometric: bool,
    /// Device passcode set
    pub has_passcode: bool,
    /// Any tamper indicator was positive
    pub jailbroken: bool,
    /// `has_biometric && has_passcode && !jailbroken`
    pub trusted: bool,
    /// Positive indicators
    pub indicators: Vec<TamperIndicator>,
}

impl TrustAssessment {
    fn new(has_biometric: bool, has_passcode: bool, findings: TamperFindings) -> Self {
        let jailbroken = findings.jailbroken();
        Self {
            has_biometric,
            has_passcode,
            jailbroken,
            trusted: has_biometric && has_passcode && !jailbroken,
            indicators: findings.into_indicators(),
        }
    }
}

/// Device trust assessor
pub struct DeviceTrustAssessor {
    capability: CapabilityProbe,
    device: Arc<dyn DeviceProbe>,
    checks: TamperChecks,
}

impl DeviceTrustAssessor {
    /// Create assessor
    pub fn new(capability: CapabilityProbe, device: Arc<dyn DeviceProbe>, checks: TamperChecks) -> Self {
        Self {
            capability,
            device,
            checks,
        }
    }

    /// Run every check and combine with the capability probe
    pub fn assess(&self) -> TrustAssessment {
        let capability = self.capability.query();
        let findings = self.scan();

        if findings.jailbroken() {
            tracing::warn!(
                "Device tamper indicators found: {}",
                findings
                    .indicators()
                    .iter()
                    .map(TamperIndicator::describe)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        TrustAssessment::new(capability.enrolled, capability.passcode_set, findings)
    }

    /// Run the tamper checks only
    pub fn scan(&self) -> TamperFindings {
        let mut findings = TamperFindings::default();
        if self.checks.simulator {
            return findings;
        }

        for path in &self.checks.artifact_paths {
            if self.device.exists(path) {
                findings.record(TamperIndicator::ArtifactPresent { path: path.clone() });
            }
        }

        if let Some(path) = &self.checks.sandbox_probe_path {
            // A successful write outside the sandbox is the compromise signal
            if self.device.try_write(path, b"test").is_ok() {
                if let Err(e) = self.device.remove(path) {
                    tracing::debug!("Could not remove sandbox probe {}: {}", path.display(), e);
                }
                findings.record(TamperIndicator::SandboxEscape { path: path.clone() });
            }
        }

        if self.checks.check_debugger && self.device.debugger_attached() {
            findings.record(TamperIndicator::DebuggerAttached);
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::BiometryKind;
    use crate::testing::{FakeChallengeProvider, FakeDeviceProbe};

    fn assessor(
        provider: Arc<FakeChallengeProvider>,
        device: Arc<FakeDeviceProbe>,
        checks: TamperChecks,
    ) -> DeviceTrustAssessor {
        DeviceTrustAssessor::new(CapabilityProbe::new(provider), device, checks)
    }

    #[test]
    fn test_clean_device_is_trusted() {
        let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
        let device = Arc::new(FakeDeviceProbe::new());
        let assessment = assessor(provider, device, TamperChecks::default()).assess();

        assert!(assessment.has_biometric);
        assert!(assessment.has_passcode);
        assert!(!assessment.jailbroken);
        assert!(assessment.trusted);
        assert!(assessment.indicators.is_empty());
    }

    #[test]
    fn test_debugger_reported_by_host_probe() {
        let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
        let device = Arc::new(FakeDeviceProbe::new());
        device.attach_debugger();

        let assessment =
            assessor(provider.clone(), device.clone(), TamperChecks::default()).assess();
        assert!(!assessment.trusted);
        assert_eq!(assessment.indicators, vec![TamperIndicator::DebuggerAttached]);

        let checks = TamperChecks {
            check_debugger: false,
            ..Default::default()
        };
        assert!(assessor(provider, device, checks).assess().trusted);
    }

    #[test]
    fn test_artifact_marks_jailbroken() {
        let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
        let device = Arc::new(FakeDeviceProbe::new());
        device.add_file("/Applications/Cydia.app");

        let assessment = assessor(provider, device, TamperChecks::default()).assess();
        assert!(assessment.jailbroken);
        assert!(!assessment.trusted);
        assert_eq!(
            assessment.indicators,
            vec![TamperIndicator::ArtifactPresent {
                path: PathBuf::from("/Applications/Cydia.app")
            }]
        );
    }

    #[test]
    fn test_successful_sandbox_write_is_positive() {
        let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
        let device = Arc::new(FakeDeviceProbe::new());
        device.allow_write(DEFAULT_SANDBOX_PROBE_PATH);

        let assessment = assessor(provider, device.clone(), TamperChecks::default()).assess();
        assert!(assessment.jailbroken);
        assert_eq!(device.removed(), vec![PathBuf::from(DEFAULT_SANDBOX_PROBE_PATH)]);
    }

    #[test]
    fn test_refused_sandbox_write_is_clean() {
        let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
        let device = Arc::new(FakeDeviceProbe::new());

        let findings = assessor(provider, device.clone(), TamperChecks::default()).scan();
        assert!(!findings.jailbroken());
        assert!(device.removed().is_empty());
    }

    #[test]
    fn test_second_indicator_keeps_verdict() {
        let mut findings = TamperFindings::default();
        assert!(!findings.jailbroken());

        findings.record(TamperIndicator::DebuggerAttached);
        assert!(findings.jailbroken());

        findings.record(TamperIndicator::ArtifactPresent {
            path: PathBuf::from("/etc/apt"),
        });
        assert!(findings.jailbroken());
        assert_eq!(findings.indicators().len(), 2);
    }

    #[test]
    fn test_simulator_skips_checks() {
        let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
        let device = Arc::new(FakeDeviceProbe::new());
        device.add_file("/bin/bash");
        device.attach_debugger();

        let checks = TamperChecks {
            simulator: true,
            ..Default::default()
        };
        let assessment = assessor(provider, device, checks).assess();
        assert!(!assessment.jailbroken);
    }

    #[test]
    fn test_missing_factor_is_untrusted() {
        let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Fingerprint));
        provider.set_passcode(false);
        let device = Arc::new(FakeDeviceProbe::new());

        let assessment = assessor(provider, device, TamperChecks::default()).assess();
        assert!(!assessment.jailbroken);
        assert!(!assessment.has_passcode);
        assert!(!assessment.trusted);
    }
}
