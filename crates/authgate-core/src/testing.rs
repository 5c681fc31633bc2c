//! Fake providers for tests
//!
//! Enabled for this crate's own tests and, through the `test-helpers` feature,
//! for dependent crates.

#![allow(missing_docs)]

use crate::capability::BiometryKind;
use crate::lifecycle::Clock;
use crate::provider::{
    ChallengeFailure, ChallengeProvider, ChallengeRequest, DomainState, Evaluation, ProbeReport,
};
use crate::trust::DeviceProbe;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

enum Scripted {
    Succeed,
    Fail(ChallengeFailure),
    WaitFor(Arc<Notify>),
    Hang,
}

struct FakeState {
    biometry: BiometryKind,
    enrolled: bool,
    passcode_set: bool,
    biometric_error: Option<String>,
    probe_failure: Option<String>,
    enrollment_generation: u32,
    script: VecDeque<Scripted>,
    last_request: Option<ChallengeRequest>,
}

/// Scriptable stand-in for the platform biometric API
pub struct FakeChallengeProvider {
    state: Mutex<FakeState>,
    challenges: AtomicUsize,
}

impl FakeChallengeProvider {
    /// Enrolled device with a passcode; every challenge succeeds by default
    pub fn new(biometry: BiometryKind) -> Self {
        Self {
            state: Mutex::new(FakeState {
                biometry,
                enrolled: biometry != BiometryKind::None,
                passcode_set: true,
                biometric_error: None,
                probe_failure: None,
                enrollment_generation: 1,
                script: VecDeque::new(),
                last_request: None,
            }),
            challenges: AtomicUsize::new(0),
        }
    }

    pub fn set_enrolled(&self, enrolled: bool) {
        self.state.lock().enrolled = enrolled;
    }

    pub fn set_passcode(&self, passcode_set: bool) {
        self.state.lock().passcode_set = passcode_set;
    }

    pub fn set_biometric_error(&self, error: Option<String>) {
        self.state.lock().biometric_error = error;
    }

    pub fn fail_probe(&self, message: &str) {
        self.state.lock().probe_failure = Some(message.to_string());
    }

    /// Simulate the user adding or removing a finger/face
    pub fn enroll_new_biometric(&self) {
        let mut state = self.state.lock();
        state.enrolled = true;
        state.enrollment_generation += 1;
    }

    pub fn push_outcome(&self, outcome: std::result::Result<(), ChallengeFailure>) {
        let step = match outcome {
            Ok(()) => Scripted::Succeed,
            Err(failure) => Scripted::Fail(failure),
        };
        self.state.lock().script.push_back(step);
    }

    /// Next challenge blocks until the returned handle is notified, then succeeds
    pub fn pause_next(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.state
            .lock()
            .script
            .push_back(Scripted::WaitFor(notify.clone()));
        notify
    }

    /// Next challenge never resolves
    pub fn hang_next(&self) {
        self.state.lock().script.push_back(Scripted::Hang);
    }

    /// Number of challenges presented so far
    pub fn challenge_count(&self) -> usize {
        self.challenges.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChallengeRequest> {
        self.state.lock().last_request.clone()
    }

    fn state_for(generation: u32) -> DomainState {
        DomainState::new(format!("enrolled-set-{}", generation).into_bytes())
    }

    fn finish_success(&self) -> Evaluation {
        let state = self.state.lock();
        if !state.enrolled {
            return Evaluation::failure(ChallengeFailure::BiometryUnavailable);
        }
        Evaluation::success(Some(Self::state_for(state.enrollment_generation)))
    }
}

#[async_trait]
impl ChallengeProvider for FakeChallengeProvider {
    fn probe(&self) -> Result<ProbeReport> {
        let state = self.state.lock();
        if let Some(message) = &state.probe_failure {
            return Err(Error::Unknown(message.clone()));
        }
        Ok(ProbeReport {
            biometry: state.biometry,
            biometrics_enrolled: state.enrolled,
            passcode_set: state.passcode_set,
            biometric_error: state.biometric_error.clone(),
        })
    }

    fn current_domain_state(&self) -> Option<DomainState> {
        let state = self.state.lock();
        state
            .enrolled
            .then(|| Self::state_for(state.enrollment_generation))
    }

    async fn evaluate(&self, request: ChallengeRequest) -> Evaluation {
        self.challenges.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut state = self.state.lock();
            state.last_request = Some(request);
            state.script.pop_front().unwrap_or(Scripted::Succeed)
        };

        match step {
            Scripted::Succeed => self.finish_success(),
            Scripted::Fail(failure) => Evaluation::failure(failure),
            Scripted::WaitFor(notify) => {
                notify.notified().await;
                self.finish_success()
            }
            Scripted::Hang => std::future::pending::<Evaluation>().await,
        }
    }
}

/// Hand-driven clock
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock starting at T=0 (Unix epoch)
    pub fn at_epoch() -> Self {
        Self::starting_at(Utc.timestamp_opt(0, 0).single().unwrap_or_default())
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock();
        *now += ChronoDuration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// In-memory device for tamper checks
#[derive(Default)]
pub struct FakeDeviceProbe {
    existing: Mutex<HashSet<PathBuf>>,
    writable: Mutex<HashSet<PathBuf>>,
    written: Mutex<Vec<PathBuf>>,
    removed: Mutex<Vec<PathBuf>>,
    debugger: Mutex<bool>,
}

impl FakeDeviceProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl Into<PathBuf>) {
        self.existing.lock().insert(path.into());
    }

    pub fn allow_write(&self, path: impl Into<PathBuf>) {
        self.writable.lock().insert(path.into());
    }

    pub fn attach_debugger(&self) {
        *self.debugger.lock() = true;
    }

    pub fn written(&self) -> Vec<PathBuf> {
        self.written.lock().clone()
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().clone()
    }
}

impl DeviceProbe for FakeDeviceProbe {
    fn exists(&self, path: &Path) -> bool {
        self.existing.lock().contains(path)
    }

    fn try_write(&self, path: &Path, _contents: &[u8]) -> io::Result<()> {
        if self.writable.lock().contains(path) {
            self.written.lock().push(path.to_path_buf());
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "sandboxed"))
        }
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.removed.lock().push(path.to_path_buf());
        Ok(())
    }

    fn debugger_attached(&self) -> bool {
        *self.debugger.lock()
    }
}
