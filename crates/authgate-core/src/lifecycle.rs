//! Foreground / background / locked security state machine
//!
//! The host forwards OS lifecycle callbacks with a delivery sequence number.
//! Transitions:
//!
//! - Foreground → Background: remember when, show the overlay
//! - Background → Foreground: within the reuse window, hide the overlay;
//!   past it, lock and emit [`SecurityEvent::ReauthRequired`]
//! - Locked → Foreground: only through [`SecurityLifecycleController::unlock`]
//! - Memory pressure: purge cached secrets, state unchanged
//!
//! Every foreground event also checks the enrolled biometric set.

use crate::enrollment::{EnrollmentMonitor, EnrollmentSnapshot, SnapshotPersistence};
use crate::policy::{AuthPolicy, AuthPolicyEngine, AuthResult};
use crate::privacy_overlay::{OverlayReason, PrivacyOverlay};
use crate::provider::DomainState;
use crate::secret_cache::SecretCache;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the outbound event channel
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Time source
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Security state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// App visible and unlocked
    Foreground,
    /// App in background
    Background,
    /// Waiting for re-authentication
    Locked,
}

/// OS-delivered lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// App entered background
    Background,
    /// App returned to foreground
    Foreground,
    /// OS memory warning
    MemoryPressure,
}

/// Outbound event for the host/UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    /// Background timeout exceeded; the session is locked
    ReauthRequired {
        /// Seconds spent in background
        elapsed_secs: u64,
    },
    /// Enrolled biometric set differs from the last-known one
    EnrollmentChanged {
        /// Last-known snapshot
        previous: EnrollmentSnapshot,
        /// Current snapshot
        current: EnrollmentSnapshot,
    },
}

/// What happened to a delivered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Event processed
    Handled,
    /// Sequence number already seen; ignored
    Duplicate,
}

struct ControllerState {
    state: LifecycleState,
    backgrounded_at: Option<DateTime<Utc>>,
    last_sequence: Option<u64>,
}

/// Process-wide security lifecycle controller
pub struct SecurityLifecycleController {
    engine: Arc<AuthPolicyEngine>,
    monitor: EnrollmentMonitor,
    policy: AuthPolicy,
    overlay: Arc<PrivacyOverlay>,
    cache: Arc<SecretCache>,
    clock: Arc<dyn Clock>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<SecurityEvent>,
}

impl SecurityLifecycleController {
    /// Controller starting in the foreground
    pub fn new(
        engine: Arc<AuthPolicyEngine>,
        snapshots: Arc<dyn SnapshotPersistence>,
        policy: AuthPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            engine,
            monitor: EnrollmentMonitor::new(snapshots),
            policy,
            overlay: Arc::new(PrivacyOverlay::new()),
            cache: Arc::new(SecretCache::new()),
            clock: Arc::new(SystemClock),
            inner: Mutex::new(ControllerState {
                state: LifecycleState::Foreground,
                backgrounded_at: None,
                last_sequence: None,
            }),
            events,
        }
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a secret cache with the host
    pub fn with_secret_cache(mut self, cache: Arc<SecretCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Share an overlay with the host
    pub fn with_overlay(mut self, overlay: Arc<PrivacyOverlay>) -> Self {
        self.overlay = overlay;
        self
    }

    /// Current state
    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Policy used for the timeout and for unlock
    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// Overlay state the UI observes
    pub fn overlay(&self) -> Arc<PrivacyOverlay> {
        self.overlay.clone()
    }

    /// Cache purged on memory pressure and lock
    pub fn secret_cache(&self) -> Arc<SecretCache> {
        self.cache.clone()
    }

    /// Subscribe to outbound events
    pub fn subscribe(&self) -> broadcast::Receiver<SecurityEvent> {
        self.events.subscribe()
    }

    /// `applicationDidEnterBackground`
    pub fn on_background(&self, sequence: u64) -> Delivery {
        self.handle(sequence, LifecycleEvent::Background)
    }

    /// `applicationWillEnterForeground`
    pub fn on_foreground(&self, sequence: u64) -> Delivery {
        self.handle(sequence, LifecycleEvent::Foreground)
    }

    /// `applicationDidReceiveMemoryWarning`
    pub fn on_memory_pressure(&self, sequence: u64) -> Delivery {
        self.handle(sequence, LifecycleEvent::MemoryPressure)
    }

    /// Process one lifecycle event in delivery order
    pub fn handle(&self, sequence: u64, event: LifecycleEvent) -> Delivery {
        let mut inner = self.inner.lock();
        if matches!(inner.last_sequence, Some(last) if sequence <= last) {
            tracing::debug!("Ignoring duplicate lifecycle event #{} ({:?})", sequence, event);
            return Delivery::Duplicate;
        }
        inner.last_sequence = Some(sequence);

        match event {
            LifecycleEvent::Background => self.enter_background(&mut inner),
            LifecycleEvent::Foreground => {
                self.enter_foreground(&mut inner);
                // Snapshot persistence may hit the database; not under the state lock
                drop(inner);
                self.check_enrollment();
            }
            LifecycleEvent::MemoryPressure => {
                let purged = self.cache.purge();
                tracing::debug!(
                    "Memory pressure in {:?}: purged {} cached secrets",
                    inner.state,
                    purged
                );
            }
        }

        Delivery::Handled
    }

    fn enter_background(&self, inner: &mut ControllerState) {
        if inner.state != LifecycleState::Foreground {
            return;
        }
        inner.state = LifecycleState::Background;
        inner.backgrounded_at = Some(self.clock.now());
        self.overlay.show(OverlayReason::Backgrounded);
        tracing::debug!("Lifecycle: Foreground -> Background");
    }

    fn enter_foreground(&self, inner: &mut ControllerState) {
        if inner.state != LifecycleState::Background {
            return;
        }

        let now = self.clock.now();
        let elapsed = inner
            .backgrounded_at
            .take()
            .map(|since| (now - since).to_std().unwrap_or_default())
            .unwrap_or_default();

        if elapsed > self.policy.reuse_window() {
            inner.state = LifecycleState::Locked;
            self.overlay.show(OverlayReason::Locked);
            self.overlay.hide(OverlayReason::Backgrounded);
            let purged = self.cache.purge();
            let elapsed_secs = elapsed.as_secs();
            tracing::info!(
                "Lifecycle: Background -> Locked after {}s (purged {} cached secrets)",
                elapsed_secs,
                purged
            );
            self.emit(SecurityEvent::ReauthRequired { elapsed_secs });
        } else {
            inner.state = LifecycleState::Foreground;
            self.overlay.hide(OverlayReason::Backgrounded);
            tracing::debug!("Lifecycle: Background -> Foreground after {:?}", elapsed);
        }
    }

    fn check_enrollment(&self) {
        if let Some(state) = self.engine.provider().current_domain_state() {
            self.record_enrollment(state);
        }
    }

    fn record_enrollment(&self, state: DomainState) {
        let snapshot = EnrollmentSnapshot::with_timestamp(state, self.clock.now());
        if let Some(change) = self.monitor.observe(snapshot) {
            self.emit(SecurityEvent::EnrollmentChanged {
                previous: change.previous,
                current: change.current,
            });
        }
    }

    /// Authenticate with the controller's policy.
    ///
    /// On success a locked session returns to the foreground and the overlay is
    /// removed. The snapshot captured by the challenge is recorded as the new
    /// enrollment baseline.
    pub async fn unlock(&self, reason: &str) -> AuthResult {
        let result = self.engine.authenticate(reason, &self.policy).await;
        if !result.succeeded {
            return result;
        }

        {
            let mut inner = self.inner.lock();
            if inner.state == LifecycleState::Locked {
                inner.state = LifecycleState::Foreground;
                inner.backgrounded_at = None;
                self.overlay.clear();
                tracing::info!("Lifecycle: Locked -> Foreground");
            }
        }

        if let Some(state) = result.domain_state.clone() {
            self.record_enrollment(state);
        }
        result
    }

    fn emit(&self, event: SecurityEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("No subscribers for security event");
        }
    }
}
