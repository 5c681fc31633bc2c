//! Public API exposed to Flutter via flutter_rust_bridge
//!
//! ## Architecture
//!
//! - **Capability**: query biometric factors and passcode
//! - **Authentication**: policy-driven challenge, lock-screen unlock
//! - **Secure Storage**: store, load, delete gated and ungated items
//! - **Device Trust**: tamper heuristics and overall verdict
//! - **Lifecycle**: OS app-state callbacks and the security state
//!
//! ## State Management
//!
//! Global state is held in a `lazy_static` RwLock and installed once by
//! [`init_bridge`] from the native side, which owns the platform providers.
//! No operation panics; every failure comes back inside the response DTO.

use crate::models::*;
use anyhow::{anyhow, Result};
use authgate_core::{
    has_changed, AuthPolicyEngine, BiometryKind, ChallengeProvider, Clock, Delivery, DeviceProbe,
    DeviceTrustAssessor, DomainState, EnrollmentSnapshot, Error, HostDeviceProbe, SecurityConfig,
    SecurityLifecycleController, SnapshotPersistence,
};
use authgate_storage::{
    AccessibilityTier, SecureStore, SoftwareKeystore, StateDatabase, TrustStoreProvider,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// Reason shown for a gated read when the host supplies none
pub const DEFAULT_LOAD_REASON: &str = "Authenticate to access data";

lazy_static::lazy_static! {
    /// Installed bridge
    static ref BRIDGE: Arc<RwLock<Option<Arc<Bridge>>>> = Arc::new(RwLock::new(None));
}

/// Platform providers registered by the native host
#[flutter_rust_bridge::frb(ignore)]
pub struct BridgeProviders {
    /// Biometric sensor and policy evaluator
    pub challenge: Arc<dyn ChallengeProvider>,
    /// Hardware trust store (`None` uses the software keystore)
    pub trust_store: Option<Arc<dyn TrustStoreProvider>>,
    /// Tamper-check device access (`None` uses the real filesystem)
    pub device: Option<Arc<dyn DeviceProbe>>,
    /// Enrollment snapshot storage (`None` opens the state database)
    pub snapshots: Option<Arc<dyn SnapshotPersistence>>,
    /// Time source (`None` uses the wall clock)
    pub clock: Option<Arc<dyn Clock>>,
}

impl BridgeProviders {
    /// Defaults for everything except the challenge provider
    pub fn new(challenge: Arc<dyn ChallengeProvider>) -> Self {
        Self {
            challenge,
            trust_store: None,
            device: None,
            snapshots: None,
            clock: None,
        }
    }
}

/// Internal only - not exposed to FFI
#[flutter_rust_bridge::frb(ignore)]
struct Bridge {
    config: SecurityConfig,
    engine: Arc<AuthPolicyEngine>,
    store: SecureStore,
    assessor: DeviceTrustAssessor,
    controller: Arc<SecurityLifecycleController>,
}

fn bridge() -> std::result::Result<Arc<Bridge>, Error> {
    BRIDGE
        .read()
        .clone()
        .ok_or_else(|| Error::Unknown("bridge not initialized".to_string()))
}

/// Controller of the installed bridge, for the event stream
pub(crate) fn controller() -> Result<Arc<SecurityLifecycleController>> {
    bridge()
        .map(|bridge| bridge.controller.clone())
        .map_err(|e| anyhow!(e))
}

// ============================================================================
// Initialization
// ============================================================================

/// Install the bridge. Replaces any previous installation.
#[flutter_rust_bridge::frb(ignore)]
pub fn init_bridge(providers: BridgeProviders, config: SecurityConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow!("invalid security config: {}", e))?;

    let snapshots: Arc<dyn SnapshotPersistence> = match providers.snapshots {
        Some(snapshots) => snapshots,
        None => {
            let path = config.resolve_state_db_path();
            let db = StateDatabase::open(&path)
                .map_err(|e| anyhow!("failed to open state database {}: {}", path.display(), e))?;
            Arc::new(db)
        }
    };
    let device: Arc<dyn DeviceProbe> = providers
        .device
        .unwrap_or_else(|| Arc::new(HostDeviceProbe));

    let engine = Arc::new(AuthPolicyEngine::new(providers.challenge.clone()));
    // Gated reads share the engine's gate so only one prompt is ever on screen
    let trust_store: Arc<dyn TrustStoreProvider> = providers.trust_store.unwrap_or_else(|| {
        Arc::new(
            SoftwareKeystore::new(providers.challenge).with_challenge_gate(engine.challenge_gate()),
        )
    });
    let assessor = DeviceTrustAssessor::new(
        engine.capability_probe().clone(),
        device,
        config.tamper_checks.clone(),
    );
    let mut controller =
        SecurityLifecycleController::new(engine.clone(), snapshots, config.policy.clone());
    if let Some(clock) = providers.clock {
        controller = controller.with_clock(clock);
    }

    let bridge = Bridge {
        engine,
        store: SecureStore::new(trust_store).with_read_timeout(config.policy.timeout()),
        assessor,
        controller: Arc::new(controller),
        config,
    };
    *BRIDGE.write() = Some(Arc::new(bridge));

    tracing::info!("Security bridge initialized");
    Ok(())
}

/// Remove the bridge. Pending calls finish against the old instance.
#[flutter_rust_bridge::frb(sync)]
pub fn shutdown_bridge() {
    if BRIDGE.write().take().is_some() {
        tracing::info!("Security bridge shut down");
    }
}

/// Whether [`init_bridge`] has run
#[flutter_rust_bridge::frb(sync)]
pub fn is_bridge_initialized() -> bool {
    BRIDGE.read().is_some()
}

/// Initialize JSON logging for the host process
pub fn init_logging() {
    let result = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .try_init();

    match result {
        Ok(()) => tracing::info!("Security bridge logging initialized"),
        Err(e) => tracing::debug!("Logging already initialized: {}", e),
    }
}

// ============================================================================
// Capability & Authentication
// ============================================================================

/// Available authentication factors
#[flutter_rust_bridge::frb(sync)]
pub fn query_capability() -> CapabilityInfo {
    match bridge() {
        Ok(bridge) => bridge.engine.capability_probe().query().into(),
        Err(_) => CapabilityInfo {
            kind: BiometryKind::None.as_str().to_string(),
            enrolled: false,
            passcode_set: false,
        },
    }
}

/// Run one challenge. `policy = None` uses the configured policy.
pub async fn authenticate(reason: String, policy: Option<AuthPolicyInput>) -> AuthResponse {
    let bridge = match bridge() {
        Ok(bridge) => bridge,
        Err(e) => return AuthResponse::from_error(e),
    };
    let policy = policy
        .map(Into::into)
        .unwrap_or_else(|| bridge.config.policy.clone());

    bridge.engine.authenticate(&reason, &policy).await.into()
}

/// Re-authenticate from the lock screen
pub async fn unlock(reason: String) -> AuthResponse {
    match bridge() {
        Ok(bridge) => bridge.controller.unlock(&reason).await.into(),
        Err(e) => AuthResponse::from_error(e),
    }
}

// ============================================================================
// Biometric State
// ============================================================================

/// Base64 fingerprint of the currently enrolled biometric set
#[flutter_rust_bridge::frb(sync)]
pub fn get_biometric_state() -> Option<String> {
    bridge()
        .ok()
        .and_then(|bridge| bridge.engine.provider().current_domain_state())
        .map(|state| state.to_base64())
}

/// Whether the enrolled set differs from `previous` (base64).
///
/// No previous value is never a change. A previous value that cannot be
/// decoded, or a device with nothing enrolled, counts as changed.
#[flutter_rust_bridge::frb(sync)]
pub fn has_biometric_state_changed(previous: Option<String>) -> bool {
    let previous = match previous {
        Some(previous) => previous,
        None => return false,
    };
    let bridge = match bridge() {
        Ok(bridge) => bridge,
        Err(_) => return false,
    };
    let previous = match DomainState::from_base64(&previous) {
        Ok(state) => EnrollmentSnapshot::new(state),
        Err(e) => {
            tracing::debug!("Unreadable previous biometric state: {}", e);
            return true;
        }
    };

    match bridge.engine.provider().current_domain_state() {
        Some(current) => has_changed(Some(&previous), &EnrollmentSnapshot::new(current)),
        None => true,
    }
}

// ============================================================================
// Secure Storage
// ============================================================================

/// Store `payload` under `key`, replacing any existing item.
///
/// `tier` is a `kSecAttrAccessible…` constant name; unknown values use the
/// default tier.
pub async fn store(key: String, payload: Vec<u8>, tier: String, gated: bool) -> StoreResponse {
    match bridge() {
        Ok(bridge) => bridge
            .store
            .put(&key, &payload, AccessibilityTier::parse(&tier), gated)
            .await
            .into(),
        Err(e) => {
            tracing::warn!("store({}) before initialization: {}", key, e);
            StoreResponse {
                success: false,
                status: authgate_storage::keystore::status::NOT_AVAILABLE,
            }
        }
    }
}

/// Read the payload under `key`, prompting with `reason` for gated items
pub async fn load(key: String, reason: Option<String>) -> LoadResponse {
    let bridge = match bridge() {
        Ok(bridge) => bridge,
        Err(e) => return LoadResponse::from_error(e),
    };
    let reason = reason.unwrap_or_else(|| DEFAULT_LOAD_REASON.to_string());

    match bridge.store.get(&key, Some(&reason)).await {
        Ok(payload) => LoadResponse::ok(payload.to_vec()),
        Err(e) => LoadResponse::from_error(e),
    }
}

/// Remove the item under `key`
pub async fn delete_item(key: String) -> StoreResponse {
    match bridge() {
        Ok(bridge) => bridge.store.delete(&key).await.into(),
        Err(_) => StoreResponse {
            success: false,
            status: authgate_storage::keystore::status::NOT_AVAILABLE,
        },
    }
}

/// Whether an item exists under `key`
pub async fn contains_item(key: String) -> bool {
    match bridge() {
        Ok(bridge) => bridge.store.contains(&key).await,
        Err(_) => false,
    }
}

// ============================================================================
// Device Trust
// ============================================================================

/// Run the tamper checks and combine with the capability probe
#[flutter_rust_bridge::frb(sync)]
pub fn assess_device_trust() -> DeviceTrustInfo {
    match bridge() {
        Ok(bridge) => bridge.assessor.assess().into(),
        Err(_) => DeviceTrustInfo {
            has_biometric: false,
            has_passcode: false,
            jailbroken: false,
            trusted: false,
            indicators: Vec::new(),
        },
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

fn deliver(sequence: u64, handle: impl FnOnce(&SecurityLifecycleController) -> Delivery) -> bool {
    match bridge() {
        Ok(bridge) => handle(&bridge.controller) == Delivery::Handled,
        Err(e) => {
            tracing::debug!("Lifecycle event #{} dropped: {}", sequence, e);
            false
        }
    }
}

/// App entered background. Returns `false` for duplicates.
#[flutter_rust_bridge::frb(sync)]
pub fn on_background(sequence: u64) -> bool {
    deliver(sequence, |controller| controller.on_background(sequence))
}

/// App returning to foreground. Returns `false` for duplicates.
#[flutter_rust_bridge::frb(sync)]
pub fn on_foreground(sequence: u64) -> bool {
    deliver(sequence, |controller| controller.on_foreground(sequence))
}

/// OS memory warning. Returns `false` for duplicates.
#[flutter_rust_bridge::frb(sync)]
pub fn on_memory_pressure(sequence: u64) -> bool {
    deliver(sequence, |controller| controller.on_memory_pressure(sequence))
}

/// Current security state (`Foreground` before initialization)
#[flutter_rust_bridge::frb(sync)]
pub fn lifecycle_state() -> SecurityState {
    bridge()
        .map(|bridge| bridge.controller.state().into())
        .unwrap_or(SecurityState::Foreground)
}

/// Whether the privacy overlay should be drawn
#[flutter_rust_bridge::frb(sync)]
pub fn privacy_overlay_visible() -> bool {
    bridge()
        .map(|bridge| bridge.controller.overlay().is_visible())
        .unwrap_or(false)
}
