//! Biometric enrollment change detection

use crate::provider::DomainState;
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Enrolled-set fingerprint at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentSnapshot {
    /// Opaque platform bytes
    pub state: DomainState,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl EnrollmentSnapshot {
    /// Snapshot taken now
    pub fn new(state: DomainState) -> Self {
        Self::with_timestamp(state, Utc::now())
    }

    /// Snapshot with explicit timestamp
    pub fn with_timestamp(state: DomainState, captured_at: DateTime<Utc>) -> Self {
        Self { state, captured_at }
    }
}

/// Compare two snapshots byte-wise.
///
/// A missing `previous` is the first observation: it establishes the baseline
/// and is never reported as a change. Timestamps are ignored.
pub fn has_changed(previous: Option<&EnrollmentSnapshot>, current: &EnrollmentSnapshot) -> bool {
    match previous {
        None => false,
        Some(previous) => previous.state.as_bytes() != current.state.as_bytes(),
    }
}

/// Storage for the single last-known snapshot
pub trait SnapshotPersistence: Send + Sync {
    /// Load the last-known snapshot
    fn load(&self) -> Result<Option<EnrollmentSnapshot>>;

    /// Replace the last-known snapshot
    fn save(&self, snapshot: &EnrollmentSnapshot) -> Result<()>;
}

/// Process-lifetime snapshot storage
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshot: RwLock<Option<EnrollmentSnapshot>>,
}

impl MemorySnapshotStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotPersistence for MemorySnapshotStore {
    fn load(&self) -> Result<Option<EnrollmentSnapshot>> {
        Ok(self.snapshot.read().clone())
    }

    fn save(&self, snapshot: &EnrollmentSnapshot) -> Result<()> {
        *self.snapshot.write() = Some(snapshot.clone());
        Ok(())
    }
}

/// Detected change in the enrolled set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentChange {
    /// Last-known snapshot
    pub previous: EnrollmentSnapshot,
    /// Newly observed snapshot
    pub current: EnrollmentSnapshot,
}

/// Tracks the last-known snapshot across launches
pub struct EnrollmentMonitor {
    store: Arc<dyn SnapshotPersistence>,
}

impl EnrollmentMonitor {
    /// Create monitor over a persistence backend
    pub fn new(store: Arc<dyn SnapshotPersistence>) -> Self {
        Self { store }
    }

    /// Last-known snapshot, if any was ever recorded
    pub fn last_known(&self) -> Option<EnrollmentSnapshot> {
        match self.store.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Failed to load enrollment snapshot: {}", e);
                None
            }
        }
    }

    /// Record `current` as last-known and report a change against the previous value.
    ///
    /// Unreadable persisted state is treated as a first observation.
    pub fn observe(&self, current: EnrollmentSnapshot) -> Option<EnrollmentChange> {
        let previous = self.last_known();
        let changed = has_changed(previous.as_ref(), &current);

        if let Err(e) = self.store.save(&current) {
            tracing::warn!("Failed to persist enrollment snapshot: {}", e);
        }

        match previous {
            Some(previous) if changed => {
                tracing::info!("Biometric enrollment changed since {}", previous.captured_at);
                Some(EnrollmentChange { previous, current })
            }
            _ => None,
        }
    }
}
