//! Content-obscuring overlay state
//!
//! The UI layer draws the blur/cover; this module only tracks why it is shown.
//! Several reasons can be active at once and the overlay stays visible until
//! the last one is removed.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Why the overlay is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayReason {
    /// App moved to the background
    Backgrounded,
    /// Session locked pending re-authentication
    Locked,
    /// Host marked the current screen as sensitive
    Sensitive,
}

impl OverlayReason {
    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Backgrounded => "App in background",
            Self::Locked => "Re-authentication required",
            Self::Sensitive => "Sensitive content",
        }
    }
}

/// Overlay state
#[derive(Debug, Default)]
pub struct PrivacyOverlay {
    reasons: RwLock<Vec<OverlayReason>>,
}

impl PrivacyOverlay {
    /// Hidden overlay
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reason. Returns `true` if the overlay became visible.
    ///
    /// Adding a reason that is already active does nothing.
    pub fn show(&self, reason: OverlayReason) -> bool {
        let mut reasons = self.reasons.write();
        if reasons.contains(&reason) {
            return false;
        }
        let was_hidden = reasons.is_empty();
        reasons.push(reason);
        tracing::debug!("Privacy overlay reason added: {}", reason.description());
        was_hidden
    }

    /// Remove a reason. Returns `true` if the overlay became hidden.
    pub fn hide(&self, reason: OverlayReason) -> bool {
        let mut reasons = self.reasons.write();
        let before = reasons.len();
        reasons.retain(|r| *r != reason);
        let hidden = before > 0 && reasons.is_empty();
        if hidden {
            tracing::debug!("Privacy overlay removed");
        }
        hidden
    }

    /// Remove every reason
    pub fn clear(&self) {
        let mut reasons = self.reasons.write();
        if !reasons.is_empty() {
            reasons.clear();
            tracing::debug!("Privacy overlay cleared");
        }
    }

    /// Overlay currently drawn
    pub fn is_visible(&self) -> bool {
        !self.reasons.read().is_empty()
    }

    /// Active reasons in the order they were added
    pub fn active_reasons(&self) -> Vec<OverlayReason> {
        self.reasons.read().clone()
    }
}
