//! Stream APIs for Flutter
//!
//! Real-time security events from the lifecycle controller.

use crate::api::controller;
use crate::models::SecurityEventInfo;
use anyhow::Result;
use tokio::sync::{broadcast, mpsc};

/// Security event stream
///
/// Emits `ReauthRequired` when the background timeout is exceeded and
/// `EnrollmentChanged` when the enrolled biometric set differs from the
/// last-known one. Ends when the receiver is dropped or the bridge shuts down.
pub async fn security_event_stream() -> Result<mpsc::Receiver<SecurityEventInfo>> {
    let mut events = controller()?.subscribe();
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        tracing::debug!("Security event stream started");

        loop {
            match events.recv().await {
                Ok(event) => {
                    if tx.send(SecurityEventInfo::from(event)).await.is_err() {
                        // Channel closed, receiver dropped
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Security event stream lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        tracing::debug!("Security event stream ended");
    });

    Ok(rx)
}
