//! Background reaper for stale approvals.
//!
//! Periodically expires approval gate entries older than the configured
//! staleness threshold, terminating their agents and telling the owner.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::gate::{ApprovalGate, ExpiredApproval};
use crate::surface::{ChatSurface, Outbound};

/// Spawn the reaper loop.
///
/// Sweeps every `interval` until `cancel` fires. A sweep failure never stops
/// the loop.
#[must_use]
pub fn spawn_reaper(
    gate: ApprovalGate,
    surface: Arc<dyn ChatSurface>,
    interval: Duration,
    ttl: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("approval reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let expired = sweep(&gate, surface.as_ref(), ttl).await;
            if expired > 0 {
                info!(expired, "approval reaper expired stale requests");
            }
        }
    })
}

/// Expire entries older than `ttl` and notify their owners.
///
/// Returns the number of entries expired.
pub async fn sweep(gate: &ApprovalGate, surface: &dyn ChatSurface, ttl: Duration) -> usize {
    let expired = gate.expire(ttl).await;
    for entry in &expired {
        notify_expired(surface, entry, "Approval timed out").await;
    }
    expired.len()
}

/// Tell the owner that `entry` was discarded, on its card if possible.
pub async fn notify_expired(surface: &dyn ChatSurface, entry: &ExpiredApproval, reason: &str) {
    let text = format!(
        "\u{231b} {reason}: `{}` was not changed. The agent was stopped.",
        entry.file_path
    );

    let result = match &entry.card {
        Some(card) => surface.edit(card, Outbound::Text(text)).await,
        None => surface
            .send(&entry.thread, Outbound::Text(text))
            .await
            .map(|_| ()),
    };

    if let Err(err) = result {
        warn!(approval_id = %entry.id, %err, "failed to post expiry notice");
    }
}
