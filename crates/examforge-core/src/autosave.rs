//! Periodic snapshotting of a live session.
//!
//! Write-through saves are issued by the session itself on every answer;
//! this task is the periodic trigger and, since failed saves are never
//! retried explicitly, also the retry mechanism.

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default period between automatic saves.
pub const AUTO_SAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Something that can snapshot itself into persistence.
#[async_trait]
pub trait AutoSave: Send + Sync + 'static {
    /// Persist a full snapshot. Returns `false` to stop the schedule.
    async fn auto_save(&self) -> bool;
}

/// Spawn the periodic save task. The first save happens one `period` from now.
pub fn spawn_autosave<T: AutoSave>(
    target: Weak<T>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        // A slow backend should not cause a burst of catch-up saves.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("auto-save cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let Some(target) = target.upgrade() else {
                        break;
                    };
                    if !target.auto_save().await {
                        break;
                    }
                }
            }
        }
    })
}
