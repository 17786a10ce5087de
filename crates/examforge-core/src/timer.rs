//! Session countdown.
//!
//! [`advance`] is the pure step (next remaining time plus crossed
//! thresholds); [`spawn_countdown`] drives it once per period until the
//! target says stop or the token is cancelled.

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Remaining seconds at which [`TimerEvent::TimeWarning`] fires.
pub const TIME_WARNING_SECS: u32 = 300;
/// Remaining seconds at which [`TimerEvent::FinalWarning`] fires.
pub const FINAL_WARNING_SECS: u32 = 60;
/// Default tick period.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    TimeWarning,
    FinalWarning,
    Expired,
}

/// Result of one countdown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub remaining: u32,
    /// Events crossed by this step, in firing order.
    pub events: Vec<TimerEvent>,
}

impl Tick {
    pub fn expired(&self) -> bool {
        self.events.contains(&TimerEvent::Expired)
    }
}

/// Step the countdown from `remaining` by `elapsed_secs`.
///
/// A threshold fires when the step goes from above it to at-or-below it,
/// so it fires at most once per countdown and never for a countdown that
/// started below it. A step starting at zero reports `Expired`.
pub fn advance(remaining: u32, elapsed_secs: u32) -> Tick {
    let next = remaining.saturating_sub(elapsed_secs);
    let mut events = Vec::new();

    let crossed = |threshold: u32| remaining > threshold && next <= threshold;
    if crossed(TIME_WARNING_SECS) {
        events.push(TimerEvent::TimeWarning);
    }
    if crossed(FINAL_WARNING_SECS) {
        events.push(TimerEvent::FinalWarning);
    }
    if next == 0 {
        events.push(TimerEvent::Expired);
    }

    Tick {
        remaining: next,
        events,
    }
}

/// Something driven by the countdown (an exam session).
#[async_trait]
pub trait Countdown: Send + Sync + 'static {
    /// Apply `elapsed_secs` of countdown. Returns `false` to stop ticking.
    async fn on_tick(&self, elapsed_secs: u32) -> bool;
}

/// Spawn the ticking task. The first tick fires one `period` from now.
///
/// The task holds only a weak reference, so dropping the target also stops it.
pub fn spawn_countdown<T: Countdown>(
    target: Weak<T>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    let step = period.as_secs().max(1) as u32;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("countdown cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let Some(target) = target.upgrade() else {
                        break;
                    };
                    if !target.on_tick(step).await {
                        break;
                    }
                }
            }
        }
    })
}
