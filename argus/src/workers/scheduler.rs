// argus/src/workers/scheduler.rs
//
// Fixed-period driver: one run immediately, then one per period, until the
// token is cancelled. A run always completes before the next tick is looked
// at, and ticks missed during a long run are skipped rather than replayed.
// Cancellation is only observed between runs; cycles check the token
// themselves between units of work.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[async_trait]
pub trait Cycle: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run_cycle(&self, cancel: &CancellationToken);
}

pub async fn run_periodic<C>(cycle: Arc<C>, period: Duration, cancel: CancellationToken)
where
    C: Cycle + ?Sized,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(task = cycle.name(), period_secs = period.as_secs(), "scheduler started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick()      => {}
        }
        cycle.run_cycle(&cancel).await;
    }

    info!(task = cycle.name(), "scheduler stopped");
}
