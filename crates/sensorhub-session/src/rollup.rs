//! Hour-boundary rollup of cached latest values
//!
//! When an hour boundary passes without a fresh reading, the rollup timer
//! persists each kind's latest cached values through the same upsert path
//! as the receive loop, stamped with the time of the last accepted reading
//! so the record lands in the hour the values were observed.

use crate::session::SessionCore;
use chrono::{DateTime, Utc};
use sensorhub_core::hour_start;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

/// Whether a rollup should run at `now`
///
/// The hour of `now` must differ from the hour of the last accepted reading,
/// and no rollup may have been saved since the current hour began.
pub fn rollup_due(
    now: DateTime<Utc>,
    last_received: DateTime<Utc>,
    last_save: DateTime<Utc>,
) -> bool {
    let boundary = hour_start(now);
    boundary != hour_start(last_received) && last_save < boundary
}

impl SessionCore {
    /// Persist cached latest values if an hour boundary has passed
    pub(crate) async fn roll_up(&self) {
        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !rollup_due(now, state.last_received_time, state.last_save_time) {
            return;
        }
        if state.latest.is_empty() {
            state.last_save_time = now;
            return;
        }

        let at = state.last_received_time;
        let mut failed = false;
        for reading in state.latest.readings() {
            match self.upsert.upsert(&mut state.current_rows, reading, at).await {
                Ok(outcome) => {
                    debug!(session = %self.id, kind = %reading.kind(), ?outcome, "Rolled up latest values")
                }
                Err(e) => {
                    failed = true;
                    error!(session = %self.id, kind = %reading.kind(), error = %e, "Hourly rollup failed");
                }
            }
        }

        // A failed kind is retried on the next tick.
        if !failed {
            state.last_save_time = now;
            info!(session = %self.id, kinds = state.latest.len(), "Hourly rollup saved");
        }
    }
}

pub(crate) async fn run(
    core: Arc<SessionCore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => core.roll_up().await,
            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_not_due_within_same_hour() {
        assert!(!rollup_due(at(10, 59), at(10, 1), at(10, 1)));
    }

    #[test]
    fn test_due_after_boundary() {
        assert!(rollup_due(at(11, 0), at(10, 45), at(10, 45)));
    }

    #[test]
    fn test_not_due_twice_for_same_boundary() {
        assert!(!rollup_due(at(11, 2), at(10, 45), at(11, 1)));
    }

    #[test]
    fn test_due_again_next_hour_while_silent() {
        assert!(rollup_due(at(12, 0), at(10, 45), at(11, 1)));
    }
}
