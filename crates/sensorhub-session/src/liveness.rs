//! Silence detection for a session
//!
//! The monitor is level-triggered: while no reading has been accepted for
//! longer than the threshold, every tick sends another no-data notice to the
//! session's own transport. Notices stop as soon as a reading arrives.
//!
//! The heartbeat lives outside the session state lock, so a slow record
//! store never delays a tick.

use crate::OutboundSender;
use sensorhub_core::OutboundMessage;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Monotonic time of the last accepted reading
#[derive(Debug)]
pub struct Heartbeat {
    last: Mutex<Instant>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Instant> {
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record that a reading was accepted just now
    pub fn beat(&self) {
        *self.lock() = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed()
    }

    /// True once silence has lasted strictly longer than `threshold`
    pub fn is_silent(&self, threshold: Duration) -> bool {
        self.elapsed() > threshold
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) async fn run(
    heartbeat: std::sync::Arc<Heartbeat>,
    outbound: OutboundSender,
    interval: Duration,
    threshold: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if heartbeat.is_silent(threshold) {
                    debug!(elapsed = ?heartbeat.elapsed(), "No data within threshold");
                    if outbound.send(OutboundMessage::no_data()).is_err() {
                        break;
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
