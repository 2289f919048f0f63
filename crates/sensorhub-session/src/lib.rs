//! Per-connection session engine
//!
//! Merges inbound sensor messages into per-kind latest values, keeps one
//! hourly record per kind and calendar hour in the record store, and fans
//! accepted readings out to every session in a shared group. Each session
//! runs a liveness monitor and an hourly rollup timer alongside its
//! receive path.

pub mod cache;
pub mod group;
pub mod liveness;
pub mod rollup;
pub mod session;
pub mod upsert;

pub use cache::*;
pub use group::*;
pub use liveness::Heartbeat;
pub use rollup::rollup_due;
pub use session::*;
pub use upsert::*;

use sensorhub_core::OutboundMessage;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Record store error: {0}")]
    Store(anyhow::Error),

    #[error("Record store call timed out after {0:?}")]
    StoreTimeout(Duration),

    #[error("Group transport error: {0}")]
    Group(anyhow::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Channel carrying messages back to a session's own transport
pub type OutboundSender = mpsc::UnboundedSender<OutboundMessage>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundMessage>;

/// Create the outbound channel for a new session
pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate a process-unique session id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Timing and grouping knobs shared by all sessions
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Broadcast group every session joins
    pub group: String,
    /// How often the liveness monitor checks for silence
    pub liveness_interval: Duration,
    /// Silence longer than this produces a no-data notice
    pub no_data_threshold: Duration,
    /// How often the rollup timer checks for an hour boundary
    pub rollup_interval: Duration,
    /// Upper bound on a single record store call
    pub store_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            group: "sensor_data".to_string(),
            liveness_interval: Duration::from_secs(1),
            no_data_threshold: Duration::from_secs(10),
            rollup_interval: Duration::from_secs(60),
            store_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("session-"));
    }

    #[test]
    fn test_default_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.group, "sensor_data");
        assert_eq!(settings.no_data_threshold, Duration::from_secs(10));
        assert_eq!(settings.rollup_interval, Duration::from_secs(60));
    }
}
