//! Group broadcast transport
//!
//! Every session joins a named group on open. A published message is
//! delivered to all current members, the publisher included. Delivery is
//! best-effort: there is no acknowledgement or replay.

use crate::SessionId;
use anyhow::Result;
use sensorhub_core::DataMessage;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Handle a group uses to reach one member session
pub type GroupMember = mpsc::UnboundedSender<DataMessage>;

#[async_trait::async_trait]
pub trait GroupTransport: Send + Sync {
    async fn join(&self, group: &str, session: SessionId, member: GroupMember) -> Result<()>;

    async fn leave(&self, group: &str, session: SessionId) -> Result<()>;

    /// Deliver `message` to every member, returning how many received it
    async fn publish(&self, group: &str, message: DataMessage) -> Result<usize>;
}

/// In-process groups backed by unbounded channels
#[derive(Default)]
pub struct ChannelGroups {
    groups: RwLock<HashMap<String, HashMap<SessionId, GroupMember>>>,
}

impl ChannelGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently in `group`
    pub async fn member_count(&self, group: &str) -> usize {
        let groups = self.groups.read().await;
        groups.get(group).map(HashMap::len).unwrap_or(0)
    }

    async fn prune(&self, group: &str, closed: &[SessionId]) {
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(group) {
            for session in closed {
                members.remove(session);
            }
            if members.is_empty() {
                groups.remove(group);
            }
        }
    }
}

#[async_trait::async_trait]
impl GroupTransport for ChannelGroups {
    async fn join(&self, group: &str, session: SessionId, member: GroupMember) -> Result<()> {
        let mut groups = self.groups.write().await;
        groups
            .entry(group.to_string())
            .or_default()
            .insert(session, member);
        debug!(%session, group, "Joined group");
        Ok(())
    }

    async fn leave(&self, group: &str, session: SessionId) -> Result<()> {
        self.prune(group, &[session]).await;
        debug!(%session, group, "Left group");
        Ok(())
    }

    async fn publish(&self, group: &str, message: DataMessage) -> Result<usize> {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let groups = self.groups.read().await;
            let Some(members) = groups.get(group) else {
                return Ok(0);
            };
            for (session, member) in members {
                if member.send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*session);
                }
            }
        }

        if !closed.is_empty() {
            debug!(group, closed = closed.len(), "Dropping closed group members");
            self.prune(group, &closed).await;
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sensorhub_core::{Dht22Fields, SensorReading};

    fn message() -> DataMessage {
        DataMessage::new(
            SensorReading::Dht22(Dht22Fields {
                tem_c: 21.0,
                humi: 50.0,
            }),
            chrono::Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_publish_reaches_all_members() {
        let groups = ChannelGroups::new();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        groups.join("sensors", SessionId::next(), a_tx).await.unwrap();
        groups.join("sensors", SessionId::next(), b_tx).await.unwrap();

        let delivered = groups.publish("sensors", message()).await.unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(a_rx.recv().await.unwrap(), message());
        assert_eq!(b_rx.recv().await.unwrap(), message());
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let groups = ChannelGroups::new();
        let session = SessionId::next();
        let (tx, mut rx) = mpsc::unbounded_channel();
        groups.join("sensors", session, tx).await.unwrap();
        groups.leave("sensors", session).await.unwrap();

        assert_eq!(groups.publish("sensors", message()).await.unwrap(), 0);
        assert_eq!(groups.member_count("sensors").await, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_members_are_pruned() {
        let groups = ChannelGroups::new();
        let (tx, rx) = mpsc::unbounded_channel();
        groups.join("sensors", SessionId::next(), tx).await.unwrap();
        drop(rx);

        assert_eq!(groups.publish("sensors", message()).await.unwrap(), 0);
        assert_eq!(groups.member_count("sensors").await, 0);
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let groups = ChannelGroups::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        groups.join("kitchen", SessionId::next(), tx).await.unwrap();

        assert_eq!(groups.publish("garage", message()).await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }
}
