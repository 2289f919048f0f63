//! Session lifecycle and receive path

use crate::liveness::{self, Heartbeat};
use crate::{
    rollup, CurrentRows, GroupTransport, HourlyUpsert, LatestValues, OutboundSender,
    SessionError, SessionId, SessionResult, SessionSettings,
};
use chrono::{DateTime, Utc};
use sensorhub_core::{
    decode_message, Clock, DataMessage, OutboundMessage, RecordStore, SensorReading, StreamId,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Collaborators shared by every session of a process
#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<dyn RecordStore>,
    pub groups: Arc<dyn GroupTransport>,
    pub clock: Arc<dyn Clock>,
    pub settings: SessionSettings,
}

/// Mutable per-session state, only touched under the session lock
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) current_rows: CurrentRows,
    pub(crate) latest: LatestValues,
    pub(crate) last_received_time: DateTime<Utc>,
    pub(crate) last_save_time: DateTime<Utc>,
}

impl SessionState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            current_rows: CurrentRows::new(),
            latest: LatestValues::new(),
            last_received_time: now,
            last_save_time: now,
        }
    }
}

pub(crate) struct SessionCore {
    pub(crate) id: SessionId,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) heartbeat: Arc<Heartbeat>,
    pub(crate) upsert: HourlyUpsert,
    pub(crate) clock: Arc<dyn Clock>,
    groups: Arc<dyn GroupTransport>,
    group: String,
    outbound: OutboundSender,
}

impl SessionCore {
    #[instrument(skip(self, text), fields(session = %self.id))]
    async fn receive(&self, text: &str) {
        let message = match decode_message(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Rejected malformed message");
                self.notify(OutboundMessage::invalid_input(&e));
                return;
            }
        };

        let now = self.clock.now();
        for reading in message.readings() {
            match reading {
                Ok(reading) => self.accept(reading, now).await,
                Err(e) => {
                    warn!(error = %e, "Rejected sensor payload");
                    self.notify(OutboundMessage::invalid_input(&e));
                }
            }
        }
    }

    /// Cache, persist and broadcast one complete reading
    async fn accept(&self, reading: SensorReading, at: DateTime<Utc>) {
        let kind = reading.kind();
        // Counts as data even while a rollup holds the state lock.
        self.heartbeat.beat();
        let persisted = {
            let mut state = self.state.lock().await;
            state.latest.record(reading.clone());
            state.last_received_time = at;
            self.upsert
                .upsert(&mut state.current_rows, &reading, at)
                .await
        };

        let result = match persisted {
            Ok(outcome) => {
                debug!(%kind, ?outcome, "Persisted reading");
                self.broadcast(DataMessage::new(reading, at)).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            error!(%kind, error = %e, "Failed to handle reading");
            self.notify(OutboundMessage::internal_error());
        }
    }

    async fn broadcast(&self, message: DataMessage) -> SessionResult<()> {
        let delivered = self
            .groups
            .publish(&self.group, message)
            .await
            .map_err(SessionError::Group)?;
        debug!(delivered, group = %self.group, "Broadcast reading");
        Ok(())
    }

    fn notify(&self, message: OutboundMessage) {
        if self.outbound.send(message).is_err() {
            debug!(session = %self.id, "Session transport closed");
        }
    }
}

/// One connection's worth of state and background activity
///
/// Dropping a session without calling [`Session::close`] still stops its
/// background tasks, but leaves group cleanup to the transport.
pub struct Session {
    core: Arc<SessionCore>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Join the broadcast group and start the liveness, rollup and relay tasks
    ///
    /// Hourly records are scoped to `stream`, or to this session alone when no
    /// stream is given.
    pub async fn open(
        ctx: &SessionContext,
        stream: Option<StreamId>,
        outbound: OutboundSender,
    ) -> SessionResult<Self> {
        let id = SessionId::next();
        let stream = stream.unwrap_or_else(|| StreamId::new(id.to_string()));
        let settings = &ctx.settings;

        let core = Arc::new(SessionCore {
            id,
            state: Mutex::new(SessionState::new(ctx.clock.now())),
            heartbeat: Arc::new(Heartbeat::new()),
            upsert: HourlyUpsert::new(ctx.store.clone(), stream, settings.store_timeout),
            clock: ctx.clock.clone(),
            groups: ctx.groups.clone(),
            group: settings.group.clone(),
            outbound: outbound.clone(),
        });

        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        ctx.groups
            .join(&settings.group, id, relay_tx)
            .await
            .map_err(SessionError::Group)?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(liveness::run(
                core.heartbeat.clone(),
                outbound.clone(),
                settings.liveness_interval,
                settings.no_data_threshold,
                shutdown_rx.clone(),
            )),
            tokio::spawn(rollup::run(
                core.clone(),
                settings.rollup_interval,
                shutdown_rx.clone(),
            )),
            tokio::spawn(relay(relay_rx, outbound, shutdown_rx)),
        ];

        info!(session = %id, stream = %core.upsert.stream(), group = %settings.group, "Session opened");
        Ok(Self {
            core,
            shutdown,
            tasks,
        })
    }

    pub fn id(&self) -> SessionId {
        self.core.id
    }

    pub fn stream(&self) -> &StreamId {
        self.core.upsert.stream()
    }

    /// Handle one inbound text message
    ///
    /// Problems are reported to the sender as status notices; the session
    /// stays open.
    pub async fn receive(&self, text: &str) {
        self.core.receive(text).await;
    }

    /// Leave the group and stop all background tasks
    ///
    /// In-memory state is discarded without a final flush.
    pub async fn close(mut self) {
        let core = &self.core;
        if let Err(e) = core.groups.leave(&core.group, core.id).await {
            warn!(session = %core.id, error = %e, "Failed to leave group");
        }

        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(session = %self.core.id, error = %e, "Session task ended abnormally");
            }
        }
        info!(session = %self.core.id, "Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Forward group messages to the session's own transport
async fn relay(
    mut messages: mpsc::UnboundedReceiver<DataMessage>,
    outbound: OutboundSender,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            message = messages.recv() => match message {
                Some(message) => {
                    if outbound.send(message.into()).is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}
