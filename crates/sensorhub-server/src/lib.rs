use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use opentelemetry::metrics::{Counter, MeterProvider};
use opentelemetry_prometheus::exporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use sensorhub_config::AppConfig;
use sensorhub_core::{RecordStore, StreamId, SystemClock};
use sensorhub_db::{DbClient, MemoryStore};
use sensorhub_session::{
    outbound_channel, ChannelGroups, Session, SessionContext, SessionSettings,
};
use serde::Deserialize;

pub struct AppState {
    ready: AtomicBool,
    registry: Registry,
    #[allow(dead_code)]
    provider: SdkMeterProvider,
    requests_total: Counter<u64>,
    connections_total: Counter<u64>,
    messages_total: Counter<u64>,
    sessions: SessionContext,
}

pub fn build_app(sessions: SessionContext) -> (Router, Arc<AppState>) {
    // Prometheus exporter via OpenTelemetry
    let registry = Registry::new();
    let reader = exporter()
        .with_registry(registry.clone())
        .build()
        .expect("prom exporter");
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    let meter = provider.meter("sensorhub-server");

    let requests_total = meter
        .u64_counter("sensorhub_requests_total")
        .with_description("Total HTTP requests served")
        .init();
    let connections_total = meter
        .u64_counter("sensorhub_connections_total")
        .with_description("WebSocket sessions opened")
        .init();
    let messages_total = meter
        .u64_counter("sensorhub_messages_total")
        .with_description("Inbound sensor messages received")
        .init();

    let state = Arc::new(AppState {
        ready: AtomicBool::new(false),
        registry,
        provider,
        requests_total,
        connections_total,
        messages_total,
        sessions,
    });

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/ws/sensor-data/", get(sensor_socket))
        .route("/ws/sensor-data", get(sensor_socket))
        .with_state(Arc::clone(&state));

    (router, state)
}

/// Session collaborators derived from configuration
pub fn session_context(cfg: &AppConfig, store: Arc<dyn RecordStore>) -> SessionContext {
    SessionContext {
        store,
        groups: Arc::new(ChannelGroups::new()),
        clock: Arc::new(SystemClock),
        settings: SessionSettings {
            group: cfg.group(),
            liveness_interval: cfg.liveness_interval(),
            no_data_threshold: cfg.no_data_threshold(),
            rollup_interval: cfg.rollup_interval(),
            store_timeout: cfg.store_timeout(),
        },
    }
}

/// Record store selected at startup
pub struct StoreHandle {
    pub records: Arc<dyn RecordStore>,
    db: Option<DbClient>,
}

impl StoreHandle {
    pub fn is_database(&self) -> bool {
        self.db.is_some()
    }

    /// Release database connections, if any
    pub async fn close(self) {
        if let Some(db) = self.db {
            db.close().await;
            tracing::info!("Database pool closed");
        }
    }
}

/// Connect the configured record store, or fall back to memory
pub async fn connect_store(cfg: &AppConfig) -> Result<StoreHandle> {
    match cfg.database_url() {
        Some(url) => {
            let client = DbClient::new(&url)
                .await
                .context("Failed to connect to database")?;
            client.ping().await.context("Database ping failed")?;
            tracing::info!("Connected to database");
            Ok(StoreHandle {
                records: Arc::new(client.clone()),
                db: Some(client),
            })
        }
        None => {
            tracing::warn!("No database configured; hourly records are kept in memory");
            Ok(StoreHandle {
                records: Arc::new(MemoryStore::new()),
                db: None,
            })
        }
    }
}

pub fn set_ready(state: &Arc<AppState>, is_ready: bool) {
    state.ready.store(is_ready, Ordering::Relaxed);
}

async fn healthz(State(state): State<Arc<AppState>>) -> StatusCode {
    state.requests_total.add(1, &[]);
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics(
    State(state): State<Arc<AppState>>,
) -> (
    [(axum::http::header::HeaderName, axum::http::HeaderValue); 1],
    String,
) {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::warn!(error=?e, "failed to encode metrics");
    }
    let body = String::from_utf8(buf).unwrap_or_default();
    let header = (
        header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    ([header], body)
}

#[derive(Deserialize)]
struct ConnectQuery {
    /// Device whose hourly records this connection writes
    device: Option<String>,
}

async fn sensor_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<ConnectQuery>,
) -> impl IntoResponse {
    state.requests_total.add(1, &[]);
    let stream = q.device.filter(|d| !d.is_empty()).map(StreamId::new);
    ws.on_upgrade(move |socket| serve_socket(socket, state, stream))
}

/// Run one session for the lifetime of a WebSocket
async fn serve_socket(mut socket: WebSocket, state: Arc<AppState>, stream: Option<StreamId>) {
    let (tx, mut rx) = outbound_channel();
    let session = match Session::open(&state.sessions, stream, tx).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "failed to open session");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    state.connections_total.add(1, &[]);

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    state.messages_total.add(1, &[]);
                    session.receive(&text).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    state.messages_total.add(1, &[]);
                    session.receive(&String::from_utf8_lossy(&bytes)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(session = %session.id(), error = %e, "websocket receive failed");
                    break;
                }
            },
            outbound = rx.recv() => match outbound {
                Some(message) => match message.to_json() {
                    Ok(json) => {
                        if socket.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to encode outbound message"),
                },
                None => break,
            },
        }
    }

    session.close().await;
}
