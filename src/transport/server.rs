//! The state-sync transport server.
//!
//! # Responsibilities
//! - Bind the listener (with bounded retry) and serve WebSocket upgrades
//! - Admit or refuse connections through the guard
//! - Dispatch inbound frames: rate check → size check → validation → event
//! - Answer protocol-level messages (PING) directly
//! - Provide `send` / `broadcast` to collaborators
//! - Tear down connections on close, error or heartbeat timeout
//!
//! # States
//! ```text
//! Starting ──bind ok──▶ Ready ──close()──▶ Closed
//!    │  ▲
//!    ▼  │ retry after fixed delay
//! Retrying{attempt} ──attempts exhausted──▶ Closed
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::guard::{AdmissionError, ConnectionGuard, GuardStats};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::protocol::{self, close_code, Envelope, ErrorCode, Message};
use crate::transport::connection::{Connection, ConnectionId, ConnectionInfo, Outbound};
use crate::transport::events::{ErrorPhase, EventBus, ServerEvent};
use crate::transport::listener::{bind_with_retry, ListenerError};
use crate::transport::registry::Registry;
use crate::transport::router::build_router;

/// How long `close()` waits for the HTTP server task to drain.
const SERVE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ServerState {
    Starting,
    Retrying { attempt: u32 },
    Ready,
    Closed,
}

/// Error type for server lifecycle operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("server already started")]
    AlreadyStarted,

    #[error("server is closed")]
    Closed,
}

/// Result of a broadcast. `sent + failed` equals the number of eligible
/// connections at the time of the call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastOutcome {
    pub sent: usize,
    pub failed: usize,
}

struct ServerInner {
    config: SyncConfig,
    registry: Arc<Registry>,
    guard: ConnectionGuard,
    events: EventBus,
    state: watch::Sender<ServerState>,
    bind_attempts: AtomicU32,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown: Shutdown,
    serve_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a state-sync server.
///
/// Cheap to clone; every clone drives the same instance. Construct one per
/// process and pass it to whatever needs to push state to clients.
#[derive(Clone)]
pub struct SyncServer {
    inner: Arc<ServerInner>,
}

impl SyncServer {
    pub fn new(config: SyncConfig) -> Self {
        let guard = ConnectionGuard::new(&config.limits, &config.heartbeat);
        let events = EventBus::new(config.events.buffer);
        let (state, _) = watch::channel(ServerState::Starting);

        Self {
            inner: Arc::new(ServerInner {
                config,
                registry: Arc::new(Registry::new()),
                guard,
                events,
                state,
                bind_attempts: AtomicU32::new(0),
                local_addr: Mutex::new(None),
                shutdown: Shutdown::new(),
                serve_task: Mutex::new(None),
            }),
        }
    }

    /// Bind, start serving and start the heartbeat.
    ///
    /// Bind failures are retried after `bind_retry.delay_ms`, up to
    /// `bind_retry.max_attempts`; each failure is published as an `Error`
    /// event with phase `bind`.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        match self.state() {
            ServerState::Starting => {}
            ServerState::Closed => return Err(ServerError::Closed),
            ServerState::Retrying { .. } | ServerState::Ready => {
                return Err(ServerError::AlreadyStarted)
            }
        }

        let config = &self.inner.config;
        let mut state_rx = self.inner.state.subscribe();
        let bind = bind_with_retry(
            &config.listener.bind_address,
            &config.bind_retry,
            |attempt, err| {
                self.inner.bind_attempts.store(attempt, Ordering::SeqCst);
                self.transition(ServerState::Retrying { attempt });
                metrics::record_bind_failure();
                self.inner.events.publish(ServerEvent::Error {
                    connection_id: None,
                    error: err.to_string(),
                    phase: ErrorPhase::Bind,
                });
            },
        );

        let bound = tokio::select! {
            bound = bind => bound,
            _ = async {
                let _ = state_rx.wait_for(|state| *state == ServerState::Closed).await;
            } => {
                tracing::info!("Closed while binding, abandoning start");
                return Err(ServerError::Closed);
            }
        };

        let bound = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.inner.state.send_replace(ServerState::Closed);
                tracing::error!(error = %e, "Giving up on bind");
                return Err(e.into());
            }
        };

        let addr = bound.local_addr;
        self.inner.bind_attempts.store(bound.attempts, Ordering::SeqCst);
        *self.inner.local_addr.lock().expect("local addr mutex poisoned") = Some(addr);

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .guard
            .start_heartbeat(Arc::clone(&self.inner.registry), move |id| {
                if let Some(server) = SyncServer::upgrade(&weak) {
                    server.evict(id);
                }
            });

        let app = build_router(self.clone()).into_make_service_with_connect_info::<SocketAddr>();
        let mut shutdown = self.inner.shutdown.subscribe();
        let weak = Arc::downgrade(&self.inner);
        let serve = tokio::spawn(async move {
            let result = axum::serve(bound.listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.recv().await;
                })
                .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                if let Some(server) = SyncServer::upgrade(&weak) {
                    server.inner.events.publish(ServerEvent::Error {
                        connection_id: None,
                        error: e.to_string(),
                        phase: ErrorPhase::Serve,
                    });
                }
            }
        });
        *self.inner.serve_task.lock().expect("serve task mutex poisoned") = Some(serve);

        // close() may have run while the heartbeat and serve task were
        // being set up and missed one of them.
        if !self.transition(ServerState::Ready) {
            tracing::info!("Closed during startup, releasing listener");
            self.inner.guard.stop();
            self.stop_serving().await;
            return Err(ServerError::Closed);
        }

        self.inner.events.publish(ServerEvent::Ready { addr });
        tracing::info!(
            address = %addr,
            path = %config.listener.path,
            "State-sync server ready"
        );

        Ok(addr)
    }

    /// Move to `next` unless already closed. `Closed` is terminal.
    fn transition(&self, next: ServerState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if *state == ServerState::Closed {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    /// Signal the HTTP server to stop and wait for it to drain.
    async fn stop_serving(&self) {
        self.inner.shutdown.trigger();
        let serve = self
            .inner
            .serve_task
            .lock()
            .expect("serve task mutex poisoned")
            .take();
        if let Some(serve) = serve {
            let abort = serve.abort_handle();
            if tokio::time::timeout(SERVE_DRAIN_TIMEOUT, serve).await.is_err() {
                tracing::warn!("HTTP server did not drain in time, aborting");
                abort.abort();
            }
        }
    }

    fn upgrade(weak: &Weak<ServerInner>) -> Option<SyncServer> {
        weak.upgrade().map(|inner| SyncServer { inner })
    }

    /// Admit a new connection from `source` whose socket task drains
    /// `outbound`.
    ///
    /// On refusal nothing is registered; the caller closes the socket with
    /// `AdmissionError::close_code`.
    pub fn on_connect(
        &self,
        source: IpAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Result<ConnectionId, AdmissionError> {
        if self.state() == ServerState::Closed {
            return Err(AdmissionError::ShuttingDown);
        }

        let id = self.inner.guard.next_connection_id();
        if let Err(refusal) = self.inner.guard.try_admit(source) {
            tracing::warn!(source = %source, error = %refusal, "Connection refused");
            metrics::record_admission_refused();
            return Err(refusal);
        }

        self.inner.guard.open_rate_limit(id);
        self.inner
            .registry
            .insert(Connection::new(id, source, outbound));

        // close() may have drained the registry between the check above and
        // the insert.
        if self.state() == ServerState::Closed {
            self.on_close(id);
            return Err(AdmissionError::ShuttingDown);
        }

        metrics::record_connection_opened(self.inner.registry.len());
        tracing::debug!(connection_id = %id, source = %source, "Client connected");
        self.inner.events.publish(ServerEvent::ClientConnected { id });

        Ok(id)
    }

    /// Handle one inbound text frame.
    pub fn on_message(&self, id: ConnectionId, raw: &str) {
        let Some(conn) = self.inner.registry.get(id) else {
            tracing::trace!(connection_id = %id, "Frame for unknown connection dropped");
            return;
        };

        if !self.inner.guard.check_rate_limit(id) {
            tracing::warn!(connection_id = %id, "Rate limit exceeded");
            self.nack(id, None, "Rate limit exceeded", ErrorCode::RateLimited);
            return;
        }

        let max_bytes = self.inner.config.listener.max_message_bytes;
        if raw.len() > max_bytes {
            self.nack(
                id,
                None,
                format!("Message exceeds {} bytes", max_bytes),
                ErrorCode::PayloadTooLarge,
            );
            return;
        }

        let envelope = match protocol::validate(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Invalid message");
                self.nack(id, protocol::extract_id(raw), e.to_string(), ErrorCode::InvalidMessage);
                return;
            }
        };

        conn.record_message();
        metrics::record_message(envelope.kind().as_str());

        let reply = match &envelope.message {
            Message::Ping(_) => {
                conn.mark_alive();
                Some(Envelope::pong(envelope.timestamp.clone()))
            }
            Message::Pong(_) => {
                conn.mark_alive();
                None
            }
            Message::StateUpdate(_) | Message::Ack(_) | Message::Nack(_) => None,
        };

        self.inner.events.publish(ServerEvent::Message { id, envelope });

        if let Some(reply) = reply {
            self.send(id, &reply);
        }
    }

    /// Handle a binary frame. The wire is JSON text, so these are rejected
    /// after the rate check.
    pub fn on_binary(&self, id: ConnectionId) {
        if self.inner.registry.get(id).is_none() {
            return;
        }
        if !self.inner.guard.check_rate_limit(id) {
            self.nack(id, None, "Rate limit exceeded", ErrorCode::RateLimited);
            return;
        }
        self.nack(id, None, "Binary frames are not supported", ErrorCode::InvalidMessage);
    }

    /// A WebSocket pong frame arrived.
    pub fn on_pong(&self, id: ConnectionId) {
        if let Some(conn) = self.inner.registry.get(id) {
            conn.mark_alive();
        }
    }

    /// Forget a connection. Returns false if it was already gone, so racing
    /// close paths release guard bookkeeping exactly once.
    pub fn on_close(&self, id: ConnectionId) -> bool {
        let Some(conn) = self.inner.registry.remove(id) else {
            return false;
        };

        conn.terminate();
        self.inner.guard.untrack_connection(conn.source());
        self.inner.guard.clear_rate_limit(id);

        metrics::record_connection_closed(self.inner.registry.len());
        tracing::debug!(
            connection_id = %id,
            messages = conn.message_count(),
            "Client disconnected"
        );
        self.inner
            .events
            .publish(ServerEvent::ClientDisconnected { id });
        true
    }

    /// Isolate a socket failure to its connection: report it and tear the
    /// connection down.
    pub fn on_error(&self, id: ConnectionId, error: impl std::fmt::Display) {
        let error = error.to_string();
        tracing::warn!(connection_id = %id, error = %error, "Client socket error");
        self.inner.events.publish(ServerEvent::Error {
            connection_id: Some(id),
            error,
            phase: ErrorPhase::ClientError,
        });
        self.on_close(id);
    }

    /// Heartbeat timeout: drop the socket without a close handshake.
    fn evict(&self, id: ConnectionId) {
        if let Some(conn) = self.inner.registry.get(id) {
            conn.terminate();
        }
        if self.on_close(id) {
            metrics::record_heartbeat_eviction();
        }
    }

    fn nack(&self, id: ConnectionId, correlation_id: Option<String>, reason: impl Into<String>, code: ErrorCode) {
        metrics::record_nack(code.as_str());
        self.send(id, &Envelope::nack(correlation_id, reason, code));
    }

    /// Best-effort send. False if the connection is unknown or not open.
    pub fn send(&self, id: ConnectionId, envelope: &Envelope) -> bool {
        let Some(conn) = self.inner.registry.get(id) else {
            return false;
        };
        match envelope.to_json() {
            Ok(text) => conn.send(Outbound::Text(text)),
            Err(e) => {
                tracing::error!(connection_id = %id, error = %e, "Failed to serialize envelope");
                false
            }
        }
    }

    /// Send to every registered connection except `exclude`.
    pub fn broadcast(&self, envelope: &Envelope, exclude: Option<ConnectionId>) -> BroadcastOutcome {
        let targets: Vec<_> = self
            .inner
            .registry
            .all()
            .into_iter()
            .filter(|conn| Some(conn.id()) != exclude)
            .collect();

        let mut outcome = BroadcastOutcome::default();
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize broadcast envelope");
                outcome.failed = targets.len();
                return outcome;
            }
        };

        for conn in targets {
            if conn.send(Outbound::Text(text.clone())) {
                outcome.sent += 1;
            } else {
                outcome.failed += 1;
            }
        }

        metrics::record_broadcast(outcome.sent, outcome.failed);
        outcome
    }

    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.inner.registry.get(id).map(|conn| conn.info())
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.inner.registry.infos()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ServerState> {
        self.inner.state.subscribe()
    }

    /// Bind attempts made so far, including the successful one.
    pub fn bind_attempts(&self) -> u32 {
        self.inner.bind_attempts.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock().expect("local addr mutex poisoned")
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn guard_stats(&self) -> GuardStats {
        self.inner.guard.stats()
    }

    /// Open connections currently accounted to `source`.
    pub fn source_connections(&self, source: IpAddr) -> usize {
        self.inner.guard.source_connections(source)
    }

    /// Whether `source` could open another connection right now.
    pub fn would_admit(&self, source: IpAddr) -> bool {
        self.inner.guard.check_connection_limit(source)
    }

    /// Stop the heartbeat, close every socket, and release the listener.
    /// Safe to call more than once.
    pub async fn close(&self) {
        if self.inner.state.send_replace(ServerState::Closed) == ServerState::Closed {
            return;
        }

        self.inner.guard.stop();

        let mut closed = 0;
        for conn in self.inner.registry.all() {
            conn.close(close_code::NORMAL, "Server closing");
            if self.on_close(conn.id()) {
                closed += 1;
            }
        }
        self.inner.guard.reset();
        self.stop_serving().await;

        tracing::info!(connections_closed = closed, "State-sync server closed");
    }
}

/// Close `old` and hand back `new`, for swapping server instances.
pub async fn replace(old: SyncServer, new: SyncServer) -> SyncServer {
    old.close().await;
    new
}
