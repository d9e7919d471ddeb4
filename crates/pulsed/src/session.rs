//! Per-connection protocol driver.
//!
//! Each socket is owned by one task driving a small state machine:
//! `Unauthenticated` until a valid `login` frame binds a principal
//! identity, then `Authenticated` until the transport closes. Credentials
//! ride in the first application message, not the transport handshake, so
//! a failed login leaves the socket open for a retry with a corrected
//! token. Undecodable or out-of-place frames are logged and dropped; none
//! of them are fatal to the connection, let alone the hub.

use crate::error::HubError;
use crate::metrics::{counters, gauges};
use crate::registry::{Role, SinkHandle};
use crate::relay;
use crate::server::HubState;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pulse_common::telemetry::{DynamicData, StaticData};
use pulse_common::wire::{self, Envelope, Login, OutboundEvent};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsRecv = SplitStream<WebSocketStream<TcpStream>>;

impl Role {
    /// Map a WebSocket upgrade path to a connection role.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/client" => Some(Role::Client),
            "/reporter" => Some(Role::Reporter),
            _ => None,
        }
    }
}

/// Identity bound to a session by a successful login.
#[derive(Debug, Clone)]
struct AuthBinding {
    identity: String,
    /// Registration instant of this session's sink, used to guard
    /// unregistration against a replacement session.
    registered_at: Instant,
}

/// Protocol state of one connection.
#[derive(Debug, Clone)]
enum SessionState {
    Unauthenticated,
    Authenticated(AuthBinding),
}

/// Everything `handle_frame` needs; the socket halves stay outside so the
/// dispatch logic is testable without a transport.
struct Session {
    hub: Arc<HubState>,
    role: Role,
    /// Sender half of this connection's outbound queue. Held until a
    /// successful login hands it to the registry.
    pending_tx: Option<mpsc::Sender<OutboundEvent>>,
    state: SessionState,
}

impl Session {
    fn new(hub: Arc<HubState>, role: Role, tx: mpsc::Sender<OutboundEvent>) -> Self {
        Self {
            hub,
            role,
            pending_tx: Some(tx),
            state: SessionState::Unauthenticated,
        }
    }

    /// Dispatch one inbound frame through the state machine.
    async fn handle_frame(&mut self, frame: &str) {
        let envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "dropping undecodable frame");
                counters::frames_dropped_total("malformed");
                return;
            }
        };

        match envelope.e.as_str() {
            wire::EVENT_LOGIN => self.handle_login(envelope).await,
            wire::EVENT_STATIC_DATA => self.handle_static_data(envelope).await,
            wire::EVENT_DYNAMIC_DATA => self.handle_dynamic_data(envelope),
            other => {
                tracing::debug!(event = other, "ignoring unknown event");
                counters::frames_dropped_total("unknown_event");
            }
        }
    }

    async fn handle_login(&mut self, envelope: Envelope) {
        if matches!(self.state, SessionState::Authenticated(_)) {
            tracing::debug!("dropping duplicate login");
            counters::frames_dropped_total("duplicate_login");
            return;
        }

        let login: Login = match envelope.payload() {
            Ok(login) => login,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed login");
                counters::frames_dropped_total("malformed");
                return;
            }
        };

        let authenticated = match self.role {
            Role::Client => self.hub.backend.authenticate_client(&login.auth_token).await,
            Role::Reporter => {
                self.hub
                    .backend
                    .authenticate_reporter(&login.auth_token)
                    .await
            }
        };
        let identity = match authenticated {
            Ok(identity) => identity,
            Err(e) => {
                // Stay unauthenticated; the peer may retry with a good token.
                tracing::debug!(error = %e, role = self.role.as_str(), "login rejected");
                counters::logins_total(self.role.as_str(), "rejected");
                return;
            }
        };

        let Some(tx) = self.pending_tx.take() else {
            tracing::debug!("sink already registered, dropping login");
            return;
        };
        let handle = SinkHandle::new(tx);
        let registered_at = handle.registered_at;
        if let Some(old) = self.hub.registry(self.role).register(&identity, handle) {
            // Closing the old handle disconnects the previous session.
            tracing::debug!(%identity, "replacing previous connection");
            drop(old);
        }

        counters::logins_total(self.role.as_str(), "ok");
        tracing::info!(role = self.role.as_str(), %identity, "connection authenticated");
        self.state = SessionState::Authenticated(AuthBinding {
            identity,
            registered_at,
        });
    }

    /// Identity check shared by the telemetry handlers: reporter-only
    /// events are dropped for clients and for unauthenticated sessions.
    fn reporter_binding(&self) -> Option<&AuthBinding> {
        match (&self.state, self.role) {
            (SessionState::Authenticated(binding), Role::Reporter) => Some(binding),
            (SessionState::Authenticated(_), Role::Client) => {
                tracing::debug!("dropping reporter event from client connection");
                counters::frames_dropped_total("wrong_role");
                None
            }
            (SessionState::Unauthenticated, _) => {
                tracing::debug!("dropping event from unauthenticated connection");
                counters::frames_dropped_total("unauthenticated");
                None
            }
        }
    }

    async fn handle_static_data(&mut self, envelope: Envelope) {
        let Some(binding) = self.reporter_binding() else {
            return;
        };
        let machine = binding.identity.clone();

        let data: StaticData = match envelope.payload() {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed static data");
                counters::frames_dropped_total("malformed");
                return;
            }
        };

        // Fire-and-forget relative to registry state; a persistence failure
        // only costs this descriptor.
        match self.hub.backend.persist_static_data(&machine, data).await {
            Ok(()) => counters::static_data_persisted_total("ok"),
            Err(e) => {
                tracing::warn!(error = %e, %machine, "failed to persist static data");
                counters::static_data_persisted_total("error");
            }
        }
    }

    fn handle_dynamic_data(&mut self, envelope: Envelope) {
        let Some(binding) = self.reporter_binding() else {
            return;
        };
        let machine = binding.identity.clone();

        let data: DynamicData = match envelope.payload() {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed dynamic data");
                counters::frames_dropped_total("malformed");
                return;
            }
        };

        relay::relay_dynamic_data(&self.hub, &machine, data);
    }
}

/// Accept the WebSocket upgrade, derive the connection role from the
/// upgrade path, and drive the session until the transport closes.
///
/// # Errors
///
/// Returns an error if the upgrade fails or the transport errors mid
/// session; per-frame problems are absorbed by the session itself.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<HubState>,
) -> Result<(), HubError> {
    let role_cell = Arc::new(OnceLock::new());
    let cell = role_cell.clone();
    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        move |req: &Request, resp: Response| match Role::from_path(req.uri().path()) {
            Some(role) => {
                let _ = cell.set(role);
                Ok(resp)
            }
            None => {
                let mut not_found = ErrorResponse::new(Some("unknown endpoint".to_string()));
                *not_found.status_mut() = StatusCode::NOT_FOUND;
                Err(not_found)
            }
        },
    )
    .await
    .map_err(HubError::WebSocket)?;

    let Some(role) = role_cell.get().copied() else {
        return Err(HubError::ConnectionClosed);
    };
    tracing::debug!(role = role.as_str(), peer = %peer_addr, "connection open");
    gauges::inc_connections(role.as_str());

    let (tx, mut deliver_rx) = mpsc::channel(state.config.send_queue);
    let mut session = Session::new(state.clone(), role, tx);
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let result = run_session(&mut ws_tx, &mut ws_rx, &mut deliver_rx, &mut session).await;

    if let SessionState::Authenticated(binding) = &session.state {
        state
            .registry(role)
            .remove_if(&binding.identity, binding.registered_at);
        tracing::debug!(role = role.as_str(), identity = %binding.identity, "connection closed");
    }
    gauges::dec_connections(role.as_str());

    result
}

/// Main select loop for one connection: inbound frames, outbound events,
/// and keepalive ticks.
async fn run_session(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    deliver_rx: &mut mpsc::Receiver<OutboundEvent>,
    session: &mut Session,
) -> Result<(), HubError> {
    let mut ping_interval = interval(Duration::from_secs(session.hub.config.ping_interval));
    let idle_timeout = Duration::from_secs(session.hub.config.idle_timeout);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => session.handle_frame(&text).await,
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => session.handle_frame(text).await,
                        Err(_) => {
                            tracing::debug!("dropping non-UTF-8 binary frame");
                            counters::frames_dropped_total("malformed");
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            tracing::debug!("failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(HubError::WebSocket(e)),
                    _ => {}
                }
            }
            delivery = deliver_rx.recv() => {
                match delivery {
                    Some(event) => {
                        last_activity = Instant::now();
                        match event.encode() {
                            Ok(frame) => {
                                ws_tx.send(Message::Text(frame)).await.map_err(HubError::WebSocket)?;
                            }
                            Err(e) => tracing::warn!(error = %e, "dropping unencodable event"),
                        }
                    }
                    // All senders gone: this session was replaced by a newer
                    // login for the same identity.
                    None => {
                        tracing::debug!("session replaced, closing");
                        return Ok(());
                    }
                }
            }
            _ = ping_interval.tick() => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::debug!("idle timeout reached, closing connection");
                    return Ok(());
                }
                if let Err(e) = ws_tx.send(Message::Ping(Vec::new())).await {
                    tracing::debug!("failed to send ping: {}", e);
                }
            }
        }
    }
}
