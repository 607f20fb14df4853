//! WebSocket signaling endpoint.
//!
//! Each upgraded socket is split: the write half goes to a `ConnectionActor`,
//! the read half stays in [`run_connection`], which decodes frames, drives
//! the heartbeat, and leaves the room when the socket goes away.

use crate::actors::{ActorMetrics, ConnectionActor, RoomControllerHandle};
use crate::config::Config;
use crate::handlers::{ConnectionContext, Dispatcher};
use crate::observability::metrics as prom;

use super::heartbeat::{HeartbeatAction, HeartbeatMonitor};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use common::types::ConnectionId;
use futures_util::{Sink, Stream, StreamExt};
use room_protocol::{codec, ServerEvent};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How long to wait for the writer to flush its close frame.
const WRITER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Socket-level limits taken from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct TransportSettings {
    pub heartbeat_interval: Duration,
    pub max_missed_heartbeats: u32,
    pub max_upload_bytes: usize,
    pub max_message_bytes: usize,
}

impl From<&Config> for TransportSettings {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            max_missed_heartbeats: config.max_missed_heartbeats,
            max_upload_bytes: config.max_upload_bytes,
            max_message_bytes: config.max_message_bytes,
        }
    }
}

/// Shared state for the signaling router.
#[derive(Debug, Clone)]
pub struct SignalingState {
    pub controller: RoomControllerHandle,
    pub metrics: Arc<ActorMetrics>,
    pub settings: TransportSettings,
    /// Cancelled on shutdown; every connection gets a child token.
    pub shutdown: CancellationToken,
}

/// Router exposing the signaling socket at `/ws`.
pub fn signaling_router(state: SignalingState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SignalingState>) -> Response {
    let limit = state.settings.max_message_bytes;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SignalingState) {
    let (sink, stream) = socket.split();
    run_connection(sink, stream, state).await;
}

/// Serve one signaling connection until it closes.
///
/// Always leaves the connection's room before returning.
#[instrument(skip_all, name = "rs.transport.ws", fields(connection_id = tracing::field::Empty))]
pub async fn run_connection<S, R, E>(sink: S, mut stream: R, state: SignalingState)
where
    S: Sink<Message> + Send + Unpin + 'static,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let connection_id = ConnectionId::new();
    tracing::Span::current().record("connection_id", tracing::field::display(connection_id));

    let token = state.shutdown.child_token();
    let (connection, writer) =
        ConnectionActor::spawn(connection_id, sink, token.clone(), Arc::clone(&state.metrics));
    state.metrics.connection_opened();

    info!(
        target: "rs.transport.ws",
        connection_id = %connection_id,
        "Connection opened"
    );

    if let Err(e) = connection.deliver(ServerEvent::Connected { id: connection_id }) {
        debug!(
            target: "rs.transport.ws",
            connection_id = %connection_id,
            error = %e,
            "Failed to queue connected frame"
        );
    }

    let dispatcher = Dispatcher::new(state.controller.clone(), state.settings.max_upload_bytes);
    let mut ctx = ConnectionContext::new(connection.clone());

    let interval = state.settings.heartbeat_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut heartbeat = HeartbeatMonitor::new(state.settings.max_missed_heartbeats);

    let reason = loop {
        tokio::select! {
            () = token.cancelled() => break "closed by server",

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    heartbeat.on_activity();
                    handle_text(&dispatcher, &mut ctx, &text).await;
                }
                Some(Ok(Message::Close(_))) | None => break "closed by client",
                Some(Ok(_)) => heartbeat.on_activity(),
                Some(Err(e)) => {
                    debug!(
                        target: "rs.transport.ws",
                        connection_id = %connection_id,
                        error = %e,
                        "Socket read failed"
                    );
                    break "read error";
                }
            },

            _ = ticker.tick() => match heartbeat.on_tick() {
                HeartbeatAction::SendPing => {
                    if connection.heartbeat().await.is_err() {
                        break "writer stopped";
                    }
                }
                HeartbeatAction::TimedOut => {
                    prom::record_heartbeat_timeout();
                    info!(
                        target: "rs.transport.ws",
                        connection_id = %connection_id,
                        missed = heartbeat.missed(),
                        "Heartbeat timeout, closing connection"
                    );
                    break "heartbeat timeout";
                }
            },
        }
    };

    dispatcher.disconnect(&mut ctx).await;

    // The writer may already be gone; the close frame is best effort.
    let _ = connection.close(reason).await;
    match tokio::time::timeout(WRITER_STOP_TIMEOUT, writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(
                target: "rs.transport.ws",
                connection_id = %connection_id,
                error = ?e,
                "Connection writer panicked"
            );
            state.metrics.record_panic(crate::actors::ActorType::Connection);
        }
        Err(_) => {
            connection.cancel();
            warn!(
                target: "rs.transport.ws",
                connection_id = %connection_id,
                "Connection writer did not stop in time"
            );
        }
    }

    state.metrics.connection_closed();
    info!(
        target: "rs.transport.ws",
        connection_id = %connection_id,
        reason,
        "Connection closed"
    );
}

async fn handle_text(dispatcher: &Dispatcher, ctx: &mut ConnectionContext, text: &str) {
    match codec::decode_client(text) {
        Ok(event) => dispatcher.dispatch(ctx, event).await,
        Err(e) => {
            prom::record_error("protocol");
            debug!(
                target: "rs.transport.ws",
                connection_id = %ctx.connection_id(),
                error = %e,
                "Ignoring undecodable frame"
            );
        }
    }
}
