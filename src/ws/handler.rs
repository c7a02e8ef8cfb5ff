//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::{AppState, PresenceHandle};
use crate::game::session::{PlayerSession, SessionError, SessionEvent, SessionMailbox};
use crate::http::middleware::{token_from_request, verify_jwt, JwtClaims};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Messages buffered for a slow client before new ones are dropped
const OUTBOUND_BUFFER: usize = 256;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    // Verify JWT token before upgrading
    let verified = token_from_request(query.token.as_deref(), &headers)
        .and_then(|token| verify_jwt(token, &state.config.jwt_secret));

    match verified {
        Ok(claims) => {
            info!(user_id = %claims.sub, "WebSocket upgrade for authenticated user");
            ws.on_upgrade(move |socket| handle_socket(socket, claims, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            e.into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, claims: JwtClaims, state: AppState) {
    let user_id = claims.sub;
    info!(user_id = %user_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let profile = match state
        .store
        .ensure_player(user_id, &claims.default_display_name())
        .await
    {
        Ok(profile) => profile,
        Err(e) => {
            error!(user_id = %user_id, error = %e, "Failed to load player");
            let msg = ServerMsg::error("profile_unavailable", "Player profile could not be loaded");
            let _ = send_msg(&mut ws_sink, &msg).await;
            return;
        }
    };

    let Some(character) = state.characters.get_or_default(profile.character_id) else {
        error!(user_id = %user_id, character_id = profile.character_id, "No characters loaded");
        let msg = ServerMsg::error("character_unavailable", "No playable character");
        let _ = send_msg(&mut ws_sink, &msg).await;
        return;
    };

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
    tokio::spawn(write_loop(user_id, ws_sink, out_rx));

    let public_id = profile.public_id.clone();
    let display_name = profile.display_name.clone();
    let session = PlayerSession::new(profile, character, out_tx.clone(), state.matchmaking.clone());
    let mailbox = session.mailbox();

    state.presence.register(
        &public_id,
        PresenceHandle {
            user_id,
            display_name,
            mailbox: mailbox.clone(),
            connected_at: unix_millis(),
        },
    );

    let mut session_task = tokio::spawn(session.run());

    // A newer connection of the same account stops the worker first
    let replaced = tokio::select! {
        _ = read_loop(user_id, ws_stream, &mailbox, &out_tx) => false,
        joined = &mut session_task => {
            if let Err(e) = joined {
                error!(user_id = %user_id, error = %e, "Session worker failed");
            }
            true
        }
    };

    if !replaced {
        let _ = mailbox.send(SessionEvent::Disconnected);
        if let Err(e) = session_task.await {
            error!(user_id = %user_id, error = %e, "Session worker failed");
        }
    }

    state.presence.unregister(&public_id, &mailbox);
    info!(user_id = %user_id, replaced, "WebSocket connection closed");
}

/// Outbound queue -> WebSocket, until every sender is gone
async fn write_loop(
    user_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = out_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(user_id = %user_id, error = %e, "WebSocket send failed");
            return;
        }
    }
    let _ = ws_sink.close().await;
}

/// WebSocket -> session mailbox
async fn read_loop(
    user_id: Uuid,
    mut ws_stream: SplitStream<WebSocket>,
    mailbox: &SessionMailbox,
    out_tx: &mpsc::Sender<ServerMsg>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !on_text(user_id, &text, &rate_limiter, mailbox, out_tx) {
                    debug!(user_id = %user_id, "Session mailbox closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Route one text frame. Returns false once the session is gone.
///
/// Frames over the rate limit are answered with an error so the client can
/// resync its prediction instead of waiting for an acknowledgement.
fn on_text(
    user_id: Uuid,
    text: &str,
    rate_limiter: &ConnectionRateLimiter,
    mailbox: &SessionMailbox,
    out_tx: &mpsc::Sender<ServerMsg>,
) -> bool {
    if !rate_limiter.check_input() {
        warn!(user_id = %user_id, "Rate limited input message");
        let _ = out_tx.try_send(SessionError::RateLimited.to_msg());
        return true;
    }

    match serde_json::from_str::<ClientMsg>(text) {
        Ok(client_msg) => mailbox.send(SessionEvent::Client(client_msg)).is_ok(),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Failed to parse client message");
            let _ = out_tx.try_send(SessionError::Malformed.to_msg());
            true
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
