// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
use crate::auth;
use crate::error::AppError;
use crate::metrics as keys;
use crate::storage::Store;
use crate::websocket::EventHandler;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use spaceqa_common::{ClientEvent, Identity, ServerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Create the WebSocket router
pub fn create_router<S: Store + Clone + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Handler for WebSocket connections.
///
/// The credential travels in the upgrade request — a `token` query
/// parameter or an `Authorization: Bearer` header — and authentication
/// completes before the upgrade, so a failed handshake never creates
/// connection state.
async fn ws_handler<S: Store + Clone + 'static>(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<Arc<AppState<S>>>,
) -> Result<Response, AppError> {
    let token = params
        .get("token")
        .cloned()
        .or_else(|| auth::bearer_token(&headers));

    let identity = state
        .auth
        .authenticate(
            &state.store,
            token.as_deref(),
            state.settings.limits.store_timeout(),
        )
        .await?;

    counter!(keys::WS_CONNECTION).increment(1);
    Ok(ws
        .on_upgrade(move |socket| handle_connection(socket, state, identity))
        .into_response())
}

async fn handle_connection<S: Store + Clone + 'static>(
    socket: WebSocket,
    state: Arc<AppState<S>>,
    identity: Identity,
) {
    let (mut sink, mut stream) = socket.split();

    // Outbound channel: the registry and the handler push ServerEvents here,
    // a dedicated task serializes them onto the socket.
    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<ServerEvent>(state.settings.limits.outbound_buffer);

    let handler = EventHandler::new(state, identity, outbound_tx.clone());
    gauge!(keys::WS_ACTIVE).increment(1.0);
    info!(conn_id = %handler.conn_id(), user = %handler.identity().email, "client connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    debug!(error = %err, "dropping unserializable event");
                    continue;
                },
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handler.dispatch(event).await,
                Err(err) => {
                    let malformed = ServerEvent::Error {
                        kind: "malformed_event".to_string(),
                        message: err.to_string(),
                    };
                    if outbound_tx.send(malformed).await.is_err() {
                        break;
                    }
                },
            },
            Message::Close(_) => break,
            _ => {}, // pings/pongs are handled by axum, binary frames ignored
        }
    }

    // Cleanup: the connection leaves every room subscriber set it joined.
    handler.disconnect();
    gauge!(keys::WS_ACTIVE).decrement(1.0);
    counter!(keys::WS_DISCONNECTION).increment(1);
    send_task.abort();
}
