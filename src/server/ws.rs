use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use super::api::AppState;
use crate::relay::{ClientEvent, RelayHandle};

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(state.relay, socket))
}

/// Pump one socket: inbound frames go to the relay in arrival order,
/// relay events go back out as JSON text frames.
async fn handle_ws(relay: RelayHandle, socket: WebSocket) {
    let Some((conn, mut rx)) = relay.connect().await else {
        warn!("relay unavailable, dropping socket");
        return;
    };

    let (mut sender, mut receiver) = socket.split();

    // Ends when the relay drops this connection's channel.
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(event = event.name(), error = %err, "failed to encode event"),
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => relay.dispatch(conn.clone(), event),
                Err(err) => debug!(%conn, error = %err, "dropping malformed frame"),
            },
            Ok(Message::Binary(_)) => debug!(%conn, "dropping binary frame"),
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                debug!(%conn, error = %err, "socket error");
                break;
            }
        }
    }

    relay.disconnect(conn);
    let _ = send_task.await;
}
