// ABOUTME: One WebSocket client session: welcome line, command relay, engine output.
// ABOUTME: The session registers a broadcast sink and ends when either side closes.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use gambit_core::{ChannelSink, ClientSink, EngineSupervisor};
use std::sync::Arc;
use tracing::{debug, info};

/// Placeholder engine name reported while no engine is loaded.
pub const NO_ENGINE: &str = "None";

pub fn welcome_line(active: Option<&str>) -> String {
    format!("info string Connected to {}", active.unwrap_or(NO_ENGINE))
}

/// Drive one client until it disconnects or is pruned from the broadcaster.
pub async fn run_session(socket: WebSocket, supervisor: Arc<EngineSupervisor>, queue: usize) {
    let (sink, mut rx) = ChannelSink::new(queue);

    // Queue the welcome ahead of any broadcast by sending before registering.
    let active = supervisor.active_engine();
    let _ = sink.send(&welcome_line(active.as_deref()));

    // The broadcaster holds the only sender, so pruning closes this session.
    let broadcaster = Arc::clone(supervisor.broadcaster());
    let client_id = broadcaster.register(Arc::new(sink));
    info!(client = %client_id, "WebSocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let relay_supervisor = Arc::clone(&supervisor);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    debug!(command = %text.as_str(), "Client command");
                    relay_supervisor.forward_command(text.as_str()).await;
                }
                Message::Close(_) => break,
                // axum answers pings itself; binary frames are not part of the protocol.
                _ => {}
            }
        }
    });

    let writer_abort = writer.abort_handle();
    let reader_abort = reader.abort_handle();
    tokio::select! {
        _ = writer => reader_abort.abort(),
        _ = reader => writer_abort.abort(),
    }

    broadcaster.unregister(client_id);
    info!(client = %client_id, "WebSocket client disconnected");
}
