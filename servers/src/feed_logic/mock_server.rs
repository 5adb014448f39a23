use crate::feed_logic::config::MockSettings;
use crate::feed_logic::mock_events::next_frame;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

/// Shared state for the demo producer's handlers.
#[derive(Clone)]
pub struct MockState {
    settings: Arc<MockSettings>,
    clients: Arc<AtomicUsize>,
    shutdown: broadcast::Sender<()>,
}

impl MockState {
    pub fn new(settings: MockSettings, shutdown: broadcast::Sender<()>) -> Self {
        Self {
            settings: Arc::new(settings),
            clients: Arc::new(AtomicUsize::new(0)),
            shutdown,
        }
    }
}

pub fn router(state: MockState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn run(state: MockState) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    let mut shutdown = state.shutdown.subscribe();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    log::info!("Mock feed listening on ws://{}/ws", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("Mock feed shutting down.");
        })
        .await?;
    Ok(())
}

async fn health_handler(State(state): State<MockState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.clients.load(Ordering::Relaxed),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<MockState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Emits one frame per interval until the client leaves or the server stops.
async fn handle_socket(mut socket: WebSocket, state: MockState) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    let connected = state.clients.fetch_add(1, Ordering::Relaxed) + 1;
    log::info!("Client {} connected ({} active)", client_id, connected);

    let mut shutdown = state.shutdown.subscribe();
    let mut ticker = tokio::time::interval(state.settings.emit_interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            _ = ticker.tick() => {
                let (frame, malformed) = next_frame(&mut rand::rng(), state.settings.malformed_ratio);
                if malformed {
                    log::warn!("Sending malformed frame to client {}: {}", client_id, frame);
                } else {
                    log::debug!("Sending event to client {}", client_id);
                }
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }

    let remaining = state.clients.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
    log::info!("Client {} disconnected ({} active)", client_id, remaining);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use lib_feed::core::Frame;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn settings(malformed_ratio: f64) -> MockSettings {
        MockSettings {
            port: 0,
            emit_interval: Duration::from_millis(20),
            malformed_ratio,
            log_dir: PathBuf::from("./logs"),
            log_level: log::LevelFilter::Info,
        }
    }

    async fn serve(state: MockState) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn streams_valid_events_to_websocket_clients() {
        let (shutdown, _) = broadcast::channel(1);
        let addr = serve(MockState::new(settings(0.0), shutdown.clone())).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        for _ in 0..3 {
            let message = tokio::time::timeout(Duration::from_secs(5), ws.next()).await.unwrap().unwrap().unwrap();
            let text = match message {
                WsMessage::Text(text) => text,
                other => panic!("expected a text frame, got {:?}", other),
            };
            assert!(matches!(Frame::parse(text.as_str()), Ok(Frame::Event(_))));
        }

        let _ = shutdown.send(());
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(Ok(message)) = ws.next().await {
                if message.is_close() {
                    break;
                }
            }
        })
        .await
        .expect("server closes the socket on shutdown");
    }

    #[tokio::test]
    async fn health_reports_connected_clients() {
        let (shutdown, _) = broadcast::channel(1);
        let state = MockState::new(settings(0.0), shutdown);
        let state_view = state.clone();
        let clients = Arc::clone(&state.clients);
        let addr = serve(state).await;

        let (_ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while clients.load(Ordering::Relaxed) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let response = health_handler(State(state_view)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["clients"], 1);
    }
}
