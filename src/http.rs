//! HTTP diagnostics surface
//!
//! Serves the collaborator endpoints: `/health`, `/info`, and `/stats`
//! return JSON snapshots sourced from the actor's read-only stats
//! query; `/` serves a static test page. Runs on its own listen
//! address so the WebSocket accept loop stays a plain TCP loop.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::error::AppError;
use crate::server::ServerCommand;
use crate::types::now_rfc3339;

/// Shared handler state: the actor's command channel
#[derive(Clone)]
pub struct HttpState {
    pub cmd_tx: mpsc::Sender<ServerCommand>,
}

/// Response envelope used by every JSON endpoint
#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    timestamp: String,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: now_rfc3339(),
        })
    }

    fn err(message: &str) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: now_rfc3339(),
        })
    }
}

/// Run the diagnostics HTTP server until the process exits
pub async fn run_http_server(
    addr: String,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/info", get(info_endpoint))
        .route("/stats", get(stats))
        .fallback(not_found)
        .with_state(HttpState { cmd_tx })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP diagnostics listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Query the actor for a stats snapshot
async fn fetch_stats(state: &HttpState) -> Option<crate::server::ServerStats> {
    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .cmd_tx
        .send(ServerCommand::GetStats { reply: reply_tx })
        .await
        .ok()?;
    reply_rx.await.ok()
}

async fn health(State(state): State<HttpState>) -> impl IntoResponse {
    match fetch_stats(&state).await {
        Some(stats) => (StatusCode::OK, ApiResponse::ok(stats)),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse::err("stats query failed"),
        ),
    }
}

async fn stats(State(state): State<HttpState>) -> impl IntoResponse {
    health(State(state)).await
}

async fn info_endpoint(State(state): State<HttpState>) -> impl IntoResponse {
    let uptime = fetch_stats(&state).await.map(|s| s.uptime).unwrap_or(0);
    let info = serde_json::json!({
        "name": "chatroom",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Real-time WebSocket chat server",
        "features": [
            "Real-time messaging",
            "User presence",
            "Typing indicators",
            "Message history",
            "Rate limiting",
            "Heartbeat monitoring",
            "CORS support",
            "Health checks",
        ],
        "endpoints": {
            "health": "/health",
            "info": "/info",
            "stats": "/stats",
        },
        "uptime": uptime,
    });
    ApiResponse::ok(info)
}

async fn not_found(uri: axum::http::Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        ApiResponse::<()>::err(&format!("Route {} not found", uri.path())),
    )
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Minimal browser client for manual testing
const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Chatroom Test Client</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 20px; background: #f5f5f5; }
    .container { max-width: 720px; margin: 0 auto; background: white; padding: 20px; border-radius: 8px; }
    .status { padding: 10px; border-radius: 4px; margin-bottom: 16px; }
    .connected { background: #d4edda; color: #155724; }
    .disconnected { background: #f8d7da; color: #721c24; }
    .messages { height: 360px; overflow-y: auto; border: 1px solid #ddd; padding: 10px; margin-bottom: 16px; }
    .message { margin-bottom: 8px; }
    .system { color: #6c757d; font-style: italic; }
    .username { font-weight: bold; margin-right: 6px; }
    input { padding: 8px; border: 1px solid #ddd; border-radius: 4px; }
    button { padding: 8px 16px; background: #007bff; color: white; border: none; border-radius: 4px; cursor: pointer; }
  </style>
</head>
<body>
<div class="container">
  <h1>Chatroom Test Client</h1>
  <div id="status" class="status disconnected">Disconnected</div>
  <div>
    <input type="text" id="username" placeholder="Username" maxlength="20">
    <button onclick="joinChat()">Join</button>
    <span>Online: <span id="user-count">0</span></span>
  </div>
  <div class="messages" id="messages"></div>
  <div>
    <input type="text" id="message" placeholder="Type a message..." maxlength="500"
           onkeypress="if (event.key === 'Enter') sendMessage()">
    <button onclick="sendMessage()">Send</button>
  </div>
</div>
<script>
  let ws = null;
  const wsUrl = prompt('WebSocket address', 'ws://127.0.0.1:8080');

  function connect() {
    ws = new WebSocket(wsUrl);
    ws.onopen = () => setStatus(true);
    ws.onclose = () => { setStatus(false); setTimeout(connect, 2000); };
    ws.onmessage = (event) => handleFrame(JSON.parse(event.data));
  }

  function setStatus(up) {
    const el = document.getElementById('status');
    el.textContent = up ? 'Connected' : 'Disconnected';
    el.className = 'status ' + (up ? 'connected' : 'disconnected');
  }

  function handleFrame(frame) {
    if (frame.type === 'chat') {
      addMessage(`<span class="username" style="color:${frame.data.userColor}">${frame.data.username}</span>${frame.data.content}`);
    } else if (frame.type === 'system') {
      addMessage(`<span class="system">${frame.data.content}</span>`);
    } else if (frame.type === 'chat_history') {
      frame.data.messages.forEach(m => {
        if (m.kind) addMessage(`<span class="system">${m.content}</span>`);
        else addMessage(`<span class="username" style="color:${m.userColor}">${m.username}</span>${m.content}`);
      });
    } else if (frame.type === 'user_count') {
      document.getElementById('user-count').textContent = frame.data.count;
    } else if (frame.type === 'error') {
      addMessage(`<span class="system">error: ${frame.data.message} (${frame.data.code})</span>`);
    } else if (frame.type === 'ping') {
      ws.send(JSON.stringify({ type: 'ping', data: { timestamp: new Date().toISOString() } }));
    }
  }

  function addMessage(html) {
    const div = document.createElement('div');
    div.className = 'message';
    div.innerHTML = html;
    const box = document.getElementById('messages');
    box.appendChild(div);
    box.scrollTop = box.scrollHeight;
  }

  function joinChat() {
    const username = document.getElementById('username').value;
    ws.send(JSON.stringify({ type: 'join', data: { username } }));
  }

  function sendMessage() {
    const input = document.getElementById('message');
    if (!input.value) return;
    ws.send(JSON.stringify({ type: 'chat', data: { content: input.value } }));
    input.value = '';
  }

  connect();
</script>
</body>
</html>
"#;
