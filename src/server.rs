//! Websocket transport for the analysis pipeline.
//!
//! One request per connection on `/ws/analyze_propaganda`. The server
//! answers with a `propaganda_detection` message as soon as detection
//! finishes, streams a `contextualization` message afterwards when the
//! request asked for it, closes the socket, then persists the full
//! record off the async path.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::providers::create_provider;
use crate::agent::config::AgentConfig;
use crate::agent::orchestrator::{AnalysisReport, ContextualizeMode, Orchestrator};
use crate::detect::PropagandaDetector;
use crate::search::GoogleSearchBackend;
use crate::storage::{AnalysisRecord, Storage};

/// Shared server state.
pub struct AppState {
    pub config: AgentConfig,
    pub storage: Arc<Storage>,
}

/// The single request message a client sends after connecting.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    pub model_name: String,
    pub text: String,
    #[serde(default)]
    pub contextualize: ContextualizeMode,
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws/analyze_propaganda", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("websocket connection accepted");
    let Some(text) = receive_request_text(&mut socket).await else {
        info!("client disconnected before sending a request");
        return;
    };

    let request: AnalyzeRequest = match serde_json::from_str(&text) {
        Ok(request) => request,
        Err(e) => {
            warn!(%e, "malformed analysis request");
            let envelope = json!({
                "type": "propaganda_detection",
                "status": "error",
                "message": format!("invalid request: {e}"),
            });
            send_json(&mut socket, &envelope).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let user_id = request
        .user_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(%user_id, model = %request.model_name, mode = ?request.contextualize, "handling analysis request");

    let report = run_pipeline(&state, &request, &user_id, &mut socket).await;
    let _ = socket.send(Message::Close(None)).await;

    let Some(report) = report else {
        return;
    };
    persist(&state, &request, &user_id, &report).await;
}

/// Runs detection and contextualization, streaming envelopes to the
/// client. Returns the final report when detection succeeded.
async fn run_pipeline(
    state: &AppState,
    request: &AnalyzeRequest,
    user_id: &str,
    socket: &mut WebSocket,
) -> Option<AnalysisReport> {
    // Per-request model override on top of the server configuration.
    let mut config = state.config.clone();
    config.model = request.model_name.clone();
    let config = Arc::new(config);

    let provider = match create_provider(&config) {
        Ok(provider) => provider,
        Err(e) => {
            error!(%e, "provider setup failed");
            send_json(socket, &detection_error(user_id, &e.to_string())).await;
            return None;
        }
    };

    let detector = PropagandaDetector::new(
        Arc::clone(&provider),
        config.model.clone(),
        config.detect_max_tokens,
    );
    let mut report = match detector.analyze(&request.text).await {
        Ok(report) => report,
        Err(e) => {
            warn!(%e, "detection failed");
            send_json(socket, &detection_error(user_id, &e.to_string())).await;
            return None;
        }
    };

    let detection = json!({
        "user_id": user_id,
        "type": "propaganda_detection",
        "status": "success",
        "data": report,
    });
    send_json(socket, &detection).await;

    let backend = GoogleSearchBackend::new(
        reqwest::Client::new(),
        config.google_api_key.clone(),
        config.google_cse_id.clone(),
    );
    let orchestrator = Orchestrator::new(provider, backend, Arc::clone(&config));
    let ran = orchestrator
        .contextualize_report(request.contextualize, &mut report)
        .await;
    if ran {
        let contextualization = json!({
            "user_id": user_id,
            "type": "contextualization",
            "status": "success",
            "data": report,
        });
        send_json(socket, &contextualization).await;
    }
    Some(report)
}

async fn persist(state: &AppState, request: &AnalyzeRequest, user_id: &str, report: &AnalysisReport) {
    let record = AnalysisRecord {
        user_id: user_id.to_string(),
        model_name: request.model_name.clone(),
        text: request.text.clone(),
        contextualize: serde_json::to_string(&request.contextualize).unwrap_or_default(),
        result: serde_json::to_string(report).unwrap_or_default(),
    };
    let storage = Arc::clone(&state.storage);
    let result =
        tokio::task::spawn_blocking(move || storage.save_analysis(&record)).await;
    match result {
        Ok(Ok(())) => info!(%user_id, "analysis persisted"),
        Ok(Err(e)) => error!(%user_id, %e, "failed to persist analysis"),
        Err(e) => error!(%user_id, %e, "persistence task aborted"),
    }
}

/// Waits for the client's first text frame, skipping control frames.
async fn receive_request_text(socket: &mut WebSocket) -> Option<String> {
    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(text)) => return Some(text.to_string()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn send_json(socket: &mut WebSocket, value: &Value) {
    let payload = value.to_string();
    if let Err(e) = socket.send(Message::Text(payload.into())).await {
        warn!(%e, "failed to send websocket message");
    }
}

fn detection_error(user_id: &str, message: &str) -> Value {
    json!({
        "user_id": user_id,
        "type": "propaganda_detection",
        "status": "error",
        "message": message,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let raw = r#"{"model_name": "gpt-4o-mini", "text": "an article"}"#;
        let request: AnalyzeRequest =
            serde_json::from_str(raw).unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert!(request.user_id.is_none());
        assert_eq!(request.contextualize, ContextualizeMode::Off);
    }

    #[test]
    fn test_request_with_mode_variants() {
        let raw = r#"{"user_id": "u-1", "model_name": "m", "text": "t", "contextualize": "Auto"}"#;
        let request: AnalyzeRequest =
            serde_json::from_str(raw).unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(request.contextualize, ContextualizeMode::Auto);

        let raw = r#"{"model_name": "m", "text": "t", "contextualize": true}"#;
        let request: AnalyzeRequest =
            serde_json::from_str(raw).unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(request.contextualize, ContextualizeMode::Always);
    }

    #[test]
    fn test_detection_error_envelope() {
        let envelope = detection_error("u-1", "boom");
        assert_eq!(envelope["type"], "propaganda_detection");
        assert_eq!(envelope["status"], "error");
        assert_eq!(envelope["user_id"], "u-1");
        assert_eq!(envelope["message"], "boom");
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_envelope_then_close() {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite;

        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|e| panic!("config build failed: {e}"));
        let storage =
            Arc::new(Storage::in_memory().unwrap_or_else(|e| panic!("storage open failed: {e}")));
        let state = Arc::new(AppState { config, storage });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("bind failed: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("no local addr: {e}"));
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(state)).await;
        });

        let url = format!("ws://{addr}/ws/analyze_propaganda");
        let (mut client, _) = tokio_tungstenite::connect_async(url)
            .await
            .unwrap_or_else(|e| panic!("connect failed: {e}"));
        client
            .send(tungstenite::Message::Text("definitely not json".into()))
            .await
            .unwrap_or_else(|e| panic!("send failed: {e}"));

        let reply = match client.next().await {
            Some(Ok(tungstenite::Message::Text(text))) => text,
            other => panic!("expected error envelope, got {other:?}"),
        };
        let envelope: Value =
            serde_json::from_str(&reply).unwrap_or_else(|e| panic!("envelope parse failed: {e}"));
        assert_eq!(envelope["type"], "propaganda_detection");
        assert_eq!(envelope["status"], "error");

        // The server finishes the exchange with a proper close frame.
        match client.next().await {
            Some(Ok(tungstenite::Message::Close(_))) => {}
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}
