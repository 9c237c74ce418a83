//! Test utilities for fley-core
//!
//! Provides a mock Gemini server so the real HTTP backend, its status
//! classification and the generator's retry loop can be exercised end to end.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;

#[derive(Default)]
struct ServerState {
    script: Mutex<VecDeque<(u16, String)>>,
    generate_calls: AtomicUsize,
    last_key: Mutex<Option<String>>,
}

/// Mock Gemini `generateContent` server
///
/// Scripted replies are served first, in order. Once the script is empty
/// every request gets a balanced plan (40% entertainment) computed from the
/// "Remaining money" line of the prompt.
pub struct MockGeminiServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockGeminiServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state = Arc::new(ServerState::default());
        let app = Router::new()
            .route("/v1beta/models/:model", get(handle_model).post(handle_generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue a reply with an HTTP status and raw body
    pub fn push_status(&self, status: u16, body: &str) {
        self.state
            .script
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
    }

    /// Queue a successful reply whose candidate text is `text`
    pub fn push_text(&self, text: &str) {
        self.push_status(200, &candidate_body(text).to_string());
    }

    /// Number of generateContent requests received
    pub fn generate_calls(&self) -> usize {
        self.state.generate_calls.load(Ordering::SeqCst)
    }

    /// API key sent with the most recent request
    pub fn last_key(&self) -> Option<String> {
        self.state.last_key.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockGeminiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

fn candidate_body(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }], "role": "model" },
            "finishReason": "STOP"
        }]
    })
}

/// Model metadata endpoint (health check)
async fn handle_model(Query(query): Query<KeyQuery>) -> Response {
    if query.key.is_none() {
        return StatusCode::FORBIDDEN.into_response();
    }
    Json(json!({ "name": "models/gemini-2.5-flash" })).into_response()
}

async fn handle_generate(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<KeyQuery>,
    Json(request): Json<Value>,
) -> Response {
    state.generate_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_key.lock().unwrap() = query.key;

    let scripted = state.script.lock().unwrap().pop_front();
    if let Some((status, body)) = scripted {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, [("content-type", "application/json")], body).into_response();
    }

    let prompt = request["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default();
    Json(candidate_body(&balanced_plan(prompt))).into_response()
}

fn balanced_plan(prompt: &str) -> String {
    let remaining: rust_decimal::Decimal = prompt
        .lines()
        .find_map(|line| line.trim().strip_prefix("Remaining money:"))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_default();
    let entertainment = (remaining * rust_decimal::Decimal::new(4, 1)).round_dp(2);
    let savings = remaining - entertainment;
    format!(
        "```json\n{{\"monthlySplit\": {{\"entertainment\": {}, \"savings\": {}}}, \"savingsPurpose\": \"Emergency fund\", \"disciplineRules\": []}}\n```",
        entertainment, savings
    )
}
