//! Test utilities for gastos-core
//!
//! Mock Ollama and PaddleOCR servers that speak just enough of each API for
//! the engine adapters, plus the scripted `MockEngine`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

pub use crate::engines::MockEngine;

/// Answer the mock vision model gives by default
pub const DEFAULT_VISION_ANSWER: &str = r#"{"amount": 29.86, "date": "2026-01-07", "title": "GRUPO DIA", "category": "Comida", "confidence": 92}"#;

/// Text the mock PaddleOCR endpoint recognizes
pub const PADDLE_LINES: [(&str, f64); 4] = [
    ("GRUPO DIA", 0.98),
    ("FECHA: 07/01/2026", 0.95),
    ("IVA 4,50", 0.93),
    ("TOTAL A PAGAR 29,86", 0.97),
];

/// Bind an ephemeral port and serve `app` until the returned sender fires
async fn serve(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
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

    (addr, shutdown_tx)
}

/// Mock Ollama server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_with_answer(DEFAULT_VISION_ANSWER).await
    }

    /// Start a server whose model always answers `answer`
    pub async fn start_with_answer(answer: &str) -> Self {
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/chat", post(handle_chat))
            .with_state(Arc::new(answer.to_string()));

        let (addr, shutdown_tx) = serve(app).await;
        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<Value> {
    Json(json!({
        "models": [
            {"name": "qwen3-vl:4b-instruct", "size": 3_300_000_000u64},
            {"name": "llama3.2:latest", "size": 2_000_000_000u64}
        ]
    }))
}

/// Ollama chat endpoint: requires an image, answers with the scripted content
async fn handle_chat(State(answer): State<Arc<String>>, Json(request): Json<Value>) -> Json<Value> {
    let has_image = request["messages"]
        .as_array()
        .map(|messages| {
            messages
                .iter()
                .any(|m| m["images"].as_array().is_some_and(|i| !i.is_empty()))
        })
        .unwrap_or(false);

    let content = if has_image {
        answer.as_str().to_string()
    } else {
        "No veo ninguna imagen.".to_string()
    };

    Json(json!({
        "model": request["model"],
        "message": {"role": "assistant", "content": content},
        "done": true
    }))
}

/// Mock PaddleOCR serving endpoint (`/predict/ocr_system`)
pub struct MockPaddleServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockPaddleServer {
    /// Start a server that recognizes `PADDLE_LINES`
    pub async fn start() -> Self {
        Self::start_with(false).await
    }

    /// Start a server that reports a serving error
    pub async fn start_failing() -> Self {
        Self::start_with(true).await
    }

    async fn start_with(failing: bool) -> Self {
        let app = Router::new()
            .route("/predict/ocr_system", post(handle_ocr_system).get(handle_probe))
            .with_state(failing);

        let (addr, shutdown_tx) = serve(app).await;
        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Full endpoint URL
    pub fn url(&self) -> String {
        format!("http://{}/predict/ocr_system", self.addr)
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockPaddleServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_probe() -> &'static str {
    "ok"
}

async fn handle_ocr_system(State(failing): State<bool>, Json(request): Json<Value>) -> Json<Value> {
    let has_image = request["images"]
        .as_array()
        .is_some_and(|images| !images.is_empty());

    if failing || !has_image {
        return Json(json!({
            "err_no": "101",
            "status": "101",
            "msg": "failed to decode image",
            "results": []
        }));
    }

    let lines: Vec<Value> = PADDLE_LINES
        .iter()
        .map(|(text, confidence)| json!({"text": text, "confidence": confidence}))
        .collect();
    Json(json!({
        "status": "000",
        "msg": "",
        "results": [lines]
    }))
}
