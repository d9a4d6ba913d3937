//! Vision-model engine backed by Ollama
//!
//! Sends the original photo to a local vision model through `/api/chat` and
//! asks for the expense fields directly as JSON. Decoding is pinned
//! (temperature 0, fixed seed) so the same photo gives the same answer, and
//! `keep_alive` defaults to 0 so the model leaves VRAM right after the call.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{DateRange, VisionConfig};
use crate::error::{Error, Result};
use crate::models::ExtractionResult;

use super::parsing::parse_vision_answer;
use super::{truncate, EngineAdapter, EngineKind, ReceiptImage};

const SYSTEM_PROMPT: &str = r#"Eres un asistente especializado en analizar imágenes de tickets/recibos de compra.
Tu tarea es extraer información estructurada del ticket y devolverla ÚNICAMENTE como JSON válido.

REGLAS ESTRICTAS:
1. Responde SOLO con un objeto JSON válido, sin texto adicional antes o después.
2. NO incluyas explicaciones, comentarios ni markdown.
3. NO uses bloques de código (```).
4. El JSON debe tener exactamente estos campos:

{
  "amount": <número decimal con el monto total pagado>,
  "date": "<fecha en formato YYYY-MM-DD>",
  "title": "<nombre del comercio/establecimiento>",
  "category": "<una de las categorías permitidas>",
  "confidence": <número entero 0-100 indicando tu confianza en la extracción>
}

CATEGORÍAS PERMITIDAS (elige la más apropiada según el tipo de gasto):
- "Comida": supermercados, restaurantes, cafeterías, panaderías, carnicerías
- "Transporte": gasolina, parking, taxi, transporte público, peajes
- "Compras": tiendas de ropa, electrónica, ópticas, muebles, deportes
- "Entretenimiento": cine, teatro, conciertos, museos, gimnasios
- "Otros": cualquier gasto que no encaje en las anteriores

INSTRUCCIONES DE EXTRACCIÓN:
- amount: Busca el TOTAL final pagado (no subtotales). Si hay varios, usa el mayor.
- date: Extrae la fecha del ticket. Si no es visible, usa "1900-01-01".
- title: Nombre del comercio, generalmente en las primeras líneas del ticket.
- category: Clasifica según el tipo de establecimiento y productos comprados.
- confidence: Tu nivel de seguridad (0-100) en la precisión de los datos extraídos.

IMPORTANTE: Si no puedes leer el ticket o está muy borroso, devuelve:
{"amount": 0, "date": "1900-01-01", "title": "Ilegible", "category": "Otros", "confidence": 0}"#;

const USER_PROMPT: &str = "Analiza esta imagen de ticket/recibo y extrae la información solicitada.
Responde ÚNICAMENTE con el JSON, sin ningún texto adicional.";

/// Request to the Ollama chat API
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: &'a str,
    options: ChatOptions,
    keep_alive: u64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f64,
    top_p: f64,
    seed: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

/// Ollama vision engine
#[derive(Debug, Clone)]
pub struct OllamaVisionEngine {
    http_client: Client,
    base_url: String,
    model: String,
    keep_alive: u64,
    timeout_secs: u64,
    years: DateRange,
}

impl OllamaVisionEngine {
    pub fn new(config: &VisionConfig, years: DateRange) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            keep_alive: config.keep_alive,
            timeout_secs: config.timeout_secs,
            years,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    /// Check Ollama is reachable and the configured model is pulled
    ///
    /// Returns `Ok(false)` when the server answers but the model is missing.
    pub async fn check_connection(&self) -> Result<bool> {
        let response = self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await?
            .error_for_status()?;
        let tags: TagsResponse = response.json().await?;
        let names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();

        let available = model_is_available(&self.model, &names);
        if available {
            info!("Ollama connection OK, model '{}' available", self.model);
        } else {
            warn!("Model '{}' not found. Available: {:?}", self.model, names);
        }
        Ok(available)
    }

    async fn chat(&self, image_b64: String) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                    images: vec![],
                },
                ChatMessage {
                    role: "user",
                    content: USER_PROMPT,
                    images: vec![image_b64],
                },
            ],
            stream: false,
            format: "json",
            options: ChatOptions {
                temperature: 0.0,
                top_p: 1.0,
                seed: 42,
            },
            keep_alive: self.keep_alive,
        };

        debug!(model = %self.model, keep_alive = self.keep_alive, "Calling Ollama chat API");
        let response = self
            .http_client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::unavailable(
                self.name(),
                format!("HTTP {}: {}", status, truncate(body.trim(), 200)),
            ));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.request_error(e)
            } else {
                Error::malformed(self.name(), format!("unexpected response body: {}", e))
            }
        })?;
        let content = chat
            .message
            .map(|m| m.content.trim().to_string())
            .ok_or_else(|| Error::malformed(self.name(), "response has no message"))?;

        debug!("Raw model response: {}", truncate(&content, 500));
        Ok(content)
    }

    fn request_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::AdapterTimeout {
                engine: self.name().to_string(),
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::unavailable(self.name(), err.to_string())
        }
    }
}

/// Exact match, or the same model family (`qwen3-vl` matches `qwen3-vl:8b`)
fn model_is_available(model: &str, installed: &[String]) -> bool {
    let family = model.split(':').next().unwrap_or(model);
    installed
        .iter()
        .any(|name| name.contains(model) || name.starts_with(family))
}

#[async_trait]
impl EngineAdapter for OllamaVisionEngine {
    fn name(&self) -> &str {
        "ollama"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Ollama
    }

    fn needs_preprocessing(&self) -> bool {
        false
    }

    async fn extract(&self, image: &ReceiptImage) -> Result<ExtractionResult> {
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image.original());
        let content = self.chat(image_b64).await?;

        let today = Local::now().date_naive();
        let answer = parse_vision_answer(&content, today, &self.years)?;

        Ok(
            ExtractionResult::succeeded(self.name(), content, answer.confidence as f64)
                .with_structured(answer.fields),
        )
    }

    async fn health_check(&self) -> bool {
        self.check_connection().await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::test_utils::MockOllamaServer;

    fn engine_for(url: &str, model: &str) -> OllamaVisionEngine {
        let config = VisionConfig {
            base_url: url.to_string(),
            model: model.to_string(),
            ..Default::default()
        };
        OllamaVisionEngine::new(&config, DateRange::default())
    }

    #[test]
    fn test_model_matching() {
        let installed = vec!["qwen3-vl:4b-instruct".to_string(), "llava:latest".to_string()];
        assert!(model_is_available("qwen3-vl:4b-instruct", &installed));
        assert!(model_is_available("llava", &installed));
        assert!(model_is_available("qwen3-vl:8b", &installed));
        assert!(!model_is_available("gemma3", &installed));
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "system",
                content: "s",
                images: vec![],
            }],
            stream: false,
            format: "json",
            options: ChatOptions {
                temperature: 0.0,
                top_p: 1.0,
                seed: 42,
            },
            keep_alive: 0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["options"]["seed"], 42);
        assert_eq!(json["keep_alive"], 0);
        assert_eq!(json["format"], "json");
        assert!(json["messages"][0].get("images").is_none());
    }

    #[tokio::test]
    async fn test_extract_structured_fields() {
        let server = MockOllamaServer::start().await;
        let engine = engine_for(&server.url(), "qwen3-vl:4b-instruct");

        let result = engine.run(&ReceiptImage::new(vec![0xFF, 0xD8, 0xFF])).await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.raw_text.contains("\"amount\""));

        let fields = result.structured.expect("structured fields");
        assert_eq!(fields.amount.value, 29.86);
        assert_eq!(fields.title.value, "GRUPO DIA");
        assert_eq!(fields.category.value, Category::Comida);
        assert_eq!(result.ocr_confidence, fields.amount.confidence() as f64);
    }

    #[tokio::test]
    async fn test_malformed_answer_is_reported() {
        let server = MockOllamaServer::start_with_answer("no puedo leer el ticket").await;
        let engine = engine_for(&server.url(), "qwen3-vl:4b-instruct");

        let err = engine
            .extract(&ReceiptImage::new(vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedModelResponse { .. }));
    }

    #[tokio::test]
    async fn test_check_connection() {
        let server = MockOllamaServer::start().await;
        assert!(engine_for(&server.url(), "qwen3-vl:4b-instruct")
            .check_connection()
            .await
            .unwrap());
        assert!(!engine_for(&server.url(), "gemma3").check_connection().await.unwrap());
        assert!(!engine_for("http://127.0.0.1:1", "qwen3-vl").health_check().await);
    }
}
