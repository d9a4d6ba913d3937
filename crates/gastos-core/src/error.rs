//! Error types for gastos

use thiserror::Error;

/// One engine's failure, as reported inside a total extraction failure
#[derive(Debug, Clone, PartialEq)]
pub struct EngineFailure {
    pub engine: String,
    pub reason: String,
}

impl std::fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.engine, self.reason)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Engine {engine} unavailable: {reason}")]
    AdapterUnavailable { engine: String, reason: String },

    #[error("Engine {engine} timed out after {timeout_secs}s")]
    AdapterTimeout { engine: String, timeout_secs: u64 },

    #[error("Engine {engine} returned a malformed response: {reason}")]
    MalformedModelResponse { engine: String, reason: String },

    #[error("No engine produced usable output ({})", format_failures(.attempts))]
    TotalExtractionFailure { attempts: Vec<EngineFailure> },
}

fn format_failures(attempts: &[EngineFailure]) -> String {
    if attempts.is_empty() {
        return "no engines configured".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub fn unavailable(engine: &str, reason: impl Into<String>) -> Self {
        Error::AdapterUnavailable {
            engine: engine.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed(engine: &str, reason: impl Into<String>) -> Self {
        Error::MalformedModelResponse {
            engine: engine.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_failure_names_every_engine() {
        let err = Error::TotalExtractionFailure {
            attempts: vec![
                EngineFailure {
                    engine: "tesseract".into(),
                    reason: "binary not found".into(),
                },
                EngineFailure {
                    engine: "ollama".into(),
                    reason: "timed out after 120s".into(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("tesseract: binary not found"));
        assert!(msg.contains("ollama: timed out after 120s"));
    }

    #[test]
    fn test_total_failure_without_engines() {
        let err = Error::TotalExtractionFailure { attempts: vec![] };
        assert!(err.to_string().contains("no engines configured"));
    }
}
