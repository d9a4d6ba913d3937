//! Analyzer configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Override file (`--config`, `$GASTOS_CONFIG`, or ~/.local/share/gastos/config.toml)
//! 2. Embedded defaults (compiled into binary)
//!
//! Environment variables are applied on top of whichever file was used, then the
//! result is validated.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engines::EngineKind;
use crate::error::{Error, Result};
use crate::models::Category;

/// Embedded default config (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/gastos.toml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Engines to try, in priority order (first listed wins ties)
    pub engines: Vec<EngineKind>,
    pub use_gpu: bool,
    /// Default per-adapter time budget
    pub engine_timeout_secs: u64,
    /// Reference text length (L0) for the engine score length bonus
    pub text_length_reference: usize,
    /// Per-engine timeout overrides keyed by engine name
    pub engine_timeouts: BTreeMap<String, u64>,
    pub tesseract: TesseractConfig,
    pub easyocr: EasyOcrConfig,
    pub paddle: PaddleConfig,
    pub vision: VisionConfig,
    pub preprocess: PreprocessConfig,
    pub dates: DateRange,
    pub weights: ConfidenceWeights,
    /// Ordered category keyword table; earlier entries win ties
    pub categories: Vec<CategoryRule>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            engines: vec![EngineKind::Tesseract, EngineKind::EasyOcr, EngineKind::PaddleOcr],
            use_gpu: false,
            engine_timeout_secs: 60,
            text_length_reference: 500,
            engine_timeouts: BTreeMap::new(),
            tesseract: TesseractConfig::default(),
            easyocr: EasyOcrConfig::default(),
            paddle: PaddleConfig::default(),
            vision: VisionConfig::default(),
            preprocess: PreprocessConfig::default(),
            dates: DateRange::default(),
            weights: ConfidenceWeights::default(),
            categories: default_categories(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    pub binary: String,
    pub languages: String,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            languages: "spa+eng".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EasyOcrConfig {
    pub binary: String,
    pub languages: Vec<String>,
}

impl Default for EasyOcrConfig {
    fn default() -> Self {
        Self {
            binary: "easyocr".to_string(),
            languages: vec!["es".to_string(), "en".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddleConfig {
    pub url: String,
}

impl Default for PaddleConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8866/predict/ocr_system".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Seconds Ollama keeps the model loaded after a request
    pub keep_alive: u64,
    /// Keep the model's answer as the record's raw text
    pub store_raw_text: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen3-vl:4b-instruct".to_string(),
            timeout_secs: 120,
            keep_alive: 0,
            store_raw_text: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub grayscale: bool,
    pub upscale: bool,
    pub upscale_factor: u32,
    pub denoise: bool,
    pub binarize: bool,
    pub block_radius: u32,
    pub deskew: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            grayscale: true,
            upscale: true,
            upscale_factor: 2,
            denoise: true,
            binarize: true,
            block_radius: 5,
            deskew: true,
        }
    }
}

/// Accepted receipt years, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateRange {
    pub min_year: i32,
    pub max_year: i32,
}

impl Default for DateRange {
    fn default() -> Self {
        Self {
            min_year: 2020,
            max_year: 2030,
        }
    }
}

impl DateRange {
    pub fn contains(&self, year: i32) -> bool {
        (self.min_year..=self.max_year).contains(&year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub amount: f64,
    pub date: f64,
    pub title: f64,
    pub category: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            amount: 0.4,
            date: 0.2,
            title: 0.2,
            category: 0.2,
        }
    }
}

/// One row of the category keyword table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: Category,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new(name: Category, keywords: &[&str]) -> Self {
        Self {
            name,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Built-in category keywords (mirrors config/gastos.toml)
pub fn default_categories() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            Category::Comida,
            &[
                "supermerc", "alimenta", "restaur", "cafe", "bar", "comida", "mercado",
                "carniceria", "panaderia", "dia", "mercadona", "carrefour",
            ],
        ),
        CategoryRule::new(
            Category::Transporte,
            &[
                "gasolina", "combustible", "parking", "taxi", "uber", "metro", "bus", "tren",
                "peaje", "autopista",
            ],
        ),
        CategoryRule::new(
            Category::Compras,
            &[
                "optic", "ropa", "zapato", "moda", "tienda", "store", "electronica", "mueble",
                "decathlon",
            ],
        ),
        CategoryRule::new(
            Category::Entretenimiento,
            &[
                "cine", "teatro", "concert", "museo", "parque", "juego", "deporte", "gym",
            ],
        ),
        CategoryRule::new(Category::Otros, &[]),
    ]
}

impl AnalyzerConfig {
    /// Load configuration from the usual places and apply environment overrides
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("GASTOS_CONFIG").ok().map(PathBuf::from))
            .or_else(|| default_config_path().filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                let content = fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&content)?
            }
            None => Self::from_toml(DEFAULT_CONFIG)?,
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; keys it leaves out keep their defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Apply environment-style overrides from `lookup`
    ///
    /// Takes a lookup function instead of reading the environment so tests can
    /// inject values without touching process state.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(engines) = lookup("GASTOS_ENGINES") {
            let parsed: Vec<EngineKind> = engines
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|s| match s.parse() {
                    Ok(kind) => Some(kind),
                    Err(e) => {
                        tracing::warn!("Ignoring GASTOS_ENGINES entry: {}", e);
                        None
                    }
                })
                .collect();
            if !parsed.is_empty() {
                self.engines = parsed;
            }
        }
        if let Some(flag) = lookup("GASTOS_USE_GPU").and_then(|v| parse_flag(&v)) {
            self.use_gpu = flag;
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL").or_else(|| lookup("OLLAMA_HOST")) {
            self.vision.base_url = normalize_base_url(&url);
        }
        if let Some(model) = lookup("OLLAMA_MODEL").filter(|m| !m.trim().is_empty()) {
            self.vision.model = model.trim().to_string();
        }
        if let Some(secs) = lookup("OLLAMA_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            self.vision.timeout_secs = secs;
        }
        if let Some(url) = lookup("PADDLE_OCR_URL").filter(|u| !u.trim().is_empty()) {
            self.paddle.url = url.trim().to_string();
        }
        if let Some(flag) = lookup("STORE_RAW_TEXT").and_then(|v| parse_flag(&v)) {
            self.vision.store_raw_text = flag;
        }
    }

    /// Check the invariants the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.engines.is_empty() {
            return Err(Error::Config("at least one engine must be configured".into()));
        }
        for (i, engine) in self.engines.iter().enumerate() {
            if self.engines[..i].contains(engine) {
                return Err(Error::Config(format!(
                    "engine '{}' is listed more than once",
                    engine
                )));
            }
        }
        let mut timed: Vec<EngineKind> = Vec::new();
        for name in self.engine_timeouts.keys() {
            let kind = name.parse::<EngineKind>().map_err(Error::Config)?;
            if timed.contains(&kind) {
                return Err(Error::Config(format!(
                    "engine_timeouts sets '{}' more than once",
                    kind
                )));
            }
            timed.push(kind);
        }

        let w = &self.weights;
        let parts = [w.amount, w.date, w.title, w.category];
        if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(Error::Config("confidence weights must be non-negative".into()));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 0.001 {
            return Err(Error::Config(format!(
                "confidence weights must sum to 1.0 (got {:.3})",
                sum
            )));
        }

        if self.dates.min_year > self.dates.max_year {
            return Err(Error::Config(format!(
                "date range is empty ({} > {})",
                self.dates.min_year, self.dates.max_year
            )));
        }
        if self.text_length_reference == 0 {
            return Err(Error::Config("text_length_reference must be positive".into()));
        }
        if self.preprocess.upscale_factor == 0 {
            return Err(Error::Config("preprocess.upscale_factor must be at least 1".into()));
        }

        for (i, rule) in self.categories.iter().enumerate() {
            if self.categories[..i].iter().any(|r| r.name == rule.name) {
                return Err(Error::Config(format!(
                    "category '{}' is defined more than once",
                    rule.name
                )));
            }
            if rule.name == Category::Otros && !rule.keywords.is_empty() {
                return Err(Error::Config(
                    "category 'Otros' is the fallback and cannot have keywords".into(),
                ));
            }
        }

        Ok(())
    }

    /// Time budget for one adapter call
    pub fn timeout_for(&self, engine: EngineKind) -> Duration {
        let default = match engine {
            EngineKind::Ollama => self.vision.timeout_secs,
            _ => self.engine_timeout_secs,
        };
        // Keys may use any accepted engine name ("paddle", "vision", ...)
        let secs = self
            .engine_timeouts
            .iter()
            .find(|(name, _)| name.parse::<EngineKind>().ok() == Some(engine))
            .map(|(_, secs)| *secs)
            .unwrap_or(default);
        Duration::from_secs(secs)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("gastos").join("config.toml"))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `OLLAMA_HOST` is often given without a scheme ("localhost:11434")
fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_embedded_config_matches_defaults() {
        let config = AnalyzerConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, AnalyzerConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = AnalyzerConfig::from_toml(
            r#"
            engines = ["ollama", "tesseract"]

            [vision]
            model = "llava"
            "#,
        )
        .unwrap();

        assert_eq!(config.engines, vec![EngineKind::Ollama, EngineKind::Tesseract]);
        assert_eq!(config.vision.model, "llava");
        assert_eq!(config.vision.base_url, "http://localhost:11434");
        assert_eq!(config.weights, ConfidenceWeights::default());
        assert_eq!(config.categories.len(), 5);
    }

    #[test]
    fn test_unknown_engine_is_rejected() {
        assert!(AnalyzerConfig::from_toml(r#"engines = ["abbyy"]"#).is_err());
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let toml = r#"
            [[categories]]
            name = "Viajes"
            keywords = ["hotel"]
        "#;
        assert!(AnalyzerConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_validate_weights() {
        let mut config = AnalyzerConfig::default();
        config.weights.amount = 0.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.weights = ConfidenceWeights {
            amount: 1.2,
            date: -0.2,
            title: 0.0,
            category: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_year_range_and_engines() {
        let mut config = AnalyzerConfig::default();
        config.dates = DateRange {
            min_year: 2030,
            max_year: 2020,
        };
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.engines = vec![EngineKind::Tesseract, EngineKind::Tesseract];
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.engine_timeouts.insert("abbyy".into(), 10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GASTOS_ENGINES", "ollama, paddleocr"),
            ("GASTOS_USE_GPU", "true"),
            ("OLLAMA_HOST", "gpu-box:11434/"),
            ("OLLAMA_MODEL", "qwen2.5vl:7b"),
            ("OLLAMA_TIMEOUT", "300"),
            ("STORE_RAW_TEXT", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = AnalyzerConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.engines, vec![EngineKind::Ollama, EngineKind::PaddleOcr]);
        assert!(config.use_gpu);
        assert_eq!(config.vision.base_url, "http://gpu-box:11434");
        assert_eq!(config.vision.model, "qwen2.5vl:7b");
        assert_eq!(config.timeout_for(EngineKind::Ollama), Duration::from_secs(300));
        assert!(!config.vision.store_raw_text);
    }

    #[test]
    fn test_base_url_takes_precedence_over_host() {
        let mut config = AnalyzerConfig::default();
        config.apply_overrides(|k| match k {
            "OLLAMA_BASE_URL" => Some("https://ollama.lan".into()),
            "OLLAMA_HOST" => Some("other:11434".into()),
            _ => None,
        });
        assert_eq!(config.vision.base_url, "https://ollama.lan");
    }

    #[test]
    fn test_timeout_overrides() {
        let mut config = AnalyzerConfig::default();
        assert_eq!(config.timeout_for(EngineKind::Tesseract), Duration::from_secs(60));
        assert_eq!(config.timeout_for(EngineKind::Ollama), Duration::from_secs(120));

        config.engine_timeouts.insert("easyocr".into(), 90);
        assert_eq!(config.timeout_for(EngineKind::EasyOcr), Duration::from_secs(90));
    }

    #[test]
    fn test_timeout_overrides_accept_engine_aliases() {
        let config = AnalyzerConfig::from_toml(
            "[engine_timeouts]\npaddle = 5\nVision = 30\n",
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.timeout_for(EngineKind::PaddleOcr), Duration::from_secs(5));
        assert_eq!(config.timeout_for(EngineKind::Ollama), Duration::from_secs(30));
        assert_eq!(config.timeout_for(EngineKind::Tesseract), Duration::from_secs(60));
    }

    #[test]
    fn test_duplicate_timeout_aliases_are_rejected() {
        let mut config = AnalyzerConfig::default();
        config.engine_timeouts.insert("paddle".into(), 5);
        config.engine_timeouts.insert("paddleocr".into(), 10);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_fallback_category_keywords_are_rejected() {
        let mut config = AnalyzerConfig::default();
        let otros = config
            .categories
            .iter_mut()
            .find(|r| r.name == Category::Otros)
            .unwrap();
        otros.keywords.push("farmacia".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Otros"));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = AnalyzerConfig::default();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("qwen3-vl"));
        assert_eq!(AnalyzerConfig::from_toml(&rendered).unwrap(), config);
    }
}
