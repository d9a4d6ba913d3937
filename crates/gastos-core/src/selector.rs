//! Engine fan-out and best-result selection
//!
//! Every configured engine runs against the same image concurrently, each
//! under its own time budget. Once all of them have finished or timed out,
//! the successful result with the highest score is chosen:
//!
//! ```text
//! score = confidence * (0.7 + 0.3 * min(1, text_len / reference_len))
//! ```
//!
//! Ties keep the engine listed first in configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::engines::{Engine, EngineAdapter, ReceiptImage};
use crate::error::{EngineFailure, Error, Result};
use crate::models::ExtractionResult;

/// Share of the score that comes from confidence alone
const CONFIDENCE_SHARE: f64 = 0.7;
/// Share that grows with the amount of recognized text
const LENGTH_SHARE: f64 = 0.3;

/// Score a successful result; failed or empty results score 0
pub fn engine_score(result: &ExtractionResult, reference_len: usize) -> f64 {
    if !result.success {
        return 0.0;
    }
    let len = result.raw_text.trim().chars().count() as f64;
    let length_factor = (len / reference_len.max(1) as f64).min(1.0);
    result.ocr_confidence * (CONFIDENCE_SHARE + LENGTH_SHARE * length_factor)
}

/// Run all engines concurrently and collect their results in engine order
///
/// Dropping the returned future aborts any engine still running.
pub async fn run_engines(
    engines: &[Engine],
    image: Arc<ReceiptImage>,
    config: &AnalyzerConfig,
) -> Vec<ExtractionResult> {
    let mut tasks = JoinSet::new();
    for (index, engine) in engines.iter().cloned().enumerate() {
        let image = Arc::clone(&image);
        let budget = config.timeout_for(engine.kind());
        tasks.spawn(async move { (index, run_with_timeout(engine, image, budget).await) });
    }

    let mut slots: Vec<Option<ExtractionResult>> = vec![None; engines.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => warn!(error = %e, "Engine task aborted"),
        }
    }

    slots
        .into_iter()
        .zip(engines)
        .map(|(slot, engine)| {
            slot.unwrap_or_else(|| ExtractionResult::failed(engine.name(), "engine task aborted"))
        })
        .collect()
}

async fn run_with_timeout(
    engine: Engine,
    image: Arc<ReceiptImage>,
    budget: Duration,
) -> ExtractionResult {
    match tokio::time::timeout(budget, engine.run(&image)).await {
        Ok(result) => result,
        Err(_) => {
            let err = Error::AdapterTimeout {
                engine: engine.name().to_string(),
                timeout_secs: budget.as_secs(),
            };
            warn!(engine = %engine.name(), timeout_secs = budget.as_secs(), "Engine timed out");
            ExtractionResult::failed(engine.name(), err.to_string())
                .with_duration(budget.as_millis() as u64)
        }
    }
}

/// Pick the best usable result
///
/// A result is usable if it succeeded with non-blank text. With no usable
/// result, the error lists every engine's failure.
pub fn choose_best(results: Vec<ExtractionResult>, reference_len: usize) -> Result<ExtractionResult> {
    let mut attempts = Vec::new();
    let mut best: Option<(f64, ExtractionResult)> = None;

    for result in results {
        if !result.success {
            attempts.push(EngineFailure {
                engine: result.engine_name.clone(),
                reason: result.error.clone().unwrap_or_else(|| "unknown error".into()),
            });
            continue;
        }
        if result.raw_text.trim().is_empty() {
            attempts.push(EngineFailure {
                engine: result.engine_name.clone(),
                reason: "no text recognized".into(),
            });
            continue;
        }

        let score = engine_score(&result, reference_len);
        debug!(engine = %result.engine_name, score, "Engine scored");
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, result));
        }
    }

    match best {
        Some((score, result)) => {
            info!(engine = %result.engine_name, score, "Selected engine result");
            Ok(result)
        }
        None => Err(Error::TotalExtractionFailure { attempts }),
    }
}

/// Run every engine and return the best result
pub async fn select(
    engines: &[Engine],
    image: Arc<ReceiptImage>,
    config: &AnalyzerConfig,
) -> Result<ExtractionResult> {
    let results = run_engines(engines, image, config).await;
    choose_best(results, config.text_length_reference)
}
