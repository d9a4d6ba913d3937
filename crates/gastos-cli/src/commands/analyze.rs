//! Receipt analysis command

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use gastos_core::{
    AnalyzerConfig, Category, EngineKind, EntryMetadata, ExpenseEntry, ExpenseRecord,
    ExpenseStore, ReceiptAnalyzer, ReceiptImage,
};
use serde_json::json;

use super::StorageSettings;

/// Options of `gastos analyze`
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub image: PathBuf,
    pub engines: Vec<String>,
    pub json: bool,
    pub save: bool,
    pub payer: Option<String>,
    pub category: Option<String>,
}

/// Replace the configured engine list with names given on the command line
pub fn override_engines(config: &mut AnalyzerConfig, names: &[String]) -> Result<()> {
    if names.is_empty() {
        return Ok(());
    }
    config.engines = names
        .iter()
        .map(|name| name.parse::<EngineKind>().map_err(|e| anyhow!(e)))
        .collect::<Result<Vec<_>>>()?;
    Ok(())
}

pub async fn cmd_analyze(
    mut config: AnalyzerConfig,
    storage: &StorageSettings,
    options: AnalyzeOptions,
) -> Result<Option<ExpenseEntry>> {
    override_engines(&mut config, &options.engines)?;
    let category = options
        .category
        .as_deref()
        .map(|c| c.parse::<Category>().map_err(|e| anyhow!(e)))
        .transpose()?;
    let payer = match (&options.payer, options.save) {
        (Some(name), true) => Some(storage.resolve_payer(name)?),
        (None, true) => return Err(anyhow!("--save requires --payer")),
        _ => None,
    };

    let bytes = std::fs::read(&options.image)
        .with_context(|| format!("Failed to read image {}", options.image.display()))?;
    let image_info = ReceiptImage::new(bytes.clone());

    if !options.json {
        println!("🧾 Analyzing {}...", options.image.display());
    }

    let analyzer = ReceiptAnalyzer::new(config).context("Invalid analyzer configuration")?;
    let record = analyzer
        .analyze(bytes.clone())
        .await
        .context("Could not read the receipt. Try again with a clearer photo")?;

    if options.json {
        let output = json!({
            "record": &record,
            "confidence_level": record.confidence_level(),
            "image_sha256": image_info.content_hash(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_record(&record);
    }

    let Some(payer) = payer else {
        return Ok(None);
    };

    let now = Local::now();
    let receipt_path = storage.archive_receipt(&bytes, image_info.extension(), now)?;
    let entry = ExpenseEntry::from_record(
        &record,
        category,
        EntryMetadata {
            payer,
            receipt_path: Some(receipt_path.display().to_string()),
            ..Default::default()
        },
        now,
    );

    let store = storage.open_store()?;
    store.save_expense(&entry).context("Failed to save expense")?;

    if !options.json {
        println!();
        println!(
            "✅ Saved {:.2} € ({}) paid by {}",
            entry.amount, entry.category, entry.payer
        );
        println!("   Receipt archived at {}", receipt_path.display());
    }

    Ok(Some(entry))
}

fn print_record(record: &ExpenseRecord) {
    let level = record.confidence_level();
    let date = if record.date().is_found() {
        record.date().value.to_string()
    } else {
        "not found".to_string()
    };
    let title = if record.title().is_found() {
        record.title().value.as_str()
    } else {
        "not found"
    };

    println!();
    println!("📊 Receipt ({})", record.engine_used());
    println!("   ─────────────────────────────");
    println!(
        "   💶 Amount:   {:>10.2} €  ({}%)",
        record.amount().value,
        record.amount().confidence()
    );
    println!("   📅 Date:     {:>10}    ({}%)", date, record.date().confidence());
    println!("   🏪 Merchant: {}  ({}%)", title, record.title().confidence());
    println!(
        "   🏷️  Category: {}  ({}%)",
        record.category().value,
        record.category().confidence()
    );
    println!();
    println!(
        "   {} Overall confidence: {:.1}%",
        level.icon(),
        record.overall_confidence()
    );

    if level.needs_review() {
        println!();
        println!("⚠️  Low confidence. Check the values before saving.");
    }
}
