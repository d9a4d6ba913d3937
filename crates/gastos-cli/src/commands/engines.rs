//! Engine and configuration inspection commands

use anyhow::{Context, Result};
use gastos_core::{AnalyzerConfig, Engine, EngineAdapter};

/// Health-check every configured engine; returns (name, available) pairs
pub async fn cmd_engines(config: &AnalyzerConfig) -> Result<Vec<(String, bool)>> {
    let engines = Engine::from_config(config).context("Invalid engine configuration")?;

    println!("🔌 Checking {} engine(s)...", engines.len());
    println!();

    let mut report = Vec::with_capacity(engines.len());
    for engine in &engines {
        let available = engine.health_check().await;
        let icon = if available { "✅" } else { "❌" };
        let timeout = config.timeout_for(engine.kind()).as_secs();
        println!(
            "   {} {:<10} ({}, timeout {}s)",
            icon,
            engine.name(),
            engine.kind().family(),
            timeout
        );
        if let Engine::Ollama(vision) = engine {
            println!("      Model: {} @ {}", vision.model(), vision.host());
        }
        report.push((engine.name().to_string(), available));
    }

    let down = report.iter().filter(|(_, ok)| !ok).count();
    println!();
    if down == report.len() {
        println!("⚠️  No engine is available. Receipts cannot be analyzed.");
    } else if down > 0 {
        println!("⚠️  {} engine(s) unavailable. The others will still be tried.", down);
    } else {
        println!("✅ All engines available");
    }

    Ok(report)
}

/// Print the effective configuration as TOML
pub fn cmd_config(config: &AnalyzerConfig) -> Result<String> {
    let rendered = config.to_toml().context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(rendered)
}
