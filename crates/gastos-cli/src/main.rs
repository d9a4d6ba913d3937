//! Gastos CLI - Receipt analyzer and expense tracker
//!
//! Usage:
//!   gastos analyze ticket.jpg                      Analyze a receipt photo
//!   gastos analyze ticket.jpg --save --payer Exe   Analyze and store the expense
//!   gastos add --amount 12.50 --payer Ceci         Register an expense by hand
//!   gastos expenses --limit 20                     List stored expenses
//!   gastos engines                                 Check engine availability

mod cli;
mod commands;


use anyhow::{Context, Result};
use clap::Parser;
use gastos_core::AnalyzerConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config =
        AnalyzerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let storage = commands::StorageSettings::from_env();

    match cli.command {
        Commands::Analyze {
            image,
            engines,
            json,
            save,
            payer,
            category,
        } => {
            let options = commands::AnalyzeOptions {
                image,
                engines,
                json,
                save,
                payer,
                category,
            };
            commands::cmd_analyze(config, &storage, options)
                .await
                .map(|_| ())
        }
        Commands::Add {
            amount,
            date,
            title,
            category,
            payer,
        } => commands::cmd_add(
            &storage,
            commands::ManualArgs {
                amount,
                date,
                title,
                category,
                payer,
            },
        )
        .map(|_| ()),
        Commands::Expenses { limit } => commands::cmd_expenses(&storage, limit).map(|_| ()),
        Commands::Engines => commands::cmd_engines(&config).await.map(|_| ()),
        Commands::Config => commands::cmd_config(&config).map(|_| ()),
    }
}
