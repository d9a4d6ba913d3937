//! CLI argument definitions using clap
//!
//! This module contains the clap structs for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Gastos - Turn receipt photos into expense records
#[derive(Parser)]
#[command(name = "gastos")]
#[command(about = "Receipt analyzer and expense tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Analyzer config file (defaults to $GASTOS_CONFIG, then the data dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a receipt photo
    Analyze {
        /// Receipt image (JPEG, PNG, ...)
        image: PathBuf,

        /// Engines to run, overriding configuration (e.g. tesseract,ollama)
        #[arg(long, value_delimiter = ',')]
        engines: Vec<String>,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,

        /// Archive the photo and store the expense
        #[arg(long, requires = "payer")]
        save: bool,

        /// Who paid (must be one of PAYERS)
        #[arg(long)]
        payer: Option<String>,

        /// Store under this category instead of the suggested one
        #[arg(long)]
        category: Option<String>,
    },

    /// Register an expense by hand
    Add {
        /// Amount in euros
        #[arg(long)]
        amount: f64,

        /// Date as YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Merchant or description
        #[arg(long)]
        title: Option<String>,

        /// Comida, Transporte, Compras, Entretenimiento or Otros
        #[arg(long, default_value = "Otros")]
        category: String,

        /// Who paid (must be one of PAYERS)
        #[arg(long)]
        payer: String,
    },

    /// List stored expenses
    Expenses {
        /// Maximum number of expenses to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show configured engines and whether they are available
    Engines,

    /// Print the effective analyzer configuration
    Config,
}
