//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `analyze` - Receipt analysis, optionally archiving and saving the expense
//! - `engines` - Engine availability and effective configuration
//! - `expenses` - Manual entry and expense listing
//! - `storage` - Storage settings from the environment (shared)

pub mod analyze;
pub mod engines;
pub mod expenses;
pub mod storage;

// Re-export command functions for main.rs
pub use analyze::*;
pub use engines::*;
pub use expenses::*;
pub use storage::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
