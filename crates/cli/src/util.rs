//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use sd_core::history::parse_snapshot;
use sd_core::FileData;
use std::path::Path;

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a size delta with an explicit sign ("+1.50 KB", "-12 B", "0 B")
pub fn format_signed_size(delta: i64) -> String {
    let magnitude = format_size(delta.unsigned_abs());
    match delta.signum() {
        1 => format!("+{}", magnitude),
        -1 => format!("-{}", magnitude),
        _ => magnitude,
    }
}

/// New size relative to the old one, rounded to three decimals
pub fn size_ratio(old: u64, new: u64) -> Option<f64> {
    if old == 0 {
        return None;
    }
    Some((new as f64 / old as f64 * 1000.0).round() / 1000.0)
}

/// Read a build snapshot (JSON array or CI log with a size marker)
pub async fn read_snapshot(path: &Path) -> Result<Vec<FileData>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_snapshot(&text).with_context(|| format!("Failed to parse build sizes from {}", path.display()))
}
