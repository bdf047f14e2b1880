//! Compare two build snapshots

use crate::config::ReportConfig;
use crate::report;
use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use sd_core::history::format_build_sizes;
use sd_core::{classify, FindRenamed};
use std::path::Path;

pub async fn run(previous: &Path, current: &Path, config: &ReportConfig, emit_marker: bool) -> Result<()> {
    // 1. Read both builds
    let previous_build = util::read_snapshot(previous).await?;
    let current_build = util::read_snapshot(current).await?;

    // 2. Classify
    let pattern = config.rename_pattern()?;
    let changes = classify(
        &previous_build,
        &current_build,
        pattern.as_ref().map(|p| p as &dyn FindRenamed),
    )
    .context("Failed to compare builds")?;

    // 3. Display report
    println!("{}", "Build size changes:".bold());
    print!("{}", report::render_changes(&changes));

    let total_before: u64 = previous_build.iter().map(|f| f.gzip_size).sum();
    let total_after: u64 = current_build.iter().map(|f| f.gzip_size).sum();
    println!();
    println!(
        "{}",
        format!(
            "Total: {} -> {} ({})",
            util::format_size(total_before),
            util::format_size(total_after),
            util::format_signed_size(total_after as i64 - total_before as i64)
        )
        .dimmed()
    );

    // 4. Marker line for the next comparison to scrape
    if emit_marker {
        println!("{}", format_build_sizes(&current_build)?);
    }

    Ok(())
}
