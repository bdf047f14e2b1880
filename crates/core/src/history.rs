//! Build size snapshots as stored in CI logs and data files
//!
//! A CI job prints its artifact sizes as a single marker line, which a later
//! job can scrape from the log to compare against.

use crate::entry::FileData;
use crate::error::{Result, SizeError};

/// Prefix of the marker line carrying a build's sizes
pub const BUILD_SIZE_PREFIX: &str = "=== BUILD SIZES: ";

/// Render the marker line for `files`
pub fn format_build_sizes(files: &[FileData]) -> Result<String> {
    Ok(format!("{}{}", BUILD_SIZE_PREFIX, serde_json::to_string(files)?))
}

/// Find the first marker line in `log`
///
/// Returns `Ok(None)` when the log has no marker.
pub fn parse_build_sizes(log: &str) -> Result<Option<Vec<FileData>>> {
    let Some(payload) = log
        .lines()
        .find_map(|line| line.trim_end_matches('\r').strip_prefix(BUILD_SIZE_PREFIX))
    else {
        return Ok(None);
    };

    if payload.is_empty() {
        return Err(SizeError::Stream("empty build size marker".to_string()));
    }
    Ok(Some(serde_json::from_str(payload)?))
}

/// Read a snapshot that is either a JSON array of artifacts or a log with a marker line
pub fn parse_snapshot(text: &str) -> Result<Vec<FileData>> {
    if text.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(text)?);
    }
    parse_build_sizes(text)?
        .ok_or_else(|| SizeError::Stream("no build size marker found".to_string()))
}
