//! Classification of two build snapshots into added, removed and changed artifacts

use crate::entry::FileData;
use crate::error::{Result, SizeError};
use crate::pattern::FindRenamed;
use ahash::AHashMap;
use tracing::debug;

/// Differences between two builds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildChanges {
    /// Artifacts only present in the current build
    pub new_items: Vec<FileData>,
    /// Artifacts only present in the previous build
    pub deleted_items: Vec<FileData>,
    /// Artifacts whose gzip size did not change (current build record)
    pub same_items: Vec<FileData>,
    /// Changed or renamed artifacts as (old, new), in discovery order
    pub changed_items: Vec<(FileData, FileData)>,
}

impl BuildChanges {
    /// Number of classified items across all buckets
    pub fn total(&self) -> usize {
        self.new_items.len() + self.deleted_items.len() + self.same_items.len() + self.changed_items.len()
    }

    /// Check if anything was added, removed or changed
    pub fn is_empty(&self) -> bool {
        self.new_items.is_empty() && self.deleted_items.is_empty() && self.changed_items.is_empty()
    }
}

/// Compare the previous build against the current one
///
/// Matching is by path first. When `rename` is given, every artifact that
/// disappeared is offered the still unclaimed new paths, in previous-build
/// order; a hit moves the pair into `changed_items`.
pub fn classify(
    previous: &[FileData],
    current: &[FileData],
    rename: Option<&dyn FindRenamed>,
) -> Result<BuildChanges> {
    let mut by_path: AHashMap<&str, usize> = AHashMap::with_capacity(current.len());
    for (idx, entry) in current.iter().enumerate() {
        by_path.entry(entry.path.as_str()).or_insert(idx);
    }

    let mut changes = BuildChanges::default();
    let mut matched = vec![false; current.len()];

    for old_entry in previous {
        let Some(&idx) = by_path.get(old_entry.path.as_str()) else {
            changes.deleted_items.push(old_entry.clone());
            continue;
        };

        matched[idx] = true;
        let new_entry = &current[idx];
        if old_entry.gzip_size != new_entry.gzip_size {
            changes.changed_items.push((old_entry.clone(), new_entry.clone()));
        } else {
            changes.same_items.push(new_entry.clone());
        }
    }

    // Look for entries that are only in the current build
    for (entry, was_matched) in current.iter().zip(matched) {
        if !was_matched {
            changes.new_items.push(entry.clone());
        }
    }

    if let Some(matcher) = rename {
        detect_renames(&mut changes, matcher)?;
    }

    debug!(
        new = changes.new_items.len(),
        deleted = changes.deleted_items.len(),
        same = changes.same_items.len(),
        changed = changes.changed_items.len(),
        "classified build changes"
    );

    Ok(changes)
}

/// Pair deleted artifacts with new ones; each new path can be claimed once
fn detect_renames(changes: &mut BuildChanges, matcher: &dyn FindRenamed) -> Result<()> {
    let deleted = std::mem::take(&mut changes.deleted_items);
    let mut new_paths: Vec<String> = changes.new_items.iter().map(|i| i.path.clone()).collect();

    for deleted_item in deleted {
        let Some(result) = matcher.find_renamed(&deleted_item.path, &new_paths) else {
            changes.deleted_items.push(deleted_item);
            continue;
        };

        let Some(path_idx) = new_paths.iter().position(|p| *p == result) else {
            return Err(SizeError::RenameMismatch(result));
        };
        new_paths.remove(path_idx);

        let Some(item_idx) = changes.new_items.iter().position(|i| i.path == result) else {
            return Err(SizeError::RenameMismatch(result));
        };
        let new_item = changes.new_items.remove(item_idx);

        debug!(from = %deleted_item.path, to = %new_item.path, "detected rename");
        changes.changed_items.push((deleted_item, new_item));
    }

    Ok(())
}
