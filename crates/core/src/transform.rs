//! Conversion of classified builds into tree builder records
//!
//! Each artifact becomes a primary symbol plus a gzip pseudo-symbol. Artifacts
//! derived from the same source (`a.js`, `a.js.gz`, `a.js.map`) are merged
//! into a single file entry so they show up as one node.

use crate::classify::BuildChanges;
use crate::entry::{FileData, FileEntry, Meta, Record, SymbolEntry};
use crate::node::{CODE_SYMBOL_TYPE, OTHER_SYMBOL_TYPE};
use ahash::AHashMap;

/// Derivative suffixes and what they are replaced with
const DERIVATIVE_SUFFIXES: &[(&str, &str)] = &[(".gz", ""), (".map", ""), (".d.ts", ".js")];

/// Meta record plus file entries, ready to be streamed
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub meta: Meta,
    pub entries: Vec<FileEntry>,
}

impl Snapshot {
    /// Records in stream order, meta first
    pub fn into_records(self) -> impl Iterator<Item = Record> {
        std::iter::once(Record::Meta(self.meta)).chain(self.entries.into_iter().map(Record::File))
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Path of the artifact `path` was derived from
pub fn source_path(path: &str) -> String {
    let mut current = path.to_string();
    'strip: loop {
        for (suffix, replacement) in DERIVATIVE_SUFFIXES {
            if let Some(stem) = current.strip_suffix(suffix) {
                // Don't strip a bare suffix down to nothing
                if stem.is_empty() || stem.ends_with('/') {
                    continue;
                }
                current = format!("{}{}", stem, replacement);
                continue 'strip;
            }
        }
        return current;
    }
}

/// Groups symbols by source path, keeping first-seen order
#[derive(Default)]
struct EntryMerger {
    entries: Vec<FileEntry>,
    index: AHashMap<String, usize>,
}

impl EntryMerger {
    fn push(&mut self, artifact_path: &str, size: i64, gzip_size: i64, count: i64) {
        let name = basename(artifact_path);
        let mut symbols = vec![SymbolEntry::new(name, size, CODE_SYMBOL_TYPE, count)];
        if !artifact_path.ends_with(".gz") {
            symbols.push(SymbolEntry::new(
                format!("{} (gzip)", name),
                gzip_size,
                OTHER_SYMBOL_TYPE,
                count,
            ));
        }

        let path = source_path(artifact_path);
        match self.index.get(&path) {
            Some(&idx) => self.entries[idx].symbols.extend(symbols),
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push(FileEntry { path, symbols });
            }
        }
    }

    fn finish(self, meta: Meta) -> Snapshot {
        Snapshot {
            meta,
            entries: self.entries,
        }
    }
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Diff mode records: every symbol carries the size delta between the builds
pub fn transform_changes(changes: &BuildChanges) -> Snapshot {
    let mut merger = EntryMerger::default();

    for item in &changes.new_items {
        merger.push(&item.path, signed(item.size), signed(item.gzip_size), 1);
    }
    for item in &changes.deleted_items {
        merger.push(&item.path, -signed(item.size), -signed(item.gzip_size), -1);
    }
    for item in &changes.same_items {
        merger.push(&item.path, 0, 0, 1);
    }
    for (old, new) in &changes.changed_items {
        merger.push(
            &new.path,
            signed(new.size) - signed(old.size),
            signed(new.gzip_size) - signed(old.gzip_size),
            1,
        );
    }

    merger.finish(Meta {
        total: changes.total(),
        diff_mode: true,
    })
}

/// Single build records with raw sizes
pub fn transform_build(files: &[FileData]) -> Snapshot {
    let mut merger = EntryMerger::default();
    for file in files {
        merger.push(&file.path, signed(file.size), signed(file.gzip_size), 1);
    }
    merger.finish(Meta {
        total: files.len(),
        diff_mode: false,
    })
}
