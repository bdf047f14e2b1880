//! Build artifact size diffing
//!
//! This crate provides:
//! - Rename detection for hash-busted artifact names
//! - Classification of two builds into added/removed/changed artifacts
//! - Conversion of builds into per-file symbol records
//! - Incremental size tree with per-type rollups and depth-limited formatting
//! - Symbol filters and build size log markers

pub mod classify;
pub mod entry;
pub mod error;
pub mod filter;
pub mod format;
pub mod history;
pub mod node;
pub mod pattern;
pub mod transform;
pub mod tree;

// Re-exports
pub use classify::{classify, BuildChanges};
pub use entry::{FileData, FileEntry, Meta, Record, SymbolEntry};
pub use error::{Result, SizeError};
pub use filter::FilterOptions;
pub use format::FormattedNode;
pub use node::{ChildStat, ChildStats, Node, NodeId, NodeKind, NO_NAME};
pub use pattern::{FindRenamed, RenamePattern};
pub use transform::{transform_build, transform_changes, Snapshot};
pub use tree::{Tree, TreeBuilder};
