//! Nodes of the size tree and their per-type statistics

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use smallvec::SmallVec;

/// Type code of a directory container
pub const DIRECTORY_TYPE: char = 'D';
/// Type code of a component container
pub const COMPONENT_TYPE: char = 'C';
/// Type code of a file container
pub const FILE_TYPE: char = 'F';
/// Type code of a synthetic java class container
pub const JAVA_CLASS_TYPE: char = 'J';

/// Type for a code/.text symbol
pub const CODE_SYMBOL_TYPE: char = 't';
/// Type for a dex method symbol
pub const DEX_METHOD_SYMBOL_TYPE: char = 'm';
/// Type for a non-method dex symbol
pub const DEX_SYMBOL_TYPE: char = 'x';
/// Type for an "other" symbol
pub const OTHER_SYMBOL_TYPE: char = 'o';

/// Every known symbol type; container types are not included
pub const SYMBOL_TYPES: &str = "bdrtRxmopP";

/// Name of the directory holding symbols with no path
pub const NO_NAME: &str = "(No path)";

/// Check whether `kind` is reserved for containers
pub fn is_container_type(kind: char) -> bool {
    matches!(kind, DIRECTORY_TYPE | COMPONENT_TYPE | FILE_TYPE | JAVA_CLASS_TYPE)
}

/// Index of a node inside a [`crate::tree::Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Folder in the artifact path
    Directory,
    /// Artifact (or source file) grouping symbols
    File,
    /// Synthetic container grouping dex members of one class
    JavaClass,
    /// Leaf symbol with its single character type
    Symbol(char),
}

impl NodeKind {
    /// Single character code of this kind
    pub fn code(self) -> char {
        match self {
            Self::Directory => DIRECTORY_TYPE,
            Self::File => FILE_TYPE,
            Self::JavaClass => JAVA_CLASS_TYPE,
            Self::Symbol(kind) => kind,
        }
    }

    /// Check whether this kind aggregates children
    pub fn is_container(self) -> bool {
        !matches!(self, Self::Symbol(_))
    }
}

/// Aggregate of the descendants of one symbol type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildStat {
    /// Byte size
    pub size: i64,
    /// Number of symbols
    pub count: i64,
}

/// Per-type rollup, kept in first-insertion order
///
/// Insertion order decides dominance ties, so a plain hash map won't do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildStats(SmallVec<[(char, ChildStat); 4]>);

impl ChildStats {
    /// Stats holding a single type
    pub fn single(kind: char, size: i64, count: i64) -> Self {
        let mut stats = Self::default();
        stats.0.push((kind, ChildStat { size, count }));
        stats
    }

    /// Look up the stat for `kind`
    pub fn get(&self, kind: char) -> Option<&ChildStat> {
        self.0.iter().find(|(k, _)| *k == kind).map(|(_, stat)| stat)
    }

    /// Check whether any descendant of `kind` was recorded
    pub fn contains(&self, kind: char) -> bool {
        self.get(kind).is_some()
    }

    /// Add `stat` to the entry for `kind`, creating it if missing
    pub fn add(&mut self, kind: char, stat: &ChildStat) {
        match self.0.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, existing)) => {
                existing.size += stat.size;
                existing.count += stat.count;
            }
            None => self.0.push((kind, *stat)),
        }
    }

    /// Merge every entry of `other` into this rollup
    pub fn merge(&mut self, other: &ChildStats) {
        for (kind, stat) in other.iter() {
            self.add(kind, stat);
        }
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (char, &ChildStat)> {
        self.0.iter().map(|(k, stat)| (*k, stat))
    }

    /// Number of recorded types
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no type was recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pick the type with the largest absolute size
    ///
    /// The incumbent keeps its place on ties; otherwise the earliest inserted
    /// type wins, since only a strictly larger size replaces the current pick.
    pub fn dominant(&self, incumbent: Option<char>) -> Option<char> {
        let mut best_type = incumbent.filter(|kind| self.contains(*kind));
        let mut best_size = best_type
            .and_then(|kind| self.get(kind))
            .map(|stat| stat.size.abs())
            .unwrap_or(0);

        for (kind, stat) in self.iter() {
            let abs_size = stat.size.abs();
            if abs_size > best_size {
                best_type = Some(kind);
                best_size = abs_size;
            }
        }

        best_type
    }
}

impl Serialize for ChildStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (kind, stat) in &self.0 {
            map.serialize_entry(kind, stat)?;
        }
        map.end()
    }
}

/// A node of the live tree
#[derive(Debug, Clone)]
pub struct Node {
    /// Full path to this node
    pub id_path: String,
    /// Byte offset in `id_path` where the display name starts
    pub short_name_index: usize,
    /// Path of the source containing this node
    pub src_path: Option<String>,
    /// Own size for symbols, sum of children for containers
    pub size: i64,
    /// What this node represents
    pub kind: NodeKind,
    /// Most significant descendant type (containers only)
    pub dominant: Option<char>,
    /// Number of symbols sharing this size
    pub num_aliases: u32,
    /// Bit flags of a symbol
    pub flags: u32,
    /// Stats about this node's descendants
    pub child_stats: ChildStats,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
}

impl Node {
    /// Create an empty container
    pub fn container(kind: NodeKind, id_path: String, short_name_index: usize) -> Self {
        Self {
            id_path,
            short_name_index,
            src_path: None,
            size: 0,
            kind,
            dominant: None,
            num_aliases: 1,
            flags: 0,
            child_stats: ChildStats::default(),
            children: Vec::new(),
            parent: None,
        }
    }

    /// Display name of this node
    pub fn short_name(&self) -> &str {
        self.id_path.get(self.short_name_index..).unwrap_or("")
    }

    /// Type string as sent over the wire, e.g. `"Ft"` or `"m"`
    pub fn type_code(&self) -> String {
        type_code(self.kind.code(), self.dominant)
    }

    /// Direct children, in attach order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Parent node, `None` for the root and detached nodes
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

pub(crate) fn type_code(code: char, dominant: Option<char>) -> String {
    let mut out = String::with_capacity(2);
    out.push(code);
    if let Some(kind) = dominant {
        out.push(kind);
    }
    out
}
