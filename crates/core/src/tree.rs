//! Size tree assembled from per-file symbol records
//!
//! Files are added one at a time with [`TreeBuilder::add_file_entry`]. Every
//! attach walks up the ancestor chain so that sizes and per-type stats are
//! always current, which lets a partially built tree be shown while the rest of
//! the stream is still being read.

use crate::entry::FileEntry;
use crate::error::{Result, SizeError};
use crate::filter::FilterOptions;
use crate::format::{join_dex_method_classes, FormattedNode};
use crate::node::{is_container_type, ChildStats, Node, NodeId, NodeKind, NO_NAME};
use ahash::AHashMap;
use tracing::debug;

/// Default path separator
pub const PATH_SEP: char = '/';

/// Predicate deciding whether a symbol node is kept
pub type SymbolPredicate = Box<dyn Fn(&Node) -> bool + Send + Sync>;

/// Byte offset of the last `/` or `sep` in `path`
fn last_separator(path: &str, sep: char) -> Option<usize> {
    path.rfind(|c: char| c == PATH_SEP || c == sep)
}

/// Byte offset where the last path component starts
fn name_start(path: &str, sep: char) -> usize {
    match last_separator(path, sep) {
        Some(idx) => idx + path[idx..].chars().next().map_or(1, char::len_utf8),
        None => 0,
    }
}

/// Folder part of `path`, empty for top level names
fn dirname(path: &str, sep: char) -> &str {
    &path[..last_separator(path, sep).unwrap_or(0)]
}

/// Arena holding every node of one load
///
/// The arena exclusively owns its nodes; children lists are the only ownership
/// edges and `parent` links are plain back-references.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    sep: char,
}

impl Tree {
    fn new(sep: char) -> Self {
        let root = Node::container(NodeKind::Directory, sep.to_string(), 0);
        Self {
            nodes: vec![root],
            root: NodeId(0),
            sep,
        }
    }

    /// Id of the root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The root node
    pub fn root_node(&self) -> &Node {
        self.node(self.root)
    }

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if nothing was attached to the root
    pub fn is_empty(&self) -> bool {
        self.root_node().children.is_empty()
    }

    /// Path separator used for this tree
    pub fn separator(&self) -> char {
        self.sep
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Link `child` under `parent` and fold its totals into every ancestor
    fn attach(&mut self, child: NodeId, parent: NodeId) {
        debug_assert!(self.node(child).parent.is_none(), "node attached twice");

        self.node_mut(parent).children.push(child);
        self.node_mut(child).parent = Some(parent);

        let additional_size = self.node(child).size;
        let additional_stats = self.node(child).child_stats.clone();

        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            let ancestor = self.node_mut(id);
            ancestor.child_stats.merge(&additional_stats);
            ancestor.dominant = ancestor.child_stats.dominant(ancestor.dominant);
            ancestor.size += additional_size;
            cursor = ancestor.parent;
        }
    }

    /// Copy `id` and its descendants down to `depth` levels
    ///
    /// Nodes with at most one child always include it, so chains of single
    /// children arrive expanded. Children are sorted by descending absolute
    /// size. Use `usize::MAX` for the whole subtree.
    pub fn format_node(&self, id: NodeId, depth: usize) -> FormattedNode {
        let node = self.node(id);
        let children = if depth > 0 || node.children.len() <= 1 {
            let child_depth = depth.saturating_sub(1);
            Some(
                node.children
                    .iter()
                    .map(|&child| self.format_node(child, child_depth))
                    .collect(),
            )
        } else {
            None
        };

        let mut formatted = join_dex_method_classes(FormattedNode::from_node(node, children));
        formatted.sort_children();
        formatted
    }

    /// Format the root and its direct children
    pub fn format_root(&self) -> FormattedNode {
        self.format_node(self.root, 1)
    }

    /// Find a node by id path
    ///
    /// Symbol paths are written `<file path>:<symbol name>`.
    pub fn find(&self, id_path: &str) -> Option<NodeId> {
        if id_path == self.root_node().id_path {
            return Some(self.root);
        }

        let sep = self.sep;
        let split = |path: &str| -> Vec<String> {
            path.split(|c: char| c == PATH_SEP || c == sep)
                .map(str::to_string)
                .collect()
        };

        let mut segments = match id_path.find(':') {
            Some(idx) => {
                let mut segments = split(&id_path[..idx]);
                segments.push(id_path[idx + 1..].to_string());
                segments
            }
            None => split(id_path),
        };

        // An empty leading segment refers to the no-name container
        if segments.first().is_some_and(|s| s.is_empty()) {
            segments.insert(0, NO_NAME.to_string());
        }

        let mut current = self.root;
        for segment in &segments {
            current = *self
                .node(current)
                .children
                .iter()
                .find(|&&child| self.node(child).short_name() == segment)?;
        }
        Some(current)
    }
}

/// Builds a [`Tree`] from file entries
///
/// Call [`TreeBuilder::add_file_entry`] for every file, then
/// [`TreeBuilder::build`] to finalize. The in-progress tree is available
/// through [`TreeBuilder::tree`].
pub struct TreeBuilder {
    tree: Tree,
    /// Cache of directory nodes by path
    parents: AHashMap<String, NodeId>,
    filter: SymbolPredicate,
}

impl TreeBuilder {
    /// Create a builder keeping only symbols accepted by `filter`
    pub fn new(filter: impl Fn(&Node) -> bool + Send + Sync + 'static) -> Self {
        Self::with_separator(filter, PATH_SEP)
    }

    /// Create a builder splitting paths on `/` and `sep`
    pub fn with_separator(filter: impl Fn(&Node) -> bool + Send + Sync + 'static, sep: char) -> Self {
        Self {
            tree: Tree::new(sep),
            parents: AHashMap::new(),
            filter: Box::new(filter),
        }
    }

    /// Create a builder filtering with parsed query options
    pub fn from_options(options: FilterOptions) -> Self {
        Self::new(move |node: &Node| options.accepts(node))
    }

    /// Tree built so far
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Add one file and its symbols
    ///
    /// Symbols rejected by the filter are dropped. A file without remaining
    /// symbols is neither created nor attached, so it allocates no directories.
    pub fn add_file_entry(&mut self, entry: &FileEntry, diff_mode: bool) -> Result<()> {
        let id_path = entry.path.as_str();
        let default_count = if diff_mode { 0 } else { 1 };

        let mut accepted = Vec::with_capacity(entry.symbols.len());
        for symbol in &entry.symbols {
            if is_container_type(symbol.kind) {
                return Err(SizeError::MalformedEntry(format!(
                    "symbol \"{}\" in \"{}\" uses container type '{}'",
                    symbol.name, entry.path, symbol.kind
                )));
            }

            let count = symbol.count.unwrap_or(default_count);
            let node = Node {
                id_path: format!("{}:{}", id_path, symbol.name),
                short_name_index: id_path.len() + 1,
                src_path: Some(entry.path.clone()),
                size: symbol.byte_size,
                kind: NodeKind::Symbol(symbol.kind),
                dominant: None,
                num_aliases: symbol.num_aliases.unwrap_or(1),
                flags: symbol.flags.unwrap_or(0),
                child_stats: ChildStats::single(symbol.kind, symbol.byte_size, count),
                children: Vec::new(),
                parent: None,
            };

            if (self.filter)(&node) {
                accepted.push(node);
            }
        }

        if accepted.is_empty() {
            debug!(path = %entry.path, "all symbols filtered out");
            return Ok(());
        }

        let mut file_node = Node::container(
            NodeKind::File,
            id_path.to_string(),
            name_start(id_path, self.tree.sep),
        );
        file_node.src_path = Some(entry.path.clone());
        let file_id = self.tree.push(file_node);

        for symbol_node in accepted {
            let symbol_id = self.tree.push(symbol_node);
            self.tree.attach(symbol_id, file_id);
        }

        // Build all ancestor nodes for this file
        let mut orphan = file_id;
        while self.tree.node(orphan).parent.is_none() && orphan != self.tree.root {
            orphan = self.get_or_make_parent(orphan);
        }

        Ok(())
    }

    /// Attach `child` to its directory, creating and caching it when missing
    fn get_or_make_parent(&mut self, child: NodeId) -> NodeId {
        let sep = self.tree.sep;
        let child_path = &self.tree.node(child).id_path;
        let parent_path = if child_path.is_empty() {
            NO_NAME.to_string()
        } else {
            dirname(child_path, sep).to_string()
        };

        let parent = if parent_path.is_empty() {
            self.tree.root
        } else if let Some(&cached) = self.parents.get(&parent_path) {
            cached
        } else {
            let short_name_index = name_start(&parent_path, sep);
            let id = self.tree.push(Node::container(
                NodeKind::Directory,
                parent_path.clone(),
                short_name_index,
            ));
            self.parents.insert(parent_path, id);
            id
        };

        self.tree.attach(child, parent);
        parent
    }

    /// Finalize the tree; no further entries can be added
    pub fn build(mut self) -> Tree {
        self.parents.clear();
        debug!(nodes = self.tree.len(), size = self.tree.root_node().size, "tree finalized");
        self.tree
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new(|_: &Node| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::SymbolEntry;
    use crate::node::{ChildStat, SYMBOL_TYPES};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn entry(path: &str, symbols: &[(&str, i64, char)]) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            symbols: symbols
                .iter()
                .map(|&(name, size, kind)| SymbolEntry::new(name, size, kind, 1))
                .collect(),
        }
    }

    fn random_entries(seed: u64, files: usize) -> Vec<FileEntry> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let dirs = ["src", "src/ui", "src/ui/tree", "lib", "lib/vendor", "assets"];
        let types: Vec<char> = SYMBOL_TYPES.chars().collect();

        (0..files)
            .map(|i| {
                let dir = dirs[rng.gen_range(0..dirs.len())];
                let path = format!("{}/file{}.js", dir, i);
                let symbols = (0..rng.gen_range(1..6))
                    .map(|j| {
                        let kind = types[rng.gen_range(0..types.len())];
                        SymbolEntry::new(format!("sym{}", j), rng.gen_range(-500..2000), kind, 1)
                    })
                    .collect();
                FileEntry { path, symbols }
            })
            .collect()
    }

    /// Returns (size, stats) recomputed from the leaves below `id`
    fn check_aggregates(tree: &Tree, id: NodeId) -> (i64, ChildStats) {
        let node = tree.node(id);
        if let NodeKind::Symbol(_) = node.kind {
            return (node.size, node.child_stats.clone());
        }

        let mut size = 0;
        let mut stats = ChildStats::default();
        for &child in node.children() {
            assert_eq!(tree.node(child).parent(), Some(id));
            let (child_size, child_stats) = check_aggregates(tree, child);
            size += child_size;
            stats.merge(&child_stats);
        }

        assert_eq!(node.size, size, "size mismatch at {}", node.id_path);
        for (kind, stat) in stats.iter() {
            assert_eq!(node.child_stats.get(kind), Some(stat), "stats mismatch at {}", node.id_path);
        }
        assert_eq!(node.child_stats.len(), stats.len());
        (size, stats)
    }

    #[test]
    fn test_builds_directory_chain() {
        let mut builder = TreeBuilder::default();
        builder
            .add_file_entry(&entry("src/ui/a.js", &[("a.js", 100, 't'), ("a.js (gzip)", 40, 'o')]), false)
            .unwrap();
        builder.add_file_entry(&entry("src/b.js", &[("b.js", 10, 't')]), false).unwrap();
        let tree = builder.build();

        let root = tree.root_node();
        assert_eq!(root.size, 150);
        assert_eq!(root.type_code(), "Dt");
        assert_eq!(root.child_stats.get('o'), Some(&ChildStat { size: 40, count: 1 }));

        let src = tree.find("src").unwrap();
        assert_eq!(tree.node(src).children().len(), 2);
        let ui = tree.find("src/ui").unwrap();
        assert_eq!(tree.node(ui).short_name(), "ui");
        let file = tree.find("src/ui/a.js").unwrap();
        assert_eq!(tree.node(file).type_code(), "Ft");
        let symbol = tree.find("src/ui/a.js:a.js (gzip)").unwrap();
        assert_eq!(tree.node(symbol).size, 40);
        assert_eq!(tree.node(symbol).short_name(), "a.js (gzip)");
    }

    #[test]
    fn test_aggregation_invariant_random() {
        for seed in 0..8 {
            let mut builder = TreeBuilder::default();
            for e in random_entries(seed, 200) {
                builder.add_file_entry(&e, true).unwrap();
            }
            let tree = builder.build();
            check_aggregates(&tree, tree.root());
        }
    }

    #[test]
    fn test_dominant_matches_largest_type() {
        let mut builder = TreeBuilder::default();
        for e in random_entries(42, 120) {
            builder.add_file_entry(&e, false).unwrap();
        }
        let tree = builder.build();

        for idx in 0..tree.len() {
            let node = tree.node(NodeId(idx as u32));
            if !node.kind.is_container() {
                continue;
            }
            let largest = node.child_stats.iter().map(|(_, s)| s.size.abs()).max().unwrap_or(0);
            match node.dominant {
                Some(kind) => assert_eq!(node.child_stats.get(kind).unwrap().size.abs(), largest),
                None => assert_eq!(largest, 0),
            }
        }
    }

    #[test]
    fn test_deterministic_builds() {
        let entries = random_entries(7, 150);
        let build = || {
            let mut builder = TreeBuilder::default();
            for e in &entries {
                builder.add_file_entry(e, true).unwrap();
            }
            builder.build()
        };

        let first = build();
        let second = build();
        assert_eq!(
            first.format_node(first.root(), usize::MAX),
            second.format_node(second.root(), usize::MAX)
        );
    }

    #[test]
    fn test_filtered_file_not_attached() {
        let mut builder = TreeBuilder::new(|node: &Node| node.size.abs() >= 100);
        builder
            .add_file_entry(&entry("lonely/tiny.js", &[("a", 3, 't'), ("b", 4, 't')]), false)
            .unwrap();
        builder.add_file_entry(&entry("big.js", &[("main", 300, 't')]), false).unwrap();
        let tree = builder.build();

        assert_eq!(tree.find("lonely"), None);
        assert_eq!(tree.root_node().children().len(), 1);
        assert_eq!(tree.root_node().size, 300);
        // root + big.js + its symbol
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_partially_filtered_file_counts_only_survivors() {
        let mut builder = TreeBuilder::new(|node: &Node| node.size >= 10);
        builder
            .add_file_entry(&entry("a.js", &[("keep", 50, 't'), ("drop", 5, 'o')]), false)
            .unwrap();
        let tree = builder.build();

        let file = tree.node(tree.find("a.js").unwrap());
        assert_eq!(file.size, 50);
        assert!(!file.child_stats.contains('o'));
    }

    #[test]
    fn test_container_type_symbol_is_malformed() {
        let mut builder = TreeBuilder::default();
        let err = builder
            .add_file_entry(&entry("a.js", &[("x", 1, 'D')]), false)
            .unwrap_err();
        assert!(matches!(err, SizeError::MalformedEntry(_)));
        assert!(builder.tree().is_empty());
    }

    #[test]
    fn test_default_count_depends_on_mode() {
        let file = FileEntry {
            path: "a.js".to_string(),
            symbols: vec![SymbolEntry {
                name: "main".to_string(),
                byte_size: 5,
                kind: 't',
                count: None,
                flags: None,
                num_aliases: None,
            }],
        };

        let mut single = TreeBuilder::default();
        single.add_file_entry(&file, false).unwrap();
        assert_eq!(single.tree().root_node().child_stats.get('t').unwrap().count, 1);

        let mut diff = TreeBuilder::default();
        diff.add_file_entry(&file, true).unwrap();
        assert_eq!(diff.tree().root_node().child_stats.get('t').unwrap().count, 0);
    }

    #[test]
    fn test_empty_path_goes_to_no_name() {
        let mut builder = TreeBuilder::default();
        builder.add_file_entry(&entry("", &[("orphan", 9, 't')]), false).unwrap();
        let tree = builder.build();

        let bucket = tree.find(NO_NAME).unwrap();
        assert_eq!(tree.node(bucket).size, 9);
        let symbol = tree.find(":orphan").unwrap();
        assert_eq!(tree.node(symbol).short_name(), "orphan");
    }

    #[test]
    fn test_find_missing_returns_none() {
        let mut builder = TreeBuilder::default();
        builder.add_file_entry(&entry("a/b.js", &[("x", 1, 't')]), false).unwrap();
        let tree = builder.build();

        assert_eq!(tree.find("/"), Some(tree.root()));
        assert_eq!(tree.find("a/c.js"), None);
        assert_eq!(tree.find("a/b.js:y"), None);
        assert_eq!(tree.find("z"), None);
    }

    #[test]
    fn test_custom_separator() {
        let mut builder = TreeBuilder::with_separator(|_: &Node| true, '.');
        builder.add_file_entry(&entry("com.example.Main", &[("run", 7, 't')]), false).unwrap();
        let tree = builder.build();

        let pkg = tree.find("com.example").unwrap();
        assert_eq!(tree.node(pkg).short_name(), "example");
        assert!(tree.find("com.example.Main:run").is_some());
    }

    #[test]
    fn test_format_depth_and_leaves() {
        let mut builder = TreeBuilder::default();
        builder
            .add_file_entry(&entry("a/x.js", &[("small", 1, 't'), ("large", -9, 't')]), false)
            .unwrap();
        builder.add_file_entry(&entry("b.js", &[("only", 3, 't')]), false).unwrap();
        let tree = builder.build();

        let root = tree.format_root();
        let children = root.children.as_ref().unwrap();
        // |-8| > |3|
        assert_eq!(children[0].short_name(), "a");
        assert_eq!(children[1].short_name(), "b.js");

        // "a" has a single child, so the chain is expanded
        let x = children[0].child("x.js").unwrap();
        // x.js has two children below the requested depth
        assert!(x.children.is_none());

        // b.js has a single child, loaded and a confirmed leaf
        let only = children[1].child("only").unwrap();
        assert!(only.is_leaf());

        let opened = tree.format_node(tree.find("a/x.js").unwrap(), 1);
        let names: Vec<_> = opened.children.unwrap().iter().map(|c| c.short_name().to_string()).collect();
        assert_eq!(names, vec!["large", "small"]);
    }

    #[test]
    fn test_format_does_not_mutate() {
        let mut builder = TreeBuilder::default();
        builder
            .add_file_entry(&entry("p/A.java", &[("p.A#run() void", 4, 'm'), ("p.A#stop() void", 2, 'm')]), false)
            .unwrap();
        let tree = builder.build();

        let snapshot = |tree: &Tree| -> Vec<(String, i64, usize)> {
            (0..tree.len())
                .map(|i| {
                    let node = tree.node(NodeId(i as u32));
                    (node.id_path.clone(), node.size, node.short_name_index)
                })
                .collect()
        };
        let before = snapshot(&tree);
        let _ = tree.format_node(tree.root(), usize::MAX);
        assert_eq!(before, snapshot(&tree));

        let file = tree.find("p/A.java").unwrap();
        assert_eq!(tree.node(file).children().len(), 2);
    }

    #[test]
    fn test_dex_join_keeps_file_size() {
        let mut builder = TreeBuilder::default();
        builder
            .add_file_entry(
                &entry(
                    "p/A.java",
                    &[("p.A#run() void", 4, 'm'), ("p.A#stop() void", 2, 'm'), ("p.A", 1, 'x'), ("p.B#go() int", 8, 'm')],
                ),
                false,
            )
            .unwrap();
        let tree = builder.build();
        let file_id = tree.find("p/A.java").unwrap();
        let raw_size = tree.node(file_id).size;

        let formatted = tree.format_node(file_id, 1);
        assert_eq!(formatted.size, raw_size);

        let classes = formatted.children.unwrap();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].id_path, "p/A.java:p.B");
        assert_eq!(classes[0].short_name(), "B");
        assert_eq!(classes[1].size, 7);
        assert_eq!(classes.iter().map(|c| c.size).sum::<i64>(), raw_size);
    }

    #[test]
    fn test_dex_class_members_sorted_by_size() {
        let mut builder = TreeBuilder::default();
        builder
            .add_file_entry(
                &entry("p/A.java", &[("p.A#small() void", 1, 'm'), ("p.A#big() void", 100, 'm')]),
                false,
            )
            .unwrap();
        let tree = builder.build();
        let file_id = tree.find("p/A.java").unwrap();

        let formatted = tree.format_node(file_id, 1);
        let classes = formatted.children.unwrap();
        assert_eq!(classes.len(), 1);

        let members: Vec<_> = classes[0]
            .children
            .as_ref()
            .unwrap()
            .iter()
            .map(|m| (m.short_name().to_string(), m.size))
            .collect();
        assert_eq!(members, vec![("big() void".to_string(), 100), ("small() void".to_string(), 1)]);
    }

    #[test]
    fn test_depth_limited_round_trip() {
        let mut builder = TreeBuilder::default();
        for e in random_entries(3, 80) {
            builder.add_file_entry(&e, true).unwrap();
        }
        let tree = builder.build();
        let full = tree.format_node(tree.root(), usize::MAX);

        fn walk<'a>(node: &'a FormattedNode, out: &mut Vec<&'a FormattedNode>) {
            out.push(node);
            for child in node.children.iter().flatten() {
                walk(child, out);
            }
        }
        let mut all = Vec::new();
        walk(&full, &mut all);

        // Class containers only exist in formatted copies
        let containers = all
            .iter()
            .filter(|n| !n.is_leaf() && n.kind_code() != Some(crate::node::JAVA_CLASS_TYPE));
        for expanded in containers {
            let id = tree.find(&expanded.id_path).expect("every container is addressable");
            let opened = tree.format_node(id, 1);

            assert_eq!(opened.size, expanded.size);
            assert_eq!(opened.child_stats, expanded.child_stats);
            let opened_sizes: Vec<_> = opened.children.iter().flatten().map(|c| (c.id_path.clone(), c.size)).collect();
            let expanded_sizes: Vec<_> =
                expanded.children.iter().flatten().map(|c| (c.id_path.clone(), c.size)).collect();
            assert_eq!(opened_sizes, expanded_sizes);
        }
    }
}
