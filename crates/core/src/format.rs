//! Depth-limited copies of the size tree
//!
//! Only formatted copies leave the worker. Serializing a whole tree with
//! hundreds of thousands of symbols is slow, so children below the requested
//! depth are replaced with `None`, meaning "exists but not loaded". A
//! confirmed leaf always carries `Some(vec![])`.

use crate::node::{
    type_code, ChildStats, Node, DEX_METHOD_SYMBOL_TYPE, DEX_SYMBOL_TYPE, FILE_TYPE,
    JAVA_CLASS_TYPE,
};
use ahash::AHashMap;
use serde::Serialize;

/// Detached copy of a node and (some of) its descendants
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedNode {
    /// Full path to this node
    pub id_path: String,
    /// Byte offset in `id_path` where the display name starts
    pub short_name_index: usize,
    /// Path of the source containing this node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_path: Option<String>,
    /// Byte size of this node and its children
    pub size: i64,
    /// Type code plus, for containers, the dominant descendant type
    #[serde(rename = "type")]
    pub type_code: String,
    /// Number of symbols sharing this size
    pub num_aliases: u32,
    /// Bit flags
    pub flags: u32,
    /// Stats about this node's descendants
    pub child_stats: ChildStats,
    /// `None` when children exist but were not loaded
    pub children: Option<Vec<FormattedNode>>,
}

impl FormattedNode {
    pub(crate) fn from_node(node: &Node, children: Option<Vec<FormattedNode>>) -> Self {
        Self {
            id_path: node.id_path.clone(),
            short_name_index: node.short_name_index,
            src_path: node.src_path.clone(),
            size: node.size,
            type_code: node.type_code(),
            num_aliases: node.num_aliases,
            flags: node.flags,
            child_stats: node.child_stats.clone(),
            children,
        }
    }

    fn java_class(id_path: String, src_path: Option<String>, short_name_index: usize) -> Self {
        Self {
            id_path,
            short_name_index,
            src_path,
            size: 0,
            type_code: JAVA_CLASS_TYPE.to_string(),
            num_aliases: 1,
            flags: 0,
            child_stats: ChildStats::default(),
            children: Some(Vec::new()),
        }
    }

    /// Display name of this node
    pub fn short_name(&self) -> &str {
        self.id_path.get(self.short_name_index..).unwrap_or("")
    }

    /// Check whether this node is known to have no children
    pub fn is_leaf(&self) -> bool {
        matches!(&self.children, Some(children) if children.is_empty())
    }

    /// Container code, dropping the dominant type
    pub fn kind_code(&self) -> Option<char> {
        self.type_code.chars().next()
    }

    /// Find a loaded child by display name
    pub fn child(&self, short_name: &str) -> Option<&FormattedNode> {
        self.children
            .as_deref()?
            .iter()
            .find(|child| child.short_name() == short_name)
    }

    /// Adds a member to a class container.
    ///
    /// Members already counted towards the file, so only this container's own
    /// stats change.
    fn adopt(&mut self, child: FormattedNode) {
        self.size += child.size;
        self.child_stats.merge(&child.child_stats);
        let incumbent = self.type_code.chars().nth(1);
        self.type_code = type_code(JAVA_CLASS_TYPE, self.child_stats.dominant(incumbent));
        self.children.get_or_insert_with(Vec::new).push(child);
    }

    pub(crate) fn sort_children(&mut self) {
        if let Some(children) = self.children.as_mut() {
            children.sort_by(|a, b| b.size.abs().cmp(&a.size.abs()));
        }
    }
}

/// Group dex members of a file node into synthetic class containers
///
/// Methods are written as `Class#method(args) returnType`; a member without a
/// space after its short name start is a bare class. Both are grouped under the
/// class id path, everything else stays a direct child of the file.
pub(crate) fn join_dex_method_classes(mut node: FormattedNode) -> FormattedNode {
    let is_file_node = node.kind_code() == Some(FILE_TYPE);
    let has_dex = node.child_stats.contains(DEX_SYMBOL_TYPE)
        || node.child_stats.contains(DEX_METHOD_SYMBOL_TYPE);
    if !is_file_node || !has_dex {
        return node;
    }
    let Some(children) = node.children.take() else {
        return node;
    };

    let mut class_index: AHashMap<String, usize> = AHashMap::new();
    let mut classes: Vec<FormattedNode> = Vec::new();
    let mut other_symbols = Vec::with_capacity(children.len());

    for mut child in children {
        let split_index = child.id_path.rfind('#');
        let is_class_node = !child
            .id_path
            .get(child.short_name_index..)
            .is_some_and(|rest| rest.contains(' '));

        if !is_class_node && split_index.is_none() {
            other_symbols.push(child);
            continue;
        }

        let class_id_path = match split_index {
            Some(idx) => child.id_path[..idx].to_string(),
            None => child.id_path.clone(),
        };

        // Strip the package of classes in .java files; the directories show it
        let mut short_name_index = child.short_name_index;
        if let Some(java_idx) = child.id_path.find(".java:") {
            if let Some(dot_idx) = class_id_path.rfind('.') {
                if dot_idx >= java_idx + 6 {
                    short_name_index += dot_idx - (java_idx + 6) + 1;
                }
            }
        }

        let idx = match class_index.get(&class_id_path) {
            Some(&idx) => idx,
            None => {
                classes.push(FormattedNode::java_class(
                    class_id_path.clone(),
                    node.src_path.clone(),
                    short_name_index,
                ));
                class_index.insert(class_id_path, classes.len() - 1);
                classes.len() - 1
            }
        };

        if let Some(split) = split_index {
            child.short_name_index = split + 1;
        }
        classes[idx].adopt(child);
    }

    for class in &mut classes {
        class.sort_children();
    }
    other_symbols.extend(classes);
    node.children = Some(other_symbols);
    node
}
