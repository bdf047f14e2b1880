//! Text rendering of build changes and size trees

use crate::util::{format_signed_size, format_size, size_ratio};
use owo_colors::OwoColorize;
use sd_core::{BuildChanges, FormattedNode};
use std::fmt::Write;

/// Render the classified changes, one artifact per line
pub fn render_changes(changes: &BuildChanges) -> String {
    let mut out = String::new();

    if changes.is_empty() {
        let _ = writeln!(out, "  No changes.");
    }

    for file in &changes.new_items {
        let _ = writeln!(out, "  {}   {} - {}", "ADDED".green(), file.path, format_size(file.gzip_size));
    }

    for file in &changes.deleted_items {
        let _ = writeln!(out, "  {} {} - was {}", "REMOVED".red(), file.path, format_size(file.gzip_size));
    }

    for (old, new) in &changes.changed_items {
        let size = if old.gzip_size == new.gzip_size {
            // Just renamed
            format!("{} -> no change", format_size(new.gzip_size))
        } else {
            let delta = new.gzip_size as i64 - old.gzip_size as i64;
            let detail = match size_ratio(old.gzip_size, new.gzip_size) {
                Some(ratio) => format!("{}, {}x", format_signed_size(delta), ratio),
                None => format_signed_size(delta),
            };
            let detail = if delta > 0 {
                detail.red().to_string()
            } else {
                detail.green().to_string()
            };
            format!("{} -> {} ({})", format_size(old.gzip_size), format_size(new.gzip_size), detail)
        };

        let _ = writeln!(out, "  {} {} - {}", "CHANGED".yellow(), new.path, size);
        if old.path != new.path {
            let _ = writeln!(out, "    Renamed from: {}", old.path);
        }
    }

    out
}

/// Render a formatted tree, indenting each level; unloaded children show as `...`
pub fn render_tree(root: &FormattedNode, diff_mode: bool) -> String {
    let mut out = String::new();
    render_node(&mut out, root, 0, diff_mode);
    out
}

fn render_node(out: &mut String, node: &FormattedNode, level: usize, diff_mode: bool) {
    let size = if diff_mode {
        format_signed_size(node.size)
    } else {
        format_size(node.size.unsigned_abs())
    };
    let name = if level == 0 { node.id_path.as_str() } else { node.short_name() };

    let _ = writeln!(
        out,
        "{:indent$}{:>12}  {:<2} {}",
        "",
        size,
        node.type_code.dimmed(),
        name,
        indent = level * 2
    );

    match &node.children {
        Some(children) => {
            for child in children {
                render_node(out, child, level + 1, diff_mode);
            }
        }
        None => {
            let _ = writeln!(out, "{:indent$}{}", "", "...".dimmed(), indent = (level + 1) * 2);
        }
    }
}
