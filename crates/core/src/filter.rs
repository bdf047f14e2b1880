//! Symbol filters parsed from a URL query string
//!
//! Options arrive unparsed, e.g. `min_size=1024&type=tm&exclude=vendor`.
//! Unknown keys are ignored. An invalid regex disables its filter instead of
//! failing the load.

use crate::node::{Node, SYMBOL_TYPES};
use regex::Regex;
use std::collections::BTreeSet;
use tracing::warn;
use url::form_urlencoded;

/// Query key of the type allow-list; may repeat and hold several types each
pub const TYPE_KEY: &str = "type";

/// Symbol filters for one load
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Minimum absolute symbol size, 0 disables the check
    pub min_size: f64,
    /// Only keep symbols whose id path matches
    pub include: Option<Regex>,
    /// Drop symbols whose id path matches
    pub exclude: Option<Regex>,
    /// Allowed symbol types, `None` when every type is allowed
    pub types: Option<BTreeSet<char>>,
    /// Data location used when the load input is `from-url://`
    pub load_url: Option<String>,
}

impl FilterOptions {
    /// Parse options from a query string, with or without the leading `?`
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);

        let mut min_size = None;
        let mut include = None;
        let mut exclude = None;
        let mut load_url = None;
        let mut types = BTreeSet::new();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                // Only the first occurrence of single valued keys counts
                "min_size" if min_size.is_none() => min_size = Some(value.into_owned()),
                "include" if include.is_none() => include = Some(value.into_owned()),
                "exclude" if exclude.is_none() => exclude = Some(value.into_owned()),
                "load_url" if load_url.is_none() => load_url = Some(value.into_owned()),
                TYPE_KEY => types.extend(value.chars()),
                _ => {}
            }
        }

        let min_size = min_size
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|n| !n.is_nan())
            .unwrap_or(0.0);

        if types.is_empty() {
            types = SYMBOL_TYPES.chars().filter(|&c| c != 'b').collect();
        }
        let types = (types.len() < SYMBOL_TYPES.len()).then_some(types);

        Self {
            min_size,
            include: include.as_deref().and_then(|p| compile_filter("include", p)),
            exclude: exclude.as_deref().and_then(|p| compile_filter("exclude", p)),
            types,
            load_url: load_url.filter(|u| !u.is_empty()),
        }
    }

    /// Check a symbol node against every enabled filter
    pub fn accepts(&self, node: &Node) -> bool {
        if self.min_size > 0.0 && (node.size.abs() as f64) < self.min_size {
            return false;
        }
        if let Some(types) = &self.types {
            if !types.contains(&node.kind.code()) {
                return false;
            }
        }
        if let Some(include) = &self.include {
            if !include.is_match(&node.id_path) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(&node.id_path) {
                return false;
            }
        }
        true
    }
}

fn compile_filter(key: &str, pattern: &str) -> Option<Regex> {
    if pattern.is_empty() {
        return None;
    }
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(key, pattern, error = %e, "ignoring invalid filter regex");
            None
        }
    }
}
