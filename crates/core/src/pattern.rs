//! Rename detection for hash-busted artifact names
//!
//! A pattern such as `js/[name]-[hash][extname]` describes how an artifact
//! path is built. Two paths that only differ in their `[hash]` part are treated
//! as the same artifact under a new name.

use crate::error::{Result, SizeError};
use regex::Regex;

/// Resolves a path missing from the current build to one of its new paths
pub trait FindRenamed {
    /// Return the candidate believed to be `missing` under a new name
    fn find_renamed(&self, missing: &str, candidates: &[String]) -> Option<String>;
}

impl<F> FindRenamed for F
where
    F: Fn(&str, &[String]) -> Option<String>,
{
    fn find_renamed(&self, missing: &str, candidates: &[String]) -> Option<String> {
        self(missing, candidates)
    }
}

/// Placeholders allowed inside a rename pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// File name without extension
    Name,
    /// Extension including the leading dot
    Extname,
    /// Content hash, allowed to differ between builds
    Hash,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "name" => Some(Self::Name),
            "extname" => Some(Self::Extname),
            "hash" => Some(Self::Hash),
            _ => None,
        }
    }

    fn sub_pattern(self) -> &'static str {
        match self {
            Self::Name => "(.+)",
            Self::Extname => r"(\.\w+)",
            Self::Hash => "([a-f0-9]+)",
        }
    }
}

/// Matches an escaped `[placeholder]` inside `regex::escape` output
const PLACEHOLDER: &str = r"\\\[(\w+)\\\]";

/// Name doesn't start with "/", "./" or "../"
fn is_plain_name(pattern: &str) -> bool {
    !(pattern.starts_with('/') || pattern.starts_with("./") || pattern.starts_with("../"))
}

/// Compiled rename pattern
#[derive(Debug, Clone)]
pub struct RenamePattern {
    source: String,
    regex: Regex,
    /// Placeholder behind each capture group, group 1 first
    groups: Vec<Placeholder>,
}

impl RenamePattern {
    /// Compile a pattern, rejecting absolute/relative paths and unknown placeholders
    pub fn compile(pattern: &str) -> Result<Self> {
        if !is_plain_name(pattern) {
            return Err(SizeError::Config(format!(
                "invalid output pattern \"{}\", cannot be an absolute or relative path",
                pattern
            )));
        }

        let escaped = regex::escape(pattern);
        let mut groups = Vec::new();
        let mut parts = String::with_capacity(escaped.len() + 16);
        let mut last = 0;

        let placeholders = Regex::new(PLACEHOLDER).map_err(|e| SizeError::Config(e.to_string()))?;
        for caps in placeholders.captures_iter(&escaped) {
            let Some(whole) = caps.get(0) else { continue };
            let name = &caps[1];
            let placeholder = Placeholder::parse(name).ok_or_else(|| {
                SizeError::Config(format!("\"{}\" is not a valid substitution name", name))
            })?;

            parts.push_str(&escaped[last..whole.start()]);
            parts.push_str(placeholder.sub_pattern());
            groups.push(placeholder);
            last = whole.end();
        }
        parts.push_str(&escaped[last..]);

        let regex = Regex::new(&format!("^{}$", parts))
            .map_err(|e| SizeError::Config(format!("pattern \"{}\": {}", pattern, e)))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            groups,
        })
    }

    /// The pattern text this matcher was compiled from
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check whether two paths name the same artifact
    pub fn is_same_artifact(&self, old_path: &str, new_path: &str) -> bool {
        let (Some(old_parts), Some(new_parts)) =
            (self.regex.captures(old_path), self.regex.captures(new_path))
        else {
            return false;
        };

        self.groups.iter().enumerate().all(|(i, placeholder)| {
            *placeholder == Placeholder::Hash
                || old_parts.get(i + 1).map(|m| m.as_str())
                    == new_parts.get(i + 1).map(|m| m.as_str())
        })
    }
}

impl FindRenamed for RenamePattern {
    fn find_renamed(&self, missing: &str, candidates: &[String]) -> Option<String> {
        if !self.regex.is_match(missing) {
            return None;
        }

        candidates
            .iter()
            .find(|candidate| self.is_same_artifact(missing, candidate))
            .cloned()
    }
}
