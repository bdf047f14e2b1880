//! Report configuration (`sizereport.toml`)
//!
//! ```toml
//! find_renamed = "js/[name]-[hash][extname]"
//! filters = "min_size=1024&type=t"
//! depth = 2
//! progress_interval_ms = 250
//! ```
//!
//! Every key is optional; command-line flags take precedence.

use anyhow::{Context, Result};
use sd_core::RenamePattern;
use sd_worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File looked up in the working directory when no path is given
pub const CONFIG_FILE_NAME: &str = "sizereport.toml";

fn default_depth() -> usize {
    1
}

fn default_progress_interval_ms() -> u64 {
    WorkerConfig::default().progress_interval_ms
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Rename pattern used to pair hash-busted artifacts
    #[serde(default)]
    pub find_renamed: Option<String>,

    /// Filter query string passed to tree loads
    #[serde(default)]
    pub filters: String,

    /// Levels of the tree printed below the root
    #[serde(default = "default_depth")]
    pub depth: usize,

    /// Minimum time between progress updates
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            find_renamed: None,
            filters: String::new(),
            depth: default_depth(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

/// Command-line values overriding the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub find_renamed: Option<String>,
    pub filters: Option<String>,
    pub depth: Option<usize>,
}

impl ReportConfig {
    /// Load `path`, or `sizereport.toml` in the working directory if present
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required): (PathBuf, bool) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILE_NAME), false),
        };

        if !required && !path.exists() {
            debug!("no {} found, using defaults", CONFIG_FILE_NAME);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        debug!(path = %path.display(), "loaded report config");
        Ok(config)
    }

    /// Apply command-line values on top of the file values
    pub fn merge(mut self, overrides: Overrides) -> Result<Self> {
        if overrides.find_renamed.is_some() {
            self.find_renamed = overrides.find_renamed;
        }
        if let Some(filters) = overrides.filters {
            self.filters = filters;
        }
        if let Some(depth) = overrides.depth {
            self.depth = depth;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values that would only fail once a report runs
    pub fn validate(&self) -> Result<()> {
        self.rename_pattern()?;
        if self.progress_interval_ms == 0 {
            anyhow::bail!("progress_interval_ms must be greater than 0");
        }
        Ok(())
    }

    /// Compiled rename pattern, if one is configured
    pub fn rename_pattern(&self) -> Result<Option<RenamePattern>> {
        self.find_renamed
            .as_deref()
            .map(|pattern| {
                RenamePattern::compile(pattern).with_context(|| format!("Invalid find_renamed pattern: {}", pattern))
            })
            .transpose()
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            progress_interval_ms: self.progress_interval_ms,
        }
    }
}
