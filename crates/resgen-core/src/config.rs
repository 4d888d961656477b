//! `resgen.toml` loading and command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compression::Level;
use crate::encode::TargetKind;
use crate::error::ResgenError;
use crate::matcher::GlobMatcher;
use crate::pipeline::{BuildOptions, DEFAULT_DRAIN_TIMEOUT};
use crate::types::Result;

/// File looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE: &str = "resgen.toml";

/// Build settings as written in `resgen.toml`.
///
/// ```toml
/// source = "assets"
/// dest = "src/generated"
/// patterns = ["*.png", "*.ogg"]
/// level = "high"
/// target = "rust"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub source: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    /// Glob patterns over entry names. Empty matches everything.
    pub patterns: Vec<String>,
    pub level: Level,
    pub target: TargetKind,
    pub skip_finalize: bool,
    /// Defaults to the number of CPUs.
    pub workers: Option<usize>,
    pub drain_timeout_secs: Option<u64>,
}

/// Values given on the command line. Each one that is set replaces the
/// corresponding config value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub source: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    /// Replaces the config patterns when non-empty.
    pub patterns: Vec<String>,
    pub level: Option<Level>,
    pub target: Option<TargetKind>,
    pub skip_finalize: Option<bool>,
    pub workers: Option<usize>,
}

impl BuildConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates the config at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|error| {
            ResgenError::from(error).with_context(format!("reading {}", path.display()))
        })?;
        Self::from_toml(&text)
            .map_err(|error| error.with_context(format!("loading {}", path.display())))
    }

    /// Loads `path` if given, otherwise `resgen.toml` in `dir` when it
    /// exists, otherwise the defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "using discovered config");
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn merge(&mut self, overrides: &CliOverrides) {
        if let Some(source) = &overrides.source {
            self.source = Some(source.clone());
        }
        if let Some(dest) = &overrides.dest {
            self.dest = Some(dest.clone());
        }
        if !overrides.patterns.is_empty() {
            self.patterns = overrides.patterns.clone();
        }
        if let Some(level) = overrides.level {
            self.level = level;
        }
        if let Some(target) = overrides.target {
            self.target = target;
        }
        if let Some(skip_finalize) = overrides.skip_finalize {
            self.skip_finalize = skip_finalize;
        }
        if let Some(workers) = overrides.workers {
            self.workers = Some(workers);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(ResgenError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if let (Some(source), Some(dest)) = (&self.source, &self.dest) {
            if source == dest {
                return Err(ResgenError::InvalidConfig(format!(
                    "source and dest are both {}",
                    source.display()
                )));
            }
        }
        GlobMatcher::new(&self.patterns)?;
        Ok(())
    }

    pub fn source(&self) -> Result<&Path> {
        self.source
            .as_deref()
            .ok_or_else(|| ResgenError::InvalidConfig("no source directory configured".to_string()))
    }

    pub fn dest(&self) -> Result<&Path> {
        self.dest
            .as_deref()
            .ok_or_else(|| ResgenError::InvalidConfig("no dest directory configured".to_string()))
    }

    pub fn matcher(&self) -> Result<GlobMatcher> {
        GlobMatcher::new(&self.patterns)
    }

    pub fn build_options(&self) -> BuildOptions {
        let defaults = BuildOptions::default();
        BuildOptions {
            level: self.level,
            target: self.target,
            skip_finalize: self.skip_finalize,
            workers: self.workers.unwrap_or(defaults.workers),
            drain_timeout: self
                .drain_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DRAIN_TIMEOUT),
        }
    }
}
