use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use crate::backends::rollup::DEFAULT_WINDOW_SECS;
use crate::backends::{ConfiguredBackend, ImmediateBackend, LineSink, RollupBackend, TimestampMode};
use crate::error::{MetricsError, Result};
use crate::filters::{
    AddTagFilter, DropKeyPrefixFilter, FilterChain, KeyContainsFilter, MetricsFilter,
};
use crate::metrics::scheduler::first_deadline;

// ─── Configuration types ─────────────────────────────────────────

/// Top-level configuration. Every field has a default, so `{}` is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Which backend renders events. Default: rollup.
    #[serde(default)]
    pub backend: BackendKind,

    /// Timestamp on immediate lines. Ignored by the rollup backend.
    #[serde(default)]
    pub timestamp_mode: TimestampMode,

    /// Rollup window length in seconds. Default: 10.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Joined to every key as `prefix.key`.
    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Immediate,
    #[default]
    Rollup,
}

/// One filter stage, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    AddTag { tag: String },
    KeyContains { needle: String },
    DropKeyPrefix { prefix: String },
}

fn default_window_seconds() -> u64 {
    DEFAULT_WINDOW_SECS
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            timestamp_mode: TimestampMode::default(),
            window_seconds: default_window_seconds(),
            prefix: String::new(),
            filters: Vec::new(),
        }
    }
}

// ─── Loading / validation ────────────────────────────────────────

impl MetricsConfig {
    /// Read a JSON config file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MetricsError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(raw).map_err(|e| MetricsError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_seconds == 0 {
            return Err(MetricsError::Config(
                "window_seconds must be a positive integer".into(),
            ));
        }
        let now = Instant::from_std(std::time::Instant::now());
        if first_deadline(now, Duration::from_secs(self.window_seconds)).is_none() {
            return Err(MetricsError::Config(format!(
                "window_seconds {} is too large to schedule",
                self.window_seconds
            )));
        }
        for filter in &self.filters {
            let empty = match filter {
                FilterConfig::AddTag { tag } => tag.is_empty(),
                FilterConfig::KeyContains { needle } => needle.is_empty(),
                FilterConfig::DropKeyPrefix { prefix } => prefix.is_empty(),
            };
            if empty {
                return Err(MetricsError::Config(format!(
                    "filter {filter:?} needs a non-empty argument"
                )));
            }
        }
        Ok(())
    }

    pub fn filter_chain(&self) -> FilterChain {
        self.filters.iter().map(FilterConfig::build).collect()
    }

    /// Construct the configured backend writing to `sink`.
    /// The rollup backend must be built inside a Tokio runtime.
    pub fn build_backend(&self, sink: Arc<dyn LineSink>) -> Result<ConfiguredBackend> {
        self.validate()?;
        let filters = self.filter_chain();
        Ok(match self.backend {
            BackendKind::Immediate => ConfiguredBackend::Immediate(Arc::new(
                ImmediateBackend::new(self.timestamp_mode, filters, sink),
            )),
            BackendKind::Rollup => ConfiguredBackend::Rollup(Arc::new(RollupBackend::new(
                self.window_seconds,
                filters,
                sink,
            )?)),
        })
    }
}

impl FilterConfig {
    pub fn build(&self) -> Box<dyn MetricsFilter> {
        match self {
            Self::AddTag { tag } => Box::new(AddTagFilter::new(tag.clone())),
            Self::KeyContains { needle } => Box::new(KeyContainsFilter::new(needle.clone())),
            Self::DropKeyPrefix { prefix } => Box::new(DropKeyPrefixFilter::new(prefix.clone())),
        }
    }
}
