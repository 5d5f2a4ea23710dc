//! Metrics instrumentation with windowed rollups.
//!
//! Events go through a backend's filter chain and are then either rendered
//! immediately (`ImmediateBackend`) or folded into per-key accumulators
//! that a background scheduler summarizes once per window
//! (`RollupBackend`).

pub mod backends;
pub mod client;
pub mod config;
pub mod error;
pub mod filters;
pub mod load_generator;
pub mod metrics;
pub mod testing;

pub use client::MetricsClient;
pub use config::MetricsConfig;
pub use error::{MetricsError, Result};
