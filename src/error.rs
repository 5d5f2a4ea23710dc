use thiserror::Error;

// ─── Unified error type ──────────────────────────────────────────

/// Everything the metrics pipeline can fail with.
///
/// Construction errors (`InvalidEventKind`, `EmptyKey`, `NonFiniteValue`)
/// are raised synchronously to the caller. `RenderFailure` is surfaced to
/// whoever asked for the render; the data that failed is dropped.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("invalid metric kind: {0:?} (expected incr, gauge, timing or histogram)")]
    InvalidEventKind(String),

    #[error("metric key must not be empty")]
    EmptyKey,

    #[error("metric {key:?} has no numeric value (got {value})")]
    NonFiniteValue { key: String, value: f64 },

    #[error("failed to render metrics line: {0}")]
    RenderFailure(#[from] std::io::Error),

    #[error("rollup backend is stopped")]
    BackendStopped,

    #[error("flush scheduler could not be armed: {0}")]
    SchedulerUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;
