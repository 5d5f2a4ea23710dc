use std::fmt;

use serde::Serialize;

use super::event::MetricKind;
use super::percentiles::PercentileSet;

// ─── Rollup categories ───────────────────────────────────────────

/// Category a metric is rolled up under. Timings fold into `Histogram`.
///
/// Variant order is the flush rendering order: `Ord` drives how the
/// table sorts its keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RollupKind {
    Incr,
    Gauge,
    Histogram,
}

impl RollupKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Incr => "INCR",
            Self::Gauge => "GAUGE",
            Self::Histogram => "HISTOGRAM",
        }
    }
}

impl From<MetricKind> for RollupKind {
    fn from(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Incr => Self::Incr,
            MetricKind::Gauge => Self::Gauge,
            MetricKind::Timing | MetricKind::Histogram => Self::Histogram,
        }
    }
}

// ─── Summaries ───────────────────────────────────────────────────

/// Derived statistics for one key over one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Summary {
    Incr {
        count: u64,
    },
    Gauge {
        count: u64,
        current: f64,
        min: f64,
        max: f64,
    },
    Histogram(PercentileSet),
}

impl Summary {
    pub fn count(&self) -> u64 {
        match self {
            Self::Incr { count } | Self::Gauge { count, .. } => *count,
            Self::Histogram(set) => set.count,
        }
    }
}

/// A summary together with the key it belongs to, ready to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyedSummary {
    pub kind: RollupKind,
    pub key: String,
    pub summary: Summary,
}

impl KeyedSummary {
    /// One `ROLLUP ...` line. `window_secs` is the configured window
    /// length, which is what the incr rate is expressed against.
    pub fn render(&self, window_secs: u64) -> String {
        RenderedSummary {
            inner: self,
            window_secs,
        }
        .to_string()
    }
}

struct RenderedSummary<'a> {
    inner: &'a KeyedSummary,
    window_secs: u64,
}

impl fmt::Display for RenderedSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let KeyedSummary { kind, key, summary } = self.inner;
        write!(f, "ROLLUP {} {}: ", kind.label(), key)?;
        match summary {
            Summary::Incr { count } => {
                write!(f, "count:{count}|rate:{count}/{}", self.window_secs)
            }
            Summary::Gauge {
                count,
                current,
                min,
                max,
            } => write!(f, "count:{count}|current:{current}|min:{min}|max:{max}"),
            Summary::Histogram(set) => write!(
                f,
                "count:{}|min:{:.2}|avg:{:.2}|median:{:.2}|ninety-five:{:.2}|max:{:.2}",
                set.count, set.min, set.avg, set.median, set.p95, set.max
            ),
        }
    }
}

// ─── Accumulator ─────────────────────────────────────────────────

/// Running statistics for one (kind, key) pair within the open window.
///
/// Incr and gauge keep scalars only. Histogram keeps every value it sees
/// so the median and 95th percentile are exact; memory is bounded by what
/// one window can receive.
#[derive(Debug, Clone)]
pub struct WindowAccumulator {
    kind: RollupKind,
    count: u64,
    min: f64,
    max: f64,
    last: f64,
    samples: Vec<f64>,
}

impl WindowAccumulator {
    pub fn new(kind: RollupKind) -> Self {
        Self {
            kind,
            count: 0,
            min: 0.0,
            max: 0.0,
            last: 0.0,
            samples: Vec::new(),
        }
    }

    pub fn kind(&self) -> RollupKind {
        self.kind
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn record(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.last = value;

        if self.kind == RollupKind::Histogram {
            self.samples.push(value);
        }
    }

    /// Read-only; calling it twice without a `record` in between gives
    /// the same answer.
    pub fn summarize(&self) -> Summary {
        match self.kind {
            RollupKind::Incr => Summary::Incr { count: self.count },
            RollupKind::Gauge => Summary::Gauge {
                count: self.count,
                current: self.last,
                min: self.min,
                max: self.max,
            },
            RollupKind::Histogram => Summary::Histogram(PercentileSet::from_samples(&self.samples)),
        }
    }
}
