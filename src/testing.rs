//! Helpers for asserting on emitted metrics in tests.
//!
//! ```
//! use rollup_metrics::client::MetricsClient;
//! use rollup_metrics::testing::MetricsMock;
//! use std::sync::Arc;
//!
//! let mm = Arc::new(MetricsMock::new());
//! let metrics = MetricsClient::new("app").with_backend(mm.clone());
//! metrics.incr("some.random.key", 1.0, &[]).unwrap();
//!
//! mm.assert_incr("app.some.random.key", None, None);
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::backends::{LineSink, MetricsBackend};
use crate::error::{MetricsError, Result};
use crate::filters::FilterChain;
use crate::metrics::{MetricEvent, MetricKind};

// ─── MemorySink ──────────────────────────────────────────────────

/// Keeps every rendered line in memory. Can be told to fail writes.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// While set, every write fails with `RenderFailure`.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl LineSink for MemorySink {
    fn write_line(&self, line: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MetricsError::RenderFailure(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memory sink set to fail",
            )));
        }
        self.lines.lock().push(line.to_owned());
        Ok(())
    }
}

// ─── MetricsMock ─────────────────────────────────────────────────

/// Backend that records a copy of every event it receives so tests can
/// filter and assert on them.
#[derive(Debug, Default)]
pub struct MetricsMock {
    filters: FilterChain,
    records: Mutex<Vec<MetricEvent>>,
}

impl MetricsMock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_records(&self) -> Vec<MetricEvent> {
        self.records.lock().clone()
    }

    /// Records matching every criterion given. `None` matches anything;
    /// tags compare as a sorted multiset.
    pub fn filter_records(
        &self,
        kind: Option<MetricKind>,
        key: Option<&str>,
        value: Option<f64>,
        tags: Option<&[&str]>,
    ) -> Vec<MetricEvent> {
        let wanted_tags = tags.map(|t| {
            let mut t: Vec<&str> = t.to_vec();
            t.sort_unstable();
            t
        });

        self.records
            .lock()
            .iter()
            .filter(|r| kind.map_or(true, |k| r.kind() == k))
            .filter(|r| key.map_or(true, |k| r.key() == k))
            .filter(|r| value.map_or(true, |v| r.value() == v))
            .filter(|r| {
                wanted_tags.as_ref().map_or(true, |want| {
                    let mut have: Vec<&str> = r.tags().iter().map(String::as_str).collect();
                    have.sort_unstable();
                    &have == want
                })
            })
            .cloned()
            .collect()
    }

    pub fn has_record(
        &self,
        kind: Option<MetricKind>,
        key: Option<&str>,
        value: Option<f64>,
        tags: Option<&[&str]>,
    ) -> bool {
        !self.filter_records(kind, key, value, tags).is_empty()
    }

    pub fn print_records(&self) {
        for record in self.records.lock().iter() {
            println!("{record:?}");
        }
    }

    pub fn clear_records(&self) {
        self.records.lock().clear();
    }

    /// Incr assertions match a value of 1 when `value` is `None`.
    pub fn assert_incr(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        let value = Some(value.unwrap_or(1.0));
        self.assert_matches(MetricKind::Incr, key, value, tags, Expect::AtLeastOnce);
    }

    pub fn assert_incr_once(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        let value = Some(value.unwrap_or(1.0));
        self.assert_matches(MetricKind::Incr, key, value, tags, Expect::Once);
    }

    pub fn assert_not_incr(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        let value = Some(value.unwrap_or(1.0));
        self.assert_matches(MetricKind::Incr, key, value, tags, Expect::Never);
    }

    pub fn assert_gauge(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        self.assert_matches(MetricKind::Gauge, key, value, tags, Expect::AtLeastOnce);
    }

    pub fn assert_gauge_once(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        self.assert_matches(MetricKind::Gauge, key, value, tags, Expect::Once);
    }

    pub fn assert_not_gauge(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        self.assert_matches(MetricKind::Gauge, key, value, tags, Expect::Never);
    }

    pub fn assert_timing(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        self.assert_matches(MetricKind::Timing, key, value, tags, Expect::AtLeastOnce);
    }

    pub fn assert_timing_once(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        self.assert_matches(MetricKind::Timing, key, value, tags, Expect::Once);
    }

    pub fn assert_not_timing(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        self.assert_matches(MetricKind::Timing, key, value, tags, Expect::Never);
    }

    pub fn assert_histogram(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        self.assert_matches(MetricKind::Histogram, key, value, tags, Expect::AtLeastOnce);
    }

    pub fn assert_histogram_once(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        self.assert_matches(MetricKind::Histogram, key, value, tags, Expect::Once);
    }

    pub fn assert_not_histogram(&self, key: &str, value: Option<f64>, tags: Option<&[&str]>) {
        self.assert_matches(MetricKind::Histogram, key, value, tags, Expect::Never);
    }

    #[track_caller]
    fn assert_matches(
        &self,
        kind: MetricKind,
        key: &str,
        value: Option<f64>,
        tags: Option<&[&str]>,
        expect: Expect,
    ) {
        let found = self.filter_records(Some(kind), Some(key), value, tags).len();
        let ok = match expect {
            Expect::AtLeastOnce => found >= 1,
            Expect::Once => found == 1,
            Expect::Never => found == 0,
        };
        if !ok {
            self.print_records();
            panic!(
                "expected {expect:?} {kind} {key:?} (value {value:?}, tags {tags:?}), found {found}"
            );
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Expect {
    AtLeastOnce,
    Once,
    Never,
}

impl MetricsBackend for MetricsMock {
    fn name(&self) -> &str {
        "mock"
    }

    fn filters(&self) -> &FilterChain {
        &self.filters
    }

    fn emit(&self, event: MetricEvent) -> Result<()> {
        self.records.lock().push(event);
        Ok(())
    }
}
