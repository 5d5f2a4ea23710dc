use std::sync::Arc;

use super::sink::LineSink;
use super::MetricsBackend;
use crate::error::Result;
use crate::filters::FilterChain;
use crate::metrics::scheduler::{render_summaries, FlushScheduler, SchedulerState};
use crate::metrics::{MetricEvent, RollupTable};

/// Default rollup window in seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 10;

/// Aggregates events per (kind, key) and emits one summary line per key
/// every window instead of one line per event.
pub struct RollupBackend {
    filters: FilterChain,
    window_secs: u64,
    table: Arc<RollupTable>,
    sink: Arc<dyn LineSink>,
    scheduler: FlushScheduler,
}

impl RollupBackend {
    /// Build the backend and arm its flush timer.
    /// Fails when no Tokio runtime is available or the window is zero.
    pub fn new(window_secs: u64, filters: FilterChain, sink: Arc<dyn LineSink>) -> Result<Self> {
        let table = Arc::new(RollupTable::new());
        let scheduler = FlushScheduler::start(Arc::clone(&table), Arc::clone(&sink), window_secs)?;

        tracing::info!(window_secs, filters = filters.len(), "rollup backend started");

        Ok(Self {
            filters,
            window_secs,
            table,
            sink,
            scheduler,
        })
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Close the current window right now and render it, outside the
    /// timer cadence. Returns the number of lines written.
    pub fn flush_now(&self) -> Result<usize> {
        let summaries = self.table.drain_window();
        render_summaries(self.sink.as_ref(), &summaries, self.window_secs)
    }

    /// Stop the timer and flush whatever the open window holds.
    /// Later emits fail with `BackendStopped`.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }
}

impl MetricsBackend for RollupBackend {
    fn name(&self) -> &str {
        "rollup"
    }

    fn filters(&self) -> &FilterChain {
        &self.filters
    }

    fn emit(&self, event: MetricEvent) -> Result<()> {
        self.table.record(&event)
    }
}
