use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use super::accumulator::KeyedSummary;
use super::table::RollupTable;
use crate::backends::sink::LineSink;
use crate::error::{MetricsError, Result};

// ─── State machine ───────────────────────────────────────────────

/// idle → armed → flushing → armed → … → stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    Idle = 0,
    Armed = 1,
    Flushing = 2,
    Stopped = 3,
}

impl SchedulerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Armed,
            2 => Self::Flushing,
            3 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

// ─── Scheduler ───────────────────────────────────────────────────

/// Background timer that drains the rollup table once per window and
/// renders one line per key.
///
/// The tick runs on its own Tokio task, so render failures never reach
/// the producers calling `record`.
pub struct FlushScheduler {
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    table: Arc<RollupTable>,
    sink: Arc<dyn LineSink>,
    window_secs: u64,
}

impl FlushScheduler {
    /// Arm the recurring timer. Must be called from inside a Tokio runtime.
    pub fn start(
        table: Arc<RollupTable>,
        sink: Arc<dyn LineSink>,
        window_secs: u64,
    ) -> Result<Self> {
        if window_secs == 0 {
            return Err(MetricsError::SchedulerUnavailable(
                "window length must be at least one second".into(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MetricsError::SchedulerUnavailable(e.to_string()))?;

        let period = Duration::from_secs(window_secs);
        let first_tick = first_deadline(Instant::now(), period).ok_or_else(|| {
            MetricsError::SchedulerUnavailable(format!(
                "a {window_secs}s window is past the end of the clock"
            ))
        })?;

        let state = Arc::new(AtomicU8::new(SchedulerState::Idle as u8));
        let cancel = CancellationToken::new();

        let task = FlushTask {
            table: Arc::clone(&table),
            sink: Arc::clone(&sink),
            window_secs,
            state: Arc::clone(&state),
        };
        let handle = runtime.spawn(task.run(first_tick, cancel.clone()));
        state.store(SchedulerState::Armed as u8, Ordering::SeqCst);

        tracing::debug!(window_secs, "flush scheduler armed");

        Ok(Self {
            state,
            cancel,
            handle: Mutex::new(Some(handle)),
            table,
            sink,
            window_secs,
        })
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Cancel the timer and wait for the final drain + flush.
    ///
    /// Idempotent. A tick that already detached its window finishes
    /// rendering before the final flush starts.
    pub async fn stop(&self) {
        self.cancel.cancel();

        // Take the handle first so the lock is not held across the await
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "flush scheduler task join failed");
                self.recover_final_window();
            }
        }
    }

    /// The task died before its final drain: close the table here so
    /// later records are refused, and flush what it still held.
    fn recover_final_window(&self) {
        let summaries = self.table.close();
        match render_summaries(self.sink.as_ref(), &summaries, self.window_secs) {
            Ok(lines) => tracing::debug!(lines, "final rollup window flushed after task failure"),
            Err(e) => tracing::error!(error = %e, "final rollup flush failed, window dropped"),
        }
        self.state.store(SchedulerState::Stopped as u8, Ordering::SeqCst);
    }
}

/// Deadline of the first tick, or `None` if the window cannot be
/// scheduled from `now`. The tick after it must fit on the clock too.
pub(crate) fn first_deadline(now: Instant, period: Duration) -> Option<Instant> {
    let first = now.checked_add(period)?;
    first.checked_add(period)?;
    Some(first)
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─── Background task ─────────────────────────────────────────────

struct FlushTask {
    table: Arc<RollupTable>,
    sink: Arc<dyn LineSink>,
    window_secs: u64,
    state: Arc<AtomicU8>,
}

impl FlushTask {
    async fn run(self, first_tick: Instant, cancel: CancellationToken) {
        let period = Duration::from_secs(self.window_secs);
        let mut interval = tokio::time::interval_at(first_tick, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(_) = ticks.next() => {
                    self.set_state(SchedulerState::Flushing);
                    let summaries = self.table.drain_window();
                    self.flush(&summaries);
                    self.set_state(SchedulerState::Armed);
                }
            }
        }

        // Final window: close the table so nothing is accepted after it.
        self.set_state(SchedulerState::Flushing);
        let summaries = self.table.close();
        self.flush(&summaries);
        self.set_state(SchedulerState::Stopped);

        tracing::info!(keys = summaries.len(), "flush scheduler stopped");
    }

    fn flush(&self, summaries: &[KeyedSummary]) {
        match render_summaries(self.sink.as_ref(), summaries, self.window_secs) {
            Ok(lines) => tracing::debug!(lines, "rollup window flushed"),
            Err(e) => tracing::error!(error = %e, "rollup flush failed, window dropped"),
        }
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Render every summary to `sink`. Each line is attempted even if an
/// earlier one failed; the first failure is returned.
pub fn render_summaries(
    sink: &dyn LineSink,
    summaries: &[KeyedSummary],
    window_secs: u64,
) -> Result<usize> {
    let mut first_err = None;
    let mut written = 0;

    for summary in summaries {
        match sink.write_line(&summary.render(window_secs)) {
            Ok(()) => written += 1,
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(written),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::metrics::event::{MetricEvent, MetricKind};
    use crate::testing::MemorySink;

    fn incr(key: &str) -> MetricEvent {
        MetricEvent::new(MetricKind::Incr, key, 1.0, vec![]).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_window() {
        let table = Arc::new(RollupTable::new());
        let sink = Arc::new(MemorySink::new());
        let scheduler = FlushScheduler::start(Arc::clone(&table), sink.clone(), 10).unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Armed);

        table.record(&incr("foo")).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(sink.lines().is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sink.lines(), ["ROLLUP INCR foo: count:1|rate:1/10"]);

        table.record(&incr("foo")).unwrap();
        table.record(&incr("foo")).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.lines().len(), 2);
        assert_eq!(sink.lines()[1], "ROLLUP INCR foo: count:2|rate:2/10");

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_flushes_and_closes() {
        let table = Arc::new(RollupTable::new());
        let sink = Arc::new(MemorySink::new());
        let scheduler = FlushScheduler::start(Arc::clone(&table), sink.clone(), 10).unwrap();

        table.record(&incr("bar")).unwrap();
        scheduler.stop().await;

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(sink.lines(), ["ROLLUP INCR bar: count:1|rate:1/10"]);
        assert!(matches!(
            table.record(&incr("bar")),
            Err(MetricsError::BackendStopped)
        ));

        // Second stop is a no-op.
        scheduler.stop().await;
        assert_eq!(sink.lines().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_window_renders_nothing() {
        let table = Arc::new(RollupTable::new());
        let sink = Arc::new(MemorySink::new());
        let scheduler = FlushScheduler::start(table, sink.clone(), 1).unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        scheduler.stop().await;
        assert!(sink.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_sink_does_not_stop_ticks() {
        let table = Arc::new(RollupTable::new());
        let sink = Arc::new(MemorySink::new());
        sink.fail_writes(true);
        let scheduler = FlushScheduler::start(Arc::clone(&table), sink.clone(), 1).unwrap();

        table.record(&incr("lost")).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(scheduler.state(), SchedulerState::Armed);

        sink.fail_writes(false);
        table.record(&incr("kept")).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.lines(), ["ROLLUP INCR kept: count:1|rate:1/1"]);

        scheduler.stop().await;
    }

    #[test]
    fn start_without_runtime_fails() {
        let table = Arc::new(RollupTable::new());
        let sink = Arc::new(MemorySink::new());
        assert!(matches!(
            FlushScheduler::start(table, sink, 10),
            Err(MetricsError::SchedulerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn window_past_end_of_clock_is_rejected() {
        let table = Arc::new(RollupTable::new());
        let sink = Arc::new(MemorySink::new());
        assert!(matches!(
            FlushScheduler::start(Arc::clone(&table), sink, u64::MAX),
            Err(MetricsError::SchedulerUnavailable(_))
        ));
        assert!(!table.is_closed());
    }

    /// Panics on its first write, then behaves like a `MemorySink`.
    #[derive(Default)]
    struct PanicOnceSink {
        panicked: AtomicBool,
        inner: MemorySink,
    }

    impl LineSink for PanicOnceSink {
        fn write_line(&self, line: &str) -> Result<()> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("sink blew up");
            }
            self.inner.write_line(line)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_closes_table_when_task_died() {
        let table = Arc::new(RollupTable::new());
        let sink = Arc::new(PanicOnceSink::default());
        let scheduler = FlushScheduler::start(Arc::clone(&table), sink.clone(), 1).unwrap();

        // The first tick panics inside the task.
        table.record(&incr("lost")).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        table.record(&incr("after")).unwrap();
        scheduler.stop().await;

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(sink.inner.lines(), ["ROLLUP INCR after: count:1|rate:1/1"]);
        assert!(matches!(
            table.record(&incr("after")),
            Err(MetricsError::BackendStopped)
        ));
    }

    #[tokio::test]
    async fn zero_window_is_rejected() {
        let table = Arc::new(RollupTable::new());
        let sink = Arc::new(MemorySink::new());
        assert!(matches!(
            FlushScheduler::start(table, sink, 0),
            Err(MetricsError::SchedulerUnavailable(_))
        ));
    }
}
