use std::collections::BTreeMap;
use std::mem;
use std::time::Instant;

use parking_lot::Mutex;

use super::accumulator::{KeyedSummary, RollupKind, WindowAccumulator};
use super::event::MetricEvent;
use crate::error::{MetricsError, Result};

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe rollup table.
/// Producers call `record()`, the flush scheduler calls `drain_window()`.
///
/// A single mutex guards the whole generation, so every record lands in
/// exactly one window: whichever generation holds the lock when the
/// record takes it.
pub struct RollupTable {
    inner: Mutex<Generation>,
}

// ─── Internal state ──────────────────────────────────────────────

/// Every accumulator opened since the last drain.
struct Generation {
    opened_at: Instant,
    closed: bool,
    // Kind first so iteration yields incr, gauge, histogram, each by key.
    entries: BTreeMap<RollupKind, BTreeMap<String, WindowAccumulator>>,
}

impl Generation {
    fn new(closed: bool) -> Self {
        Self {
            opened_at: Instant::now(),
            closed,
            entries: BTreeMap::new(),
        }
    }

    fn record(&mut self, event: &MetricEvent) -> Result<()> {
        if self.closed {
            return Err(MetricsError::BackendStopped);
        }

        let kind = RollupKind::from(event.kind());
        let keyed = self.entries.entry(kind).or_default();
        match keyed.get_mut(event.key()) {
            Some(acc) => acc.record(event.value()),
            // First event for this key in the window
            None => {
                let mut acc = WindowAccumulator::new(kind);
                acc.record(event.value());
                keyed.insert(event.key().to_owned(), acc);
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }
}

// ─── RollupTable impl ────────────────────────────────────────────

impl RollupTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generation::new(false)),
        }
    }

    /// Fold one event into its accumulator, creating it on first use.
    /// Fails once the table has been closed.
    pub fn record(&self, event: &MetricEvent) -> Result<()> {
        self.inner.lock().record(event)
    }

    /// Detach the open window and start a fresh one.
    ///
    /// Summaries come back grouped incr, gauge, histogram and sorted by key
    /// inside each group. They are computed after the lock is released.
    pub fn drain_window(&self) -> Vec<KeyedSummary> {
        let old = {
            let mut inner = self.inner.lock();
            let closed = inner.closed;
            mem::replace(&mut *inner, Generation::new(closed))
        };
        Self::summarize(old)
    }

    /// Final drain: hands back the open window and refuses every later
    /// `record`. Calling it again returns nothing.
    pub fn close(&self) -> Vec<KeyedSummary> {
        let old = mem::replace(&mut *self.inner.lock(), Generation::new(true));
        Self::summarize(old)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of live accumulators in the open window.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn summarize(generation: Generation) -> Vec<KeyedSummary> {
        let keys = generation.len();
        let mut out = Vec::with_capacity(keys);
        for (kind, keyed) in generation.entries {
            for (key, acc) in keyed {
                out.push(KeyedSummary {
                    kind,
                    key,
                    summary: acc.summarize(),
                });
            }
        }

        tracing::debug!(
            keys,
            window_age_ms = generation.opened_at.elapsed().as_millis() as u64,
            "rollup window drained"
        );
        out
    }
}

impl Default for RollupTable {
    fn default() -> Self {
        Self::new()
    }
}
