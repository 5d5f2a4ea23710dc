use std::sync::Arc;
use std::time::Instant;

use crate::backends::MetricsBackend;
use crate::error::Result;
use crate::metrics::{MetricEvent, MetricKind};

/// Application-facing handle: namespaces keys and fans each event out to
/// every configured backend.
#[derive(Clone)]
pub struct MetricsClient {
    prefix: String,
    backends: Vec<Arc<dyn MetricsBackend>>,
}

impl MetricsClient {
    /// `prefix` is joined to every key with a `.`; pass `""` for none.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            backends: Vec::new(),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn MetricsBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn backends(&self) -> &[Arc<dyn MetricsBackend>] {
        &self.backends
    }

    pub fn incr(&self, key: &str, value: f64, tags: &[&str]) -> Result<()> {
        self.record(MetricKind::Incr, key, value, tags)
    }

    pub fn gauge(&self, key: &str, value: f64, tags: &[&str]) -> Result<()> {
        self.record(MetricKind::Gauge, key, value, tags)
    }

    /// `value` is a duration in milliseconds.
    pub fn timing(&self, key: &str, value: f64, tags: &[&str]) -> Result<()> {
        self.record(MetricKind::Timing, key, value, tags)
    }

    pub fn histogram(&self, key: &str, value: f64, tags: &[&str]) -> Result<()> {
        self.record(MetricKind::Histogram, key, value, tags)
    }

    /// Emits a `timing` of the elapsed milliseconds when the guard drops.
    pub fn timer(&self, key: &str, tags: &[&str]) -> TimerGuard {
        TimerGuard {
            client: self.clone(),
            key: key.to_owned(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            started: Instant::now(),
        }
    }

    /// Hand `event` to every backend. All backends are tried; the first
    /// failure is returned.
    pub fn emit(&self, event: MetricEvent) -> Result<()> {
        let mut first_err = None;
        for backend in &self.backends {
            if let Err(e) = backend.emit_to_backend(event.clone()) {
                tracing::warn!(backend = backend.name(), key = event.key(), error = %e, "metric emit failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn record(&self, kind: MetricKind, key: &str, value: f64, tags: &[&str]) -> Result<()> {
        let tags = tags.iter().map(|t| t.to_string()).collect();
        let event = MetricEvent::new(kind, self.full_key(key), value, tags)?;
        self.emit(event)
    }

    fn full_key(&self, key: &str) -> String {
        match (self.prefix.is_empty(), key.is_empty()) {
            (true, _) => key.to_owned(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}.{}", self.prefix, key),
        }
    }
}

/// Returned by [`MetricsClient::timer`].
pub struct TimerGuard {
    client: MetricsClient,
    key: String,
    tags: Vec<String>,
    started: Instant,
}

impl TimerGuard {
    /// Stop the timer now instead of at end of scope.
    pub fn finish(self) {}
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        if let Err(e) = self.client.timing(&self.key, elapsed_ms, &tags) {
            tracing::warn!(key = %self.key, error = %e, "timer emit failed");
        }
    }
}
