use std::sync::Arc;

use chrono::{Local, SecondsFormat};
use serde::Deserialize;

use super::sink::LineSink;
use super::MetricsBackend;
use crate::error::Result;
use crate::filters::FilterChain;
use crate::metrics::MetricEvent;

/// Whether (and how) immediate lines carry the event timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    #[default]
    None,
    /// ISO-8601 with a `+00:00` offset.
    Utc,
    /// Local wall-clock time, no offset.
    Local,
}

/// Renders every event as one `METRICS|...` line as soon as it arrives.
pub struct ImmediateBackend {
    filters: FilterChain,
    timestamp_mode: TimestampMode,
    sink: Arc<dyn LineSink>,
}

impl ImmediateBackend {
    pub fn new(timestamp_mode: TimestampMode, filters: FilterChain, sink: Arc<dyn LineSink>) -> Self {
        Self {
            filters,
            timestamp_mode,
            sink,
        }
    }

    pub fn render(&self, event: &MetricEvent) -> String {
        let body = format!(
            "{}|{}|{}|{}",
            event.kind(),
            event.key(),
            event.value(),
            event.tag_string()
        );
        match self.timestamp_mode {
            TimestampMode::None => format!("METRICS|{body}"),
            TimestampMode::Utc => format!(
                "METRICS|{}|{body}",
                event.timestamp().to_rfc3339_opts(SecondsFormat::AutoSi, false)
            ),
            TimestampMode::Local => format!(
                "METRICS|{}|{body}",
                event
                    .timestamp()
                    .with_timezone(&Local)
                    .naive_local()
                    .format("%Y-%m-%dT%H:%M:%S%.f")
            ),
        }
    }
}

impl MetricsBackend for ImmediateBackend {
    fn name(&self) -> &str {
        "immediate"
    }

    fn filters(&self) -> &FilterChain {
        &self.filters
    }

    fn emit(&self, event: MetricEvent) -> Result<()> {
        self.sink.write_line(&self.render(&event))
    }
}
