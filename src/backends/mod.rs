pub mod immediate;
pub mod rollup;
pub mod sink;

pub use immediate::{ImmediateBackend, TimestampMode};
pub use rollup::RollupBackend;
pub use sink::{LineSink, LogSink, WriterSink};

use std::sync::Arc;

use crate::error::Result;
use crate::filters::FilterChain;
use crate::metrics::MetricEvent;

/// A destination for metric events.
///
/// Backends own their filter chain; callers go through `emit_to_backend`
/// so the chain runs before the event is rendered or aggregated.
pub trait MetricsBackend: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &str;

    fn filters(&self) -> &FilterChain;

    /// Handle an event that already passed the filter chain.
    fn emit(&self, event: MetricEvent) -> Result<()>;

    fn emit_to_backend(&self, event: MetricEvent) -> Result<()> {
        match self.filters().apply(event) {
            Some(event) => self.emit(event),
            None => Ok(()),
        }
    }
}

/// A backend built from configuration, keeping its concrete type so the
/// rollup variant can still be stopped.
#[derive(Clone)]
pub enum ConfiguredBackend {
    Immediate(Arc<ImmediateBackend>),
    Rollup(Arc<RollupBackend>),
}

impl ConfiguredBackend {
    pub fn backend(&self) -> Arc<dyn MetricsBackend> {
        match self {
            Self::Immediate(b) => b.clone(),
            Self::Rollup(b) => b.clone(),
        }
    }

    /// Flush and stop a rollup backend; nothing to do for immediate.
    pub async fn stop(&self) {
        if let Self::Rollup(b) = self {
            b.stop().await;
        }
    }
}
