use std::fmt;

use crate::metrics::MetricEvent;

/// One stage of a filter chain: pass the event on (possibly rewritten)
/// or return `None` to drop it.
pub trait MetricsFilter: Send + Sync {
    fn decide(&self, event: MetricEvent) -> Option<MetricEvent>;
}

impl<F> MetricsFilter for F
where
    F: Fn(MetricEvent) -> Option<MetricEvent> + Send + Sync,
{
    fn decide(&self, event: MetricEvent) -> Option<MetricEvent> {
        self(event)
    }
}

/// Ordered filter stages, evaluated first to last; the first drop wins.
#[derive(Default)]
pub struct FilterChain {
    stages: Vec<Box<dyn MetricsFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: impl MetricsFilter + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn push(&mut self, stage: Box<dyn MetricsFilter>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn apply(&self, event: MetricEvent) -> Option<MetricEvent> {
        self.stages
            .iter()
            .try_fold(event, |event, stage| stage.decide(event))
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl FromIterator<Box<dyn MetricsFilter>> for FilterChain {
    fn from_iter<I: IntoIterator<Item = Box<dyn MetricsFilter>>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

// ─── Built-in stages ─────────────────────────────────────────────

/// Appends a fixed tag to every event.
#[derive(Debug, Clone)]
pub struct AddTagFilter {
    tag: String,
}

impl AddTagFilter {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

impl MetricsFilter for AddTagFilter {
    fn decide(&self, event: MetricEvent) -> Option<MetricEvent> {
        Some(event.with_tag(self.tag.clone()))
    }
}

/// Passes only events whose key contains `needle`.
#[derive(Debug, Clone)]
pub struct KeyContainsFilter {
    needle: String,
}

impl KeyContainsFilter {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

impl MetricsFilter for KeyContainsFilter {
    fn decide(&self, event: MetricEvent) -> Option<MetricEvent> {
        event.key().contains(&self.needle).then_some(event)
    }
}

/// Drops events whose key starts with `prefix`.
#[derive(Debug, Clone)]
pub struct DropKeyPrefixFilter {
    prefix: String,
}

impl DropKeyPrefixFilter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl MetricsFilter for DropKeyPrefixFilter {
    fn decide(&self, event: MetricEvent) -> Option<MetricEvent> {
        (!event.key().starts_with(&self.prefix)).then_some(event)
    }
}
