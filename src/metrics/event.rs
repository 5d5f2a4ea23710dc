use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

/// The four kinds of metric an application can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Incr,
    Gauge,
    Timing,
    Histogram,
}

impl MetricKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incr => "incr",
            Self::Gauge => "gauge",
            Self::Timing => "timing",
            Self::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "incr" => Ok(Self::Incr),
            "gauge" => Ok(Self::Gauge),
            "timing" => Ok(Self::Timing),
            "histogram" => Ok(Self::Histogram),
            other => Err(MetricsError::InvalidEventKind(other.to_owned())),
        }
    }
}

/// One emission: kind, key, value, tags and the instant it was created.
///
/// Immutable once built. Filters that want to rewrite an event consume it
/// through the `with_*` methods and hand back a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    kind: MetricKind,
    key: String,
    value: f64,
    tags: Vec<String>,
    timestamp: DateTime<Utc>,
}

impl MetricEvent {
    /// Build an event stamped with the current time.
    pub fn new(
        kind: MetricKind,
        key: impl Into<String>,
        value: f64,
        tags: Vec<String>,
    ) -> Result<Self> {
        Self::with_timestamp(kind, key, value, tags, Utc::now())
    }

    pub fn with_timestamp(
        kind: MetricKind,
        key: impl Into<String>,
        value: f64,
        tags: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(MetricsError::EmptyKey);
        }
        if !value.is_finite() {
            return Err(MetricsError::NonFiniteValue { key, value });
        }
        Ok(Self {
            kind,
            key,
            value,
            tags,
            timestamp,
        })
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Same event under a different key. Empty keys are rejected.
    pub fn with_key(self, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(MetricsError::EmptyKey);
        }
        Ok(Self { key, ..self })
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// `#tag1,tag2` in input order, or an empty string when untagged.
    pub fn tag_string(&self) -> String {
        if self.tags.is_empty() {
            String::new()
        } else {
            format!("#{}", self.tags.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_kind() {
        for kind in [
            MetricKind::Incr,
            MetricKind::Gauge,
            MetricKind::Timing,
            MetricKind::Histogram,
        ] {
            assert_eq!(kind.as_str().parse::<MetricKind>().unwrap(), kind);
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = "counter".parse::<MetricKind>().unwrap_err();
        assert!(matches!(err, MetricsError::InvalidEventKind(k) if k == "counter"));
    }

    #[test]
    fn rejects_empty_key_and_nan() {
        assert!(matches!(
            MetricEvent::new(MetricKind::Incr, "", 1.0, vec![]),
            Err(MetricsError::EmptyKey)
        ));
        assert!(matches!(
            MetricEvent::new(MetricKind::Gauge, "foo", f64::NAN, vec![]),
            Err(MetricsError::NonFiniteValue { .. })
        ));
        assert!(matches!(
            MetricEvent::new(MetricKind::Timing, "foo", f64::INFINITY, vec![]),
            Err(MetricsError::NonFiniteValue { .. })
        ));
    }

    #[test]
    fn tag_string_preserves_order() {
        let ev = MetricEvent::new(
            MetricKind::Incr,
            "foo",
            1.0,
            vec!["key2:val".into(), "key1:val".into()],
        )
        .unwrap();
        assert_eq!(ev.tag_string(), "#key2:val,key1:val");

        let bare = MetricEvent::new(MetricKind::Incr, "foo", 1.0, vec![]).unwrap();
        assert_eq!(bare.tag_string(), "");
    }

    #[test]
    fn rewrites_keep_timestamp() {
        let ev = MetricEvent::new(MetricKind::Incr, "foo", 1.0, vec![]).unwrap();
        let ts = ev.timestamp();
        let ev = ev.with_key("bar").unwrap().with_tag("env:prod");
        assert_eq!(ev.key(), "bar");
        assert_eq!(ev.tags(), ["env:prod".to_string()]);
        assert_eq!(ev.timestamp(), ts);
    }
}
