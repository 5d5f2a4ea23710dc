use serde::Serialize;

/// Exact distribution summary for one window of timing/histogram values.
/// Rendered straight into the `ROLLUP HISTOGRAM` line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSet {
    pub count: u64,
    pub min: f64,
    pub avg: f64,
    pub median: f64,
    pub p95: f64,
    pub max: f64,
}

impl PercentileSet {
    /// Compute every statistic from the raw samples.
    /// Returns zeroed values if `samples` is empty.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::empty();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        Self {
            count: count as u64,
            min: sorted[0],
            avg: sum / count as f64,
            median: median(&sorted),
            p95: percentile(&sorted, 0.95),
            max: sorted[count - 1],
        }
    }

    /// All-zero placeholder used before any samples are recorded.
    pub fn empty() -> Self {
        Self {
            count: 0,
            min: 0.0,
            avg: 0.0,
            median: 0.0,
            p95: 0.0,
            max: 0.0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

/// Middle value of an ascending slice; the mean of the two middle values
/// when the length is even.
pub fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Nearest-rank percentile of an ascending slice:
/// index = ceil(p * n) - 1, clamped to [0, n - 1].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let rank = (p * n as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);
    sorted[idx]
}
