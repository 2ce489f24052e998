use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution, Max, Min, OrderStatistics};
use std::fmt;

/// Summary of a set of latency samples, in the unit the samples were taken in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

impl Statistics {
    /// Non-finite samples are dropped before summarizing.
    pub fn from_samples(samples: &[f64]) -> Self {
        let finite: Vec<f64> = samples.iter().copied().filter(|s| s.is_finite()).collect();
        if finite.is_empty() {
            return Self::zeros();
        }

        let count = finite.len();
        let mut data = Data::new(finite);

        Self {
            count,
            mean: data.mean().unwrap_or(0.0),
            median: data.median(),
            p90: data.quantile(0.90),
            p95: data.quantile(0.95),
            p99: data.quantile(0.99),
            min: data.min(),
            max: data.max(),
            // a single sample has no spread
            stddev: data.std_dev().filter(|s| s.is_finite()).unwrap_or(0.0),
        }
    }

    pub fn zeros() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            median: 0.0,
            p90: 0.0,
            p95: 0.0,
            p99: 0.0,
            min: 0.0,
            max: 0.0,
            stddev: 0.0,
        }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} mean={:.2} p50={:.2} p95={:.2} p99={:.2} max={:.2}",
            self.count, self.mean, self.median, self.p95, self.p99, self.max
        )
    }
}
