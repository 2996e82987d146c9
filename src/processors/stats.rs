//! Per-axis descriptive statistics over point groups.
//!
//! Each axis is accumulated independently: mean, population variance,
//! min, max, and the exact median. There is no cross-axis covariance.

use thiserror::Error;

use crate::core::cloud::PointCloud;
use crate::processors::clustering::ClusterGroup;

/// Errors that can occur during statistics computation.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("statistics requested over an empty point set")]
    EmptyInput,
}

/// Result type for statistics operations.
pub type Result<T> = std::result::Result<T, StatsError>;

/// Per-axis statistics of a point group, one component per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStats {
    pub mean: [f32; 3],
    /// Population variance (denominator n).
    pub var: [f32; 3],
    pub min: [f32; 3],
    pub max: [f32; 3],
    /// Exact median; for an even count, the midpoint of the central pair.
    pub median: [f32; 3],
}

/// Streaming accumulator for one axis.
///
/// Mean and variance use shifted sums around the first sample to keep the
/// subtraction in the variance numerically tame; min/max update in the same
/// pass. Median requires the retained values and is computed at the end.
struct AxisAccumulator {
    count: usize,
    shift: f64,
    sum: f64,
    sum_sq: f64,
    min: f32,
    max: f32,
    values: Vec<f32>,
}

impl AxisAccumulator {
    fn new() -> Self {
        Self {
            count: 0,
            shift: 0.0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            values: Vec::new(),
        }
    }

    fn push(&mut self, v: f32) {
        if self.count == 0 {
            self.shift = v as f64;
        }
        let d = v as f64 - self.shift;
        self.count += 1;
        self.sum += d;
        self.sum_sq += d * d;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.values.push(v);
    }

    fn mean(&self) -> f32 {
        (self.shift + self.sum / self.count as f64) as f32
    }

    fn variance(&self) -> f32 {
        let n = self.count as f64;
        let mean_d = self.sum / n;
        ((self.sum_sq / n - mean_d * mean_d).max(0.0)) as f32
    }

    fn median(&mut self) -> f32 {
        self.values.sort_by(|a, b| a.total_cmp(b));
        let n = self.values.len();
        if n % 2 == 1 {
            self.values[n / 2]
        } else {
            0.5 * (self.values[n / 2 - 1] + self.values[n / 2])
        }
    }
}

fn accumulate<I: Iterator<Item = usize>>(cloud: &PointCloud, indices: I) -> Result<ClusterStats> {
    let mut acc = [
        AxisAccumulator::new(),
        AxisAccumulator::new(),
        AxisAccumulator::new(),
    ];

    for i in indices {
        let p = cloud.point(i);
        acc[0].push(p[0]);
        acc[1].push(p[1]);
        acc[2].push(p[2]);
    }

    if acc[0].count == 0 {
        return Err(StatsError::EmptyInput);
    }

    Ok(ClusterStats {
        mean: [acc[0].mean(), acc[1].mean(), acc[2].mean()],
        var: [acc[0].variance(), acc[1].variance(), acc[2].variance()],
        min: [acc[0].min, acc[1].min, acc[2].min],
        max: [acc[0].max, acc[1].max, acc[2].max],
        median: [acc[0].median(), acc[1].median(), acc[2].median()],
    })
}

/// Statistics over the exact index set of one cluster group.
///
/// # Errors
///
/// Returns an error for an empty group; undefined statistics are signaled,
/// never zero-filled.
pub fn cluster_stats(cloud: &PointCloud, group: &ClusterGroup) -> Result<ClusterStats> {
    accumulate(cloud, group.indices.iter().copied())
}

/// Statistics over all valid points of a cloud.
///
/// # Errors
///
/// Returns an error if the cloud has no valid points.
pub fn cloud_stats(cloud: &PointCloud) -> Result<ClusterStats> {
    accumulate(cloud, (0..cloud.len()).filter(|&i| cloud.is_valid(i)))
}
