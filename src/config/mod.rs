//! Configuration types for the tracking pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors produced while loading or validating configuration.
///
/// Any of these is fatal at startup: the pipeline refuses to run with bad
/// parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must be at least 1, got 0")]
    ZeroCount { name: &'static str },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Axis a clipping rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    #[serde(rename = "x")]
    X,
    #[serde(rename = "y")]
    Y,
    #[serde(rename = "z")]
    Z,
}

/// Comparison operator for a clipping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipOp {
    #[serde(rename = "GT")]
    GreaterThan,
    #[serde(rename = "LT")]
    LessThan,
}

/// Axis-aligned bound used to filter points.
///
/// A rule set is combined as a logical AND: a point must satisfy every rule
/// to be kept. Unknown axis or operator strings fail at deserialization,
/// before any point is touched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClippingRule {
    pub axis: Axis,
    pub op: ClipOp,
    pub threshold: f32,
}

impl ClippingRule {
    /// Returns true if the coordinate triple satisfies this rule.
    #[inline]
    pub fn accepts(&self, p: [f32; 3]) -> bool {
        let value = match self.axis {
            Axis::X => p[0],
            Axis::Y => p[1],
            Axis::Z => p[2],
        };
        match self.op {
            ClipOp::GreaterThan => value > self.threshold,
            ClipOp::LessThan => value < self.threshold,
        }
    }
}

/// Configuration for the downsample/clip preprocessing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Voxel grid cell side length in meters.
    #[serde(default = "default_voxel_size")]
    pub voxel_size: f32,

    /// Clipping rules applied after downsampling (AND-combined).
    #[serde(default)]
    pub clipping_rules: Vec<ClippingRule>,
}

fn default_voxel_size() -> f32 {
    0.02
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            voxel_size: default_voxel_size(),
            clipping_rules: Vec::new(),
        }
    }
}

/// Configuration for Euclidean clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Neighbor distance tolerance in meters.
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,

    /// Minimum points for a cluster to be reported.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
}

fn default_tolerance() -> f32 {
    0.08
}

fn default_min_cluster_size() -> usize {
    200
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            min_cluster_size: default_min_cluster_size(),
        }
    }
}

/// Configuration for the Kalman tracker and measurement gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Maximum centroid-to-prediction distance for a cluster to qualify
    /// as a measurement, in meters.
    #[serde(default = "default_gating_distance")]
    pub gating_distance: f64,

    /// Consecutive measurement-less frames before the track is lost.
    #[serde(default = "default_max_missed_frames")]
    pub max_missed_frames: u32,

    /// Process noise variance sigma_a^2 in (m/s^2)^2.
    #[serde(default = "default_process_noise_var")]
    pub process_noise_var: f64,

    /// Measurement noise variance sigma_z^2 in m^2.
    #[serde(default = "default_measurement_noise_var")]
    pub measurement_noise_var: f64,

    /// Initial covariance diagonal when a track is (re)acquired.
    #[serde(default = "default_initial_covariance")]
    pub initial_covariance: f64,

    /// Covariance trace above which the track is declared lost.
    #[serde(default = "default_max_covariance_trace")]
    pub max_covariance_trace: f64,
}

fn default_gating_distance() -> f64 {
    0.5
}

fn default_max_missed_frames() -> u32 {
    5
}

fn default_process_noise_var() -> f64 {
    0.5
}

fn default_measurement_noise_var() -> f64 {
    0.01
}

fn default_initial_covariance() -> f64 {
    1.0
}

fn default_max_covariance_trace() -> f64 {
    50.0
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            gating_distance: default_gating_distance(),
            max_missed_frames: default_max_missed_frames(),
            process_noise_var: default_process_noise_var(),
            measurement_noise_var: default_measurement_noise_var(),
            initial_covariance: default_initial_covariance(),
            max_covariance_trace: default_max_covariance_trace(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub preprocess: PreprocessConfig,

    #[serde(default)]
    pub clustering: ClusterConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Capacity of the bounded frame queue (drop-oldest beyond this).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            clustering: ClusterConfig::default(),
            tracking: TrackingConfig::default(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check all parameters against their startup constraints.
    ///
    /// Called by the pipeline constructor; a failure here must prevent the
    /// pipeline from ever processing a frame.
    pub fn validate(&self) -> Result<()> {
        positive("voxel_size", self.preprocess.voxel_size as f64)?;
        positive("tolerance", self.clustering.tolerance as f64)?;
        if self.clustering.min_cluster_size == 0 {
            return Err(ConfigError::ZeroCount {
                name: "min_cluster_size",
            });
        }
        positive("gating_distance", self.tracking.gating_distance)?;
        if self.tracking.max_missed_frames == 0 {
            return Err(ConfigError::ZeroCount {
                name: "max_missed_frames",
            });
        }
        positive("process_noise_var", self.tracking.process_noise_var)?;
        positive("measurement_noise_var", self.tracking.measurement_noise_var)?;
        positive("initial_covariance", self.tracking.initial_covariance)?;
        positive("max_covariance_trace", self.tracking.max_covariance_trace)?;
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCount {
                name: "queue_capacity",
            });
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracking.max_missed_frames, 5);
        assert_eq!(config.clustering.min_cluster_size, 200);
    }

    #[test]
    fn test_validate_rejects_bad_voxel_size() {
        let mut config = PipelineConfig::default();
        config.preprocess.voxel_size = 0.0;
        assert!(config.validate().is_err());

        config.preprocess.voxel_size = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let mut config = PipelineConfig::default();
        config.clustering.min_cluster_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.tracking.max_missed_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clipping_rule_accepts() {
        let rule = ClippingRule {
            axis: Axis::Z,
            op: ClipOp::GreaterThan,
            threshold: 0.1,
        };
        assert!(rule.accepts([0.0, 0.0, 0.5]));
        assert!(!rule.accepts([0.0, 0.0, 0.05]));

        let rule = ClippingRule {
            axis: Axis::X,
            op: ClipOp::LessThan,
            threshold: 2.0,
        };
        assert!(rule.accepts([1.0, 10.0, 10.0]));
        assert!(!rule.accepts([3.0, 0.0, 0.0]));
    }

    #[test]
    fn test_rule_yaml_encoding() {
        let yaml = "axis: z\nop: GT\nthreshold: 0.15\n";
        let rule: ClippingRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.axis, Axis::Z);
        assert_eq!(rule.op, ClipOp::GreaterThan);

        // Unknown axis/op strings are a configuration error at parse time.
        assert!(serde_yaml::from_str::<ClippingRule>("axis: w\nop: GT\nthreshold: 0.0\n").is_err());
        assert!(serde_yaml::from_str::<ClippingRule>("axis: x\nop: GE\nthreshold: 0.0\n").is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = PipelineConfig::default();
        config.preprocess.clipping_rules.push(ClippingRule {
            axis: Axis::Z,
            op: ClipOp::LessThan,
            threshold: 2.2,
        });
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.preprocess.clipping_rules.len(), 1);
        assert_eq!(loaded.preprocess.clipping_rules[0].op, ClipOp::LessThan);
        assert_eq!(loaded.clustering.tolerance, config.clustering.tolerance);
    }
}
