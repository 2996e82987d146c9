//! Per-frame geometric processing stages.

pub mod clustering;
pub mod distance;
pub mod preprocess;
pub mod spatial;
pub mod stats;

// Re-export key types for convenience
pub use clustering::{cluster, ClusterError, ClusterGroup};
pub use distance::{min_distance, DistanceError, MinDistance};
pub use preprocess::{clip, downsample, PreprocessError};
pub use spatial::SpatialIndex;
pub use stats::{cloud_stats, cluster_stats, ClusterStats, StatsError};
