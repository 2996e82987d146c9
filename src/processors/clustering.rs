//! Euclidean connected-component clustering for point clouds.
//!
//! Points belong to the same cluster when they are reachable through a chain
//! of neighbors each within the distance tolerance. The implementation
//! precomputes neighbor lists in parallel with a KD-tree, then grows
//! components sequentially in ascending point-index order so the same input
//! always yields the same groups in the same order.

use rayon::prelude::*;
use thiserror::Error;

use crate::core::cloud::PointCloud;
use crate::processors::spatial::SpatialIndex;

/// Errors that can occur during clustering.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster tolerance must be positive, got {0}")]
    NonPositiveTolerance(f32),

    #[error("minimum cluster size must be at least 1")]
    ZeroMinSize,
}

/// Result type for clustering operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// A set of point indices into the clustered cloud forming one connected
/// component. Groups from one `cluster` call are pairwise disjoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterGroup {
    /// Indices into the cloud the group was extracted from, ascending.
    pub indices: Vec<usize>,
}

impl ClusterGroup {
    /// Number of points in the group.
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns true if the group holds no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Group the cloud's valid points into connected components under the
/// distance `tolerance`, discarding components smaller than `min_size`.
///
/// # Algorithm
///
/// 1. Build a KD-tree over the valid points.
/// 2. Precompute each point's neighbor list within `tolerance` (parallel).
/// 3. Seeded region growing: scan points in ascending index order, breadth-
///    first expand each unvisited seed through the precomputed lists.
/// 4. Drop components below `min_size`.
///
/// Returned indices reference the input cloud (NaN-marked points never
/// appear). Groups are ordered by their lowest member index.
///
/// # Errors
///
/// Returns an error if `tolerance <= 0` or `min_size == 0`.
pub fn cluster(cloud: &PointCloud, tolerance: f32, min_size: usize) -> Result<Vec<ClusterGroup>> {
    if tolerance <= 0.0 {
        return Err(ClusterError::NonPositiveTolerance(tolerance));
    }
    if min_size == 0 {
        return Err(ClusterError::ZeroMinSize);
    }

    let index = SpatialIndex::build(cloud);
    let n = index.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    // Parallel neighbor precomputation in compacted space.
    let neighbors: Vec<Vec<usize>> = (0..n)
        .into_par_iter()
        .map(|i| index.radius_compacted(&index.coord(i), tolerance))
        .collect();

    // Sequential region growing over a fixed traversal order.
    let mut visited = vec![false; n];
    let mut groups = Vec::new();

    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let mut members = vec![seed];
        let mut frontier = vec![seed];

        while let Some(current) = frontier.pop() {
            for &nb in &neighbors[current] {
                if !visited[nb] {
                    visited[nb] = true;
                    members.push(nb);
                    frontier.push(nb);
                }
            }
        }

        if members.len() >= min_size {
            let mut indices: Vec<usize> =
                members.into_iter().map(|i| index.cloud_index(i)).collect();
            indices.sort_unstable();
            groups.push(ClusterGroup { indices });
        }
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blob_cloud() -> PointCloud {
        let mut cloud = PointCloud::new("camera");
        // Blob around the origin.
        cloud.push(0.0, 0.0, 0.0);
        cloud.push(0.05, 0.0, 0.0);
        cloud.push(0.0, 0.05, 0.0);
        cloud.push(0.05, 0.05, 0.0);
        // Blob far away.
        cloud.push(10.0, 10.0, 0.0);
        cloud.push(10.05, 10.0, 0.0);
        cloud.push(10.0, 10.05, 0.0);
        cloud
    }

    #[test]
    fn test_two_separate_clusters() {
        let cloud = two_blob_cloud();
        let groups = cluster(&cloud, 0.1, 2).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].indices, vec![0, 1, 2, 3]);
        assert_eq!(groups[1].indices, vec![4, 5, 6]);
    }

    #[test]
    fn test_groups_disjoint() {
        let cloud = two_blob_cloud();
        let groups = cluster(&cloud, 0.1, 1).unwrap();

        let mut seen = std::collections::HashSet::new();
        for g in &groups {
            for &i in &g.indices {
                assert!(seen.insert(i), "index {} appears in two groups", i);
            }
        }
    }

    #[test]
    fn test_min_size_discards_small_groups() {
        let cloud = two_blob_cloud();
        let groups = cluster(&cloud, 0.1, 4).unwrap();

        // Only the 4-point blob survives.
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 4);
    }

    #[test]
    fn test_tight_sphere_single_cluster() {
        // 10 points packed within a 0.02-radius sphere around (1, 2, 3).
        let offsets = [
            [0.0, 0.0, 0.0],
            [0.01, 0.0, 0.0],
            [-0.01, 0.0, 0.0],
            [0.0, 0.01, 0.0],
            [0.0, -0.01, 0.0],
            [0.0, 0.0, 0.01],
            [0.0, 0.0, -0.01],
            [0.01, 0.01, 0.0],
            [-0.01, -0.01, 0.0],
            [0.01, 0.0, 0.01],
        ];
        let mut cloud = PointCloud::new("camera");
        for o in offsets {
            cloud.push(1.0 + o[0], 2.0 + o[1], 3.0 + o[2]);
        }

        let groups = cluster(&cloud, 0.1, 5).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 10);

        let stats = crate::processors::stats::cluster_stats(&cloud, &groups[0]).unwrap();
        assert!((stats.mean[0] - 1.0).abs() < 0.01);
        assert!((stats.mean[1] - 2.0).abs() < 0.01);
        assert!((stats.mean[2] - 3.0).abs() < 0.01);
    }

    #[test]
    fn test_chain_connectivity() {
        // A chain of points each 0.09 apart: connected under tolerance 0.1
        // even though the ends are far from each other.
        let mut cloud = PointCloud::new("camera");
        for i in 0..20 {
            cloud.push(i as f32 * 0.09, 0.0, 0.0);
        }

        let groups = cluster(&cloud, 0.1, 2).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 20);
    }

    #[test]
    fn test_invalid_points_never_clustered() {
        let mut cloud = two_blob_cloud();
        cloud.invalidate(1);

        let groups = cluster(&cloud, 0.1, 1).unwrap();
        for g in &groups {
            assert!(!g.indices.contains(&1));
        }
    }

    #[test]
    fn test_empty_cloud() {
        let cloud = PointCloud::new("camera");
        let groups = cluster(&cloud, 0.1, 1).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_bad_parameters() {
        let cloud = two_blob_cloud();
        assert!(cluster(&cloud, 0.0, 1).is_err());
        assert!(cluster(&cloud, -0.5, 1).is_err());
        assert!(cluster(&cloud, 0.1, 0).is_err());
    }

    #[test]
    fn test_deterministic_repeat() {
        let cloud = two_blob_cloud();
        let a = cluster(&cloud, 0.1, 1).unwrap();
        let b = cluster(&cloud, 0.1, 1).unwrap();
        assert_eq!(a, b);
    }
}
