//! Minimum-distance search between two point clouds.
//!
//! Used for the safety separation between the tracked human cluster and the
//! robot body cloud. Small inputs take an exhaustive scan; larger ones build
//! a KD-tree on the bigger cloud and query it once per point of the smaller
//! one. Both paths return the same minimum value.

use rayon::prelude::*;
use thiserror::Error;

use crate::core::cloud::{PointCloud, TaggedPoint};
use crate::processors::spatial::SpatialIndex;

/// Above this pair-count the indexed search replaces the exhaustive scan.
const BRUTE_FORCE_MAX_PAIRS: usize = 4096;

/// Errors that can occur during distance search.
#[derive(Debug, Error)]
pub enum DistanceError {
    #[error("minimum distance requested against an empty point cloud")]
    EmptyInput,
}

/// Result type for distance operations.
pub type Result<T> = std::result::Result<T, DistanceError>;

/// Closest pair between two clouds, each point tagged with its cloud's
/// reference frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MinDistance {
    /// Euclidean distance between the two points.
    pub distance: f32,
    /// Closest point of the first cloud.
    pub point_a: TaggedPoint,
    /// Closest point of the second cloud.
    pub point_b: TaggedPoint,
}

#[inline]
fn dist_sq(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Find the pair of points, one from each cloud, minimizing Euclidean
/// distance. Ties resolve to the lowest `(i, j)` index pair in the
/// exhaustive path; the indexed path guarantees the same distance value.
///
/// # Errors
///
/// Returns an error if either cloud has no valid points.
pub fn min_distance(cloud_a: &PointCloud, cloud_b: &PointCloud) -> Result<MinDistance> {
    let (coords_a, map_a) = cloud_a.valid_coords();
    let (coords_b, map_b) = cloud_b.valid_coords();

    if coords_a.is_empty() || coords_b.is_empty() {
        return Err(DistanceError::EmptyInput);
    }

    let (best_sq, ia, ib) = if coords_a.len() * coords_b.len() <= BRUTE_FORCE_MAX_PAIRS {
        brute_force(&coords_a, &coords_b)
    } else {
        indexed(&coords_a, &coords_b, cloud_a, cloud_b)
    };

    Ok(MinDistance {
        distance: best_sq.sqrt(),
        point_a: cloud_a.tagged_point(map_a[ia]),
        point_b: cloud_b.tagged_point(map_b[ib]),
    })
}

/// Exhaustive scan, parallel over the first cloud. The reduction compares
/// `(distance, i, j)` tuples so the result is deterministic regardless of
/// rayon's split order.
fn brute_force(coords_a: &[[f32; 3]], coords_b: &[[f32; 3]]) -> (f32, usize, usize) {
    coords_a
        .par_iter()
        .enumerate()
        .map(|(i, pa)| {
            let mut best = (f32::INFINITY, i, 0usize);
            for (j, pb) in coords_b.iter().enumerate() {
                let d = dist_sq(*pa, *pb);
                if d < best.0 {
                    best = (d, i, j);
                }
            }
            best
        })
        .reduce(
            || (f32::INFINITY, usize::MAX, usize::MAX),
            |a, b| {
                if (b.0, b.1, b.2) < (a.0, a.1, a.2) {
                    b
                } else {
                    a
                }
            },
        )
}

/// KD-tree on the larger cloud, nearest query per point of the smaller.
fn indexed(
    coords_a: &[[f32; 3]],
    coords_b: &[[f32; 3]],
    cloud_a: &PointCloud,
    cloud_b: &PointCloud,
) -> (f32, usize, usize) {
    // Query from the smaller side; an index lookup maps tree hits back to
    // compacted positions, which is what the caller expects here.
    let a_is_smaller = coords_a.len() <= coords_b.len();
    let (small, large_cloud) = if a_is_smaller {
        (coords_a, cloud_b)
    } else {
        (coords_b, cloud_a)
    };

    let index = SpatialIndex::build(large_cloud);

    let best = small
        .par_iter()
        .enumerate()
        .map(|(i, p)| match index.nearest(p) {
            Some((j, d)) => (d * d, i, j),
            None => (f32::INFINITY, i, 0),
        })
        .reduce(
            || (f32::INFINITY, usize::MAX, usize::MAX),
            |a, b| {
                if (b.0, b.1, b.2) < (a.0, a.1, a.2) {
                    b
                } else {
                    a
                }
            },
        );

    // nearest() returns cloud indices of the large cloud; compact them so
    // both sides use compacted positions like the brute-force path.
    let (_, large_map) = large_cloud.valid_coords();
    let large_compacted = large_map
        .iter()
        .position(|&ci| ci == best.2)
        .unwrap_or(best.2);

    if a_is_smaller {
        (best.0, best.1, large_compacted)
    } else {
        (best.0, large_compacted, best.1)
    }
}
