//! Voxel-grid downsampling and rule-based axis clipping.
//!
//! Both operations run before clustering: downsampling bounds the work the
//! spatial index has to do, clipping removes floor/ceiling/background points
//! that would otherwise bridge clusters.

use std::collections::HashMap;

use thiserror::Error;

use crate::config::ClippingRule;
use crate::core::cloud::PointCloud;

/// Errors that can occur during preprocessing.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("voxel size must be positive, got {0}")]
    NonPositiveVoxelSize(f32),
}

/// Result type for preprocessing operations.
pub type Result<T> = std::result::Result<T, PreprocessError>;

/// Downsample a cloud by replacing all points within each voxel-grid cell
/// with their centroid.
///
/// Invalid (NaN-marked) points are skipped and never averaged in. The output
/// is unorganized regardless of the input layout; points are emitted in
/// ascending voxel key order so repeated runs produce identical clouds.
///
/// # Errors
///
/// Returns an error if `voxel_size` is not strictly positive.
pub fn downsample(cloud: &PointCloud, voxel_size: f32) -> Result<PointCloud> {
    if voxel_size <= 0.0 {
        return Err(PreprocessError::NonPositiveVoxelSize(voxel_size));
    }

    // Accumulate per-voxel coordinate sums keyed by the quantized cell.
    let mut cells: HashMap<[i64; 3], ([f64; 3], usize)> = HashMap::new();
    let inv = 1.0 / voxel_size;

    for i in 0..cloud.len() {
        if !cloud.is_valid(i) {
            continue;
        }
        let p = cloud.point(i);
        let key = [
            (p[0] * inv).floor() as i64,
            (p[1] * inv).floor() as i64,
            (p[2] * inv).floor() as i64,
        ];
        let entry = cells.entry(key).or_insert(([0.0; 3], 0));
        entry.0[0] += p[0] as f64;
        entry.0[1] += p[1] as f64;
        entry.0[2] += p[2] as f64;
        entry.1 += 1;
    }

    let mut keys: Vec<[i64; 3]> = cells.keys().copied().collect();
    keys.sort_unstable();

    let mut out = PointCloud::with_capacity(cloud.frame_id.clone(), keys.len());
    for key in keys {
        let (sum, count) = cells[&key];
        let n = count as f64;
        out.push(
            (sum[0] / n) as f32,
            (sum[1] / n) as f32,
            (sum[2] / n) as f32,
        );
    }

    Ok(out)
}

/// Keep only points satisfying the AND of all clipping rules.
///
/// Organized clouds keep their grid layout: rejected points become NaN
/// markers instead of being removed. Unorganized clouds drop rejected points.
/// An empty rule set is the identity.
pub fn clip(cloud: &PointCloud, rules: &[ClippingRule]) -> PointCloud {
    let mut out = if cloud.organized {
        cloud.clone()
    } else {
        PointCloud::with_capacity(cloud.frame_id.clone(), cloud.len())
    };

    if cloud.organized {
        for i in 0..cloud.len() {
            if !cloud.is_valid(i) {
                continue;
            }
            let p = cloud.point(i);
            if !rules.iter().all(|r| r.accepts(p)) {
                out.invalidate(i);
            }
        }
    } else {
        for i in 0..cloud.len() {
            if !cloud.is_valid(i) {
                continue;
            }
            let p = cloud.point(i);
            if rules.iter().all(|r| r.accepts(p)) {
                if let Some(ref colors) = cloud.colors {
                    out.push_with_color(p[0], p[1], p[2], colors[i]);
                } else {
                    out.push(p[0], p[1], p[2]);
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Axis, ClipOp};

    fn cube_corner_cloud() -> PointCloud {
        // Two tight groups in separate voxels plus one far point.
        let mut cloud = PointCloud::new("camera");
        cloud.push(0.01, 0.01, 0.01);
        cloud.push(0.02, 0.02, 0.02);
        cloud.push(0.03, 0.01, 0.03);
        cloud.push(1.01, 1.01, 1.01);
        cloud.push(1.02, 1.03, 1.02);
        cloud.push(5.0, 5.0, 5.0);
        cloud
    }

    #[test]
    fn test_downsample_reduces_count() {
        let cloud = cube_corner_cloud();
        let out = downsample(&cloud, 0.1).unwrap();

        assert_eq!(out.len(), 3);
        assert!(out.len() <= cloud.len());
    }

    #[test]
    fn test_downsample_centroid_within_cell() {
        let mut cloud = PointCloud::new("camera");
        cloud.push(0.01, 0.0, 0.0);
        cloud.push(0.03, 0.0, 0.0);

        let out = downsample(&cloud, 0.05).unwrap();
        assert_eq!(out.len(), 1);

        let p = out.point(0);
        assert!((p[0] - 0.02).abs() < 1e-6);
        // Centroid stays inside the cell of the points it replaces.
        assert!(p[0] >= 0.0 && p[0] < 0.05);
    }

    #[test]
    fn test_downsample_skips_invalid_points() {
        let mut cloud = PointCloud::new("camera");
        cloud.push(0.01, 0.01, 0.01);
        cloud.push(f32::NAN, f32::NAN, f32::NAN);

        let out = downsample(&cloud, 0.1).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out.is_valid(0));
    }

    #[test]
    fn test_downsample_rejects_bad_voxel_size() {
        let cloud = cube_corner_cloud();
        assert!(downsample(&cloud, 0.0).is_err());
        assert!(downsample(&cloud, -1.0).is_err());
    }

    #[test]
    fn test_clip_empty_rules_is_identity() {
        let cloud = cube_corner_cloud();
        let out = clip(&cloud, &[]);
        assert_eq!(out.len(), cloud.len());
    }

    #[test]
    fn test_clip_and_combination() {
        let cloud = cube_corner_cloud();
        let rules = vec![
            ClippingRule {
                axis: Axis::X,
                op: ClipOp::GreaterThan,
                threshold: 0.5,
            },
            ClippingRule {
                axis: Axis::X,
                op: ClipOp::LessThan,
                threshold: 2.0,
            },
        ];

        let out = clip(&cloud, &rules);
        assert_eq!(out.len(), 2);
        for i in 0..out.len() {
            let p = out.point(i);
            assert!(p[0] > 0.5 && p[0] < 2.0);
        }
    }

    #[test]
    fn test_clip_organized_preserves_positions() {
        let mut cloud = cube_corner_cloud();
        cloud.organized = true;
        let rules = vec![ClippingRule {
            axis: Axis::Z,
            op: ClipOp::LessThan,
            threshold: 2.0,
        }];

        let out = clip(&cloud, &rules);
        assert_eq!(out.len(), cloud.len());
        assert!(out.is_valid(0));
        assert!(!out.is_valid(5)); // z = 5.0 rejected, slot preserved
    }
}
