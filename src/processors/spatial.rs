//! KD-tree spatial index over the valid points of a cloud.
//!
//! Built once per cloud and never mutated; clustering uses the radius query,
//! cross-cloud distance search uses the nearest query. Results are reported
//! as indices into the original cloud, even when NaN-marked points were
//! compacted away during construction.

use kiddo::{ImmutableKdTree, SquaredEuclidean};

use crate::core::cloud::PointCloud;

/// Nearest-neighbor structure over one cloud's valid points.
pub struct SpatialIndex {
    tree: Option<ImmutableKdTree<f32, 3>>,
    /// Map from compacted tree entry back to cloud index.
    index_map: Vec<usize>,
    coords: Vec<[f32; 3]>,
}

impl SpatialIndex {
    /// Build an index over the cloud's valid points.
    ///
    /// A cloud with no valid points yields an index whose queries return
    /// nothing.
    pub fn build(cloud: &PointCloud) -> Self {
        let (coords, index_map) = cloud.valid_coords();
        let tree = if coords.is_empty() {
            None
        } else {
            Some(ImmutableKdTree::new_from_slice(&coords))
        };
        Self {
            tree,
            index_map,
            coords,
        }
    }

    /// Number of indexed points.
    #[inline]
    pub fn len(&self) -> usize {
        self.index_map.len()
    }

    /// Returns true if no points were indexed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index_map.is_empty()
    }

    /// Cloud indices of all points within `radius` of `center`, sorted
    /// ascending for deterministic traversal.
    pub fn radius(&self, center: &[f32; 3], radius: f32) -> Vec<usize> {
        let Some(ref tree) = self.tree else {
            return Vec::new();
        };

        let mut hits: Vec<usize> = tree
            .within::<SquaredEuclidean>(center, radius * radius)
            .iter()
            .map(|nn| self.index_map[nn.item as usize])
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Cloud index and Euclidean distance of the point closest to `query`.
    pub fn nearest(&self, query: &[f32; 3]) -> Option<(usize, f32)> {
        let tree = self.tree.as_ref()?;
        let nn = tree.nearest_one::<SquaredEuclidean>(query);
        Some((self.index_map[nn.item as usize], nn.distance.sqrt()))
    }

    /// Compacted entries within `radius` of `center`, sorted ascending.
    ///
    /// Used by clustering, which tracks visited flags in compacted space and
    /// maps back to cloud indices only when emitting groups.
    pub(crate) fn radius_compacted(&self, center: &[f32; 3], radius: f32) -> Vec<usize> {
        let Some(ref tree) = self.tree else {
            return Vec::new();
        };

        let mut hits: Vec<usize> = tree
            .within::<SquaredEuclidean>(center, radius * radius)
            .iter()
            .map(|nn| nn.item as usize)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Coordinates of the compacted entry `i` (tree order, not cloud order).
    #[inline]
    pub(crate) fn coord(&self, i: usize) -> [f32; 3] {
        self.coords[i]
    }

    /// Cloud index of the compacted entry `i`.
    #[inline]
    pub(crate) fn cloud_index(&self, i: usize) -> usize {
        self.index_map[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_cloud() -> PointCloud {
        let mut cloud = PointCloud::new("map");
        for i in 0..5 {
            cloud.push(i as f32, 0.0, 0.0);
        }
        cloud
    }

    #[test]
    fn test_radius_query_sorted() {
        let cloud = line_cloud();
        let index = SpatialIndex::build(&cloud);

        let hits = index.radius(&[1.0, 0.0, 0.0], 1.1);
        assert_eq!(hits, vec![0, 1, 2]);
    }

    #[test]
    fn test_nearest_query() {
        let cloud = line_cloud();
        let index = SpatialIndex::build(&cloud);

        let (idx, dist) = index.nearest(&[3.2, 0.0, 0.0]).unwrap();
        assert_eq!(idx, 3);
        assert!((dist - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_invalid_points_excluded() {
        let mut cloud = line_cloud();
        cloud.invalidate(2);
        let index = SpatialIndex::build(&cloud);

        assert_eq!(index.len(), 4);
        let hits = index.radius(&[2.0, 0.0, 0.0], 1.1);
        // Index 2 is NaN-marked; neighbors 1 and 3 remain, mapped back to
        // their original cloud indices.
        assert_eq!(hits, vec![1, 3]);
    }

    #[test]
    fn test_empty_cloud() {
        let cloud = PointCloud::new("map");
        let index = SpatialIndex::build(&cloud);

        assert!(index.is_empty());
        assert!(index.radius(&[0.0, 0.0, 0.0], 10.0).is_empty());
        assert!(index.nearest(&[0.0, 0.0, 0.0]).is_none());
    }
}
