//! 3D point cloud container used throughout the pipeline.
//!
//! Clouds are stored as structure-of-arrays for cache-friendly per-axis
//! passes. An optional RGB channel is carried alongside the coordinates but
//! never consulted by geometry code.
//!
//! Organized clouds (depth-camera output with a fixed grid layout) mark
//! removed points with NaN coordinates instead of deleting them, so that
//! array positions stay meaningful for consumers that rely on the grid.

/// A single 3D point with an optional color, tagged with the reference
/// frame of the cloud it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedPoint {
    /// Coordinates [x, y, z].
    pub coords: [f32; 3],
    /// Reference frame id of the originating cloud.
    pub frame_id: String,
}

/// Container for 3D point cloud data.
#[derive(Debug, Clone)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f32>,
    /// Y coordinates of all points.
    pub y: Vec<f32>,
    /// Z coordinates of all points.
    pub z: Vec<f32>,
    /// Optional RGB colors for each point.
    pub colors: Option<Vec<[u8; 3]>>,
    /// Reference frame the coordinates are expressed in.
    pub frame_id: String,
    /// Whether invalid points occupy fixed grid positions (NaN markers)
    /// rather than being removed.
    pub organized: bool,
}

impl PointCloud {
    /// Creates a new empty unorganized cloud in the given frame.
    pub fn new(frame_id: impl Into<String>) -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            colors: None,
            frame_id: frame_id.into(),
            organized: false,
        }
    }

    /// Creates a new cloud with pre-allocated capacity.
    pub fn with_capacity(frame_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            colors: None,
            frame_id: frame_id.into(),
            organized: false,
        }
    }

    /// Creates a cloud from coordinate vectors.
    pub fn from_xyz(frame_id: impl Into<String>, x: Vec<f32>, y: Vec<f32>, z: Vec<f32>) -> Self {
        debug_assert_eq!(x.len(), y.len());
        debug_assert_eq!(x.len(), z.len());
        Self {
            x,
            y,
            z,
            colors: None,
            frame_id: frame_id.into(),
            organized: false,
        }
    }

    /// Returns the number of points in the cloud, including invalid markers.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the cloud holds no points at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Returns true if point `i` has finite coordinates.
    #[inline]
    pub fn is_valid(&self, i: usize) -> bool {
        self.x[i].is_finite() && self.y[i].is_finite() && self.z[i].is_finite()
    }

    /// Returns the number of valid (finite) points.
    pub fn valid_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_valid(i)).count()
    }

    /// Returns point `i` as a coordinate triple.
    #[inline]
    pub fn point(&self, i: usize) -> [f32; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    /// Returns point `i` tagged with this cloud's frame id.
    pub fn tagged_point(&self, i: usize) -> TaggedPoint {
        TaggedPoint {
            coords: self.point(i),
            frame_id: self.frame_id.clone(),
        }
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    /// Adds a point with a color channel.
    pub fn push_with_color(&mut self, x: f32, y: f32, z: f32, color: [u8; 3]) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);

        if self.colors.is_none() {
            self.colors = Some(Vec::with_capacity(self.x.capacity()));
        }
        if let Some(ref mut colors) = self.colors {
            colors.push(color);
        }
    }

    /// Marks point `i` invalid with NaN coordinates, preserving its slot.
    pub fn invalidate(&mut self, i: usize) {
        self.x[i] = f32::NAN;
        self.y[i] = f32::NAN;
        self.z[i] = f32::NAN;
    }

    /// Extracts valid points as a contiguous coordinate array together with
    /// a map from compacted position back to original cloud index.
    ///
    /// Spatial structures are built over the compacted array; the index map
    /// translates query results back into cloud indices.
    pub fn valid_coords(&self) -> (Vec<[f32; 3]>, Vec<usize>) {
        let n = self.len();
        let mut coords = Vec::with_capacity(n);
        let mut index_map = Vec::with_capacity(n);
        for i in 0..n {
            if self.is_valid(i) {
                coords.push(self.point(i));
                index_map.push(i);
            }
        }
        (coords, index_map)
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_len() {
        let mut cloud = PointCloud::new("map");
        cloud.push(1.0, 2.0, 3.0);
        cloud.push(4.0, 5.0, 6.0);

        assert_eq!(cloud.len(), 2);
        assert!(!cloud.is_empty());
        assert_eq!(cloud.point(1), [4.0, 5.0, 6.0]);
        assert_eq!(cloud.frame_id, "map");
    }

    #[test]
    fn test_invalidate_preserves_slot() {
        let mut cloud = PointCloud::new("camera");
        cloud.organized = true;
        cloud.push(1.0, 1.0, 1.0);
        cloud.push(2.0, 2.0, 2.0);

        cloud.invalidate(0);

        assert_eq!(cloud.len(), 2);
        assert!(!cloud.is_valid(0));
        assert!(cloud.is_valid(1));
        assert_eq!(cloud.valid_count(), 1);
    }

    #[test]
    fn test_valid_coords_compaction() {
        let mut cloud = PointCloud::new("camera");
        cloud.push(1.0, 0.0, 0.0);
        cloud.push(f32::NAN, f32::NAN, f32::NAN);
        cloud.push(3.0, 0.0, 0.0);

        let (coords, index_map) = cloud.valid_coords();

        assert_eq!(coords.len(), 2);
        assert_eq!(coords[0], [1.0, 0.0, 0.0]);
        assert_eq!(coords[1], [3.0, 0.0, 0.0]);
        assert_eq!(index_map, vec![0, 2]);
    }

    #[test]
    fn test_color_channel_carried() {
        let mut cloud = PointCloud::new("camera");
        cloud.push_with_color(0.0, 0.0, 0.0, [255, 0, 0]);

        let colors = cloud.colors.as_ref().unwrap();
        assert_eq!(colors[0], [255, 0, 0]);
    }
}
