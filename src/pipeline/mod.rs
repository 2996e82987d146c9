//! Per-frame orchestration of the detection and tracking stages.
//!
//! One `HumanTrackPipeline` owns the tracker and wires the geometric stages
//! together for each synchronized frame pair: downsample and clip the
//! candidate cloud, cluster it, compute per-cluster statistics, feed the
//! centroids to the tracker, then measure the separation between the
//! selected cluster and the robot body cloud.
//!
//! Recoverable stage failures (empty clouds, no qualifying cluster, an
//! unavailable transform) degrade the frame to "no measurement" and are
//! logged; only configuration validation at construction is fatal.

use std::collections::VecDeque;

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::{ConfigError, PipelineConfig};
use crate::core::cloud::PointCloud;
use crate::processors::clustering::{self, ClusterGroup};
use crate::processors::distance::{self, MinDistance};
use crate::processors::preprocess;
use crate::processors::stats::{self, ClusterStats};
use crate::tracking::tracker::{Candidate, HumanTracker, TrackPhase, TrackSnapshot};

/// Errors surfaced at the pipeline boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from the external coordinate transform collaborator.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transform to frame '{target}' unavailable: {reason}")]
    Unavailable { target: String, reason: String },
}

/// External coordinate transform service.
///
/// Implementations are expected to be time-bounded; a failure here costs the
/// frame its distance stage, never the track.
pub trait TransformService {
    /// Re-express `cloud` in `target_frame`.
    fn transform(&self, cloud: &PointCloud, target_frame: &str)
        -> Result<PointCloud, TransformError>;
}

/// A synchronized (candidate cloud, robot cloud, timestamp) tuple.
#[derive(Debug, Clone)]
pub struct FramePair {
    /// Cloud that may contain the human.
    pub candidate: PointCloud,
    /// Cloud of the robot's own body.
    pub robot: PointCloud,
    /// Frame timestamp in seconds; must be non-decreasing across frames.
    pub timestamp: f64,
}

/// The cluster chosen as the human this frame, with its member points for
/// downstream visualization.
#[derive(Debug, Clone)]
pub struct SelectedCluster {
    pub group: ClusterGroup,
    pub stats: ClusterStats,
    /// Member points extracted into their own cloud.
    pub points: PointCloud,
}

/// Everything the pipeline emits for one processed frame.
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    /// Track state after this frame; `None` while no track exists.
    pub track: Option<TrackSnapshot>,
    /// The cluster accepted as the human, if any qualified.
    pub cluster: Option<SelectedCluster>,
    /// Minimum human-robot separation, if it could be computed.
    pub min_distance: Option<MinDistance>,
}

/// Bounded frame buffer with drop-oldest overflow.
///
/// Keeps latency bounded when frame arrival outpaces processing; a dropped
/// frame is not an error, just unprocessed.
pub struct FrameQueue {
    frames: VecDeque<FramePair>,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Enqueue a frame, returning the oldest one if it had to be evicted.
    pub fn push(&mut self, frame: FramePair) -> Option<FramePair> {
        let dropped = if self.frames.len() == self.capacity {
            let old = self.frames.pop_front();
            debug!("frame queue full, dropping oldest frame");
            old
        } else {
            None
        };
        self.frames.push_back(frame);
        dropped
    }

    /// Dequeue the oldest pending frame.
    pub fn pop(&mut self) -> Option<FramePair> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// The per-frame detection and tracking pipeline.
pub struct HumanTrackPipeline {
    config: PipelineConfig,
    tracker: HumanTracker,
    transform: Option<Box<dyn TransformService + Send>>,
    last_timestamp: Option<f64>,
}

impl HumanTrackPipeline {
    /// Build a pipeline from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any parameter fails its startup
    /// constraint; the pipeline never runs with bad parameters.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let tracker = HumanTracker::new(config.tracking.clone());
        Ok(Self {
            config,
            tracker,
            transform: None,
            last_timestamp: None,
        })
    }

    /// Attach the external transform collaborator.
    ///
    /// Without one, both clouds are assumed to already share a frame.
    pub fn with_transform(mut self, transform: Box<dyn TransformService + Send>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Current tracker phase, for callers that schedule around track state.
    pub fn track_phase(&self) -> TrackPhase {
        self.tracker.phase()
    }

    /// Process one synchronized frame pair.
    ///
    /// Never panics and never leaves the track half-updated; every
    /// recoverable failure degrades to an absent field in the output.
    pub fn process(&mut self, frame: FramePair) -> FrameOutput {
        if let Some(last) = self.last_timestamp {
            if frame.timestamp < last {
                warn!(
                    "frame timestamp {:.3} precedes last processed {:.3}, skipping",
                    frame.timestamp, last
                );
                return FrameOutput::default();
            }
        }
        self.last_timestamp = Some(frame.timestamp);

        // Geometric stages on the candidate cloud.
        let filtered = match preprocess::downsample(&frame.candidate, self.config.preprocess.voxel_size)
        {
            Ok(cloud) => cloud,
            Err(e) => {
                // Unreachable with a validated config; degrade rather than panic.
                warn!("downsampling failed: {}", e);
                return FrameOutput::default();
            }
        };
        let filtered = preprocess::clip(&filtered, &self.config.preprocess.clipping_rules);

        let groups = match clustering::cluster(
            &filtered,
            self.config.clustering.tolerance,
            self.config.clustering.min_cluster_size,
        ) {
            Ok(groups) => groups,
            Err(e) => {
                warn!("clustering failed: {}", e);
                return FrameOutput::default();
            }
        };
        debug!(
            "frame {:.3}: {} points after preprocessing, {} clusters",
            frame.timestamp,
            filtered.valid_count(),
            groups.len()
        );

        // Centroids for gating; clusters whose stats fail are skipped.
        let mut group_stats = Vec::with_capacity(groups.len());
        let mut candidates = Vec::with_capacity(groups.len());
        for group in &groups {
            match stats::cluster_stats(&filtered, group) {
                Ok(s) => {
                    candidates.push(Candidate {
                        centroid: [s.mean[0] as f64, s.mean[1] as f64],
                        size: group.len(),
                    });
                    group_stats.push(s);
                }
                Err(e) => {
                    warn!("cluster statistics failed: {}", e);
                }
            }
        }

        // Temporal stage.
        let outcome = self.tracker.process_frame(frame.timestamp, &candidates);
        if self.tracker.phase() == TrackPhase::Lost {
            info!("resetting lost track for reacquisition");
            self.tracker.reset();
        }

        let cluster = outcome.selected.map(|i| SelectedCluster {
            group: groups[i].clone(),
            stats: group_stats[i].clone(),
            points: extract_points(&filtered, &groups[i]),
        });

        // Safety separation between the selected cluster and the robot body.
        let min_distance = cluster
            .as_ref()
            .and_then(|c| self.robot_separation(&c.points, &frame.robot));

        FrameOutput {
            track: outcome.snapshot,
            cluster,
            min_distance,
        }
    }

    fn robot_separation(&self, human: &PointCloud, robot: &PointCloud) -> Option<MinDistance> {
        let robot = match &self.transform {
            Some(service) if robot.frame_id != human.frame_id => {
                match service.transform(robot, &human.frame_id) {
                    Ok(cloud) => cloud,
                    Err(e) => {
                        warn!("skipping distance stage: {}", e);
                        return None;
                    }
                }
            }
            _ => robot.clone(),
        };

        match distance::min_distance(human, &robot) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("distance stage skipped: {}", e);
                None
            }
        }
    }
}

/// Copy a group's member points into their own cloud.
fn extract_points(cloud: &PointCloud, group: &ClusterGroup) -> PointCloud {
    let mut out = PointCloud::with_capacity(cloud.frame_id.clone(), group.len());
    for &i in &group.indices {
        let p = cloud.point(i);
        if let Some(ref colors) = cloud.colors {
            out.push_with_color(p[0], p[1], p[2], colors[i]);
        } else {
            out.push(p[0], p[1], p[2]);
        }
    }
    out
}
