//! Human detection and tracking core for 3D point cloud streams.
//!
//! This crate provides the per-frame geometric pipeline and temporal state
//! estimator for tracking a moving person near a robot:
//! - Voxel-grid downsampling and axis clipping of candidate clouds
//! - KD-tree backed Euclidean clustering
//! - Per-cluster descriptive statistics
//! - Minimum-distance search between the human cluster and the robot body
//! - A 2-D constant-velocity Kalman tracker with gating and loss recovery
//!
//! # Example
//!
//! ```no_run
//! use human_track::config::PipelineConfig;
//! use human_track::pipeline::{FramePair, HumanTrackPipeline};
//! use human_track::PointCloud;
//!
//! let mut pipeline = HumanTrackPipeline::new(PipelineConfig::default()).unwrap();
//! let frame = FramePair {
//!     candidate: PointCloud::new("camera"),
//!     robot: PointCloud::new("camera"),
//!     timestamp: 0.0,
//! };
//! let output = pipeline.process(frame);
//! if let Some(track) = output.track {
//!     println!("human at [{:.2}, {:.2}]", track.position[0], track.position[1]);
//! }
//! ```

pub mod config;
pub mod core;
pub mod pipeline;
pub mod processors;
pub mod tracking;

pub use config::{ClippingRule, PipelineConfig};
pub use core::cloud::{PointCloud, TaggedPoint};
pub use pipeline::{FrameOutput, FramePair, FrameQueue, HumanTrackPipeline};
pub use tracking::tracker::{TrackPhase, TrackQuality, TrackSnapshot};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
