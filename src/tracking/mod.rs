//! Temporal state estimation for the tracked human.

pub mod kalman;
pub mod tracker;

pub use kalman::KalmanState;
pub use tracker::{
    Candidate, HumanTracker, TrackPhase, TrackQuality, TrackSnapshot, TrackerOutcome,
};
