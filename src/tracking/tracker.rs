//! Track lifecycle around the Kalman filter.
//!
//! Phases: Uninitialized -> Tracking -> Lost -> (reset) -> Uninitialized.
//! The tracker owns measurement qualification: among candidate cluster
//! centroids it selects at most one per frame, gated against the predicted
//! position, and treats everything else as "no measurement".

use log::{debug, info, warn};

use crate::config::TrackingConfig;
use crate::tracking::kalman::{KalmanState, Mat4, Vec2};

/// Consecutive reverted updates before the track is forced to Lost.
const MAX_INSTABILITY_STREAK: u32 = 2;

/// Lifecycle phase of the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    /// No track; waiting for a first acceptable measurement.
    Uninitialized,
    /// Active track; predict/update every frame.
    Tracking,
    /// Track lost; requires an explicit reset before reacquisition.
    Lost,
}

/// Coarse track confidence derived from covariance and miss count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackQuality {
    /// Recently updated, covariance well bounded.
    High,
    /// Running on prediction only or uncertainty growing.
    Degraded,
    /// No usable track.
    Lost,
}

/// One candidate measurement: a cluster centroid with its supporting size.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    /// Centroid projected to the ground plane [x, y].
    pub centroid: Vec2,
    /// Number of points backing the cluster.
    pub size: usize,
}

/// Immutable view of the track state after a frame.
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    pub position: Vec2,
    pub velocity: Vec2,
    pub covariance: Mat4,
    /// Timestamp of the frame that produced this snapshot, seconds.
    pub timestamp: f64,
    pub quality: TrackQuality,
    /// Frames since the last accepted measurement.
    pub consecutive_misses: u32,
}

/// Result of feeding one frame's candidates to the tracker.
#[derive(Debug, Clone)]
pub struct TrackerOutcome {
    /// Index into the candidate slice of the accepted measurement, if any.
    pub selected: Option<usize>,
    /// Track state after the frame; `None` while no track exists.
    pub snapshot: Option<TrackSnapshot>,
}

/// Single-target human tracker.
pub struct HumanTracker {
    config: TrackingConfig,
    phase: TrackPhase,
    filter: Option<KalmanState>,
    last_timestamp: f64,
    consecutive_misses: u32,
    instability_streak: u32,
    /// Position of the last accepted measurement; biases reacquisition
    /// toward where the human was last seen.
    last_position: Option<Vec2>,
}

impl HumanTracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            phase: TrackPhase::Uninitialized,
            filter: None,
            last_timestamp: 0.0,
            consecutive_misses: 0,
            instability_streak: 0,
            last_position: None,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> TrackPhase {
        self.phase
    }

    /// Drop a lost track and return to Uninitialized.
    ///
    /// The next frame with candidates restarts tracking from scratch; the
    /// last accepted position is kept to bias reacquisition.
    pub fn reset(&mut self) {
        if self.phase != TrackPhase::Uninitialized {
            info!("track reset from {:?}", self.phase);
        }
        self.phase = TrackPhase::Uninitialized;
        self.filter = None;
        self.consecutive_misses = 0;
        self.instability_streak = 0;
    }

    /// Advance the track by one frame.
    ///
    /// `timestamp` must be non-decreasing across calls; `candidates` are the
    /// centroids of all clusters that passed the minimum-size filter. The
    /// state is only ever committed whole: a frame either completes its
    /// predict/update cycle or leaves the track exactly as it was.
    pub fn process_frame(&mut self, timestamp: f64, candidates: &[Candidate]) -> TrackerOutcome {
        match self.phase {
            TrackPhase::Uninitialized => self.acquire(timestamp, candidates),
            TrackPhase::Tracking => self.track(timestamp, candidates),
            TrackPhase::Lost => TrackerOutcome {
                selected: None,
                snapshot: None,
            },
        }
    }

    fn acquire(&mut self, timestamp: f64, candidates: &[Candidate]) -> TrackerOutcome {
        let Some(seed) = self.pick_seed(candidates) else {
            return TrackerOutcome {
                selected: None,
                snapshot: None,
            };
        };

        let position = candidates[seed].centroid;
        self.filter = Some(KalmanState::new(
            position,
            self.config.initial_covariance,
            self.config.process_noise_var,
            self.config.measurement_noise_var,
        ));
        self.phase = TrackPhase::Tracking;
        self.last_timestamp = timestamp;
        self.consecutive_misses = 0;
        self.last_position = Some(position);
        info!(
            "track acquired at [{:.2}, {:.2}] from a {}-point cluster",
            position[0], position[1], candidates[seed].size
        );

        TrackerOutcome {
            selected: Some(seed),
            snapshot: self.snapshot(timestamp),
        }
    }

    /// Seed choice before any prediction exists: nearest to the last known
    /// position when one is available within the gate, otherwise the largest
    /// cluster.
    fn pick_seed(&self, candidates: &[Candidate]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        if let Some(last) = self.last_position {
            if let Some((idx, d)) = nearest_candidate(candidates, last) {
                if d <= self.config.gating_distance {
                    return Some(idx);
                }
            }
        }
        candidates
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.size.cmp(&b.size).then(ib.cmp(ia)))
            .map(|(i, _)| i)
    }

    fn track(&mut self, timestamp: f64, candidates: &[Candidate]) -> TrackerOutcome {
        let dt = (timestamp - self.last_timestamp).max(0.0);
        self.last_timestamp = timestamp;

        let Some(filter) = self.filter.as_mut() else {
            return TrackerOutcome {
                selected: None,
                snapshot: None,
            };
        };
        filter.predict(dt);
        let predicted = filter.position();

        // Gate: nearest centroid to the prediction, within gating distance.
        let selected = nearest_candidate(candidates, predicted)
            .filter(|&(_, d)| d <= self.config.gating_distance)
            .map(|(i, _)| i);

        match selected {
            Some(i) => {
                let z = candidates[i].centroid;
                if filter.update(z) {
                    self.consecutive_misses = 0;
                    self.instability_streak = 0;
                    self.last_position = Some(z);
                } else {
                    // Reverted update: covariance/position would have gone
                    // non-finite. Counts as a miss.
                    self.instability_streak += 1;
                    self.consecutive_misses += 1;
                    warn!(
                        "numeric instability in track update (streak {})",
                        self.instability_streak
                    );
                    if self.instability_streak >= MAX_INSTABILITY_STREAK {
                        return self.lose("repeated numeric instability", timestamp);
                    }
                }
            }
            None => {
                self.consecutive_misses += 1;
                debug!(
                    "no cluster within gate ({} consecutive misses)",
                    self.consecutive_misses
                );
            }
        }

        if self.consecutive_misses >= self.config.max_missed_frames {
            return self.lose("miss limit exceeded", timestamp);
        }
        let trace = self.filter.as_ref().map(|f| f.covariance_trace());
        if trace.map_or(false, |t| t > self.config.max_covariance_trace) {
            return self.lose("covariance trace exceeded bound", timestamp);
        }

        TrackerOutcome {
            selected,
            snapshot: self.snapshot(timestamp),
        }
    }

    /// Transition to Lost. The losing frame still emits one final snapshot
    /// (quality `Lost`, from the filter state before it is dropped) so that
    /// consumers see the loss in the frame output itself.
    fn lose(&mut self, reason: &str, timestamp: f64) -> TrackerOutcome {
        warn!("track lost: {}", reason);
        self.phase = TrackPhase::Lost;
        let snapshot = self.snapshot(timestamp);
        self.filter = None;
        TrackerOutcome {
            selected: None,
            snapshot,
        }
    }

    fn snapshot(&self, timestamp: f64) -> Option<TrackSnapshot> {
        let filter = self.filter.as_ref()?;
        let quality = if self.phase != TrackPhase::Tracking {
            TrackQuality::Lost
        } else if self.consecutive_misses > 0
            || filter.covariance_trace() > 0.5 * self.config.max_covariance_trace
        {
            TrackQuality::Degraded
        } else {
            TrackQuality::High
        };

        Some(TrackSnapshot {
            position: filter.position(),
            velocity: filter.velocity(),
            covariance: *filter.covariance(),
            timestamp,
            quality,
            consecutive_misses: self.consecutive_misses,
        })
    }
}

fn nearest_candidate(candidates: &[Candidate], target: Vec2) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, c) in candidates.iter().enumerate() {
        let dx = c.centroid[0] - target[0];
        let dy = c.centroid[1] - target[1];
        let d = (dx * dx + dy * dy).sqrt();
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best
}
