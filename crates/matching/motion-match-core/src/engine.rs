//! Matcher: the per-character online query.
//!
//! One tick:
//! 1. idle short-circuit: root speed at or under `idle_velocity_epsilon` selects the idle
//!    pose and skips straight to cull bookkeeping;
//! 2. trajectory filtering: every valid window except the current pose and culled
//!    poses whose distance to the live window is under `comparison_threshold`;
//! 3. pose selection: minimum weighted pose distance, first evaluated wins ties;
//!    no candidates keeps the current animation;
//! 4. transition request for the selected pose;
//! 5. cull bookkeeping: push the selection, age all entries, drop expired ones.
//!
//! The database is shared read-only; the cull queue and current playback are
//! private to the matcher.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::database::FeatureDatabase;
use crate::error::{MatchError, Result};
use crate::features::{PoseSample, TrajectoryWindow};
use crate::ids::{ClipId, PoseId};
use crate::live::{LiveMotionSource, TransitionRequest};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchState {
    Idle,
    Matching,
    /// A transition was requested; playback owns its completion.
    Transitioning,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CullEntry {
    pub id: PoseId,
    pub ticks_remaining: u32,
}

/// Recently selected poses, excluded from selection until they expire.
#[derive(Clone, Debug, Default)]
pub struct CullQueue {
    entries: VecDeque<CullEntry>,
}

impl CullQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cull `id` for `ticks` ticks. An id already queued gets its lifetime reset.
    pub fn push(&mut self, id: PoseId, ticks: u32) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.id == id) {
            e.ticks_remaining = ticks;
            return;
        }
        self.entries.push_back(CullEntry {
            id,
            ticks_remaining: ticks,
        });
    }

    /// Age every entry by one tick and drop the expired ones.
    pub fn age(&mut self) {
        for e in self.entries.iter_mut() {
            e.ticks_remaining = e.ticks_remaining.saturating_sub(1);
        }
        self.entries.retain(|e| e.ticks_remaining > 0);
    }

    pub fn contains(&self, id: PoseId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CullEntry> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// What the last requested playback position is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPlayback {
    pub pose: PoseId,
    pub clip: ClipId,
    pub frame: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickOutcome {
    /// Idle short-circuit; the idle pose was selected.
    Idle,
    /// Filtering left nothing; current animation retained.
    NoCandidates,
    /// A new pose was selected and requested.
    Transitioned,
}

/// Result of one query tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub outcome: TickOutcome,
    pub selected: Option<PoseId>,
    /// Size of the filtered candidate set.
    pub candidates: usize,
    pub request: Option<TransitionRequest>,
}

#[derive(Debug, Clone)]
pub struct Matcher {
    db: Arc<FeatureDatabase>,
    cfg: Config,
    state: MatchState,
    current: CurrentPlayback,
    cull: CullQueue,
}

impl Matcher {
    /// Matcher starting at the idle pose. Fails on an empty database, an invalid
    /// config or an idle pose outside the database.
    pub fn new(db: Arc<FeatureDatabase>, cfg: Config) -> Result<Self> {
        cfg.validate()?;
        if db.is_empty() {
            return Err(MatchError::EmptyDatabase);
        }
        let idle = PoseId(cfg.idle_pose);
        let pose = db.pose(idle)?;
        let current = CurrentPlayback {
            pose: idle,
            clip: pose.clip,
            frame: pose.frame,
        };
        Ok(Self {
            db,
            cfg,
            state: MatchState::Idle,
            current,
            cull: CullQueue::new(),
        })
    }

    /// Start from `pose` instead of the idle pose.
    pub fn with_current(mut self, pose: PoseId) -> Result<Self> {
        let sample = self.db.pose(pose)?;
        self.current = CurrentPlayback {
            pose,
            clip: sample.clip,
            frame: sample.frame,
        };
        Ok(self)
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn current(&self) -> CurrentPlayback {
        self.current
    }

    pub fn current_pose(&self) -> PoseId {
        self.current.pose
    }

    pub fn cull_queue(&self) -> &CullQueue {
        &self.cull
    }

    pub fn database(&self) -> &Arc<FeatureDatabase> {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Request that plays the current pose; used to start playback.
    pub fn initial_request(&self) -> Result<TransitionRequest> {
        self.request_for(self.current.pose)
    }

    /// Trajectory filtering, in database order.
    pub fn filter_candidates(&self, live: &TrajectoryWindow) -> Vec<PoseId> {
        if live.len() != self.cfg.trajectory_points_to_use {
            warn!(
                "matcher: live window has {} points, database windows have {}",
                live.len(),
                self.cfg.trajectory_points_to_use
            );
        }
        self.db
            .valid_windows()
            .filter_map(|w| {
                let id = w.id?;
                if id == self.current.pose || self.cull.contains(id) {
                    return None;
                }
                let distance = if self.cfg.anchor_relative_trajectories {
                    w.relative_to_anchor().distance(live)
                } else {
                    w.distance(live)
                };
                (distance < self.cfg.comparison_threshold).then_some(id)
            })
            .collect()
    }

    /// Weighted sum of position and velocity deltas of root and both feet.
    pub fn pose_distance(&self, candidate: &PoseSample, live: &PoseSample) -> f32 {
        let w = &self.cfg.pose_weights;
        w.root_position * (candidate.root_position - live.root_position).norm()
            + w.left_foot_position * (candidate.left_foot_position - live.left_foot_position).norm()
            + w.right_foot_position
                * (candidate.right_foot_position - live.right_foot_position).norm()
            + w.root_velocity * (candidate.root_velocity - live.root_velocity).norm()
            + w.left_foot_velocity * (candidate.left_foot_velocity - live.left_foot_velocity).norm()
            + w.right_foot_velocity
                * (candidate.right_foot_velocity - live.right_foot_velocity).norm()
    }

    /// Candidate with the smallest pose distance; the first one evaluated wins ties.
    pub fn select_pose(&self, candidates: &[PoseId], live: &PoseSample) -> Option<PoseId> {
        let mut best: Option<(PoseId, f32)> = None;
        for &id in candidates {
            let Ok(pose) = self.db.pose(id) else {
                continue;
            };
            let d = self.pose_distance(pose, live);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((id, d));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Run one query tick against the live motion source.
    pub fn tick(&mut self, live: &dyn LiveMotionSource) -> Tick {
        let speed = live.root_velocity().norm();
        if speed <= self.cfg.idle_velocity_epsilon {
            return self.idle_tick();
        }

        self.state = MatchState::Matching;
        let window = live.current_trajectory_window();
        let candidates = self.filter_candidates(&window);
        let selected = if candidates.is_empty() {
            None
        } else {
            self.select_pose(&candidates, &live.current_pose_snapshot())
        };

        let Some(selected) = selected else {
            debug!("matcher: no candidates, keeping {}", self.current.pose);
            self.cull.age();
            return Tick {
                outcome: TickOutcome::NoCandidates,
                selected: None,
                candidates: candidates.len(),
                request: None,
            };
        };

        let request = self.transition_to(selected);
        debug!("matcher: {} candidates, selected {}", candidates.len(), selected);
        self.cull.push(selected, self.cfg.frames_to_cull);
        self.cull.age();
        Tick {
            outcome: TickOutcome::Transitioned,
            selected: Some(selected),
            candidates: candidates.len(),
            request,
        }
    }

    fn idle_tick(&mut self) -> Tick {
        let idle = PoseId(self.cfg.idle_pose);
        let request = if self.current.pose != idle {
            self.transition_to(idle)
        } else {
            None
        };
        debug!("matcher: idle, selected {}", idle);
        self.state = MatchState::Idle;
        self.cull.push(idle, self.cfg.frames_to_cull);
        self.cull.age();
        Tick {
            outcome: TickOutcome::Idle,
            selected: Some(idle),
            candidates: 0,
            request,
        }
    }

    /// Build the request and record it as the current playback.
    fn transition_to(&mut self, pose: PoseId) -> Option<TransitionRequest> {
        match self.request_for(pose) {
            Ok(request) => {
                self.current = CurrentPlayback {
                    pose,
                    clip: request.clip,
                    frame: request.frame,
                };
                self.state = MatchState::Transitioning;
                Some(request)
            }
            Err(err) => {
                warn!("matcher: cannot transition to {}: {}", pose, err);
                None
            }
        }
    }

    fn request_for(&self, pose: PoseId) -> Result<TransitionRequest> {
        let sample = self.db.pose(pose)?;
        let clip = self.db.clip(sample.clip)?;
        Ok(TransitionRequest {
            pose,
            clip: sample.clip,
            clip_name: clip.name.clone(),
            frame: sample.frame,
            normalized_time: clip.normalized_time(sample.frame),
            start_seconds: clip.seconds_at(sample.frame),
        })
    }
}
