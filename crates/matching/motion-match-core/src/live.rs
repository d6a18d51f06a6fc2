//! Contracts with the host: live motion input and playback output.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::features::{PoseSample, TrajectoryWindow};
use crate::ids::{ClipId, PoseId};

/// Live motion of one character, refreshed by the host between ticks.
/// Windows and poses are expected in the character's local space.
pub trait LiveMotionSource {
    fn current_trajectory_window(&self) -> TrajectoryWindow;
    fn current_pose_snapshot(&self) -> PoseSample;
    fn root_velocity(&self) -> Vector3<f32>;
}

/// Playback side: starts the selected clip at a normalized time. Completion of
/// the transition is owned by the implementor.
pub trait PlaybackSink {
    fn request_transition(&mut self, request: &TransitionRequest);
}

/// A request to jump or crossfade to a recorded frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub pose: PoseId,
    pub clip: ClipId,
    pub clip_name: String,
    pub frame: u32,
    /// `frame / frame_count` of the target clip.
    pub normalized_time: f32,
    /// Start time in seconds, when the clip frame rate is known.
    pub start_seconds: Option<f32>,
}

/// Plain value holder for hosts that push a fresh sample before each tick.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveSample {
    pub trajectory: TrajectoryWindow,
    pub pose: PoseSample,
    pub root_velocity: Vector3<f32>,
}

impl LiveMotionSource for LiveSample {
    fn current_trajectory_window(&self) -> TrajectoryWindow {
        self.trajectory.clone()
    }

    fn current_pose_snapshot(&self) -> PoseSample {
        self.pose.clone()
    }

    fn root_velocity(&self) -> Vector3<f32> {
        self.root_velocity
    }
}

/// Collects requests in order.
impl PlaybackSink for Vec<TransitionRequest> {
    fn request_transition(&mut self, request: &TransitionRequest) {
        self.push(request.clone());
    }
}
