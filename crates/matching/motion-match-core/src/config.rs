//! Core configuration for the matcher and the preprocessing pipeline.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};

/// Upper bound on points per trajectory window.
pub const MAX_TRAJECTORY_POINTS: usize = 1024;
/// Upper bound on the frame distance covered by one window.
pub const MAX_WINDOW_SPAN: usize = 1 << 20;

/// Joint names used to extract features from a clip.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JointMap {
    pub root: String,
    /// Joint whose rotation curve carries the root orientation.
    pub root_orientation: String,
    pub left_foot: String,
    pub right_foot: String,
}

impl Default for JointMap {
    fn default() -> Self {
        Self {
            root: "Root".into(),
            root_orientation: "Root".into(),
            left_foot: "LeftFoot".into(),
            right_foot: "RightFoot".into(),
        }
    }
}

/// Weights of the pose distance terms.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoseWeights {
    pub root_position: f32,
    pub left_foot_position: f32,
    pub right_foot_position: f32,
    pub root_velocity: f32,
    pub left_foot_velocity: f32,
    pub right_foot_velocity: f32,
}

impl Default for PoseWeights {
    fn default() -> Self {
        Self {
            root_position: 1.0,
            left_foot_position: 1.0,
            right_foot_position: 1.0,
            root_velocity: 1.0,
            left_foot_velocity: 1.0,
            right_foot_velocity: 1.0,
        }
    }
}

/// Configuration shared by preprocessing, window construction and matching.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// K: points per trajectory window.
    pub trajectory_points_to_use: usize,
    /// Frame spacing between consecutive window points.
    pub frame_step_size: usize,
    /// Lifetime of a cull entry, in query ticks.
    pub frames_to_cull: u32,
    /// Trajectory distance cutoff for candidates.
    pub comparison_threshold: f32,
    /// Seconds between query ticks.
    pub query_rate: f32,
    /// Seconds to wait after an idle tick.
    pub idle_delay: f32,
    /// Root speed at or under which the character counts as idle.
    pub idle_velocity_epsilon: f32,
    /// Canonical idle pose id.
    pub idle_pose: u32,
    /// Local forward axis, rotated by the root orientation to get the facing direction.
    pub forward_axis: [f32; 3],
    /// Compare candidate windows re-expressed relative to their anchor point.
    pub anchor_relative_trajectories: bool,
    pub pose_weights: PoseWeights,
    pub joints: JointMap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trajectory_points_to_use: 5,
            frame_step_size: 25,
            frames_to_cull: 10,
            comparison_threshold: 50.0,
            query_rate: 0.1,
            idle_delay: 1.0,
            idle_velocity_epsilon: 1e-3,
            idle_pose: 0,
            forward_axis: [0.0, 0.0, 1.0],
            anchor_relative_trajectories: false,
            pose_weights: PoseWeights::default(),
            joints: JointMap::default(),
        }
    }
}

impl Config {
    /// Parse a JSON config; missing fields take their defaults. The result is validated.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Config = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[inline]
    pub fn forward(&self) -> Vector3<f32> {
        Vector3::from(self.forward_axis)
    }

    /// Frame distance between a window's anchor and its last point.
    /// Saturates for configs that [`Config::validate`] rejects.
    #[inline]
    pub fn window_span(&self) -> usize {
        self.trajectory_points_to_use
            .saturating_sub(1)
            .saturating_mul(self.frame_step_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trajectory_points_to_use == 0 {
            return Err(invalid("trajectory_points_to_use must be >= 1"));
        }
        if self.frame_step_size == 0 {
            return Err(invalid("frame_step_size must be >= 1"));
        }
        if self.trajectory_points_to_use > MAX_TRAJECTORY_POINTS {
            return Err(invalid(format!(
                "trajectory_points_to_use must be <= {MAX_TRAJECTORY_POINTS}"
            )));
        }
        let span = (self.trajectory_points_to_use - 1).checked_mul(self.frame_step_size);
        if span.map_or(true, |s| s > MAX_WINDOW_SPAN) {
            return Err(invalid(format!(
                "window span must be <= {MAX_WINDOW_SPAN} frames"
            )));
        }
        if !self.comparison_threshold.is_finite() || self.comparison_threshold <= 0.0 {
            return Err(invalid("comparison_threshold must be finite and > 0"));
        }
        if !self.query_rate.is_finite() || self.query_rate <= 0.0 {
            return Err(invalid("query_rate must be finite and > 0"));
        }
        if !self.idle_delay.is_finite() || self.idle_delay <= 0.0 {
            return Err(invalid("idle_delay must be finite and > 0"));
        }
        if !self.idle_velocity_epsilon.is_finite() || self.idle_velocity_epsilon < 0.0 {
            return Err(invalid("idle_velocity_epsilon must be finite and >= 0"));
        }
        if self.forward().norm() == 0.0 {
            return Err(invalid("forward_axis must be non-zero"));
        }
        let j = &self.joints;
        for (field, name) in [
            ("root", &j.root),
            ("root_orientation", &j.root_orientation),
            ("left_foot", &j.left_foot),
            ("right_foot", &j.right_foot),
        ] {
            if name.trim().is_empty() {
                return Err(invalid(format!("joints.{field} must not be empty")));
            }
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> MatchError {
    MatchError::InvalidConfig {
        reason: reason.into(),
    }
}
