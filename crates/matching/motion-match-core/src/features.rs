//! Feature records: pose samples, trajectory points and trajectory windows.
//!
//! Positions of the feet are root-relative; root position and trajectory points
//! are in clip space. Records are created during preprocessing or table decoding
//! and never mutated afterwards.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::ids::{ClipId, PoseId};

/// One recorded frame of a clip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub clip: ClipId,
    pub frame: u32,
    pub root_position: Vector3<f32>,
    /// Absent when the source table carried an all-zero quaternion.
    pub root_orientation: Option<UnitQuaternion<f32>>,
    pub left_foot_position: Vector3<f32>,
    pub right_foot_position: Vector3<f32>,
    pub root_velocity: Vector3<f32>,
    pub left_foot_velocity: Vector3<f32>,
    pub right_foot_velocity: Vector3<f32>,
}

impl PoseSample {
    /// Pose at the origin with every feature zeroed.
    pub fn zeroed(clip: ClipId, frame: u32) -> Self {
        Self {
            clip,
            frame,
            root_position: Vector3::zeros(),
            root_orientation: None,
            left_foot_position: Vector3::zeros(),
            right_foot_position: Vector3::zeros(),
            root_velocity: Vector3::zeros(),
            left_foot_velocity: Vector3::zeros(),
            right_foot_velocity: Vector3::zeros(),
        }
    }

    /// Trajectory anchor: root position plus the facing direction.
    /// A pose without orientation faces the zero vector.
    pub fn anchor_point(&self, forward_axis: &Vector3<f32>) -> TrajectoryPoint {
        TrajectoryPoint {
            position: self.root_position,
            forward: self
                .root_orientation
                .map(|q| q * forward_axis)
                .unwrap_or_else(Vector3::zeros),
        }
    }
}

/// A single waypoint: position and facing direction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub position: Vector3<f32>,
    pub forward: Vector3<f32>,
}

impl Default for TrajectoryPoint {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            forward: Vector3::zeros(),
        }
    }
}

impl TrajectoryPoint {
    pub fn new(position: Vector3<f32>, forward: Vector3<f32>) -> Self {
        Self { position, forward }
    }
}

/// Fixed-length sequence of trajectory points anchored at one pose sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryWindow {
    pub clip: ClipId,
    /// Frame of the anchor pose.
    pub frame: u32,
    /// Id of the companion pose sample; `None` marks a placeholder window.
    pub id: Option<PoseId>,
    pub points: Vec<TrajectoryPoint>,
}

impl TrajectoryWindow {
    /// Window with `len` zero points and no id.
    pub fn placeholder(clip: ClipId, frame: u32, len: usize) -> Self {
        Self {
            clip,
            frame,
            id: None,
            points: vec![TrajectoryPoint::default(); len],
        }
    }

    #[inline]
    pub fn is_placeholder(&self) -> bool {
        self.id.is_none()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of per-point position distances plus sum of per-point forward distances,
    /// over the shorter of the two windows.
    pub fn distance(&self, other: &TrajectoryWindow) -> f32 {
        self.points
            .iter()
            .zip(other.points.iter())
            .map(|(a, b)| (a.position - b.position).norm() + (a.forward - b.forward).norm())
            .sum()
    }

    /// Re-express the points relative to the first point: translated to the origin
    /// and turned about +Y so the anchor faces +Z. Anchors without a horizontal
    /// facing are only translated.
    pub fn relative_to_anchor(&self) -> TrajectoryWindow {
        let Some(anchor) = self.points.first().copied() else {
            return self.clone();
        };
        let yaw = if anchor.forward.x == 0.0 && anchor.forward.z == 0.0 {
            0.0
        } else {
            anchor.forward.x.atan2(anchor.forward.z)
        };
        let undo = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -yaw);
        TrajectoryWindow {
            clip: self.clip,
            frame: self.frame,
            id: self.id,
            points: self
                .points
                .iter()
                .map(|p| TrajectoryPoint {
                    position: undo * (p.position - anchor.position),
                    forward: undo * p.forward,
                })
                .collect(),
        }
    }
}

/// Per-clip metadata kept beside the feature records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipEntry {
    pub name: String,
    pub frame_count: u32,
    /// Known when built from a clip library; tables do not persist it.
    pub frame_rate: Option<f32>,
}

impl ClipEntry {
    /// Normalized [0,1) playback position of `frame`.
    pub fn normalized_time(&self, frame: u32) -> f32 {
        if self.frame_count == 0 {
            0.0
        } else {
            frame as f32 / self.frame_count as f32
        }
    }

    pub fn seconds_at(&self, frame: u32) -> Option<f32> {
        self.frame_rate
            .filter(|r| *r > 0.0)
            .map(|r| frame as f32 / r)
    }
}

/// Flat output of preprocessing and input of the table codec: clip table,
/// pose samples in clip order, and one trajectory anchor per pose.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub clips: Vec<ClipEntry>,
    pub poses: Vec<PoseSample>,
    pub anchors: Vec<TrajectoryPoint>,
}

impl FeatureSet {
    #[inline]
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn clip_name(&self, clip: ClipId) -> Option<&str> {
        self.clips.get(clip.index()).map(|c| c.name.as_str())
    }
}
