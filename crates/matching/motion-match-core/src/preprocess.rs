//! Offline feature extraction.
//!
//! Per clip, per frame `i` in `0..frame_count`:
//! 1. sample root position and orientation;
//! 2. build the root-to-world isometry (unit scale) and invert it;
//! 3. sample both feet in world space and move them into root space;
//! 4. velocities are `(current - previous) * frame_rate`, with `previous = 0` at frame 0
//!    (clips never wrap);
//! 5. emit a [`PoseSample`] and a trajectory anchor `(root position, orientation * forward)`.
//!
//! Windows are built afterwards over the whole sequence by [`build_windows`].

use log::{info, warn};
use nalgebra::{Isometry3, Point3, Translation3, Vector3};

use crate::config::{Config, JointMap};
use crate::error::{MatchError, Result};
use crate::features::{ClipEntry, FeatureSet, PoseSample, TrajectoryPoint, TrajectoryWindow};
use crate::ids::{ClipId, PoseId};
use crate::sampler::{ClipInfo, CurveSampler, JointHandle};

/// Joint handles of one clip, resolved from a [`JointMap`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedJoints {
    pub root: JointHandle,
    pub root_orientation: JointHandle,
    pub left_foot: JointHandle,
    pub right_foot: JointHandle,
}

/// Resolve every mapped joint on `clip`, failing on the first missing name.
pub fn resolve_joints(
    sampler: &dyn CurveSampler,
    clip: &ClipInfo,
    joints: &JointMap,
) -> Result<ResolvedJoints> {
    let resolve = |name: &str| {
        sampler
            .resolve_joint(clip, name)
            .ok_or_else(|| MatchError::JointNotFound {
                clip: clip.name.clone(),
                joint: name.to_string(),
            })
    };
    Ok(ResolvedJoints {
        root: resolve(joints.root.as_str())?,
        root_orientation: resolve(joints.root_orientation.as_str())?,
        left_foot: resolve(joints.left_foot.as_str())?,
        right_foot: resolve(joints.right_foot.as_str())?,
    })
}

/// Sample one clip into pose samples and trajectory anchors.
pub fn preprocess_clip(
    sampler: &dyn CurveSampler,
    clip: &ClipInfo,
    clip_id: ClipId,
    cfg: &Config,
) -> Result<(Vec<PoseSample>, Vec<TrajectoryPoint>)> {
    if !clip.frame_rate.is_finite() || clip.frame_rate <= 0.0 {
        return Err(MatchError::InvalidConfig {
            reason: format!("clip '{}' has frame rate {}", clip.name, clip.frame_rate),
        });
    }
    let joints = resolve_joints(sampler, clip, &cfg.joints)?;
    let forward = cfg.forward();
    let rate = clip.frame_rate;

    let n = clip.frame_count as usize;
    let mut poses = Vec::with_capacity(n);
    let mut anchors = Vec::with_capacity(n);

    let mut prev_root = Vector3::zeros();
    let mut prev_left = Vector3::zeros();
    let mut prev_right = Vector3::zeros();

    for frame in 0..clip.frame_count {
        let root = sampler.sample_joint_position(clip, frame, joints.root);
        let orientation = sampler.sample_joint_orientation(clip, frame, joints.root_orientation);
        let to_root = Isometry3::from_parts(Translation3::from(root), orientation).inverse();

        let left_world = sampler.sample_joint_position(clip, frame, joints.left_foot);
        let right_world = sampler.sample_joint_position(clip, frame, joints.right_foot);
        let left = to_root.transform_point(&Point3::from(left_world)).coords;
        let right = to_root.transform_point(&Point3::from(right_world)).coords;

        let pose = PoseSample {
            clip: clip_id,
            frame,
            root_position: root,
            root_orientation: Some(orientation),
            left_foot_position: left,
            right_foot_position: right,
            root_velocity: (root - prev_root) * rate,
            left_foot_velocity: (left - prev_left) * rate,
            right_foot_velocity: (right - prev_right) * rate,
        };
        anchors.push(pose.anchor_point(&forward));
        poses.push(pose);

        prev_root = root;
        prev_left = left;
        prev_right = right;
    }

    Ok((poses, anchors))
}

/// Result of preprocessing a clip library.
#[derive(Debug, Default)]
pub struct PreprocessReport {
    pub features: FeatureSet,
    /// Per-clip failures; those clips contribute no samples.
    pub skipped: Vec<MatchError>,
}

/// Preprocess every clip. A clip whose joints cannot be resolved is logged,
/// recorded in [`PreprocessReport::skipped`] and left out; the rest continue.
pub fn preprocess_library(
    clips: &[ClipInfo],
    sampler: &dyn CurveSampler,
    cfg: &Config,
) -> Result<PreprocessReport> {
    cfg.validate()?;
    let mut report = PreprocessReport::default();

    for clip in clips {
        let clip_id = ClipId(report.features.clips.len() as u32);
        match preprocess_clip(sampler, clip, clip_id, cfg) {
            Ok((poses, anchors)) => {
                report.features.clips.push(ClipEntry {
                    name: clip.name.clone(),
                    frame_count: clip.frame_count,
                    frame_rate: Some(clip.frame_rate),
                });
                report.features.poses.extend(poses);
                report.features.anchors.extend(anchors);
            }
            Err(err) => {
                warn!("preprocess: skipping clip '{}': {}", clip.name, err);
                report.skipped.push(err);
            }
        }
    }

    info!(
        "preprocess: {} clips, {} poses, {} skipped",
        report.features.clips.len(),
        report.features.poses.len(),
        report.skipped.len()
    );
    Ok(report)
}

/// Build one window per pose sample.
///
/// The window of pose `i` holds the anchors at `i, i+step, .., i+(K-1)*step`.
/// When the last of those lies past the end of the sequence, in another clip, or
/// not exactly `(K-1)*step` frames after the anchor, the window is a placeholder.
/// Anchors are taken from `set.anchors` when it is parallel to `set.poses` and
/// derived from the poses otherwise.
pub fn build_windows(set: &FeatureSet, cfg: &Config) -> Vec<TrajectoryWindow> {
    let k = cfg.trajectory_points_to_use;
    let step = cfg.frame_step_size;
    let span = cfg.window_span();

    let derived;
    let anchors: &[TrajectoryPoint] = if set.anchors.len() == set.poses.len() {
        &set.anchors
    } else {
        let forward = cfg.forward();
        derived = set
            .poses
            .iter()
            .map(|p| p.anchor_point(&forward))
            .collect::<Vec<_>>();
        &derived
    };

    let poses = &set.poses;
    poses
        .iter()
        .enumerate()
        .map(|(i, anchor)| {
            let in_clip = i
                .checked_add(span)
                .and_then(|last| poses.get(last))
                .is_some_and(|end| {
                    end.clip == anchor.clip
                        && (anchor.frame as usize).checked_add(span) == Some(end.frame as usize)
                });
            if !in_clip {
                return TrajectoryWindow::placeholder(anchor.clip, anchor.frame, k);
            }
            TrajectoryWindow {
                clip: anchor.clip,
                frame: anchor.frame,
                id: Some(PoseId::from(i)),
                points: (0..k).map(|j| anchors[i + j * step]).collect(),
            }
        })
        .collect()
}
