//! Curve sampling contract and a baked, in-memory implementation.
//!
//! Joint names are resolved once per clip into opaque [`JointHandle`]s; sampling
//! then goes through the handle. Hosts with their own animation assets implement
//! [`CurveSampler`]; [`BakedLibrary`] serves pre-baked per-frame keys (tests,
//! offline tools, JSON exports).

use hashbrown::HashMap;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Clip metadata handed to the preprocessor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipInfo {
    pub name: String,
    /// Sample rate in frames per second.
    pub frame_rate: f32,
    pub frame_count: u32,
}

/// Opaque joint handle returned by [`CurveSampler::resolve_joint`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct JointHandle(pub u32);

/// Source of world-space joint curves for a clip library.
pub trait CurveSampler {
    /// Resolve a joint name on a clip; `None` when the clip has no such joint.
    fn resolve_joint(&self, clip: &ClipInfo, joint: &str) -> Option<JointHandle>;

    fn sample_joint_position(&self, clip: &ClipInfo, frame: u32, joint: JointHandle)
        -> Vector3<f32>;

    fn sample_joint_orientation(
        &self,
        clip: &ClipInfo,
        frame: u32,
        joint: JointHandle,
    ) -> UnitQuaternion<f32>;
}

/// One baked key: translation and rotation quaternion (x, y, z, w).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointKey {
    pub translation: [f32; 3],
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl JointKey {
    pub fn at(translation: [f32; 3]) -> Self {
        Self {
            translation,
            rotation: identity_rotation(),
        }
    }

    pub fn new(translation: [f32; 3], rotation: [f32; 4]) -> Self {
        Self {
            translation,
            rotation,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointTrack {
    pub name: String,
    pub keys: Vec<JointKey>,
}

/// A clip baked to one key per frame per joint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BakedClip {
    pub name: String,
    pub frame_rate: f32,
    #[serde(default)]
    pub joints: Vec<JointTrack>,
}

impl BakedClip {
    pub fn new(name: impl Into<String>, frame_rate: f32) -> Self {
        Self {
            name: name.into(),
            frame_rate,
            joints: Vec::new(),
        }
    }

    pub fn with_joint(mut self, name: impl Into<String>, keys: Vec<JointKey>) -> Self {
        self.joints.push(JointTrack {
            name: name.into(),
            keys,
        });
        self
    }

    /// Longest joint track length.
    pub fn frame_count(&self) -> u32 {
        self.joints.iter().map(|j| j.keys.len()).max().unwrap_or(0) as u32
    }

    pub fn info(&self) -> ClipInfo {
        ClipInfo {
            name: self.name.clone(),
            frame_rate: self.frame_rate,
            frame_count: self.frame_count(),
        }
    }

    /// Key at `frame`, holding the last key past the end of a short track.
    fn key(&self, joint: JointHandle, frame: u32) -> Option<&JointKey> {
        let keys = &self.joints.get(joint.0 as usize)?.keys;
        keys.get(frame as usize).or_else(|| keys.last())
    }
}

#[derive(Debug, Deserialize)]
struct LibraryFile {
    clips: Vec<BakedClip>,
}

/// A set of baked clips indexed by name.
#[derive(Clone, Debug, Default)]
pub struct BakedLibrary {
    clips: Vec<BakedClip>,
    by_name: HashMap<String, usize>,
}

impl BakedLibrary {
    pub fn new(clips: Vec<BakedClip>) -> Self {
        let by_name = clips
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { clips, by_name }
    }

    /// Parse `{ "clips": [ { "name", "frame_rate", "joints": [ { "name", "keys" } ] } ] }`.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let file: LibraryFile = serde_json::from_str(s)?;
        Ok(Self::new(file.clips))
    }

    pub fn clips(&self) -> &[BakedClip] {
        &self.clips
    }

    pub fn get(&self, name: &str) -> Option<&BakedClip> {
        self.by_name.get(name).map(|&i| &self.clips[i])
    }

    /// Clip library in declaration order.
    pub fn clip_infos(&self) -> Vec<ClipInfo> {
        self.clips.iter().map(BakedClip::info).collect()
    }
}

impl CurveSampler for BakedLibrary {
    fn resolve_joint(&self, clip: &ClipInfo, joint: &str) -> Option<JointHandle> {
        self.get(&clip.name)?
            .joints
            .iter()
            .position(|j| j.name == joint)
            .map(|i| JointHandle(i as u32))
    }

    fn sample_joint_position(
        &self,
        clip: &ClipInfo,
        frame: u32,
        joint: JointHandle,
    ) -> Vector3<f32> {
        self.get(&clip.name)
            .and_then(|c| c.key(joint, frame))
            .map(|k| Vector3::from(k.translation))
            .unwrap_or_else(Vector3::zeros)
    }

    fn sample_joint_orientation(
        &self,
        clip: &ClipInfo,
        frame: u32,
        joint: JointHandle,
    ) -> UnitQuaternion<f32> {
        self.get(&clip.name)
            .and_then(|c| c.key(joint, frame))
            .map(|k| {
                let [x, y, z, w] = k.rotation;
                let q = Quaternion::new(w, x, y, z);
                if q.norm() == 0.0 {
                    UnitQuaternion::identity()
                } else {
                    UnitQuaternion::new_normalize(q)
                }
            })
            .unwrap_or_else(UnitQuaternion::identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> BakedLibrary {
        BakedLibrary::new(vec![BakedClip::new("walk", 30.0)
            .with_joint(
                "Root",
                vec![JointKey::at([0.0, 1.0, 0.0]), JointKey::at([0.0, 1.0, 0.1])],
            )
            .with_joint("LeftFoot", vec![JointKey::at([0.1, 0.0, 0.0])])])
    }

    #[test]
    fn resolves_exact_joint_names_only() {
        let lib = library();
        let info = lib.clip_infos().remove(0);
        assert_eq!(info.frame_count, 2);
        assert_eq!(lib.resolve_joint(&info, "Root"), Some(JointHandle(0)));
        assert_eq!(lib.resolve_joint(&info, "LeftFoot"), Some(JointHandle(1)));
        assert_eq!(lib.resolve_joint(&info, "Left"), None);

        let unknown = ClipInfo {
            name: "run".into(),
            frame_rate: 30.0,
            frame_count: 1,
        };
        assert_eq!(lib.resolve_joint(&unknown, "Root"), None);
    }

    #[test]
    fn short_tracks_hold_their_last_key() {
        let lib = library();
        let info = lib.clip_infos().remove(0);
        let foot = lib.resolve_joint(&info, "LeftFoot").unwrap();
        assert_eq!(
            lib.sample_joint_position(&info, 1, foot),
            Vector3::new(0.1, 0.0, 0.0)
        );
        assert_eq!(
            lib.sample_joint_orientation(&info, 1, foot),
            UnitQuaternion::identity()
        );
    }

    #[test]
    fn parses_library_json() {
        let lib = BakedLibrary::from_json_str(
            r#"{ "clips": [ { "name": "idle", "frame_rate": 24,
                 "joints": [ { "name": "Root", "keys": [ { "translation": [0, 1, 0] } ] } ] } ] }"#,
        )
        .expect("parse library");
        assert_eq!(lib.clips().len(), 1);
        let info = &lib.clip_infos()[0];
        assert_eq!(info.frame_rate, 24.0);
        assert_eq!(info.frame_count, 1);
    }
}
