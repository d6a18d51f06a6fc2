//! Feature database: pose samples, their trajectory windows and the clip table.
//!
//! Built once, either by preprocessing a clip library or by decoding a persisted
//! table; windows are always rebuilt with [`build_windows`]. Read-only afterwards,
//! so one database can back any number of matchers (wrap it in an `Arc`).

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use hashbrown::HashMap;
use log::info;

use crate::codec;
use crate::config::Config;
use crate::error::{MatchError, Result};
use crate::features::{ClipEntry, FeatureSet, PoseSample, TrajectoryPoint, TrajectoryWindow};
use crate::ids::{ClipId, PoseId};
use crate::preprocess::{build_windows, preprocess_library};
use crate::sampler::{ClipInfo, CurveSampler};

#[derive(Debug, Clone)]
pub struct FeatureDatabase {
    clips: Vec<ClipEntry>,
    clip_index: HashMap<String, ClipId>,
    poses: Vec<PoseSample>,
    anchors: Vec<TrajectoryPoint>,
    windows: Vec<TrajectoryWindow>,
}

impl FeatureDatabase {
    /// Index a feature set and build its trajectory windows.
    pub fn from_features(set: FeatureSet, cfg: &Config) -> Result<Self> {
        cfg.validate()?;
        if let Some(pose) = set.poses.iter().find(|p| p.clip.index() >= set.clips.len()) {
            return Err(MatchError::OutOfRangeLookup {
                what: "clip",
                index: pose.clip.index(),
                len: set.clips.len(),
            });
        }

        let windows = build_windows(&set, cfg);
        let FeatureSet {
            clips,
            poses,
            anchors,
        } = set;
        let anchors = if anchors.len() == poses.len() {
            anchors
        } else {
            let forward = cfg.forward();
            poses.iter().map(|p| p.anchor_point(&forward)).collect()
        };
        let clip_index = clips
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), ClipId(i as u32)))
            .collect();

        let db = Self {
            clips,
            clip_index,
            poses,
            anchors,
            windows,
        };
        info!(
            "feature database: {} clips, {} poses, {} valid windows",
            db.clips.len(),
            db.poses.len(),
            db.valid_windows().count()
        );
        Ok(db)
    }

    /// Preprocess `clips` through `sampler` and index the result. Clips whose
    /// joints cannot be resolved are logged and left out.
    pub fn initialize(cfg: &Config, clips: &[ClipInfo], sampler: &dyn CurveSampler) -> Result<Self> {
        let report = preprocess_library(clips, sampler, cfg)?;
        Self::from_features(report.features, cfg)
    }

    /// Decode a persisted table. Clip frame rates are unknown until
    /// [`FeatureDatabase::with_frame_rates`] attaches them.
    pub fn load_table<R: Read>(reader: R, cfg: &Config) -> Result<Self> {
        let set = codec::decode(BufReader::new(reader), &cfg.forward())?;
        Self::from_features(set, cfg)
    }

    pub fn load_table_file(path: impl AsRef<Path>, cfg: &Config) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::load_table(file, cfg)
    }

    pub fn write_table<W: Write>(&self, out: W) -> Result<()> {
        codec::encode(&self.to_feature_set(), out)
    }

    /// Write the table, creating parent directories as needed.
    pub fn write_table_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        self.write_table(BufWriter::new(File::create(path)?))
    }

    /// Cached construction: when `rebuild` is set or `table` does not exist,
    /// preprocess the library and persist the table; otherwise decode the table.
    /// Frame rates from `clips` are attached in both cases.
    pub fn load_or_build(
        cfg: &Config,
        clips: &[ClipInfo],
        sampler: &dyn CurveSampler,
        table: impl AsRef<Path>,
        rebuild: bool,
    ) -> Result<Self> {
        let table = table.as_ref();
        if rebuild || !table.exists() {
            let db = Self::initialize(cfg, clips, sampler)?;
            db.write_table_file(table)?;
            info!("feature database: wrote {}", table.display());
            Ok(db)
        } else {
            info!("feature database: loading {}", table.display());
            Ok(Self::load_table_file(table, cfg)?.with_frame_rates(clips))
        }
    }

    /// Attach frame rates from a clip library, matched by clip name.
    pub fn with_frame_rates(mut self, clips: &[ClipInfo]) -> Self {
        for info in clips {
            if let Some(id) = self.clip_index.get(&info.name) {
                self.clips[id.index()].frame_rate = Some(info.frame_rate);
            }
        }
        self
    }

    /// Copy of the records in codec form.
    pub fn to_feature_set(&self) -> FeatureSet {
        FeatureSet {
            clips: self.clips.clone(),
            poses: self.poses.clone(),
            anchors: self.anchors.clone(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn poses(&self) -> &[PoseSample] {
        &self.poses
    }

    pub fn windows(&self) -> &[TrajectoryWindow] {
        &self.windows
    }

    pub fn anchors(&self) -> &[TrajectoryPoint] {
        &self.anchors
    }

    pub fn clips(&self) -> &[ClipEntry] {
        &self.clips
    }

    /// Windows carrying a trajectory id, in database order.
    pub fn valid_windows(&self) -> impl Iterator<Item = &TrajectoryWindow> {
        self.windows.iter().filter(|w| !w.is_placeholder())
    }

    pub fn pose(&self, id: PoseId) -> Result<&PoseSample> {
        self.poses.get(id.index()).ok_or(MatchError::OutOfRangeLookup {
            what: "pose",
            index: id.index(),
            len: self.poses.len(),
        })
    }

    pub fn window(&self, id: PoseId) -> Result<&TrajectoryWindow> {
        self.windows.get(id.index()).ok_or(MatchError::OutOfRangeLookup {
            what: "trajectory",
            index: id.index(),
            len: self.windows.len(),
        })
    }

    pub fn clip(&self, id: ClipId) -> Result<&ClipEntry> {
        self.clips.get(id.index()).ok_or(MatchError::OutOfRangeLookup {
            what: "clip",
            index: id.index(),
            len: self.clips.len(),
        })
    }

    pub fn lookup_clip_name(&self, id: ClipId) -> Result<&str> {
        self.clip(id).map(|c| c.name.as_str())
    }

    pub fn clip_id(&self, name: &str) -> Option<ClipId> {
        self.clip_index.get(name).copied()
    }
}
