//! Identifiers for clips and pose samples.

use serde::{Deserialize, Serialize};

/// Dense index of a clip in the database clip table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ClipId(pub u32);

/// Dense index of a pose sample. Also the trajectory id of its companion window.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PoseId(pub u32);

impl ClipId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl PoseId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for PoseId {
    fn from(idx: usize) -> Self {
        PoseId(idx as u32)
    }
}

impl std::fmt::Display for PoseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
