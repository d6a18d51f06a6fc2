//! Motion matching core (engine-agnostic)
//!
//! Offline: sample a clip library into pose samples and trajectory anchors
//! ([`preprocess`]), persist them as a feature table ([`codec`]) and index them
//! with their trajectory windows ([`database`]).
//!
//! Online: per character, a [`Matcher`] filters windows against the live
//! trajectory, picks the closest pose and requests a transition; a
//! [`QueryLoop`] runs it on a fixed cadence.

pub mod codec;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod features;
pub mod ids;
pub mod live;
pub mod preprocess;
pub mod sampler;
pub mod scheduler;

// Re-exports for hosts
pub use config::{Config, JointMap, PoseWeights};
pub use database::FeatureDatabase;
pub use engine::{CullEntry, CullQueue, CurrentPlayback, MatchState, Matcher, Tick, TickOutcome};
pub use error::{MatchError, Result};
pub use features::{ClipEntry, FeatureSet, PoseSample, TrajectoryPoint, TrajectoryWindow};
pub use ids::{ClipId, PoseId};
pub use live::{LiveMotionSource, LiveSample, PlaybackSink, TransitionRequest};
pub use preprocess::{build_windows, preprocess_library, PreprocessReport};
pub use sampler::{BakedClip, BakedLibrary, ClipInfo, CurveSampler, JointHandle, JointKey};
pub use scheduler::QueryLoop;
