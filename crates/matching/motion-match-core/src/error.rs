//! Error types for feature extraction, table I/O and database lookups.

/// Errors surfaced by the motion matching core.
///
/// Per-tick matching never produces an error: an empty candidate set is
/// ordinary fallback behaviour handled inside [`crate::engine::Matcher`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum MatchError {
    /// A persisted feature table row could not be decoded.
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// A mapped joint name is missing from a clip.
    #[error("Joint '{joint}' not found in clip '{clip}'")]
    JointNotFound { clip: String, joint: String },

    /// A query loop was started against a database with no pose samples.
    #[error("Feature database is empty")]
    EmptyDatabase,

    /// Index or name lookup outside the available range.
    #[error("{what} lookup out of range: index {index} (len {len})")]
    OutOfRangeLookup {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// Configuration rejected by validation.
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// Table file could not be read or written.
    #[error("IO error: {reason}")]
    Io { reason: String },

    /// JSON config or clip library could not be parsed.
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

pub type Result<T> = std::result::Result<T, MatchError>;

impl MatchError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }

    /// Lookup and per-clip preprocessing failures do not invalidate the rest of the data.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::OutOfRangeLookup { .. } | Self::JointNotFound { .. }
        )
    }

    /// Error category for logging.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::MalformedRecord { .. } => "record",
            Self::JointNotFound { .. } => "preprocess",
            Self::EmptyDatabase => "database",
            Self::OutOfRangeLookup { .. } => "lookup",
            Self::InvalidConfig { .. } => "config",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
        }
    }
}

impl From<std::io::Error> for MatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for MatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability() {
        let lookup = MatchError::OutOfRangeLookup {
            what: "clip",
            index: 4,
            len: 2,
        };
        assert!(lookup.is_recoverable());
        assert!(!MatchError::EmptyDatabase.is_recoverable());
        assert!(!MatchError::malformed(3, "short row").is_recoverable());
    }

    #[test]
    fn categories_and_messages() {
        let err = MatchError::JointNotFound {
            clip: "walk".into(),
            joint: "LeftFoot".into(),
        };
        assert_eq!(err.category(), "preprocess");
        assert_eq!(err.to_string(), "Joint 'LeftFoot' not found in clip 'walk'");

        let err = MatchError::malformed(7, "expected 24 fields, found 20");
        assert_eq!(err.category(), "record");
        assert!(err.to_string().contains("line 7"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing table");
        let err: MatchError = io.into();
        assert!(matches!(err, MatchError::Io { .. }));
        assert_eq!(err.category(), "io");
    }
}
