//! Error types for birdwatch.

use uuid::Uuid;

/// Result type alias for birdwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for birdwatch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Database operation failed.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// Detection event failed validation.
    #[error("invalid detection event: {message}")]
    InvalidEvent {
        /// Description of the validation failure.
        message: String,
    },

    /// Failed to decode base64 audio payload.
    #[error("failed to decode audio payload")]
    AudioDecode {
        /// Underlying decode error.
        #[source]
        source: base64::DecodeError,
    },

    /// Timestamp string could not be parsed.
    #[error("failed to parse timestamp '{value}'")]
    TimestampParse {
        /// The unparseable value.
        value: String,
    },

    /// Invalid latitude value.
    #[error("invalid latitude: {value} (must be -90.0 to 90.0)")]
    InvalidLatitude {
        /// Invalid latitude value.
        value: f64,
    },

    /// Invalid longitude value.
    #[error("invalid longitude: {value} (must be -180.0 to 180.0)")]
    InvalidLongitude {
        /// Invalid longitude value.
        value: f64,
    },

    /// Classifier invocation failed.
    #[error("classifier failed: {reason}")]
    Classifier {
        /// Description of the classifier failure.
        reason: String,
    },

    /// Failed to create the recordings directory for a clip.
    #[error("failed to create recordings directory '{path}'")]
    RecordingDirCreate {
        /// Path to the directory.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a WAV clip.
    #[error("failed to write WAV clip '{path}'")]
    ClipWrite {
        /// Path to the clip file.
        path: std::path::PathBuf,
        /// Underlying encoder error.
        #[source]
        source: hound::Error,
    },

    /// Failed to read the eBird pack registry file.
    #[error("failed to read eBird pack registry '{path}'")]
    PackRegistryRead {
        /// Path to the registry file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the eBird pack registry file.
    #[error("failed to parse eBird pack registry '{path}'")]
    PackRegistryParse {
        /// Path to the registry file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Detection not found in the store.
    #[error("detection '{id}' not found")]
    DetectionNotFound {
        /// Id of the missing detection.
        id: Uuid,
    },

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Whether a persistence failure is transient and worth buffering for
    /// retry (timeouts, lock contention, short-lived disk pressure), as
    /// opposed to permanent failures (schema or integrity violations).
    pub fn is_transient_persistence(&self) -> bool {
        match self {
            Self::Database(source) => match source {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db) => {
                    // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_IOERR (10),
                    // SQLITE_FULL (13). Extended result codes carry the
                    // primary code in their low byte.
                    db.code()
                        .and_then(|code| code.parse::<i64>().ok())
                        .is_some_and(|code| matches!(code & 0xff, 5 | 6 | 10 | 13))
                }
                _ => false,
            },
            Self::Io(_) => true,
            _ => false,
        }
    }
}
