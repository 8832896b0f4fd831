use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StageError>;

/// Error type shared by every stage, with variants designed around what the
/// caller can do about them.
///
/// The first three variants are sentinels. Match them by variant, never by
/// their message text.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage intentionally does not support this capability.
    #[error("not implemented")]
    NotImplemented,

    /// The consumer asked to stop. Terminates a sequence silently.
    #[error("cancelled")]
    Cancelled,

    /// Reserved for aborting a sequence mid-stream.
    #[error("stream interrupted")]
    StreamInterrupted,

    /// `set_value` was called with a setting the stage does not accept.
    #[error("unsupported value: {0}")]
    UnsupportedValue(&'static str),

    /// Bad configuration blob or missing required setting.
    #[error("config: {0}")]
    Config(String),

    /// Bad input record. Don't retry, fix the data.
    #[error("invalid: {0}")]
    Invalid(String),

    /// Transient failure (network, rate limit). Retrying might help.
    #[error("transient: {0}")]
    Transient(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("database: {0}")]
    Db(#[from] rusqlite::Error),

    /// Everything else. Inspect the message for details.
    #[error("{0}")]
    Other(String),
}

impl From<ureq::Error> for StageError {
    fn from(e: ureq::Error) -> Self {
        StageError::Transient(e.to_string())
    }
}

impl StageError {
    /// Create an [`Invalid`](StageError::Invalid) error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        StageError::Invalid(msg.into())
    }

    /// Create a [`Config`](StageError::Config) error.
    pub fn config(msg: impl Into<String>) -> Self {
        StageError::Config(msg.into())
    }

    /// Create a [`Transient`](StageError::Transient) error.
    pub fn transient(msg: impl Into<String>) -> Self {
        StageError::Transient(msg.into())
    }

    /// Create an [`Other`](StageError::Other) error.
    pub fn other(msg: impl Into<String>) -> Self {
        StageError::Other(msg.into())
    }

    /// True for the [`Cancelled`](StageError::Cancelled) sentinel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StageError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- constructors ---

    #[test]
    fn invalid_constructor() {
        let err = StageError::invalid("bad input");
        assert!(matches!(err, StageError::Invalid(msg) if msg == "bad input"));
    }

    #[test]
    fn config_constructor() {
        let err = StageError::config("no table");
        assert!(matches!(err, StageError::Config(msg) if msg == "no table"));
    }

    #[test]
    fn transient_constructor() {
        let err = StageError::transient("timeout");
        assert!(matches!(err, StageError::Transient(msg) if msg == "timeout"));
    }

    // --- Display ---

    #[test]
    fn display_invalid() {
        assert_eq!(StageError::invalid("bad input").to_string(), "invalid: bad input");
    }

    #[test]
    fn display_other() {
        assert_eq!(StageError::other("something").to_string(), "something");
    }

    #[test]
    fn display_sentinels() {
        assert_eq!(StageError::NotImplemented.to_string(), "not implemented");
        assert_eq!(StageError::Cancelled.to_string(), "cancelled");
        assert_eq!(StageError::StreamInterrupted.to_string(), "stream interrupted");
    }

    #[test]
    fn display_unsupported_value() {
        let err = StageError::UnsupportedValue("model");
        assert_eq!(err.to_string(), "unsupported value: model");
    }

    // --- sentinels ---

    #[test]
    fn cancelled_is_matched_by_variant() {
        assert!(StageError::Cancelled.is_cancelled());
        assert!(!StageError::other("cancelled").is_cancelled());
        assert!(!StageError::StreamInterrupted.is_cancelled());
    }

    // --- From conversions ---

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: StageError = io_err.into();
        assert!(matches!(&err, StageError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StageError = json_err.into();
        assert!(matches!(err, StageError::Json(_)));
    }
}
