use thiserror::Error;

/// Library-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error raised by an [`ItemSource`](crate::source::ItemSource) implementation.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned across the item source boundary.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Tree engine error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Expansion was requested on a node that is not a folder.
    #[error("Not a folder: {0}")]
    NotAFolder(String),

    /// The item source failed or timed out for one node.
    #[error("Source unavailable for {path}: {source}")]
    SourceUnavailable {
        path: String,
        #[source]
        source: SourceError,
    },

    /// Cooperative cancellation was observed before the work completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O errors from filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid path provided by the caller.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl Error {
    /// Wrap a source failure for `path`.
    pub fn source_unavailable(path: impl Into<String>, source: impl Into<SourceError>) -> Self {
        Error::SourceUnavailable {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Whether this is the cancellation outcome rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn not_a_folder_display() {
        let err = Error::NotAFolder("notes.txt".into());
        assert_eq!(err.to_string(), "Not a folder: notes.txt");
    }

    #[test]
    fn source_unavailable_keeps_cause() {
        let err = Error::source_unavailable("/remote/docs", "connection reset");
        assert_eq!(
            err.to_string(),
            "Source unavailable for /remote/docs: connection reset"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn cancelled_is_distinct_outcome() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::InvalidPath("/nope".into()).is_cancelled());
    }
}
