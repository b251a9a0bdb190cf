use thiserror::Error;

/// Main error type for kbsync
#[derive(Error, Debug)]
pub enum KbsyncError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document bodies that are not valid JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed sync window token; aborts the run before any I/O
    #[error("Invalid sync window: {0}")]
    InvalidWindow(String),

    /// Parent pointer loop in the category table
    #[error("Category hierarchy cycle detected at category {0}")]
    HierarchyCycle(i64),

    /// Classification call failed or returned an unexpected shape
    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),

    /// Fetch, reconcile or save failed for one entity
    #[error("Update failed for entity {name}: {reason}")]
    EntityUpdateFailed { name: String, reason: String },

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A blocking database task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Convenient Result type using KbsyncError
pub type Result<T> = std::result::Result<T, KbsyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KbsyncError::InvalidWindow("tomorrow".to_string());
        assert!(err.to_string().contains("Invalid sync window"));
        assert!(err.to_string().contains("tomorrow"));
    }

    #[test]
    fn test_entity_update_failed_names_entity() {
        let err = KbsyncError::EntityUpdateFailed {
            name: "示例科技有限公司".to_string(),
            reason: "save rejected".to_string(),
        };
        assert!(err.to_string().contains("示例科技有限公司"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: KbsyncError = rusqlite_err.into();
        assert!(matches!(err, KbsyncError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: KbsyncError = io_err.into();
        assert!(matches!(err, KbsyncError::Io(_)));
    }
}
