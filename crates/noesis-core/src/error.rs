//! Error types for Noesis

use thiserror::Error;

/// Result type alias using Noesis's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Noesis error types
///
/// Business errors (not-found, duplicate keys, invalid input, update
/// conflicts) are returned to callers as structured failures; everything
/// else is treated as an infrastructure fault.
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Domain '{0}' not found")]
    DomainNotFound(String),

    #[error("Subdomain '{0}' not found")]
    SubdomainNotFound(String),

    #[error("Knowledge node '{0}' not found")]
    NodeNotFound(String),

    #[error("Relationship '{0}' not found")]
    EdgeNotFound(String),

    #[error("Ingestion record '{0}' not found")]
    IngestionNotFound(String),

    #[error("Model version '{0}' not found")]
    ModelVersionNotFound(String),

    // Constraint errors (E100-E199)
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    // Input errors (E200-E299)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Concurrency errors (E300-E399)
    #[error("Concurrent update conflict on '{0}' after {1} attempts")]
    UpdateConflict(String, u32),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::DomainNotFound(_) => "E001",
            Self::SubdomainNotFound(_) => "E002",
            Self::NodeNotFound(_) => "E003",
            Self::EdgeNotFound(_) => "E004",
            Self::IngestionNotFound(_) => "E005",
            Self::ModelVersionNotFound(_) => "E006",
            Self::DuplicateKey(_) => "E100",
            Self::InvalidInput(_) => "E200",
            Self::UpdateConflict(..) => "E300",
            Self::Database(_) => "E400",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Whether this is a business error the caller can act on,
    /// as opposed to an infrastructure fault.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            Self::DomainNotFound(_)
                | Self::SubdomainNotFound(_)
                | Self::NodeNotFound(_)
                | Self::EdgeNotFound(_)
                | Self::IngestionNotFound(_)
                | Self::ModelVersionNotFound(_)
                | Self::DuplicateKey(_)
                | Self::InvalidInput(_)
                | Self::UpdateConflict(..)
        )
    }

    /// Whether this error means a targeted record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DomainNotFound(_)
                | Self::SubdomainNotFound(_)
                | Self::NodeNotFound(_)
                | Self::EdgeNotFound(_)
                | Self::IngestionNotFound(_)
                | Self::ModelVersionNotFound(_)
        )
    }
}

/// Map a sqlx error from an INSERT into a domain error, translating
/// unique-constraint violations into [`Error::DuplicateKey`].
pub fn map_unique_violation(err: sqlx::Error, key: &str) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return Error::DuplicateKey(key.to_string());
        }
    }
    Error::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::DomainNotFound("x".into()).code(), "E001");
        assert_eq!(Error::DuplicateKey("x".into()).code(), "E100");
        assert_eq!(Error::InvalidInput("x".into()).code(), "E200");
        assert_eq!(Error::UpdateConflict("x".into(), 3).code(), "E300");
        assert_eq!(Error::Other("x".into()).code(), "E9999");
    }

    #[test]
    fn test_business_classification() {
        assert!(Error::NodeNotFound("n".into()).is_business());
        assert!(Error::DuplicateKey("k".into()).is_business());
        assert!(Error::InvalidInput("bad".into()).is_business());
        assert!(!Error::Other("boom".into()).is_business());
        assert!(!Error::Database(sqlx::Error::PoolClosed).is_business());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(Error::SubdomainNotFound("s".into()).is_not_found());
        assert!(!Error::DuplicateKey("k".into()).is_not_found());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::ModelVersionNotFound("1.2.0".into());
        assert!(err.to_string().contains("1.2.0"));

        let err = Error::UpdateConflict("node-1".into(), 3);
        assert!(err.to_string().contains("node-1"));
        assert!(err.to_string().contains('3'));
    }
}
