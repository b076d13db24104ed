use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutreachError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for OutreachError {
    fn from(err: std::io::Error) -> Self {
        OutreachError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for OutreachError {
    fn from(err: serde_json::Error) -> Self {
        OutreachError::Storage(err.to_string())
    }
}
