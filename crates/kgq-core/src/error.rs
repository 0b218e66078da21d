use thiserror::Error;

/// Failure kinds surfaced by the query layer.
///
/// Nothing in this workspace swallows or retries these; a failed query
/// reaches the caller with its originating kind intact.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or mismatched input, caught before any store or engine is touched.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Raised by the retrieval engine itself and passed through as-is.
    #[error("Retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    #[error("Vector store connection failed: {0}")]
    StoreConnection(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn store_connection(msg: impl Into<String>) -> Self {
        Self::StoreConnection(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
