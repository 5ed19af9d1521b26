use thiserror::Error;

/// Errors produced by the document store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A document read inside a transaction changed before commit.
    #[error("Transaction conflict")]
    Conflict,

    /// The retry bound was hit while every attempt kept conflicting.
    #[error("Transaction aborted after {attempts} conflicting attempts")]
    RetriesExhausted { attempts: u32 },

    /// An update targeted a document that does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Malformed document path.
    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    /// Document body could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// PostgreSQL backend error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
