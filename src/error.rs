//! Error types for the assessor dispatch pipeline

use thiserror::Error;

/// Result type alias for assessor operations
pub type Result<T> = std::result::Result<T, AssessorError>;

#[derive(Error, Debug)]
pub enum AssessorError {

    // =============================
    // Contract Boundary Errors
    // =============================

    #[error("Contract violation: {0}")]
    ContractViolation(String),

    // =============================
    // Tool Errors
    // =============================

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    // =============================
    // External Collaborators
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
