//! Error type for the shared domain layer.

use thiserror::Error;

/// Common error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Profile error: {0}")]
    Profile(String),

    #[error("Aux Data number must be between 1 and 8, got {0}")]
    InvalidAuxSlot(u8),

    #[error("Unknown category: {0} (expected EXISTING or PROPOSED)")]
    InvalidCategory(String),
}

/// Result alias
pub type Result<T> = std::result::Result<T, Error>;
