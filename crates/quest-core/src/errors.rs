//! Shared error types

use thiserror::Error;

/// Core errors shared between the engine and its adapters
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
