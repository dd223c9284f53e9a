//! Shared error types for the article pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid UUID: {input}")]
    InvalidUuid { input: String },

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: String, value: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
