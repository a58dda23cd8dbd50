//! Crate-level error type.

use crate::store::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A resolver or the reconciler was called with arguments it cannot work
    /// with. Raised before any mutation.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Geocoding error: {0}")]
    Geocoding(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
