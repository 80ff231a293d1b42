use thiserror::Error;

/// The single error type shared by every component of the engine.
///
/// Replaces the ad hoc `SimpleError`/`SmallError` split this crate grew out
/// of with one coherent, typed error. No component returns a bare `String`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("fatal io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fatal io error: {0}")]
    FatalIo(String),

    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("buffer capacity refused: {0}")]
    CapacityRefused(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::InvariantViolated(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn capacity_refused(msg: impl Into<String>) -> Self {
        Error::CapacityRefused(msg.into())
    }
}
