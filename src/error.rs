//! Error types for the script environment pool

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to build script environment: {message}")]
    Build {
        message: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("No script environment became available within {0:?}")]
    PoolExhausted(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap any failure during environment construction into a build error
    pub fn build(cause: Error) -> Self {
        match cause {
            already @ Error::Build { .. } => already,
            cause => Error::Build {
                message: cause.to_string(),
                source: Box::new(cause),
            },
        }
    }

    /// Check if this is an environment build error
    pub fn is_build_error(&self) -> bool {
        matches!(self, Error::Build { .. })
    }

    /// Check if a bounded acquire gave up waiting
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Error::PoolExhausted(_))
    }
}

impl From<Box<rhai::EvalAltResult>> for Error {
    fn from(err: Box<rhai::EvalAltResult>) -> Self {
        Error::Script(err.to_string())
    }
}

impl From<rhai::ParseError> for Error {
    fn from(err: rhai::ParseError) -> Self {
        Error::Script(err.to_string())
    }
}
