// crates/filtergraph-core/src/error.rs
//
// Error taxonomy for the graph runtime. Every public entry point returns
// `GraphResult<T>` rather than the signed-integer codes of the system this
// crate generalizes — the `kind` is still the stable thing callers match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no memory")]
    NoMemory,

    #[error("option not found: {0}")]
    OptionNotFound(String),

    #[error("operation not supported")]
    OperationNotSupported,

    #[error("end of file")]
    Eof,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("registry is at capacity")]
    OutOfCapacity,
}

pub type GraphResult<T> = Result<T, GraphError>;
