//! Error types for routing.

use thiserror::Error;

/// Router-specific errors.
///
/// Every variant except [`RouterError::UnknownMethod`] is a configuration
/// error raised while the route table is built.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Two endpoints normalize to the same static path.
    #[error("this URL path already exists: {path}")]
    DuplicatePath { path: String },

    /// Two parameterized endpoints compile to the same pattern under one prefix.
    #[error("this URL pattern already exists: {path} (pattern {pattern})")]
    DuplicatePattern { path: String, pattern: String },

    /// A parameter token is malformed or reuses a name.
    #[error("invalid parameter in {path}: {reason}")]
    InvalidParam { path: String, reason: String },

    /// An optional parameter is followed by a segment that is not optional.
    #[error("optional parameter `{param}` must be trailing in {path}")]
    OptionalNotTrailing { path: String, param: String },

    /// The generated pattern failed to compile.
    #[error("invalid path pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The method name is not one the router knows.
    #[error("unknown HTTP method: {0}")]
    UnknownMethod(String),
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;
