//! Error types and handling for SCMS
//!
//! This module defines all error types used throughout the system. Library
//! layers return [`Result`]; only the HTTP edge turns an [`Error`] into a
//! status code.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for SCMS
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rejected before touching the store
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Storage layer errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A page template failed to parse at one of the two stages
    #[error("Template compile error in page {page:?} ({stage}): {message}")]
    TemplateCompile {
        /// Name of the page being compiled
        page: String,
        /// Which compile stage failed
        stage: &'static str,
        /// Template engine message
        message: String,
    },

    /// A compiled template failed while executing
    #[error("Template render error: {0}")]
    TemplateRender(String),

    /// Import stopped at a failing archive entry; earlier entries stay applied
    #[error("Import failed at entry {entry:?} after {applied} applied entries: {source}")]
    PartialImport {
        /// Name of the failing archive entry
        entry: String,
        /// Number of entries committed before the failure
        applied: usize,
        /// Underlying failure
        source: Box<Error>,
    },

    /// Tree materialization went deeper than the configured limit
    #[error("Tree of kind {kind:?} exceeds maximum depth {max_depth}")]
    TreeTooDeep {
        /// Kind being materialized
        kind: String,
        /// Configured depth limit
        max_depth: usize,
    },

    /// A single request issued more store calls than allowed
    #[error("Store round-trip budget of {budget} calls exceeded")]
    RoundTripBudgetExceeded {
        /// Configured budget
        budget: usize,
    },

    /// The site root has no usable default page
    #[error("no default page is specified")]
    NoDefaultPage,

    /// JSON errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zip container errors
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal system errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Input validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required form field was empty
    #[error("field '{0}' must not be empty")]
    EmptyField(String),

    /// Unknown field type name
    #[error("invalid field type {0:?}")]
    InvalidFieldType(String),

    /// Uploaded file at or above the size cap
    #[error("file {name:?} is too large: {size} bytes (max: {max} exclusive)")]
    FileTooLarge {
        /// File name
        name: String,
        /// Actual size in bytes
        size: usize,
        /// Exclusive upper bound in bytes
        max: usize,
    },

    /// Runtime value outside the supported kinds
    #[error("type {0} is unsupported")]
    UnsupportedType(String),

    /// String input could not be parsed into the target kind
    #[error("cannot parse {input:?} as {kind}: {reason}")]
    Parse {
        /// Target kind name
        kind: &'static str,
        /// Raw input
        input: String,
        /// Parser message
        reason: String,
    },

    /// Malformed key token
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Template-facing argument of the wrong runtime type
    #[error("{operation}: unexpected type of '{parameter}': {got}, must be {expected}")]
    InvalidArgumentType {
        /// Operation being called
        operation: &'static str,
        /// Parameter name
        parameter: &'static str,
        /// Accepted types
        expected: &'static str,
        /// Type actually supplied
        got: String,
    },

    /// Argument with the right type but an unusable value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend could not serve the request
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A key that must be complete was not
    #[error("incomplete key: {0}")]
    IncompleteKey(String),

    /// Snapshot could not be written or read
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// Corruption detected in stored data
    #[error("data corruption detected: {0}")]
    Corruption(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an empty-field validation error
    pub fn empty_field(field: impl Into<String>) -> Self {
        Self::Validation(ValidationError::EmptyField(field.into()))
    }

    /// Create an invalid-argument validation error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::Validation(ValidationError::InvalidArgument(msg.into()))
    }

    /// Check if this is a "not found" condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this is a client error (4xx equivalent)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::NotFound(_))
    }

    /// Check if this is a server error (5xx equivalent)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}
