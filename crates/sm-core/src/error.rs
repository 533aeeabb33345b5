//! Error types for sm-core

use thiserror::Error;

/// Result type alias for merge and export operations
pub type Result<T> = std::result::Result<T, MergeError>;

/// Errors that can occur while merging or exporting layer solids
#[derive(Debug, Error)]
pub enum MergeError {
    /// Input rejected before any kernel interaction
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The geometry kernel cannot be used
    #[error("Geometry kernel '{0}' is not available")]
    KernelUnavailable(String),

    /// A kernel call failed
    #[error("CAD kernel error: {0}")]
    Kernel(#[from] sm_cad::CadError),

    /// The input document could not be decoded, or the output encoded
    #[error("Invalid document: {0}")]
    Document(#[from] serde_json::Error),

    /// Reading or writing a document failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergeError {
    /// Whether this error was raised before touching the kernel
    pub fn is_validation(&self) -> bool {
        matches!(self, MergeError::Validation(_))
    }
}
