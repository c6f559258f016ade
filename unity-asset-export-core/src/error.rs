//! Error handling system
//!
//! Error taxonomy for the export pipeline. Every failure is scoped to the file,
//! object or task it came from; nothing here is fatal to the process.

use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Main error type for the Unity asset export pipeline
#[derive(Error, Debug, Clone)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to load {file}: {message}")]
    Load { file: String, message: String },

    #[error("Failed to decode {object}: {message}")]
    Decode { object: String, message: String },

    #[error("Destination already exists: {path}")]
    WriteConflict { path: String },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Invalid export path: {path}")]
    InvalidPath { path: String },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ExportError {
    /// Create a per-file load error
    pub fn load<F, M>(file: F, message: M) -> Self
    where
        F: Into<String>,
        M: Into<String>,
    {
        Self::Load {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create a per-object decode error
    pub fn decode<O, M>(object: O, message: M) -> Self
    where
        O: Into<String>,
        M: Into<String>,
    {
        Self::Decode {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Create a write conflict for an existing destination
    pub fn write_conflict<P: Into<String>>(path: P) -> Self {
        Self::WriteConflict { path: path.into() }
    }

    /// Whether this error means the destination already existed.
    ///
    /// Batch exports count these as skips instead of errors.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::WriteConflict { .. })
    }

    /// Whether this error came from decoding source data
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

impl From<std::io::Error> for ExportError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<tokio::task::JoinError> for ExportError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::TaskJoin(error.to_string())
    }
}

impl From<image::ImageError> for ExportError {
    fn from(error: image::ImageError) -> Self {
        Self::Encode(error.to_string())
    }
}

impl From<zip::result::ZipError> for ExportError {
    fn from(error: zip::result::ZipError) -> Self {
        Self::Archive(error.to_string())
    }
}

/// Error context trait for better error reporting
pub trait ErrorContext<T> {
    /// Add context to error
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<ExportError>,
{
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>,
    {
        self.map_err(|e| {
            let base_error = e.into();
            ExportError::Custom(format!("{}: {}", context.into(), base_error))
        })
    }
}
