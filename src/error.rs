//! Error types for the I3D exporter.

use thiserror::Error;

/// Result type alias using ExportError.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Main error type for export operations.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Failed to parse a scene description or config file.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The XML emitter rejected the document.
    #[error("XML write error: {0}")]
    Xml(String),

    /// The DDS encoder rejected the texture layout.
    #[error("DDS write error: {0}")]
    Dds(String),

    /// Invalid node configuration, fatal for the shape being built.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A scene reference names an object that does not exist.
    #[error("Object not found: {0}")]
    MissingObject(String),

    /// A mesh object references mesh data that does not exist.
    #[error("Mesh data not found: {0}")]
    MissingMesh(String),

    /// Mesh data references loops or vertices that do not exist.
    #[error("Invalid mesh data in {0}: {1}")]
    InvalidMesh(String, String),

    /// The object-data texture hierarchy is malformed.
    #[error("Object data error: {0}")]
    ObjectData(String),

    /// The external binary optimizer failed.
    #[error("Binary optimizer error: {0}")]
    Optimizer(String),
}
