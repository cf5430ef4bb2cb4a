//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Failed to parse an OBJ file.
    #[error("Failed to load OBJ file '{path}': {source}")]
    ObjLoad {
        /// Path to the file that failed to load.
        path: PathBuf,
        source: tobj::LoadError,
    },

    /// The model contains no triangles.
    #[error("Model '{0}' contains no triangles")]
    EmptyMesh(PathBuf),

    /// A face references a position or texture coordinate that does not exist.
    #[error("Index {index} out of range for {attribute} (count {count})")]
    IndexOutOfRange {
        attribute: &'static str,
        index: u32,
        count: usize,
    },

    /// Failed to decode an image file.
    #[error("Failed to decode image '{path}': {source}")]
    ImageDecode {
        path: PathBuf,
        source: image::ImageError,
    },

    /// Pixel data does not match the stated dimensions.
    #[error("Invalid texture: {0}")]
    InvalidTexture(String),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

impl ResourceError {
    /// Short category label used when reporting a fatal error.
    pub fn category(&self) -> &'static str {
        match self {
            ResourceError::ObjLoad { .. }
            | ResourceError::EmptyMesh(_)
            | ResourceError::IndexOutOfRange { .. } => "mesh",
            ResourceError::ImageDecode { .. } | ResourceError::InvalidTexture(_) => "texture",
            ResourceError::FileNotFound(_) => "file-not-found",
        }
    }
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
