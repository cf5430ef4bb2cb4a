//! Error types shared across the workspace.

use thiserror::Error;

/// Error type for setup concerns that sit outside the GPU layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or surface handle errors
    #[error("Window error: {0}")]
    Window(String),

    /// Vulkan surface creation errors raised by the platform layer
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Short category label used when reporting a fatal error.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Window(_) => "window",
            Error::Vulkan(_) => "vulkan",
            Error::Io(_) => "io",
            Error::Config(_) => "config",
        }
    }
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
