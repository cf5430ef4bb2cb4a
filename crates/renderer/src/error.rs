//! Renderer error type.

use thiserror::Error;
use vkframe_resources::ResourceError;
use vkframe_rhi::RhiError;

/// Everything that can stop the renderer.
///
/// Transient surface conditions never reach this type: the frame scheduler
/// turns them into swapchain rebuilds.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Platform(#[from] vkframe_core::Error),
}

impl RendererError {
    /// Short category label used when reporting a fatal error.
    pub fn category(&self) -> &'static str {
        match self {
            RendererError::Rhi(e) => e.category(),
            RendererError::Resource(e) => e.category(),
            RendererError::Platform(e) => e.category(),
        }
    }
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;
