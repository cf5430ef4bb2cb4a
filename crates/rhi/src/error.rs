//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
///
/// Everything here is fatal except the two surface conditions reported by
/// [`RhiError::is_transient`], which callers above the frame scheduler never
/// see.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panic on another thread
    #[error("Allocator lock poisoned")]
    AllocatorPoisoned,

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No memory type matches the requested type bits and property flags
    #[error("No suitable memory type (type bits {type_bits:#b}, properties {properties:?})")]
    NoSuitableMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// The format cannot be used as a linearly filtered blit source and destination
    #[error("Format {0:?} does not support linear blitting")]
    UnsupportedBlit(vk::Format),

    /// The (old, new) layout pair is not in the transition table
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// None of the candidate formats supports the requested features
    #[error("No supported format among {0:?}")]
    UnsupportedFormat(Vec<vk::Format>),

    /// Shader module error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RhiError {
    /// Returns true for the recoverable surface states (out-of-date, suboptimal).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR)
        )
    }

    /// Short category label used when reporting a fatal error.
    pub fn category(&self) -> &'static str {
        match self {
            RhiError::VulkanError(_) => "vulkan",
            RhiError::LoadingError(_) => "loader",
            RhiError::AllocatorError(_) | RhiError::AllocatorPoisoned => "allocator",
            RhiError::NoSuitableGpu => "no-suitable-gpu",
            RhiError::NoSuitableMemoryType { .. } => "no-suitable-memory-type",
            RhiError::UnsupportedBlit(_) => "unsupported-blit",
            RhiError::UnsupportedLayoutTransition { .. } => "unsupported-layout-transition",
            RhiError::UnsupportedFormat(_) => "unsupported-format",
            RhiError::ShaderError(_) => "shader",
            RhiError::SurfaceError(_) => "surface",
            RhiError::SwapchainError(_) => "swapchain",
            RhiError::InvalidHandle(_) => "invalid-handle",
            RhiError::PipelineError(_) => "pipeline",
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_surface_staleness_is_transient() {
        assert!(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DATE_KHR).is_transient());
        assert!(RhiError::VulkanError(vk::Result::SUBOPTIMAL_KHR).is_transient());

        assert!(!RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST).is_transient());
        assert!(!RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR).is_transient());
        assert!(!RhiError::UnsupportedBlit(vk::Format::R8G8B8A8_SRGB).is_transient());
        assert!(!RhiError::NoSuitableGpu.is_transient());
    }

    #[test]
    fn test_categories() {
        let err = RhiError::NoSuitableMemoryType {
            type_bits: 0b1010,
            properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        };
        assert_eq!(err.category(), "no-suitable-memory-type");

        let err = RhiError::UnsupportedLayoutTransition {
            old: vk::ImageLayout::GENERAL,
            new: vk::ImageLayout::PRESENT_SRC_KHR,
        };
        assert_eq!(err.category(), "unsupported-layout-transition");
        assert!(err.to_string().contains("GENERAL"));
    }
}
