//! Depth buffer management.
//!
//! The depth target is one single-level image sized to the swapchain extent.
//! It is created together with the swapchain and dropped together with it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::command::CommandPool;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::vk;
//! use vkframe_renderer::depth_buffer::{DepthBuffer, find_depth_format};
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), vkframe_rhi::RhiError> {
//! let format = find_depth_format(&device)?;
//! let depth_buffer = DepthBuffer::new(
//!     device,
//!     pool,
//!     vk::Extent2D { width: 1920, height: 1080 },
//!     format,
//! )?;
//! let _view = depth_buffer.image_view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use vkframe_rhi::RhiResult;
use vkframe_rhi::command::CommandPool;
use vkframe_rhi::device::Device;
use vkframe_rhi::image::{Image, ImageConfig, ImageTiling, find_supported_format};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Picks the first candidate usable as an optimal-tiling depth attachment.
///
/// # Errors
///
/// Returns [`vkframe_rhi::RhiError::UnsupportedFormat`] if none qualifies.
pub fn find_depth_format(device: &Device) -> RhiResult<vk::Format> {
    let format = find_supported_format(
        device,
        &DEPTH_FORMAT_CANDIDATES,
        ImageTiling::Optimal,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )?;
    info!("Depth format: {:?}", format);
    Ok(format)
}

/// Depth buffer for depth testing.
///
/// Leaves construction already in `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`.
pub struct DepthBuffer {
    image: Image,
}

impl DepthBuffer {
    /// Creates a depth image of `extent` and transitions it for attachment use.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The extent is zero
    /// - Image creation or memory allocation fails
    /// - The layout transition submission fails
    pub fn new(
        device: Arc<Device>,
        pool: &CommandPool,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> RhiResult<Self> {
        let mut image = Image::new(device.clone(), &ImageConfig::depth(extent, format))?;

        pool.submit_one_time(device.graphics_queue(), |cmd| {
            image.transition_layout(cmd, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        })?;

        debug!(
            "Created depth buffer: {}x{} ({:?})",
            extent.width, extent.height, format
        );

        Ok(Self { image })
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.image.layout()
    }
}
