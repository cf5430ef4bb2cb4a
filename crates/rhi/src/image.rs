//! GPU image management.
//!
//! [`Image`] owns a VkImage, its dedicated allocation and a view over all of
//! its mip levels. It also tracks the image's current layout: every layout
//! change goes through [`Image::transition_layout`] (or a routine that
//! reports the final layout back via [`Image::assume_layout`]), so the
//! tracked layout always matches the last barrier recorded for the image.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::image::{Image, ImageConfig};
//! use vkframe_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let depth = Image::new(
//!     device,
//!     &ImageConfig::depth(vk::Extent2D { width: 800, height: 600 }, vk::Format::D32_SFLOAT),
//! )?;
//! assert_eq!(depth.layout(), vk::ImageLayout::UNDEFINED);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::{self, DedicatedTarget, MemoryVisibility};
use crate::transition;

/// Texel arrangement of an image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageTiling {
    /// Implementation-defined layout, required for sampling and attachments.
    #[default]
    Optimal,
    /// Row-major texels.
    Linear,
}

impl ImageTiling {
    pub fn to_vk(self) -> vk::ImageTiling {
        match self {
            ImageTiling::Optimal => vk::ImageTiling::OPTIMAL,
            ImageTiling::Linear => vk::ImageTiling::LINEAR,
        }
    }
}

/// Parameters for [`Image::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageConfig {
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub format: vk::Format,
    pub tiling: ImageTiling,
    pub usage: vk::ImageUsageFlags,
    /// Aspect the image view exposes.
    pub aspect: vk::ImageAspectFlags,
    pub name: &'static str,
}

impl ImageConfig {
    /// A sampled color texture with `mip_levels` levels that is filled by
    /// transfers and blits.
    pub fn texture(extent: vk::Extent2D, mip_levels: u32, format: vk::Format) -> Self {
        Self {
            extent,
            mip_levels,
            format,
            tiling: ImageTiling::Optimal,
            usage: vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
            name: "texture",
        }
    }

    /// A single-level depth attachment.
    pub fn depth(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            mip_levels: 1,
            format,
            tiling: ImageTiling::Optimal,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            name: "depth",
        }
    }
}

/// A device-local 2D image with a view and a tracked layout.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    extent: vk::Extent2D,
    mip_levels: u32,
    format: vk::Format,
    layout: vk::ImageLayout,
    name: &'static str,
}

impl Image {
    /// Creates the image in the `UNDEFINED` layout, binds dedicated
    /// device-local memory and creates a view over all mip levels.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The extent or mip level count is zero
    /// - Image creation fails
    /// - Memory allocation fails
    /// - Image view creation fails
    pub fn new(device: Arc<Device>, config: &ImageConfig) -> RhiResult<Self> {
        let vk::Extent2D { width, height } = config.extent;
        if width == 0 || height == 0 || config.mip_levels == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image '{}' needs non-zero extent and mip levels, got {}x{} with {} levels",
                config.name, width, height, config.mip_levels
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(config.format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(config.mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(config.tiling.to_vk())
            .usage(config.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let allocation = match memory::allocate_and_bind(
            &device,
            DedicatedTarget::Image(image),
            MemoryVisibility::DeviceLocal,
            config.name,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = match create_image_view(
            &device,
            image,
            config.format,
            config.aspect,
            config.mip_levels,
        ) {
            Ok(view) => view,
            Err(e) => {
                memory::free(&device, allocation);
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        debug!(
            "Created {} image: {}x{}, {} mip level(s), {:?}",
            config.name, width, height, config.mip_levels, config.format
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            extent: config.extent,
            mip_levels: config.mip_levels,
            format: config.format,
            layout: vk::ImageLayout::UNDEFINED,
            name: config.name,
        })
    }

    /// Records a barrier moving every mip level from the current layout to
    /// `new_layout` and updates the tracked layout.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedLayoutTransition`] if the pair is not in
    /// the transition table; the tracked layout is left unchanged.
    pub fn transition_layout(
        &mut self,
        cmd: &CommandBuffer,
        new_layout: vk::ImageLayout,
    ) -> RhiResult<()> {
        transition::record_transition(
            cmd,
            self.image,
            self.format,
            self.mip_levels,
            self.layout,
            new_layout,
        )?;
        self.layout = new_layout;
        Ok(())
    }

    /// Records that a routine issuing its own barriers left every mip level
    /// in `layout`.
    pub fn assume_layout(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the view covering all mip levels.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// The layout the last recorded barrier left the image in.
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }

        if let Some(allocation) = self.allocation.take() {
            memory::free(&self.device, allocation);
        }

        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }

        debug!("Destroyed {} image", self.name);
    }
}

/// Creates a 2D view over `level_count` mip levels of `image`.
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    level_count: u32,
) -> RhiResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(level_count)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = unsafe { device.handle().create_image_view(&view_info, None)? };
    Ok(view)
}

/// Returns the first candidate whose features for `tiling` contain `features`.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedFormat`] if no candidate qualifies.
pub fn find_supported_format(
    device: &Device,
    candidates: &[vk::Format],
    tiling: ImageTiling,
    features: vk::FormatFeatureFlags,
) -> RhiResult<vk::Format> {
    select_format(candidates, tiling, features, |format| {
        device.format_properties(format)
    })
}

fn select_format(
    candidates: &[vk::Format],
    tiling: ImageTiling,
    features: vk::FormatFeatureFlags,
    properties: impl Fn(vk::Format) -> vk::FormatProperties,
) -> RhiResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = properties(format);
            let supported = match tiling {
                ImageTiling::Linear => props.linear_tiling_features,
                ImageTiling::Optimal => props.optimal_tiling_features,
            };
            supported.contains(features)
        })
        .ok_or_else(|| RhiError::UnsupportedFormat(candidates.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPTH_CANDIDATES: [vk::Format; 3] = [
        vk::Format::D32_SFLOAT,
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::D24_UNORM_S8_UINT,
    ];

    #[test]
    fn test_select_format_takes_first_supported() {
        let format = select_format(
            &DEPTH_CANDIDATES,
            ImageTiling::Optimal,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| {
                let features = if format == vk::Format::D32_SFLOAT {
                    vk::FormatFeatureFlags::empty()
                } else {
                    vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                };
                vk::FormatProperties {
                    optimal_tiling_features: features,
                    ..Default::default()
                }
            },
        )
        .unwrap();

        assert_eq!(format, vk::Format::D32_SFLOAT_S8_UINT);
    }

    #[test]
    fn test_select_format_checks_requested_tiling() {
        let props = |_| vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };

        let err = select_format(
            &DEPTH_CANDIDATES,
            ImageTiling::Optimal,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            props,
        )
        .unwrap_err();
        assert!(matches!(err, RhiError::UnsupportedFormat(ref c) if c.len() == 3));

        assert!(
            select_format(
                &DEPTH_CANDIDATES,
                ImageTiling::Linear,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                props,
            )
            .is_ok()
        );
    }

    #[test]
    fn test_texture_config() {
        let config = ImageConfig::texture(
            vk::Extent2D {
                width: 512,
                height: 256,
            },
            10,
            vk::Format::R8G8B8A8_SRGB,
        );
        assert_eq!(config.mip_levels, 10);
        assert_eq!(config.tiling, ImageTiling::Optimal);
        // Blitting between levels reads and writes the same image.
        assert!(config.usage.contains(
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED
        ));
    }

    #[test]
    fn test_depth_config() {
        let config = ImageConfig::depth(
            vk::Extent2D {
                width: 800,
                height: 600,
            },
            vk::Format::D32_SFLOAT,
        );
        assert_eq!(config.mip_levels, 1);
        assert_eq!(config.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(config.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
    }
}
