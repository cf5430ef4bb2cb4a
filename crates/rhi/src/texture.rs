//! Sampled textures uploaded from RGBA8 pixels.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageConfig};
use crate::mipmap;

/// Format every texture is stored in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// A device-local texture with a complete mip chain, ready for sampling.
pub struct Texture {
    image: Image,
}

impl Texture {
    /// Uploads `pixels` (tightly packed RGBA8, row-major) and builds the
    /// mip chain.
    ///
    /// The staging buffer is destroyed before mip generation starts. On
    /// return every level is in `SHADER_READ_ONLY_OPTIMAL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pixel buffer does not match the dimensions,
    /// the format cannot be blitted with linear filtering, or any GPU call
    /// fails.
    pub fn from_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected || expected == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Texture {}x{} needs {} RGBA bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        // Fail before any allocation if the chain cannot be generated.
        mipmap::check_blit_support(TEXTURE_FORMAT, &device.format_properties(TEXTURE_FORMAT))?;

        let mip_levels = mipmap::mip_level_count(width, height);
        let mut image = Image::new(
            device.clone(),
            &ImageConfig::texture(vk::Extent2D { width, height }, mip_levels, TEXTURE_FORMAT),
        )?;

        {
            let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_offset(vk::Offset3D::default())
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });

            pool.submit_one_time(device.graphics_queue(), |cmd| {
                image.transition_layout(cmd, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
                cmd.copy_buffer_to_image(staging.handle(), image.handle(), &[region]);
                Ok(())
            })?;
        }

        mipmap::generate_mipmaps(&device, pool, &mut image)?;

        info!(
            "Texture uploaded: {}x{}, {} mip levels",
            width, height, mip_levels
        );

        Ok(Self { image })
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// View over all mip levels.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }
}
