//! Mip chain generation by repeated blits.
//!
//! Level *k* is produced from level *k-1* with a linear-filtered blit at half
//! the size (floored, never below 1). Every level starts in
//! `TRANSFER_DST_OPTIMAL` and ends in `SHADER_READ_ONLY_OPTIMAL`.

use ash::vk;
use tracing::debug;

use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::Image;

/// Number of levels in a full mip chain: `floor(log2(max(w, h))) + 1`.
///
/// Returns 1 for a zero-sized extent.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height);
    if largest == 0 {
        return 1;
    }
    u32::BITS - largest.leading_zeros()
}

/// Dimensions of `level` for a base of `width` x `height`.
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    let shrink = |size: u32| size.checked_shr(level).unwrap_or(0).max(1);
    (shrink(width), shrink(height))
}

/// One blit of the chain: `src_level` is downsampled into `src_level + 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MipBlit {
    pub src_level: u32,
    pub src_extent: (u32, u32),
    pub dst_extent: (u32, u32),
}

impl MipBlit {
    #[inline]
    pub fn dst_level(&self) -> u32 {
        self.src_level + 1
    }

    fn to_vk(self) -> vk::ImageBlit {
        let corner = |(w, h): (u32, u32)| vk::Offset3D {
            x: w as i32,
            y: h as i32,
            z: 1,
        };
        let layers = |level| {
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .mip_level(level)
                .base_array_layer(0)
                .layer_count(1)
        };

        vk::ImageBlit::default()
            .src_offsets([vk::Offset3D::default(), corner(self.src_extent)])
            .src_subresource(layers(self.src_level))
            .dst_offsets([vk::Offset3D::default(), corner(self.dst_extent)])
            .dst_subresource(layers(self.dst_level()))
    }
}

/// Lists the blits needed to fill levels `1..mip_levels` of an image.
pub fn blit_plan(width: u32, height: u32, mip_levels: u32) -> Vec<MipBlit> {
    (1..mip_levels)
        .map(|level| MipBlit {
            src_level: level - 1,
            src_extent: mip_extent(width, height, level - 1),
            dst_extent: mip_extent(width, height, level),
        })
        .collect()
}

/// Fails with [`RhiError::UnsupportedBlit`] unless `format` can be the source
/// and destination of a linear-filtered blit with optimal tiling.
pub fn check_blit_support(format: vk::Format, properties: &vk::FormatProperties) -> RhiResult<()> {
    let required = vk::FormatFeatureFlags::BLIT_SRC
        | vk::FormatFeatureFlags::BLIT_DST
        | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR;

    if properties.optimal_tiling_features.contains(required) {
        Ok(())
    } else {
        Err(RhiError::UnsupportedBlit(format))
    }
}

/// Fills every mip level of `image` from level 0.
///
/// Level 0 must hold the source pixels and every level must be in
/// `TRANSFER_DST_OPTIMAL`. The whole chain is recorded into one command
/// buffer that is submitted and awaited before returning; afterwards every
/// level is in `SHADER_READ_ONLY_OPTIMAL`.
///
/// # Errors
///
/// - [`RhiError::UnsupportedBlit`] if the format lacks linear blit support
/// - [`RhiError::UnsupportedLayoutTransition`] if the image is not in
///   `TRANSFER_DST_OPTIMAL`
/// - Any submission or wait failure
pub fn generate_mipmaps(device: &Device, pool: &CommandPool, image: &mut Image) -> RhiResult<()> {
    check_blit_support(image.format(), &device.format_properties(image.format()))?;

    if image.layout() != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
        return Err(RhiError::UnsupportedLayoutTransition {
            old: image.layout(),
            new: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        });
    }

    let extent = image.extent();
    let mip_levels = image.mip_levels();
    let handle = image.handle();
    let plan = blit_plan(extent.width, extent.height, mip_levels);

    pool.submit_one_time(device.graphics_queue(), |cmd| {
        record_mip_chain(cmd, handle, mip_levels, &plan);
        Ok(())
    })?;

    image.assume_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    debug!(
        "Generated {} mip levels for {}x{} image",
        mip_levels, extent.width, extent.height
    );

    Ok(())
}

fn record_mip_chain(cmd: &CommandBuffer, image: vk::Image, mip_levels: u32, plan: &[MipBlit]) {
    for blit in plan {
        let src = blit.src_level;

        cmd.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            &[level_barrier(
                image,
                src,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::TRANSFER_READ,
            )],
        );

        cmd.blit_within(image, blit.to_vk(), vk::Filter::LINEAR);

        cmd.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &[level_barrier(
                image,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::SHADER_READ,
            )],
        );
    }

    // The last level was only ever a blit destination.
    cmd.pipeline_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        &[level_barrier(
            image,
            mip_levels - 1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
        )],
    );
}

fn level_barrier(
    image: vk::Image,
    level: u32,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .image(image)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(level)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
        .old_layout(old)
        .new_layout(new)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(512, 512), 10);
        assert_eq!(mip_level_count(1024, 768), 11);
        assert_eq!(mip_level_count(300, 200), 9);
        assert_eq!(mip_level_count(1, 4096), 13);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_mip_level_count_matches_log2() {
        for (w, h) in [(3, 5), (17, 9), (640, 480), (1920, 1080), (4097, 2)] {
            let expected = (w.max(h) as f64).log2().floor() as u32 + 1;
            assert_eq!(mip_level_count(w, h), expected, "{}x{}", w, h);
        }
    }

    #[test]
    fn test_mip_extent_clamps_to_one() {
        assert_eq!(mip_extent(1024, 256, 0), (1024, 256));
        assert_eq!(mip_extent(1024, 256, 3), (128, 32));
        assert_eq!(mip_extent(1024, 256, 9), (2, 1));
        assert_eq!(mip_extent(1024, 256, 10), (1, 1));
        assert_eq!(mip_extent(7, 3, 40), (1, 1));
    }

    #[test]
    fn test_blit_plan_non_power_of_two() {
        let levels = mip_level_count(300, 200);
        let plan = blit_plan(300, 200, levels);

        assert_eq!(plan.len() as u32, levels - 1);
        assert_eq!(plan[0].src_extent, (300, 200));
        assert_eq!(plan[0].dst_extent, (150, 100));
        assert_eq!(plan[1].dst_extent, (75, 50));
        assert_eq!(plan[2].dst_extent, (37, 25));

        let last = plan.last().unwrap();
        assert_eq!(last.dst_level(), levels - 1);
        assert_eq!(last.dst_extent, (1, 1));

        for pair in plan.windows(2) {
            assert_eq!(pair[0].dst_extent, pair[1].src_extent);
            assert_eq!(pair[0].dst_level(), pair[1].src_level);
        }
    }

    #[test]
    fn test_blit_plan_single_level_is_empty() {
        assert!(blit_plan(1, 1, 1).is_empty());
    }

    #[test]
    fn test_blit_regions() {
        let blit = MipBlit {
            src_level: 2,
            src_extent: (64, 32),
            dst_extent: (32, 16),
        }
        .to_vk();

        assert_eq!(blit.src_subresource.mip_level, 2);
        assert_eq!(blit.dst_subresource.mip_level, 3);
        assert_eq!(blit.src_offsets[1], vk::Offset3D { x: 64, y: 32, z: 1 });
        assert_eq!(blit.dst_offsets[1], vk::Offset3D { x: 32, y: 16, z: 1 });
    }

    #[test]
    fn test_check_blit_support() {
        let full = vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::BLIT_SRC
                | vk::FormatFeatureFlags::BLIT_DST
                | vk::FormatFeatureFlags::SAMPLED_IMAGE
                | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
            ..Default::default()
        };
        assert!(check_blit_support(vk::Format::R8G8B8A8_SRGB, &full).is_ok());

        let no_linear = vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::BLIT_SRC
                | vk::FormatFeatureFlags::BLIT_DST,
            linear_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
            ..Default::default()
        };
        assert!(matches!(
            check_blit_support(vk::Format::R8G8B8A8_SRGB, &no_linear),
            Err(RhiError::UnsupportedBlit(vk::Format::R8G8B8A8_SRGB))
        ));
    }
}
