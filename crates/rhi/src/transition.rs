//! Image layout transitions.
//!
//! A transition is keyed by its (old, new) layout pair. Each supported pair
//! maps to a fixed set of access masks and pipeline stages; the table is
//! closed and any other pair is rejected with
//! [`RhiError::UnsupportedLayoutTransition`].
//!
//! | old | new | src access | dst access | src stage | dst stage |
//! |---|---|---|---|---|---|
//! | `UNDEFINED` | `TRANSFER_DST_OPTIMAL` | none | transfer write | top of pipe | transfer |
//! | `TRANSFER_DST_OPTIMAL` | `SHADER_READ_ONLY_OPTIMAL` | transfer write | shader read | transfer | fragment shader |
//! | `UNDEFINED` | `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` | none | depth/stencil read+write | top of pipe | early fragment tests |

use ash::vk;

use crate::command::CommandBuffer;
use crate::error::{RhiError, RhiResult};

/// Access masks and stages a transition barrier is recorded with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Looks up the barrier parameters for an (old, new) layout pair.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedLayoutTransition`] for pairs outside the table.
pub fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<TransitionMasks> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            })
        }
        _ => Err(RhiError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Returns true if the depth format also carries a stencil component.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Aspect mask a barrier into `new` must cover for an image of `format`.
pub fn aspect_mask_for(format: vk::Format, new: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Records the barrier for an (old, new) transition over `level_count` mip
/// levels starting at level 0.
///
/// Nothing is recorded when the pair is unsupported.
pub fn record_transition(
    cmd: &CommandBuffer,
    image: vk::Image,
    format: vk::Format,
    level_count: u32,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<()> {
    let masks = transition_masks(old, new)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_mask_for(format, new))
                .base_mip_level(0)
                .level_count(level_count)
                .base_array_layer(0)
                .layer_count(1),
        )
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    cmd.pipeline_barrier(masks.src_stage, masks.dst_stage, &[barrier]);

    Ok(())
}
