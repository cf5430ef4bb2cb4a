//! Render pass and framebuffer management.
//!
//! The renderer uses one render pass with two attachments and a single
//! subpass:
//!
//! | attachment | load | store | final layout |
//! |---|---|---|---|
//! | 0 color (swapchain format) | clear | store | `PRESENT_SRC_KHR` |
//! | 1 depth | clear | don't care | `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` |
//!
//! The external-to-subpass dependency makes this frame's color and depth
//! writes wait until earlier use of the same attachments at the
//! color-output and early-fragment-test stages has finished.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::render_pass::{RenderPass, RenderPassDesc};
//! use vkframe_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let render_pass = RenderPass::new(
//!     device,
//!     RenderPassDesc::new(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiResult;

/// Color the color attachment is cleared to.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
/// Depth the depth attachment is cleared to (far plane).
pub const CLEAR_DEPTH: f32 = 1.0;

/// Clear values in attachment order.
pub fn clear_values() -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: CLEAR_DEPTH,
                stencil: 0,
            },
        },
    ]
}

/// Formats the render pass is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
}

impl RenderPassDesc {
    pub fn new(color_format: vk::Format, depth_format: vk::Format) -> Self {
        Self {
            color_format,
            depth_format,
        }
    }

    /// Attachment descriptions: color at index 0, depth at index 1.
    pub fn attachments(&self) -> [vk::AttachmentDescription; 2] {
        [
            vk::AttachmentDescription::default()
                .format(self.color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            vk::AttachmentDescription::default()
                .format(self.depth_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ]
    }

    /// The single external -> subpass 0 dependency.
    pub fn dependency(&self) -> vk::SubpassDependency {
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;

        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
    }
}

/// Vulkan render pass wrapper. Built once, never modified.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    desc: RenderPassDesc,
}

impl RenderPass {
    /// Creates the render pass described by `desc`.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new(device: Arc<Device>, desc: RenderPassDesc) -> RhiResult<Self> {
        let attachments = desc.attachments();

        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];

        let dependencies = [desc.dependency()];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        info!(
            "Render pass created (color {:?}, depth {:?})",
            desc.color_format, desc.depth_format
        );

        Ok(Self {
            device,
            render_pass,
            desc,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        info!("Render pass destroyed");
    }
}

/// Framebuffer binding one swapchain view and the depth view to a render pass.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Creates a framebuffer whose attachments are `views`, in render pass
    /// attachment order.
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };

        debug!(
            "Created framebuffer {}x{}",
            extent.width, extent.height
        );

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
        debug!("Destroyed framebuffer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> RenderPassDesc {
        RenderPassDesc::new(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT)
    }

    #[test]
    fn test_color_attachment() {
        let [color, _] = desc().attachments();
        assert_eq!(color.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(color.samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn test_depth_attachment() {
        let [_, depth] = desc().attachments();
        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_external_dependency() {
        let dep = desc().dependency();
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;

        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert_eq!(dep.src_stage_mask, stages);
        assert_eq!(dep.dst_stage_mask, stages);
        assert_eq!(dep.src_access_mask, vk::AccessFlags::empty());
        assert_eq!(
            dep.dst_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
    }

    #[test]
    fn test_clear_values() {
        let [color, depth] = clear_values();
        unsafe {
            assert_eq!(color.color.float32, [0.0, 0.0, 0.0, 1.0]);
            assert_eq!(depth.depth_stencil.depth, 1.0);
            assert_eq!(depth.depth_stencil.stencil, 0);
        }
    }
}
