//! Swap-chain manager.
//!
//! Owns everything whose size follows the surface: the swapchain with its
//! image views, the depth buffer, and one framebuffer per swapchain image.
//! All of it is torn down and rebuilt together.
//!
//! ```text
//! new ──► Ready ──recreate──► (block while size is 0) ──► negotiate ──► wait idle
//!                                                                        │
//!          Ready ◄── framebuffers ◄── depth ◄── swapchain ◄──────────────┘
//! ```
//!
//! The size wait and the negotiation live in [`next_config`], which needs no
//! device.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use vkframe_rhi::RhiResult;
use vkframe_rhi::command::CommandPool;
use vkframe_rhi::device::Device;
use vkframe_rhi::render_pass::{Framebuffer, RenderPass};
use vkframe_rhi::swapchain::{Swapchain, SwapchainConfig, SwapchainSupportDetails};

use crate::depth_buffer::DepthBuffer;
use crate::error::RendererResult;
use crate::frame_scheduler::{DrawableSurface, wait_for_drawable};

/// Parameters for the chain that replaces `current`.
///
/// Blocks until the surface has a non-zero size, then asks `query_support`
/// for the surface's capabilities at that size. Returns `None`, without
/// querying, if the surface closes while minimized.
///
/// # Errors
///
/// Returns an error if the query fails, the surface is inadequate, or it
/// would force a different surface format.
pub fn next_config<F>(
    surface: &mut dyn DrawableSurface,
    current: &SwapchainConfig,
    query_support: F,
) -> RendererResult<Option<SwapchainConfig>>
where
    F: FnOnce() -> RhiResult<SwapchainSupportDetails>,
{
    let Some((width, height)) = wait_for_drawable(surface) else {
        return Ok(None);
    };
    let support = query_support()?;
    Ok(Some(current.renegotiate(&support, width, height)?))
}

/// Swapchain plus the size-dependent attachments built on it.
pub struct SwapchainManager {
    device: Arc<Device>,
    // Field order is drop order: framebuffers reference the views below them.
    framebuffers: Vec<Framebuffer>,
    depth_buffer: DepthBuffer,
    swapchain: Swapchain,
    depth_format: vk::Format,
}

impl SwapchainManager {
    /// Builds the depth buffer and framebuffers for `swapchain`.
    ///
    /// `render_pass` must have been created for the swapchain's format and
    /// `depth_format`.
    ///
    /// # Errors
    ///
    /// Returns an error if any object creation fails.
    pub fn new(
        device: Arc<Device>,
        pool: &CommandPool,
        swapchain: Swapchain,
        render_pass: &RenderPass,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let depth_buffer =
            DepthBuffer::new(device.clone(), pool, swapchain.extent(), depth_format)?;
        let framebuffers =
            Self::create_framebuffers(&device, render_pass, &swapchain, &depth_buffer)?;

        Ok(Self {
            device,
            framebuffers,
            depth_buffer,
            swapchain,
            depth_format,
        })
    }

    fn create_framebuffers(
        device: &Arc<Device>,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
        depth_buffer: &DepthBuffer,
    ) -> RhiResult<Vec<Framebuffer>> {
        let extent = swapchain.extent();
        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    device.clone(),
                    render_pass,
                    &[view, depth_buffer.image_view()],
                    extent,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        debug!("Created {} framebuffers", framebuffers.len());
        Ok(framebuffers)
    }

    /// Rebuilds the chain for the surface's current drawable size.
    ///
    /// While the size is zero (minimized window) this blocks on platform
    /// events. If the platform closes during that wait, nothing is rebuilt.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface format would change, or if waiting
    /// for the device or any object creation fails.
    pub fn recreate(
        &mut self,
        pool: &CommandPool,
        render_pass: &RenderPass,
        surface: &mut dyn DrawableSurface,
    ) -> RendererResult<()> {
        let swapchain = &self.swapchain;
        let next = next_config(surface, swapchain.config(), || swapchain.query_support())?;
        let Some(config) = next else {
            info!("Window closing while minimized, skipping swapchain rebuild");
            return Ok(());
        };

        self.device.wait_idle()?;

        // Framebuffers go first; the swapchain handle stays alive as
        // old_swapchain for the new chain.
        self.framebuffers.clear();
        self.swapchain.rebuild(config)?;

        self.depth_buffer = DepthBuffer::new(
            self.device.clone(),
            pool,
            self.swapchain.extent(),
            self.depth_format,
        )?;
        self.framebuffers = Self::create_framebuffers(
            &self.device,
            render_pass,
            &self.swapchain,
            &self.depth_buffer,
        )?;

        let extent = self.swapchain.extent();
        info!(
            "Swapchain rebuilt: {}x{}, {} images",
            extent.width,
            extent.height,
            self.swapchain.image_count()
        );
        Ok(())
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.swapchain.format()
    }

    #[inline]
    pub fn depth_buffer(&self) -> &DepthBuffer {
        &self.depth_buffer
    }

    /// Framebuffer for swapchain image `image_index`.
    #[inline]
    pub fn framebuffer(&self, image_index: u32) -> Option<&Framebuffer> {
        self.framebuffers.get(image_index as usize)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use vkframe_rhi::RhiError;

    use super::*;
    use crate::error::RendererError;
    use crate::frame_scheduler::mock::MockSurface;

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    /// Resizable window surface with a fixed format list.
    fn window_support() -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![srgb(vk::Format::B8G8R8A8_SRGB)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    fn initial_config() -> SwapchainConfig {
        SwapchainConfig::negotiate(&window_support(), 640, 480).unwrap()
    }

    #[test]
    fn test_rebuilding_twice_at_same_size_gives_same_chain() {
        let mut surface = MockSurface::new(800, 600);

        let first = next_config(&mut surface, &initial_config(), || Ok(window_support()))
            .unwrap()
            .unwrap();
        let second = next_config(&mut surface, &first, || Ok(window_support()))
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            second.extent,
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        assert_eq!(second.image_count, 3);
        assert_eq!(second.surface_format, srgb(vk::Format::B8G8R8A8_SRGB));
        assert_eq!(surface.waits, 0);
    }

    #[test]
    fn test_minimized_surface_queries_after_restore() {
        let mut surface = MockSurface::new(0, 0);
        surface.pending_sizes.extend([(0, 0), (1280, 720)]);
        let queries = Cell::new(0);

        let config = next_config(&mut surface, &initial_config(), || {
            queries.set(queries.get() + 1);
            Ok(window_support())
        })
        .unwrap()
        .unwrap();

        assert_eq!(surface.waits, 2);
        assert_eq!(queries.get(), 1);
        assert_eq!(
            config.extent,
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn test_closing_while_minimized_builds_nothing() {
        let mut surface = MockSurface::new(0, 0);
        let queried = Cell::new(false);

        let config = next_config(&mut surface, &initial_config(), || {
            queried.set(true);
            Ok(window_support())
        })
        .unwrap();

        assert!(config.is_none());
        assert!(!queried.get());
        assert_eq!(surface.waits, 1);
    }

    #[test]
    fn test_format_change_on_rebuild_is_an_error() {
        let mut surface = MockSurface::new(800, 600);
        let mut support = window_support();
        support.formats = vec![srgb(vk::Format::R8G8B8A8_UNORM)];

        let result = next_config(&mut surface, &initial_config(), || Ok(support));

        assert!(matches!(
            result,
            Err(RendererError::Rhi(RhiError::SwapchainError(_)))
        ));
    }

    #[test]
    fn test_query_failure_propagates() {
        let mut surface = MockSurface::new(800, 600);

        let result = next_config(&mut surface, &initial_config(), || {
            Err(RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR))
        });

        assert!(matches!(
            result,
            Err(RendererError::Rhi(RhiError::VulkanError(
                vk::Result::ERROR_SURFACE_LOST_KHR
            )))
        ));
    }
}
