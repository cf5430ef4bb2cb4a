//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, and presentation.
//!
//! # Overview
//!
//! - [`SwapchainSupportDetails`] holds what the surface supports
//! - [`SwapchainConfig::negotiate`] turns that support plus the drawable size
//!   into the concrete chain parameters; it is pure, so the same inputs always
//!   give the same chain
//! - [`Swapchain`] owns the chain and one view per image, and is rebuilt
//!   wholesale by [`Swapchain::recreate`]
//! - [`AcquireOutcome`] and [`PresentOutcome`] report the stale-surface states
//!   as values, not errors
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::instance::Instance;
//! use vkframe_rhi::swapchain::{AcquireOutcome, Swapchain};
//! use vkframe_rhi::vk;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR,
//! #     image_available: vk::Semaphore) -> Result<(), vkframe_rhi::RhiError> {
//! let mut swapchain = Swapchain::new(instance, device, surface, 800, 600)?;
//!
//! match swapchain.acquire_next_image(image_available)? {
//!     AcquireOutcome::Ready { image_index, .. } => { /* record and present */ }
//!     AcquireOutcome::OutOfDate => swapchain.recreate(800, 600)?,
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::create_image_view;
use crate::instance::Instance;

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Concrete parameters of one swapchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    /// Picks format, present mode, extent and image count for a surface whose
    /// drawable area is `width` x `height`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] if the surface reports no formats
    /// or no present modes.
    pub fn negotiate(
        support: &SwapchainSupportDetails,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        Ok(Self {
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, width, height),
            image_count: determine_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }

    /// Negotiates the next chain for a rebuild.
    ///
    /// The render pass and pipeline were built for this chain's format, so a
    /// rebuild must keep it.
    ///
    /// # Errors
    ///
    /// Everything [`SwapchainConfig::negotiate`] rejects, and a
    /// [`RhiError::SwapchainError`] if the surface now yields another format.
    pub fn renegotiate(
        &self,
        support: &SwapchainSupportDetails,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let next = Self::negotiate(support, width, height)?;
        if next.surface_format != self.surface_format {
            return Err(RhiError::SwapchainError(format!(
                "Surface format changed from {:?}/{:?} to {:?}/{:?}; the render pass no longer matches",
                self.surface_format.format,
                self.surface_format.color_space,
                next.surface_format.format,
                next.surface_format.color_space
            )));
        }
        Ok(next)
    }
}

/// Result of asking the swapchain for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; `suboptimal` means it can still be rendered and
    /// presented, but the chain should be rebuilt afterwards.
    Ready { image_index: u32, suboptimal: bool },
    /// The chain no longer matches the surface and must be rebuilt before
    /// anything is rendered.
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the chain no longer matches the surface exactly.
    Suboptimal,
    /// Not presented; the chain must be rebuilt.
    OutOfDate,
}

impl PresentOutcome {
    /// True when the chain should be rebuilt after this present.
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// Vulkan swapchain wrapper.
///
/// Owns the chain and one view per image. Images are owned by the chain
/// itself and released with it.
///
/// # Thread Safety
///
/// The swapchain is driven from the render thread only.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    config: SwapchainConfig,
}

impl Swapchain {
    /// Creates a new swapchain for `surface` sized to the drawable area.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Surface queries fail
    /// - No suitable format or present mode is available
    /// - Swapchain creation fails
    /// - Image view creation fails
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support =
            SwapchainSupportDetails::query(&surface_loader, device.physical_device(), surface)?;
        let config = SwapchainConfig::negotiate(&support, width, height)?;

        Self::create_internal(
            device,
            swapchain_loader,
            surface_loader,
            surface,
            config,
            vk::SwapchainKHR::null(),
        )
    }

    fn create_internal(
        device: Arc<Device>,
        swapchain_loader: ash::khr::swapchain::Device,
        surface_loader: ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        config: SwapchainConfig,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        if config.extent.width == 0 || config.extent.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "Cannot create a {}x{} swapchain",
                config.extent.width, config.extent.height
            )));
        }

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            config.image_count
        );

        // Images cross queues only when presenting happens on another family.
        let families = [device.graphics_family(), device.present_family()];
        let shared = families[0] != families[1];
        if shared {
            debug!(
                "Graphics family {} and present family {} share swapchain images",
                families[0], families[1]
            );
        }
        let (sharing_mode, sharing_families): (_, &[u32]) = if shared {
            (vk::SharingMode::CONCURRENT, &families[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(sharing_families)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };
        info!("Swapchain created with {} images", images.len());

        // Views are pushed into `this` one by one so Drop cleans up a partial set.
        let mut this = Self {
            device,
            swapchain_loader,
            surface_loader,
            surface,
            swapchain,
            images,
            image_views: Vec::new(),
            config,
        };

        for &image in &this.images {
            let view = create_image_view(
                &this.device,
                image,
                this.config.surface_format.format,
                vk::ImageAspectFlags::COLOR,
                1,
            )?;
            this.image_views.push(view);
        }

        debug!("Created {} swapchain image views", this.image_views.len());
        Ok(this)
    }

    /// Current surface support, for negotiating the next chain.
    pub fn query_support(&self) -> RhiResult<SwapchainSupportDetails> {
        SwapchainSupportDetails::query(
            &self.surface_loader,
            self.device.physical_device(),
            self.surface,
        )
    }

    /// Replaces the chain with a new one for a `width` x `height` drawable,
    /// keeping the surface format.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface query fails, the format would change,
    /// or [`Swapchain::rebuild`] fails.
    pub fn recreate(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let config = self.config.renegotiate(&self.query_support()?, width, height)?;
        self.rebuild(config)
    }

    /// Replaces the chain with one created from `config`.
    ///
    /// The old chain is passed as `oldSwapchain` and destroyed, with its
    /// views, once the new one exists.
    ///
    /// The caller must ensure no submitted work still references the old
    /// images (wait for the device to go idle first).
    ///
    /// # Errors
    ///
    /// Returns an error if creating the new chain fails; the old chain is
    /// kept in that case.
    pub fn rebuild(&mut self, config: SwapchainConfig) -> RhiResult<()> {
        info!(
            "Recreating swapchain for new size: {}x{}",
            config.extent.width, config.extent.height
        );

        let new_swapchain = Self::create_internal(
            self.device.clone(),
            self.swapchain_loader.clone(),
            self.surface_loader.clone(),
            self.surface,
            config,
            self.swapchain,
        )?;

        drop(std::mem::replace(self, new_swapchain));
        Ok(())
    }

    /// Acquires the next image, signaling `semaphore` once it is ready.
    ///
    /// # Errors
    ///
    /// Any result other than success, suboptimal or out-of-date is returned
    /// as an error.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    debug!("Acquired image {} from a suboptimal swapchain", image_index);
                }
                Ok(AcquireOutcome::Ready {
                    image_index,
                    suboptimal,
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                warn!("Swapchain out of date during acquire");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Presents `image_index` on `queue` after `wait_semaphore` is signaled.
    ///
    /// # Errors
    ///
    /// Any result other than success, suboptimal or out-of-date is returned
    /// as an error.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.config.surface_format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    /// Number of images the driver actually created.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn destroy_image_views(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.config.extent.width,
            self.config.extent.height,
            self.images.len()
        );
    }
}

/// Surface formats in order of preference, all in the sRGB nonlinear space.
const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM];

/// First entry of [`PREFERRED_FORMATS`] the surface offers, else the
/// surface's own first entry.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = PREFERRED_FORMATS.iter().find_map(|&wanted| {
        formats
            .iter()
            .find(|f| f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    });

    match (preferred, formats.first()) {
        (Some(format), _) => format,
        (None, Some(&first)) => {
            warn!("No preferred surface format offered, using {:?}", first.format);
            first
        }
        // Unreachable after `is_adequate`; keep a sane value anyway.
        (None, None) => vk::SurfaceFormatKHR {
            format: PREFERRED_FORMATS[1],
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
    }
}

/// MAILBOX when offered, else FIFO (always supported).
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// A fixed `current_extent` wins; the `u32::MAX` sentinel means the drawable
/// size decides, clamped to the supported range.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    let current = capabilities.current_extent;
    if current.width != u32::MAX {
        return current;
    }

    let (min, max) = (capabilities.min_image_extent, capabilities.max_image_extent);
    vk::Extent2D {
        width: width.clamp(min.width, max.width),
        height: height.clamp(min.height, max.height),
    }
}

/// Minimum plus one, capped by the maximum; a maximum of 0 means no cap.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    match capabilities.max_image_count {
        0 => wanted,
        max => wanted.min(max),
    }
}
