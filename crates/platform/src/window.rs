//! winit window and Vulkan surface.
//!
//! Resize events are not pushed into the renderer. The event loop records
//! them on the [`Window`] and the frame loop polls [`Window::take_resized`]
//! once per frame.

use std::ffi::{CStr, c_char};

use ash::vk;
use raw_window_handle::{DisplayHandle, HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use vkframe_core::{Error, Result};

/// Owned `VkSurfaceKHR`.
///
/// Must be dropped after every swapchain built on it and before the
/// instance it came from.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for capability, format and present-mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: created from the loader's instance; destroyed only here.
        unsafe { self.loader.destroy_surface(self.handle, None) };
        debug!("Vulkan surface destroyed");
    }
}

/// A window plus the resize state the frame loop polls.
pub struct Window {
    window: WinitWindow,
    size: (u32, u32),
    resized: bool,
}

impl Window {
    /// Opens a resizable window with the given inner size in physical pixels.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);
        let window = event_loop
            .create_window(attributes)
            .map_err(|e| Error::Window(e.to_string()))?;

        let PhysicalSize { width, height } = window.inner_size();
        info!("Window '{}' opened at {}x{}", title, width, height);

        Ok(Self {
            window,
            size: (width, height),
            resized: false,
        })
    }

    /// Records a resize. The flag stays raised until [`Self::take_resized`].
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        if self.size != (width, height) {
            debug!("Drawable size now {}x{}", width, height);
        }
        self.size = (width, height);
        self.resized = true;
    }

    /// Returns and clears the resize flag.
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    /// Size in pixels as of the last resize event; `(0, 0)` while minimized.
    pub fn drawable_size(&self) -> (u32, u32) {
        self.size
    }

    fn display(&self) -> Result<DisplayHandle<'_>> {
        self.window
            .display_handle()
            .map_err(|e| Error::Window(format!("No display handle: {}", e)))
    }

    /// Instance extensions a surface for this window needs. The pointers are
    /// static strings owned by `ash-window`.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let extensions = ash_window::enumerate_required_extensions(self.display()?.as_raw())
            .map_err(|e| Error::Vulkan(format!("Unsupported display for Vulkan: {}", e)))?;

        for &name in extensions {
            // SAFETY: ash-window returns NUL-terminated static strings.
            debug!("Surface extension {:?}", unsafe { CStr::from_ptr(name) });
        }
        Ok(extensions.to_vec())
    }

    /// Creates the Vulkan surface for this window.
    ///
    /// # Errors
    ///
    /// Fails if the window or display handle is unavailable, or if
    /// `vkCreate*SurfaceKHR` fails.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display = self.display()?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("No window handle: {}", e)))?;

        // SAFETY: entry and instance are live and the handles belong to a live
        // window. Surface::drop destroys the result.
        let handle = unsafe {
            ash_window::create_surface(entry, instance, display.as_raw(), window.as_raw(), None)
        }
        .map_err(|e| Error::Vulkan(format!("Surface creation failed: {}", e)))?;

        info!("Vulkan surface created");
        Ok(Surface {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }
}
