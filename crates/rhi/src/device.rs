//! Logical device, queues and the GPU memory allocator.
//!
//! A [`Device`] is created once from the selected physical device and shared
//! through `Arc` by every resource that has to destroy itself. It also owns
//! the gpu-allocator instance, so memory blocks are released before the
//! device that backs them.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::instance::{Instance, InstanceDesc};
//! use vkframe_rhi::physical_device::{SelectionStrategy, select_physical_device};
//!
//! let instance = Instance::new(&InstanceDesc::default()).expect("Failed to create instance");
//! let physical_device_info =
//!     select_physical_device(instance.handle(), None, SelectionStrategy::FirstSuitable)
//!         .expect("No suitable GPU found");
//!
//! let device = Device::new(&instance, &physical_device_info, false)
//!     .expect("Failed to create logical device");
//!
//! let graphics_queue = device.graphics_queue();
//! ```

use std::ffi::c_char;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::RhiError;
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, REQUIRED_DEVICE_EXTENSIONS};

/// Queue 0 of the graphics and present families, which may coincide.
#[derive(Clone, Copy, Debug)]
struct Queues {
    graphics_family: u32,
    present_family: u32,
    graphics: vk::Queue,
    present: vk::Queue,
}

/// Priority list for one queue per family.
const QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Logical device shared across the renderer.
///
/// The allocator sits behind a `Mutex`; everything else is immutable after
/// creation.
pub struct Device {
    /// Instance dispatch table, for physical-device queries.
    instance: ash::Instance,
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    limits: vk::PhysicalDeviceLimits,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Dropped by hand before `vkDestroyDevice`.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    queues: Queues,
}

impl Device {
    /// Creates the logical device, fetches its queues and sets up the allocator.
    ///
    /// `enable_swapchain` turns on `VK_KHR_swapchain`; headless devices leave it off.
    /// Sampler anisotropy is always enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The queue family indices are incomplete
    /// - Device creation fails
    /// - Allocator initialization fails
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
        enable_swapchain: bool,
    ) -> Result<Arc<Self>, RhiError> {
        let families = physical_device_info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (families.graphics_family, families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let queue_infos: Vec<_> = families
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&QUEUE_PRIORITIES)
            })
            .collect();
        let extensions: Vec<*const c_char> = if enable_swapchain {
            REQUIRED_DEVICE_EXTENSIONS.map(|name| name.as_ptr()).to_vec()
        } else {
            Vec::new()
        };
        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);
        let physical_device = physical_device_info.device;
        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device, &create_info, None)?
        };

        let queues = unsafe {
            Queues {
                graphics_family,
                present_family,
                graphics: device.get_device_queue(graphics_family, 0),
                present: device.get_device_queue(present_family, 0),
            }
        };
        info!(
            "Logical device created: {} queue famil{}, {} extension(s)",
            queue_infos.len(),
            if queue_infos.len() == 1 { "y" } else { "ies" },
            extensions.len()
        );
        debug!("{:?}", queues);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };
        debug!("gpu-allocator ready");

        Ok(Arc::new(Self {
            instance: instance.handle().clone(),
            device,
            physical_device,
            limits: physical_device_info.properties.limits,
            memory_properties: physical_device_info.memory_properties,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queues,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Format features the physical device supports for `format`.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.queues.graphics
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.queues.present
    }

    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.queues.graphics_family
    }

    /// Same as [`Device::graphics_family`] on headless devices.
    #[inline]
    pub fn present_family(&self) -> u32 {
        self.queues.present_family
    }

    /// Locks the GPU memory allocator.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::AllocatorPoisoned`] if another thread panicked while
    /// holding the lock.
    pub fn allocator(&self) -> Result<MutexGuard<'_, Allocator>, RhiError> {
        self.allocator.lock().map_err(|_| RhiError::AllocatorPoisoned)
    }

    /// Blocks until every queue is idle.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits to the graphics queue, signaling `fence` (may be null) when done.
    ///
    /// # Safety
    ///
    /// Every command buffer in `submit_infos` must be fully recorded, and a
    /// non-null `fence` must be unsignaled and not part of another submission.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device
                .queue_submit(self.queues.graphics, submit_infos, fence)?
        };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Device not idle at teardown: {:?}", e);
            }
            // Allocator blocks are freed through the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// ash dispatch tables are Send + Sync, handles are plain integers, and the
// allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
