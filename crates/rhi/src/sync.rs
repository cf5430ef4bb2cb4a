//! Semaphores and fences.
//!
//! Semaphores order GPU work against GPU work (acquire, submit, present);
//! fences let the host wait for GPU work. [`FrameSync`] groups the three
//! objects a frame slot needs.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//!
//! // Signaled so the first wait returns immediately
//! let in_flight_fence = Fence::new(device.clone(), true)?;
//! in_flight_fence.wait_forever()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::trace;

use crate::device::Device;
use crate::error::RhiResult;

/// Binary semaphore, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let semaphore = unsafe {
            device
                .handle()
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        trace!("Semaphore {:?} created", semaphore);
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_semaphore(self.semaphore, None) };
    }
}

/// Host-visible completion signal for a queue submission.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence; `signaled` fences satisfy the first wait at once.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let mut flags = vk::FenceCreateFlags::empty();
        if signaled {
            flags |= vk::FenceCreateFlags::SIGNALED;
        }
        let fence = unsafe {
            device
                .handle()
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?
        };
        trace!("Fence {:?} created (signaled: {})", fence, signaled);
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits up to `timeout_ns` nanoseconds.
    ///
    /// # Errors
    ///
    /// An expired timeout surfaces as `vk::Result::TIMEOUT`.
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout_ns)?
        };
        Ok(())
    }

    pub fn wait_forever(&self) -> RhiResult<()> {
        self.wait(u64::MAX)
    }

    /// Back to unsignaled. The fence must not belong to a pending submission.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }

    /// Polls without blocking; a failed query counts as unsignaled.
    pub fn is_signaled(&self) -> bool {
        unsafe { self.device.handle().get_fence_status(self.fence) }.unwrap_or(false)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_fence(self.fence, None) };
    }
}

/// Synchronization objects owned by one frame slot.
///
/// ```text
/// wait(in_flight) -> acquire(signal image_available) -> reset(in_flight)
///   -> submit(wait image_available @ COLOR_ATTACHMENT_OUTPUT,
///             signal render_finished + in_flight)
///   -> present(wait render_finished)
/// ```
///
/// The fence is reset only after a successful acquire, so an out-of-date
/// acquire never leaves the slot waiting on a fence nobody will signal.
pub struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSync {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
        })
    }

    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available.handle()
    }

    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }

    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_objects_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
