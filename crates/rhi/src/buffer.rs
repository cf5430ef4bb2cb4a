//! GPU buffer management.
//!
//! This module handles vertex, index, uniform, staging and readback buffers.
//! Every buffer owns one dedicated allocation (see [`crate::memory`]).
//!
//! # Overview
//!
//! - [`BufferUsage`] defines how a buffer will be used and where its memory lives
//! - [`Buffer`] wraps VkBuffer with its allocation
//! - [`Buffer::new_device_local`] runs the staging upload path: host-visible
//!   staging buffer, copy on the GPU, staging buffer destroyed before returning
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::buffer::{Buffer, BufferUsage};
//! use vkframe_rhi::command::CommandPool;
//! use vkframe_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), vkframe_rhi::RhiError> {
//! let indices: [u32; 3] = [0, 1, 2];
//! let index_buffer = Buffer::new_device_local(
//!     device,
//!     pool,
//!     BufferUsage::Index,
//!     bytemuck::cast_slice(&indices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::{self, DedicatedTarget, MemoryVisibility};

/// What a buffer is for; decides its usage flags and where its memory lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex input, filled through a staging copy
    Vertex,
    /// Index input, filled through a staging copy
    Index,
    /// Persistently mapped, rewritten by the CPU every frame
    Uniform,
    /// Host-written transfer source
    Staging,
    /// Transfer destination the host reads back
    Readback,
}

impl BufferUsage {
    /// Usage flags. Mesh buffers are also transfer sources so they can be
    /// read back for inspection.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        use vk::BufferUsageFlags as F;
        let mesh_transfer = F::TRANSFER_DST | F::TRANSFER_SRC;
        match self {
            BufferUsage::Vertex => F::VERTEX_BUFFER | mesh_transfer,
            BufferUsage::Index => F::INDEX_BUFFER | mesh_transfer,
            BufferUsage::Uniform => F::UNIFORM_BUFFER,
            BufferUsage::Staging => F::TRANSFER_SRC,
            BufferUsage::Readback => F::TRANSFER_DST,
        }
    }

    pub fn visibility(self) -> MemoryVisibility {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryVisibility::DeviceLocal,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryVisibility::HostVisibleCoherent,
            BufferUsage::Readback => MemoryVisibility::HostReadback,
        }
    }

    /// Lowercase label used in logs and allocation names.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
            BufferUsage::Readback => "readback",
        }
    }
}

/// Byte range `offset..offset + len` if it fits in a buffer of `size` bytes.
fn checked_range(
    size: vk::DeviceSize,
    offset: vk::DeviceSize,
    len: usize,
) -> RhiResult<std::ops::Range<usize>> {
    let end = offset.checked_add(len as vk::DeviceSize);
    match end {
        Some(end) if end <= size => Ok(offset as usize..end as usize),
        _ => Err(RhiError::InvalidHandle(format!(
            "Write of {} byte(s) at offset {} overruns a {}-byte buffer",
            len, offset, size
        ))),
    }
}

/// GPU buffer with a dedicated memory allocation.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a new buffer with the specified size.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero, or if buffer creation or memory
    /// allocation fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let allocation = match memory::allocate_and_bind(
            &device,
            DedicatedTarget::Buffer(buffer),
            usage.visibility(),
            usage.name(),
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a host-visible buffer and writes `data` into it.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation fails or the memory is not mapped.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Creates a device-local buffer filled with `data` through a staging copy.
    ///
    /// The staging buffer lives only for the duration of this call; the copy
    /// is submitted on the graphics queue and awaited before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if any allocation, the copy submission, or the wait fails.
    pub fn new_device_local(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let staging = Self::new_with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::new(device.clone(), usage, staging.size())?;

        let region = vk::BufferCopy::default().size(staging.size());
        pool.submit_one_time(device.graphics_queue(), |cmd| {
            cmd.copy_buffer(staging.handle(), buffer.handle(), &[region]);
            Ok(())
        })?;

        Ok(buffer)
    }

    /// Writes data to the buffer at the specified offset.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The buffer memory is not mapped
    /// - The write would exceed the buffer size
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let range = checked_range(self.size, offset, data.len())?;
        let dst = self.mapped_ptr()?;
        // SAFETY: the mapping covers `size` bytes and `range` lies within it.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst.add(range.start), range.len());
        }

        Ok(())
    }

    /// Copies the whole buffer contents into a new vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer memory is not mapped.
    pub fn read_data(&self) -> RhiResult<Vec<u8>> {
        let src = self.mapped_ptr()?;
        let mut out = vec![0u8; self.size as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(src.cast_const(), out.as_mut_ptr(), out.len());
        }
        Ok(out)
    }

    fn mapped_ptr(&self) -> RhiResult<*mut u8> {
        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;

        allocation
            .mapped_ptr()
            .map(|ptr| ptr.as_ptr().cast::<u8>())
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Free allocation first, then destroy buffer
        if let Some(allocation) = self.allocation.take() {
            memory::free(&self.device, allocation);
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_table() {
        use vk::BufferUsageFlags as F;
        let cases = [
            (BufferUsage::Vertex, F::VERTEX_BUFFER | F::TRANSFER_DST, MemoryVisibility::DeviceLocal),
            (BufferUsage::Index, F::INDEX_BUFFER | F::TRANSFER_DST, MemoryVisibility::DeviceLocal),
            (BufferUsage::Uniform, F::UNIFORM_BUFFER, MemoryVisibility::HostVisibleCoherent),
            (BufferUsage::Staging, F::TRANSFER_SRC, MemoryVisibility::HostVisibleCoherent),
            (BufferUsage::Readback, F::TRANSFER_DST, MemoryVisibility::HostReadback),
        ];
        for (usage, flags, visibility) in cases {
            assert!(usage.to_vk_usage().contains(flags), "{:?}", usage);
            assert_eq!(usage.visibility(), visibility, "{:?}", usage);
        }
        assert_eq!(BufferUsage::Staging.to_vk_usage(), F::TRANSFER_SRC);
        assert_eq!(BufferUsage::Uniform.name(), "uniform");
    }

    #[test]
    fn test_checked_range() {
        assert_eq!(checked_range(192, 0, 192).unwrap(), 0..192);
        assert_eq!(checked_range(192, 64, 128).unwrap(), 64..192);
        assert!(checked_range(192, 64, 129).is_err());
        assert!(checked_range(16, u64::MAX, 1).is_err());
    }
}
