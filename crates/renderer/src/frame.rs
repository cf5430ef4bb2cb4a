//! Per-slot frame resources.
//!
//! Each frame in flight owns a command buffer, its synchronization objects, a
//! uniform buffer and a descriptor set pointing at that buffer. Nothing here
//! is shared between slots, so a slot can be re-recorded as soon as its fence
//! has signaled.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vkframe_rhi::RhiResult;
use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::device::Device;
use vkframe_rhi::sync::FrameSync;

use crate::ubo::UniformBufferObject;

/// Resources exclusively owned by one frame slot.
pub struct FrameSlot {
    command_buffer: CommandBuffer,
    sync: FrameSync,
    uniform_buffer: Buffer,
    descriptor_set: vk::DescriptorSet,
}

impl FrameSlot {
    /// Creates the slot's sync objects and uniform buffer around an already
    /// allocated command buffer and descriptor set.
    ///
    /// The in-flight fence starts signaled so the first wait returns at once.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore, fence or buffer creation fails.
    pub fn new(
        device: Arc<Device>,
        command_buffer: CommandBuffer,
        descriptor_set: vk::DescriptorSet,
    ) -> RhiResult<Self> {
        let sync = FrameSync::new(device.clone())?;
        let uniform_buffer = Buffer::new(
            device,
            BufferUsage::Uniform,
            UniformBufferObject::SIZE as vk::DeviceSize,
        )?;

        debug!("Created frame slot");

        Ok(Self {
            command_buffer,
            sync,
            uniform_buffer,
            descriptor_set,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn command_buffer_mut(&mut self) -> &mut CommandBuffer {
        &mut self.command_buffer
    }

    #[inline]
    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }

    #[inline]
    pub fn uniform_buffer(&self) -> &Buffer {
        &self.uniform_buffer
    }

    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Copies `ubo` into the slot's mapped uniform buffer.
    ///
    /// Only valid once the slot's fence has signaled.
    pub fn write_uniforms(&self, ubo: &UniformBufferObject) -> RhiResult<()> {
        self.uniform_buffer.write_data(0, bytemuck::bytes_of(ubo))
    }
}
