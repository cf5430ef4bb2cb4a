//! Command pools and command buffers.
//!
//! Two kinds of pool exist: the per-frame pool, whose buffers are reset and
//! re-recorded every frame, and the transient setup pool behind
//! [`CommandPool::submit_one_time`], which records, submits and waits in one
//! call. [`CommandBuffer`] exposes only the commands this renderer records.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::command::CommandPool;
//!
//! # fn example(device: Arc<Device>, src: vkframe_rhi::vk::Buffer, dst: vkframe_rhi::vk::Buffer)
//! #     -> Result<(), vkframe_rhi::RhiError> {
//! let pool = CommandPool::new_transient(device.clone(), device.graphics_family())?;
//!
//! // Record, submit and wait for a copy
//! pool.submit_one_time(device.graphics_queue(), |cmd| {
//!     cmd.copy_buffer(src, dst, &[vkframe_rhi::vk::BufferCopy::default().size(64)]);
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::sync::Fence;

/// What a pool's command buffers are used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolKind {
    /// Long-lived buffers, reset individually before each re-record.
    PerFrame,
    /// Short-lived buffers freed right after one submission.
    Transient,
}

impl PoolKind {
    fn create_flags(self) -> vk::CommandPoolCreateFlags {
        match self {
            PoolKind::PerFrame => vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            PoolKind::Transient => vk::CommandPoolCreateFlags::TRANSIENT,
        }
    }
}

/// Vulkan command pool wrapper.
///
/// Not thread-safe; all recording happens on the render thread.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    kind: PoolKind,
}

impl CommandPool {
    /// Creates a [`PoolKind::PerFrame`] pool.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        Self::of_kind(device, queue_family_index, PoolKind::PerFrame)
    }

    /// Creates a [`PoolKind::Transient`] pool.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new_transient(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        Self::of_kind(device, queue_family_index, PoolKind::Transient)
    }

    fn of_kind(device: Arc<Device>, queue_family_index: u32, kind: PoolKind) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(kind.create_flags());
        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        info!("{:?} command pool created on family {}", kind, queue_family_index);
        Ok(Self { device, pool, kind })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Allocates `count` primary command buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let handles = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        Ok(handles
            .into_iter()
            .map(|buffer| CommandBuffer {
                device: self.device.clone(),
                buffer,
            })
            .collect())
    }

    /// Records a buffer with `record`, submits it to `queue` and blocks until
    /// the GPU is done with it. Setup work only.
    ///
    /// # Errors
    ///
    /// Returns the first error from recording, submission or the wait.
    pub fn submit_one_time<F>(&self, queue: vk::Queue, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        let Some(cmd) = self.allocate_command_buffers(1)?.pop() else {
            return Err(RhiError::InvalidHandle(
                "Command pool returned no buffer".to_string(),
            ));
        };

        let outcome = cmd
            .record(record)
            .and_then(|()| self.submit_and_wait(&cmd, queue));

        // Freed on every path, including a failed record.
        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.pool, &[cmd.buffer]);
        }
        outcome
    }

    fn submit_and_wait(&self, cmd: &CommandBuffer, queue: vk::Queue) -> RhiResult<()> {
        let done = Fence::new(self.device.clone(), false)?;
        let buffers = [cmd.buffer];
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);

        unsafe {
            self.device
                .handle()
                .queue_submit(queue, std::slice::from_ref(&submit), done.handle())?;
        }
        done.wait_forever()?;

        debug!("Setup submission finished");
        Ok(())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_command_pool(self.pool, None) };
        info!("{:?} command pool destroyed", self.kind);
    }
}

/// A primary command buffer.
///
/// Does not free its handle; the owning [`CommandPool`] releases it.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    fn raw(&self) -> &ash::Device {
        self.device.handle()
    }

    /// Begins recording for a single submission.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.raw().begin_command_buffer(self.buffer, &begin_info)? };
        Ok(())
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.raw().end_command_buffer(self.buffer)? };
        Ok(())
    }

    /// `begin`, then `body`, then `end`; stops at the first error.
    pub fn record<F>(&self, body: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        self.begin()?;
        body(self)?;
        self.end()
    }

    /// Returns the buffer to the initial state. Needs a [`PoolKind::PerFrame`] pool.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.raw()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    /// Begins `render_pass` on `framebuffer` with inline contents.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);
        unsafe {
            self.raw()
                .cmd_begin_render_pass(self.buffer, &begin_info, vk::SubpassContents::INLINE)
        };
    }

    pub fn end_render_pass(&self) {
        unsafe { self.raw().cmd_end_render_pass(self.buffer) };
    }

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.raw()
                .cmd_bind_pipeline(self.buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    /// Binds `buffer` at binding 0, offset 0.
    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.raw().cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[0]) };
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer, index_type: vk::IndexType) {
        unsafe {
            self.raw()
                .cmd_bind_index_buffer(self.buffer, buffer, 0, index_type)
        };
    }

    /// Binds `set` as set 0 of a graphics pipeline layout.
    pub fn bind_graphics_descriptor_set(&self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.raw().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            )
        };
    }

    pub fn set_viewport(&self, viewport: vk::Viewport) {
        unsafe { self.raw().cmd_set_viewport(self.buffer, 0, &[viewport]) };
    }

    pub fn set_scissor(&self, scissor: vk::Rect2D) {
        unsafe { self.raw().cmd_set_scissor(self.buffer, 0, &[scissor]) };
    }

    /// One instance of `index_count` indices from the start of the index buffer.
    pub fn draw_indexed(&self, index_count: u32) {
        unsafe {
            self.raw()
                .cmd_draw_indexed(self.buffer, index_count, 1, 0, 0, 0)
        };
    }

    /// Image memory barriers between two stage sets.
    pub fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.raw().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                image_barriers,
            )
        };
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.raw().cmd_copy_buffer(self.buffer, src, dst, regions) };
    }

    /// Copies into `dst`, which must be in `TRANSFER_DST_OPTIMAL`.
    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.raw().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                regions,
            )
        };
    }

    /// Blits between two mip levels of the same image. The source level must
    /// be in `TRANSFER_SRC_OPTIMAL` and the destination in `TRANSFER_DST_OPTIMAL`.
    pub fn blit_within(&self, image: vk::Image, region: vk::ImageBlit, filter: vk::Filter) {
        unsafe {
            self.raw().cmd_blit_image(
                self.buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                filter,
            )
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_kind_flags() {
        assert_eq!(
            PoolKind::PerFrame.create_flags(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
        );
        assert_eq!(
            PoolKind::Transient.create_flags(),
            vk::CommandPoolCreateFlags::TRANSIENT
        );
    }

    #[test]
    fn test_command_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
        assert_send::<CommandPool>();
    }
}
