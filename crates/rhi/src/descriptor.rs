//! Descriptor layouts, pools and the per-frame set.
//!
//! Every frame slot owns one set with the same two bindings:
//!
//! | binding | type | stage |
//! |---|---|---|
//! | 0 | uniform buffer | vertex |
//! | 1 | combined image sampler | fragment |
//!
//! [`frame_bindings`], [`frame_pool_sizes`] and [`write_frame_set`] are all
//! derived from that one table, so they cannot disagree.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::descriptor::{self, DescriptorPool, DescriptorSetLayout};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let layout = DescriptorSetLayout::new(device.clone(), &descriptor::frame_bindings())?;
//! let pool = DescriptorPool::new(device.clone(), 2, &descriptor::frame_pool_sizes(2))?;
//! let sets = pool.allocate(&[layout.handle(); 2])?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Binding of the per-frame transform block.
pub const UNIFORM_BINDING: u32 = 0;
/// Binding of the texture and its sampler.
pub const TEXTURE_BINDING: u32 = 1;

/// `(binding, type, stage)` for each descriptor of a frame set.
const FRAME_SET: [(u32, vk::DescriptorType, vk::ShaderStageFlags); 2] = [
    (
        UNIFORM_BINDING,
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::ShaderStageFlags::VERTEX,
    ),
    (
        TEXTURE_BINDING,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        vk::ShaderStageFlags::FRAGMENT,
    ),
];

/// Immutable descriptor set layout.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };
        debug!("Descriptor set layout with {} binding(s)", bindings.len());
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None)
        };
    }
}

/// Fixed-capacity pool. Sets are never freed one by one; they go with the pool.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
        debug!("Descriptor pool for {} set(s)", max_sets);
        Ok(Self { device, pool })
    }

    /// One set per entry of `layouts`.
    ///
    /// # Errors
    ///
    /// Fails with `ERROR_OUT_OF_POOL_MEMORY` once the pool is exhausted.
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        Ok(unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None)
        };
    }
}

/// Layout bindings of a frame set, one descriptor each.
pub fn frame_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    FRAME_SET.map(|(binding, ty, stages)| {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(stages)
    })
}

/// Pool sizes for `frame_count` frame sets.
pub fn frame_pool_sizes(frame_count: u32) -> [vk::DescriptorPoolSize; 2] {
    FRAME_SET.map(|(_, ty, _)| {
        vk::DescriptorPoolSize::default()
            .ty(ty)
            .descriptor_count(frame_count)
    })
}

/// Points `set` at `uniform_range` bytes of `uniform_buffer` and at the
/// texture `view`, sampled through `sampler` in `SHADER_READ_ONLY_OPTIMAL`.
pub fn write_frame_set(
    device: &Device,
    set: vk::DescriptorSet,
    uniform_buffer: vk::Buffer,
    uniform_range: vk::DeviceSize,
    sampler: vk::Sampler,
    view: vk::ImageView,
) {
    let uniform = [vk::DescriptorBufferInfo {
        buffer: uniform_buffer,
        offset: 0,
        range: uniform_range,
    }];
    let texture = [vk::DescriptorImageInfo {
        sampler,
        image_view: view,
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }];

    let [uniform_slot, texture_slot] = FRAME_SET.map(|(binding, ty, _)| {
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(ty)
    });
    let writes = [
        uniform_slot.buffer_info(&uniform),
        texture_slot.image_info(&texture),
    ];

    unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
    debug!("Frame descriptor set {:?} written", set);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bindings() {
        let [uniform, texture] = frame_bindings();

        assert_eq!(uniform.binding, UNIFORM_BINDING);
        assert_eq!(uniform.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(uniform.stage_flags, vk::ShaderStageFlags::VERTEX);

        assert_eq!(texture.binding, TEXTURE_BINDING);
        assert_eq!(
            texture.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(texture.stage_flags, vk::ShaderStageFlags::FRAGMENT);

        assert!([uniform, texture].iter().all(|b| b.descriptor_count == 1));
    }

    #[test]
    fn test_frame_pool_sizes_scale_with_frame_count() {
        for frames in 1..=3 {
            let sizes = frame_pool_sizes(frames);
            assert!(sizes.iter().all(|s| s.descriptor_count == frames));
            assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
            assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        }
    }
}
