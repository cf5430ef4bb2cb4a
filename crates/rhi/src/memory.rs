//! Device memory selection and allocation.
//!
//! Every buffer and image receives its own dedicated allocation, bound at
//! offset 0. Memory type selection walks the device's memory types in order
//! and takes the first one allowed by the resource's type bits whose property
//! flags contain the requested properties. The allocator is then handed only
//! that type, so its own location preferences cannot pick a different one.

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Memory visibility of a buffer or image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryVisibility {
    /// Only the GPU can access the memory.
    DeviceLocal,
    /// The CPU can map and write the memory without explicit flushes.
    HostVisibleCoherent,
    /// CPU-mapped memory meant for reading results back from the GPU.
    HostReadback,
}

impl MemoryVisibility {
    /// Property flags a memory type must contain.
    pub fn required_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            MemoryVisibility::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryVisibility::HostVisibleCoherent | MemoryVisibility::HostReadback => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    /// The gpu-allocator location that maps to these properties.
    pub fn location(self) -> MemoryLocation {
        match self {
            MemoryVisibility::DeviceLocal => MemoryLocation::GpuOnly,
            MemoryVisibility::HostVisibleCoherent => MemoryLocation::CpuToGpu,
            MemoryVisibility::HostReadback => MemoryLocation::GpuToCpu,
        }
    }
}

/// Finds the first memory type allowed by `type_bits` with all `properties`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableMemoryType`] if no memory type matches.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> RhiResult<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(i, memory_type)| {
            type_bits & (1 << i) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(i, _)| i as u32)
        .ok_or(RhiError::NoSuitableMemoryType {
            type_bits,
            properties,
        })
}

/// Narrows `requirements` to the single memory type `index`.
///
/// gpu-allocator ranks types by [`MemoryLocation`] and may prefer a later one
/// (`CpuToGpu` favors device-local host memory). With one bit left, its
/// fallback search lands on `index`, whose flags contain what every location
/// requires.
pub fn pin_memory_type(mut requirements: vk::MemoryRequirements, index: u32) -> vk::MemoryRequirements {
    requirements.memory_type_bits = 1 << index;
    requirements
}

/// The resource a dedicated allocation is created for.
#[derive(Clone, Copy, Debug)]
pub enum DedicatedTarget {
    Buffer(vk::Buffer),
    Image(vk::Image),
}

/// Allocates and binds a dedicated allocation for a buffer or image.
///
/// The memory type comes from [`find_memory_type`]; a capability mismatch
/// surfaces as [`RhiError::NoSuitableMemoryType`] instead of a generic
/// allocator error.
pub fn allocate_and_bind(
    device: &Device,
    target: DedicatedTarget,
    visibility: MemoryVisibility,
    name: &str,
) -> RhiResult<Allocation> {
    let (requirements, scheme, linear) = match target {
        DedicatedTarget::Buffer(buffer) => (
            unsafe { device.handle().get_buffer_memory_requirements(buffer) },
            AllocationScheme::DedicatedBuffer(buffer),
            true,
        ),
        DedicatedTarget::Image(image) => (
            unsafe { device.handle().get_image_memory_requirements(image) },
            AllocationScheme::DedicatedImage(image),
            false,
        ),
    };

    let memory_type_index = find_memory_type(
        device.memory_properties(),
        requirements.memory_type_bits,
        visibility.required_flags(),
    )?;

    let allocation = device.allocator()?.allocate(&AllocationCreateDesc {
        name,
        requirements: pin_memory_type(requirements, memory_type_index),
        location: visibility.location(),
        linear,
        allocation_scheme: scheme,
    })?;

    let bound = unsafe {
        match target {
            DedicatedTarget::Buffer(buffer) => {
                device
                    .handle()
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            }
            DedicatedTarget::Image(image) => {
                device
                    .handle()
                    .bind_image_memory(image, allocation.memory(), allocation.offset())
            }
        }
    };

    if let Err(e) = bound {
        free(device, allocation);
        return Err(e.into());
    }

    debug!(
        "Allocated {} bytes for '{}' (memory type {}, {:?}, offset {})",
        requirements.size,
        name,
        memory_type_index,
        allocation.memory_properties(),
        allocation.offset()
    );

    Ok(allocation)
}

/// Returns an allocation to the allocator, logging failures.
pub fn free(device: &Device, allocation: Allocation) {
    match device.allocator() {
        Ok(mut allocator) => {
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free allocation: {:?}", e);
            }
        }
        Err(e) => tracing::error!("Leaking allocation: {}", e),
    }
}
