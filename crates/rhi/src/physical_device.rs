//! Physical device (GPU) selection.
//!
//! # Overview
//!
//! The physical device selection process involves:
//! 1. Enumerating all available GPUs
//! 2. Checking each GPU for the graphics queue, the present queue, the
//!    swapchain extension, adequate surface support and sampler anisotropy
//! 3. Taking the first suitable GPU, or the highest-rated one when
//!    [`SelectionStrategy::HighestScore`] is requested
//!
//! Passing no surface selects a device for headless use (uploads, readbacks);
//! the present family then aliases the graphics family.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::instance::{Instance, InstanceDesc};
//! use vkframe_rhi::physical_device::{SelectionStrategy, select_physical_device};
//!
//! let instance = Instance::new(&InstanceDesc::default()).expect("Failed to create instance");
//! let device_info =
//!     select_physical_device(instance.handle(), None, SelectionStrategy::FirstSuitable)
//!         .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {:?}", device_info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions every selected GPU must expose when presenting.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// How to choose among several suitable GPUs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Enumeration order, first match wins.
    #[default]
    FirstSuitable,
    /// Highest [`rate_device`] score wins; ties keep enumeration order.
    HighestScore,
}

/// Surface a selected device must be able to present to.
#[derive(Clone, Copy)]
pub struct SurfaceTarget<'a> {
    pub surface: vk::SurfaceKHR,
    pub loader: &'a ash::khr::surface::Instance,
}

/// Queue family indices for the queues the renderer submits to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    /// Aliases `graphics_family` on headless devices.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Families to create queues on, without duplicates.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families: Vec<u32> = [self.graphics_family, self.present_family]
            .into_iter()
            .flatten()
            .collect();
        families.dedup();
        families
    }

    /// Scans family properties in order, taking the first graphics family
    /// and the first family `can_present` accepts.
    fn scan(
        families: &[vk::QueueFamilyProperties],
        mut can_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let mut indices = Self::default();
        for (index, family) in (0u32..).zip(families) {
            if family.queue_count == 0 {
                continue;
            }
            if indices.graphics_family.is_none()
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics_family = Some(index);
            }
            if indices.present_family.is_none() && can_present(index) {
                indices.present_family = Some(index);
            }
            if indices.is_complete() {
                break;
            }
        }
        indices
    }
}

/// Why a GPU was passed over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rejection {
    NoGraphicsQueue,
    NoPresentQueue,
    MissingSwapchainExtension,
    InadequateSurface,
    NoAnisotropy,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Rejection::NoGraphicsQueue => "no graphics queue family",
            Rejection::NoPresentQueue => "no queue family can present to the surface",
            Rejection::MissingSwapchainExtension => "VK_KHR_swapchain not exposed",
            Rejection::InadequateSurface => "surface reports no formats or present modes",
            Rejection::NoAnisotropy => "sampler anisotropy unsupported",
        };
        f.write_str(reason)
    }
}

/// A GPU that passed every check, with what device creation needs.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("<unnamed GPU>")
    }

    /// Sum of all device-local heaps, in bytes.
    pub fn device_local_memory(&self) -> u64 {
        let heaps = &self.memory_properties.memory_heaps
            [..self.memory_properties.memory_heap_count as usize];
        heaps
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.properties.device_type)
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects a physical device for rendering.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU meets the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: Option<SurfaceTarget<'_>>,
    strategy: SelectionStrategy,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let mut candidates = Vec::new();
    for device in devices {
        match evaluate(instance, device, surface) {
            Ok(candidate) => {
                debug!(
                    "GPU '{}' is suitable, score {}",
                    candidate.device_name(),
                    rate_device(&candidate.properties)
                );
                candidates.push(candidate);
                if strategy == SelectionStrategy::FirstSuitable {
                    break;
                }
            }
            Err((name, reason)) => debug!("GPU '{}' skipped: {}", name, reason),
        }
    }

    let scores: Vec<u32> = candidates
        .iter()
        .map(|candidate| rate_device(&candidate.properties))
        .collect();
    let Some(index) = choose_candidate(&scores, strategy) else {
        warn!("No GPU meets the renderer's requirements");
        return Err(RhiError::NoSuitableGpu);
    };
    let selected = candidates.swap_remove(index);

    let version = selected.properties.api_version;
    info!(
        "Selected GPU '{}' ({:?}), Vulkan {}.{}, {} MiB device-local, strategy {:?}",
        selected.device_name(),
        selected.properties.device_type,
        vk::api_version_major(version),
        vk::api_version_minor(version),
        selected.device_local_memory() >> 20,
        strategy
    );

    Ok(selected)
}

/// Picks a candidate index from the per-device scores.
fn choose_candidate(scores: &[u32], strategy: SelectionStrategy) -> Option<usize> {
    match strategy {
        SelectionStrategy::FirstSuitable => (!scores.is_empty()).then_some(0),
        // `max_by_key` keeps the last maximum; reversing keeps the first.
        SelectionStrategy::HighestScore => scores
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|&(_, score)| *score)
            .map(|(index, _)| index),
    }
}

/// Runs every suitability check on one GPU.
///
/// On rejection, returns the device name with the first failed check.
fn evaluate(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: Option<SurfaceTarget<'_>>,
) -> Result<PhysicalDeviceInfo, (String, Rejection)> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let reject = |reason| {
        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        (name, reason)
    };

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut queue_families = QueueFamilyIndices::scan(&families, |index| match surface {
        Some(target) => unsafe {
            target
                .loader
                .get_physical_device_surface_support(device, index, target.surface)
                .unwrap_or(false)
        },
        None => false,
    });

    if queue_families.graphics_family.is_none() {
        return Err(reject(Rejection::NoGraphicsQueue));
    }

    match surface {
        None => queue_families.present_family = queue_families.graphics_family,
        Some(target) => {
            if queue_families.present_family.is_none() {
                return Err(reject(Rejection::NoPresentQueue));
            }
            if !supports_required_extensions(instance, device) {
                return Err(reject(Rejection::MissingSwapchainExtension));
            }
            let adequate = SwapchainSupportDetails::query(target.loader, device, target.surface)
                .is_ok_and(|support| support.is_adequate());
            if !adequate {
                return Err(reject(Rejection::InadequateSurface));
            }
        }
    }

    let features = unsafe { instance.get_physical_device_features(device) };
    if features.sampler_anisotropy == vk::FALSE {
        return Err(reject(Rejection::NoAnisotropy));
    }

    Ok(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties: unsafe { instance.get_physical_device_memory_properties(device) },
        queue_families,
    })
}

/// Checks the device exposes every entry of [`REQUIRED_DEVICE_EXTENSIONS`].
fn supports_required_extensions(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(available) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };

    REQUIRED_DEVICE_EXTENSIONS.iter().all(|required| {
        available
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *required))
    })
}

/// Score used by [`SelectionStrategy::HighestScore`]: discrete GPUs first,
/// then the largest supported 2D image.
pub fn rate_device(properties: &vk::PhysicalDeviceProperties) -> u32 {
    let discrete_bonus = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        _ => 0,
    };
    discrete_bonus + properties.limits.max_image_dimension2_d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_completeness_needs_both_families() {
        let both = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert!(both.is_complete());
        assert!(!QueueFamilyIndices::default().is_complete());
        assert!(
            !QueueFamilyIndices {
                present_family: None,
                ..both
            }
            .is_complete()
        );
    }

    #[test]
    fn test_unique_families() {
        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        assert_eq!(split.unique_families(), vec![0, 1]);

        let shared = QueueFamilyIndices {
            graphics_family: Some(2),
            present_family: Some(2),
        };
        assert_eq!(shared.unique_families(), vec![2]);
    }

    #[test]
    fn test_scan_finds_separate_present_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::COMPUTE, 1),
        ];
        let indices = QueueFamilyIndices::scan(&families, |index| index == 2);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(2));
    }

    #[test]
    fn test_scan_skips_empty_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 4),
        ];
        let indices = QueueFamilyIndices::scan(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_scan_without_presentation() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let indices = QueueFamilyIndices::scan(&families, |_| false);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, None);
    }

    #[test]
    fn test_candidate_choice() {
        let scores = [10, 5000, 20];
        assert_eq!(
            choose_candidate(&scores, SelectionStrategy::FirstSuitable),
            Some(0)
        );
        assert_eq!(
            choose_candidate(&scores, SelectionStrategy::HighestScore),
            Some(1)
        );
        // Ties keep enumeration order.
        assert_eq!(
            choose_candidate(&[7, 9, 9], SelectionStrategy::HighestScore),
            Some(1)
        );
        assert_eq!(choose_candidate(&[], SelectionStrategy::FirstSuitable), None);
        assert_eq!(choose_candidate(&[], SelectionStrategy::HighestScore), None);
    }

    #[test]
    fn test_discrete_gpus_rate_higher() {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.limits.max_image_dimension2_d = 8192;
        properties.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        let integrated = rate_device(&properties);

        properties.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;
        assert_eq!(rate_device(&properties), integrated + 1000);
    }

    #[test]
    fn test_rejection_messages() {
        assert_eq!(
            Rejection::MissingSwapchainExtension.to_string(),
            "VK_KHR_swapchain not exposed"
        );
        assert_eq!(
            Rejection::NoAnisotropy.to_string(),
            "sampler anisotropy unsupported"
        );
    }

    #[test]
    fn test_required_extensions_include_swapchain() {
        assert!(REQUIRED_DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }
}
