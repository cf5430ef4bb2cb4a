//! Texture samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Sampler parameters.
///
/// The default samples with linear filtering in every dimension, repeats
/// outside `[0, 1]` and covers the whole mip chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: vk::SamplerAddressMode,
    /// Requested anisotropy; `None` disables anisotropic filtering. Clamped
    /// to the device limit.
    pub max_anisotropy: Option<f32>,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: Some(f32::MAX),
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
        }
    }
}

impl SamplerDesc {
    fn create_info(&self, device_max_anisotropy: f32) -> vk::SamplerCreateInfo<'static> {
        let anisotropy = self.max_anisotropy.map(|a| a.min(device_max_anisotropy));

        vk::SamplerCreateInfo::default()
            .mag_filter(self.mag_filter)
            .min_filter(self.min_filter)
            .address_mode_u(self.address_mode)
            .address_mode_v(self.address_mode)
            .address_mode_w(self.address_mode)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(self.mipmap_mode)
            .mip_lod_bias(0.0)
            .min_lod(self.min_lod)
            .max_lod(self.max_lod)
    }
}

/// Vulkan sampler wrapper.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates a sampler.
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn new(device: Arc<Device>, desc: &SamplerDesc) -> RhiResult<Self> {
        let create_info = desc.create_info(device.limits().max_sampler_anisotropy);
        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };

        debug!(
            "Created sampler (max anisotropy {})",
            create_info.max_anisotropy
        );

        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed sampler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sampler_info() {
        let info = SamplerDesc::default().create_info(16.0);

        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.address_mode_w, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 16.0);
        assert_eq!(info.min_lod, 0.0);
        assert_eq!(info.max_lod, vk::LOD_CLAMP_NONE);
    }

    #[test]
    fn test_anisotropy_disabled() {
        let desc = SamplerDesc {
            max_anisotropy: None,
            ..Default::default()
        };
        let info = desc.create_info(16.0);
        assert_eq!(info.anisotropy_enable, vk::FALSE);
        assert_eq!(info.max_anisotropy, 1.0);
    }

    #[test]
    fn test_anisotropy_clamped_to_device() {
        let desc = SamplerDesc {
            max_anisotropy: Some(8.0),
            ..Default::default()
        };
        assert_eq!(desc.create_info(4.0).max_anisotropy, 4.0);
        assert_eq!(desc.create_info(16.0).max_anisotropy, 8.0);
    }
}
