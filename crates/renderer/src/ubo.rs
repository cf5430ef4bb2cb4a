//! Uniform buffer object definitions for shaders.
//!
//! Must match the `UniformBufferObject` block at binding 0 of the vertex
//! shader. `#[repr(C)]` plus `Pod` lets it be copied into the mapped buffer
//! as raw bytes.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Vertical field of view.
pub const FOV_Y_DEGREES: f32 = 45.0;
pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 10.0;
/// Camera position; the camera looks at the origin with +Z up.
pub const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);

/// Transform block uploaded once per frame.
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// The static transform for a target of `extent`.
    ///
    /// The model stays at identity. The projection uses Vulkan's 0..1 depth
    /// range and has its Y axis flipped, since clip-space Y points down.
    pub fn for_extent(extent: vk::Extent2D) -> Self {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;

        let mut proj = Mat4::perspective_rh(
            FOV_Y_DEGREES.to_radians(),
            aspect,
            NEAR_PLANE,
            FAR_PLANE,
        );
        proj.y_axis.y *= -1.0;

        Self {
            model: Mat4::IDENTITY,
            view: Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z),
            proj,
        }
    }
}
