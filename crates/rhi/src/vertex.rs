//! Vertex format and input descriptions.
//!
//! # Memory Layout
//!
//! [`Vertex`] uses `#[repr(C)]`:
//! - Offset 0: position (12 bytes), location 0
//! - Offset 12: color (12 bytes), location 1
//! - Offset 24: tex_coord (8 bytes), location 2
//! - Total size: 32 bytes

use std::hash::{Hash, Hasher};
use std::mem::offset_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Vertex with position, color and texture coordinates.
///
/// Equality and hashing compare the exact bit patterns of every component,
/// so two vertices are equal only when all eight floats are identical.
/// This makes the type usable as a `HashMap` key for deduplication.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    fn bits(&self) -> [u32; 8] {
        [
            self.position.x.to_bits(),
            self.position.y.to_bits(),
            self.position.z.to_bits(),
            self.color.x.to_bits(),
            self.color.y.to_bits(),
            self.color.z.to_bits(),
            self.tex_coord.x.to_bits(),
            self.tex_coord.y.to_bits(),
        ]
    }

    /// Binding 0, advanced per vertex.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_vertex_size() {
        // Vec3 (12) + Vec3 (12) + Vec2 (8)
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_vertex_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_attribute_descriptions() {
        let attrs = Vertex::attribute_descriptions();

        assert_eq!(attrs[0].location, 0);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[0].offset, 0);

        assert_eq!(attrs[1].location, 1);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[1].offset, 12);

        assert_eq!(attrs[2].location, 2);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[2].offset, 24);

        assert!(attrs.iter().all(|a| a.binding == 0));
    }

    #[test]
    fn test_equal_vertices_hash_together() {
        let a = Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::ONE, Vec2::new(1.0, 0.0));
        let b = a;
        let c = Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::ONE, Vec2::new(0.0, 0.0));

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(c);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_signed_zero_is_distinct() {
        let a = Vertex::new(Vec3::new(0.0, 0.0, 0.0), Vec3::ONE, Vec2::ZERO);
        let b = Vertex::new(Vec3::new(-0.0, 0.0, 0.0), Vec3::ONE, Vec2::ZERO);
        assert_ne!(a, b);
    }

    #[test]
    fn test_vertex_pod_cast() {
        let vertices = [
            Vertex::new(Vec3::new(1.0, 2.0, 3.0), Vec3::X, Vec2::new(0.25, 0.75)),
            Vertex::default(),
        ];

        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 64);

        let back: &[Vertex] = bytemuck::cast_slice(bytes);
        assert_eq!(back, &vertices);
    }
}
