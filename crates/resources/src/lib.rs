//! Resource loading.
//!
//! This crate produces the CPU-side data the renderer uploads:
//! - Meshes from OBJ files, deduplicated into vertex and index lists
//! - Textures decoded to RGBA8
//! - Built-in fallbacks (two quads, a checkerboard) when no asset is configured

mod error;

pub mod mesh;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use mesh::MeshData;
pub use texture::TextureData;
