//! Mesh data: a deduplicated vertex list plus a triangle index list.
//!
//! Meshes come from three places:
//! - [`MeshData::from_vertices`], for any unindexed triangle stream
//! - [`MeshData::load_obj`], for Wavefront OBJ files
//! - [`MeshData::quads`], the built-in fallback geometry
//!
//! All three go through the same deduplication: a vertex is stored once per
//! distinct (position, color, tex_coord) tuple, and the index list refers to
//! the first occurrence.

use std::collections::HashMap;
use std::path::Path;

use glam::{Vec2, Vec3};
use tracing::{debug, info};
use vkframe_rhi::vertex::Vertex;

use crate::error::{ResourceError, ResourceResult};

/// Color assigned to every vertex loaded from a file.
pub const DEFAULT_VERTEX_COLOR: Vec3 = Vec3::ONE;

/// Indexed triangle mesh ready for upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Builds an indexed mesh from an unindexed vertex stream, where every
    /// three consecutive vertices form a triangle.
    pub fn from_vertices<I>(stream: I) -> Self
    where
        I: IntoIterator<Item = Vertex>,
    {
        let mut unique: HashMap<Vertex, u32> = HashMap::new();
        let mut mesh = MeshData::default();

        for vertex in stream {
            let index = *unique.entry(vertex).or_insert_with(|| {
                mesh.vertices.push(vertex);
                (mesh.vertices.len() - 1) as u32
            });
            mesh.indices.push(index);
        }

        mesh
    }

    /// Loads every model in an OBJ file into one mesh.
    ///
    /// Texture coordinates have V flipped (OBJ puts the origin at the bottom
    /// left, Vulkan samples from the top left) and every vertex is white.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, fails to parse, has an
    /// out-of-range face index, or contains no triangles.
    pub fn load_obj(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: false,
            ..Default::default()
        };
        let (models, _materials) =
            tobj::load_obj(path, &options).map_err(|source| ResourceError::ObjLoad {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("Parsed {} model(s) from {}", models.len(), path.display());

        let mut corners = Vec::new();
        for model in &models {
            corners.extend(mesh_corners(&model.mesh)?);
        }

        let mesh = Self::from_vertices(corners);
        if mesh.indices.is_empty() {
            return Err(ResourceError::EmptyMesh(path.to_path_buf()));
        }

        info!(
            "Loaded {}: {} unique vertices, {} indices",
            path.display(),
            mesh.vertices.len(),
            mesh.indices.len()
        );

        Ok(mesh)
    }

    /// Two stacked textured quads, half a unit apart along Z.
    pub fn quads() -> Self {
        let corners = [
            (Vec2::new(-0.5, -0.5), Vec3::new(1.0, 0.0, 0.0), Vec2::new(1.0, 0.0)),
            (Vec2::new(0.5, -0.5), Vec3::new(0.0, 1.0, 0.0), Vec2::new(0.0, 0.0)),
            (Vec2::new(0.5, 0.5), Vec3::new(0.0, 0.0, 1.0), Vec2::new(0.0, 1.0)),
            (Vec2::new(-0.5, 0.5), Vec3::new(1.0, 1.0, 1.0), Vec2::new(1.0, 1.0)),
        ];

        let mut mesh = MeshData::default();
        for z in [0.0, -0.5] {
            let base = mesh.vertices.len() as u32;
            mesh.vertices.extend(
                corners
                    .iter()
                    .map(|&(xy, color, uv)| Vertex::new(xy.extend(z), color, uv)),
            );
            mesh.indices
                .extend([0, 1, 2, 2, 3, 0].iter().map(|i| base + i));
        }
        mesh
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Expands a tobj mesh into one vertex per face corner.
fn mesh_corners(mesh: &tobj::Mesh) -> ResourceResult<Vec<Vertex>> {
    let position_count = mesh.positions.len() / 3;
    let texcoord_count = mesh.texcoords.len() / 2;
    let has_texcoords = !mesh.texcoord_indices.is_empty();

    mesh.indices
        .iter()
        .enumerate()
        .map(|(corner, &pi)| {
            let p = pi as usize;
            if p >= position_count {
                return Err(ResourceError::IndexOutOfRange {
                    attribute: "position",
                    index: pi,
                    count: position_count,
                });
            }
            let position = Vec3::new(
                mesh.positions[3 * p],
                mesh.positions[3 * p + 1],
                mesh.positions[3 * p + 2],
            );

            let tex_coord = match mesh.texcoord_indices.get(corner) {
                Some(&ti) if has_texcoords => {
                    let t = ti as usize;
                    if t >= texcoord_count {
                        return Err(ResourceError::IndexOutOfRange {
                            attribute: "tex_coord",
                            index: ti,
                            count: texcoord_count,
                        });
                    }
                    Vec2::new(mesh.texcoords[2 * t], 1.0 - mesh.texcoords[2 * t + 1])
                }
                _ => Vec2::ZERO,
            };

            Ok(Vertex::new(position, DEFAULT_VERTEX_COLOR, tex_coord))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32, y: f32, u: f32) -> Vertex {
        Vertex::new(Vec3::new(x, y, 0.0), Vec3::ONE, Vec2::new(u, 0.0))
    }

    #[test]
    fn test_from_vertices_keeps_first_occurrence_order() {
        let mesh = MeshData::from_vertices([
            v(0.0, 0.0, 0.0),
            v(1.0, 0.0, 0.0),
            v(0.0, 1.0, 0.0),
            v(0.0, 1.0, 0.0),
            v(1.0, 0.0, 0.0),
            v(1.0, 1.0, 0.0),
        ]);

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 1, 3]);
        assert_eq!(mesh.vertices[3], v(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_from_vertices_distinguishes_tex_coords() {
        let mesh = MeshData::from_vertices([v(0.0, 0.0, 0.0), v(0.0, 0.0, 1.0)]);
        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(mesh.indices, vec![0, 1]);
    }

    #[test]
    fn test_quads() {
        let mesh = MeshData::quads();
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.index_count(), 12);
        assert_eq!(&mesh.indices[6..], &[4, 5, 6, 6, 7, 4]);
        assert_eq!(mesh.vertices[4].position.z, -0.5);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn test_load_obj_missing_file() {
        let err = MeshData::load_obj(Path::new("does/not/exist.obj")).unwrap_err();
        assert!(matches!(err, ResourceError::FileNotFound(_)));
        assert_eq!(err.category(), "file-not-found");
    }

    #[test]
    fn test_mesh_corners_rejects_bad_position_index() {
        let mesh = tobj::Mesh {
            positions: vec![0.0; 6],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        assert!(matches!(
            mesh_corners(&mesh),
            Err(ResourceError::IndexOutOfRange {
                attribute: "position",
                index: 2,
                count: 2
            })
        ));
    }
}
