//! Integration tests for mesh and texture loading.

use std::io::Write;

use glam::{Vec2, Vec3};
use vkframe_resources::{MeshData, ResourceError, TextureData};
use vkframe_rhi::vertex::Vertex;

fn write_temp(suffix: &str, contents: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(contents).expect("Failed to write temp file");
    file.flush().expect("Failed to flush temp file");
    file
}

#[test]
fn test_identical_vertices_deduplicate() {
    // Two separately produced vertices with the same (position, color, tex_coord).
    let a = Vertex::new(Vec3::new(0.25, 0.5, 0.0), Vec3::ONE, Vec2::new(0.5, 0.5));
    let b = Vertex::new(
        Vec3::new(0.5 / 2.0, 0.25 * 2.0, 0.0),
        Vec3::splat(1.0),
        Vec2::splat(0.5),
    );

    let mesh = MeshData::from_vertices([a, b]);

    assert_eq!(mesh.vertices.len(), 1, "Identical vertices should be stored once");
    assert_eq!(mesh.indices, vec![0, 0]);
}

#[test]
fn test_load_obj_quad() {
    // A unit quad as two triangles sharing an edge.
    let obj = b"\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3
f 1/1 3/3 4/4
";
    let file = write_temp(".obj", obj);

    let mesh = MeshData::load_obj(file.path()).expect("Failed to load OBJ");

    assert_eq!(mesh.vertices.len(), 4, "Shared corners should deduplicate");
    assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);

    // V is flipped and color is white.
    assert_eq!(mesh.vertices[0].tex_coord, Vec2::new(0.0, 1.0));
    assert_eq!(mesh.vertices[2].tex_coord, Vec2::new(1.0, 0.0));
    assert!(mesh.vertices.iter().all(|v| v.color == Vec3::ONE));
}

#[test]
fn test_load_obj_without_faces_is_empty() {
    let file = write_temp(".obj", b"v 0.0 0.0 0.0\nv 1.0 0.0 0.0\n");

    match MeshData::load_obj(file.path()) {
        Err(ResourceError::EmptyMesh(_)) | Err(ResourceError::ObjLoad { .. }) => {}
        other => panic!("Expected an empty-mesh error, got {:?}", other),
    }
}

#[test]
fn test_load_png_texture() {
    let mut img = image::RgbImage::new(3, 2);
    img.put_pixel(2, 1, image::Rgb([10, 20, 30]));

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("tex.png");
    img.save(&path).expect("Failed to write PNG");

    let texture = TextureData::load(&path).expect("Failed to load texture");

    assert_eq!((texture.width(), texture.height()), (3, 2));
    assert_eq!(texture.pixels().len(), 3 * 2 * 4);
    // RGB input gains an opaque alpha channel.
    let last = &texture.pixels()[5 * 4..];
    assert_eq!(last, &[10, 20, 30, 255]);
}

#[test]
fn test_load_corrupt_texture() {
    let file = write_temp(".png", b"not a png");
    let err = TextureData::load(file.path()).unwrap_err();
    assert!(matches!(err, ResourceError::ImageDecode { .. }));
    assert_eq!(err.category(), "texture");
}
