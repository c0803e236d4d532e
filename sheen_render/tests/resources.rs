mod common;

use sheen_asset::{Mesh, PixelFormat, Texture2D};
use sheen_render::readback::{ReadbackError, read_layer_rgba_f32};
use sheen_render::{GpuResources, ResourceCounts, TextureKind};
use wgpu::TextureFormat;

#[test]
fn missing_texture_falls_back_to_white() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);

    let id = resources.load_2d("does/not/exist.png", true, true);
    let texture = resources.texture(id).unwrap();

    assert_eq!((texture.width(), texture.height()), (1, 1));
    assert_eq!(texture.format(), TextureFormat::Rgba8Unorm);
    assert_eq!(texture.source_format, Some(PixelFormat::Rgba8));
    assert_eq!(texture.kind, TextureKind::Flat);
    assert!(!texture.has_mip_chain());
}

#[test]
fn every_fallback_is_its_own_handle() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);

    let a = resources.load_2d("missing_a.png", false, false);
    let b = resources.load_2d("missing_b.png", false, false);
    assert_ne!(a, b);

    assert!(resources.release_texture(a));
    assert!(resources.texture(b).is_some());
}

#[test]
fn uploads_keep_the_mip_chain() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);

    let image = Texture2D::checkerboard(64, 4, [255; 3], [0; 3]);
    let mipped = resources.upload_2d(&image, true);
    let flat = resources.upload_2d(&image, false);

    assert_eq!(resources.texture(mipped).unwrap().texture.mip_level_count(), 7);
    assert!(!resources.texture(flat).unwrap().has_mip_chain());
    assert_eq!(resources.texture(flat).unwrap().source_format, Some(PixelFormat::Rgb8));
}

#[test]
fn release_returns_counts_to_baseline() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let baseline = resources.counts();
    assert_eq!(baseline, ResourceCounts::default());

    let mesh = resources.create_vertex_array("Quad", &Mesh::unit_quad());
    let texture = resources.upload_2d(&Texture2D::fallback(), false);
    assert_eq!(
        resources.counts(),
        ResourceCounts {
            buffers: 2,
            textures: 1,
            vertex_arrays: 1,
        }
    );
    assert_eq!(resources.vertex_array(mesh).unwrap().index_count, 6);

    assert!(resources.release_vertex_array(mesh));
    assert!(resources.release_texture(texture));
    assert_eq!(resources.counts(), baseline);
}

#[test]
fn double_release_is_a_no_op() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);

    let texture = resources.upload_2d(&Texture2D::fallback(), false);
    assert!(resources.release_texture(texture));
    assert!(!resources.release_texture(texture));
    assert!(resources.texture(texture).is_none());
}

#[test]
fn float_readback_rejects_byte_textures() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);

    let id = resources.upload_2d(&Texture2D::fallback(), false);
    let texture = &resources.texture(id).unwrap().texture;
    let err = read_layer_rgba_f32(state.device(), state.queue(), texture, 0).unwrap_err();

    assert!(matches!(
        err,
        ReadbackError::UnsupportedFormat {
            format: TextureFormat::Rgba8Unorm
        }
    ));
}
