mod common;

use image::{Rgb, Rgb32FImage};
use sheen_asset::{CubeFace, EnvironmentSettings, HdrImage};
use sheen_render::environment::CUBEMAP_FORMAT;
use sheen_render::readback::read_layer_rgba_f32;
use sheen_render::{
    Environment, EnvironmentError, EnvironmentStage, GpuResources, ProgramManager, State,
};
use std::path::PathBuf;

fn small_settings() -> EnvironmentSettings {
    EnvironmentSettings::builder()
        .face_size(16)
        .irradiance_size(8)
        .sample_delta(0.2)
        .build()
}

fn uniform_panorama(value: f32) -> HdrImage {
    HdrImage::from_rgb_f32(16, 8, vec![value; 16 * 8 * 3]).unwrap()
}

/// Bright sky over a dark ground.
fn sky_panorama() -> HdrImage {
    let (width, height) = (16u32, 8u32);
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        let value = if y < height / 2 { 4.0 } else { 0.0 };
        for _ in 0..width {
            pixels.extend_from_slice(&[value; 3]);
        }
    }
    HdrImage::from_rgb_f32(width, height, pixels).unwrap()
}

fn write_hdr(name: &str, value: f32) -> PathBuf {
    let path = std::env::temp_dir().join(format!("sheen_{}_{name}.hdr", std::process::id()));
    Rgb32FImage::from_pixel(16, 8, Rgb([value; 3]))
        .save(&path)
        .unwrap();
    path
}

fn face_mean(
    state: &State,
    resources: &GpuResources,
    texture: sheen_render::TextureId,
    face: CubeFace,
) -> f32 {
    let texture = &resources.texture(texture).unwrap().texture;
    let texels = read_layer_rgba_f32(state.device(), state.queue(), texture, face.layer()).unwrap();
    let reds: Vec<f32> = texels.chunks_exact(4).map(|t| t[0]).collect();
    reds.iter().sum::<f32>() / reds.len() as f32
}

#[test]
fn stages_must_run_in_order() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);
    let mut env = Environment::new();
    assert_eq!(env.stage(), EnvironmentStage::Empty);

    let err = env.equirect_to_cubemap(&mut resources, &mut programs, 16).unwrap_err();
    assert!(matches!(
        err,
        EnvironmentError::NotReady {
            required: EnvironmentStage::HdrLoaded,
            ..
        }
    ));

    env.set_hdr(&mut resources, &uniform_panorama(1.0));
    let err = env
        .convolve_irradiance(&mut resources, &mut programs, 8, 0.2)
        .unwrap_err();
    assert!(matches!(
        err,
        EnvironmentError::NotReady {
            current: EnvironmentStage::HdrLoaded,
            required: EnvironmentStage::CubemapBuilt,
            ..
        }
    ));

    let cubemap = env.equirect_to_cubemap(&mut resources, &mut programs, 16).unwrap();
    assert_eq!(env.stage(), EnvironmentStage::CubemapBuilt);

    let irradiance = env
        .convolve_irradiance(&mut resources, &mut programs, 8, 0.2)
        .unwrap();
    assert_ne!(cubemap, irradiance);
    assert_eq!(env.stage(), EnvironmentStage::IrradianceBuilt);

    let cube = resources.texture(cubemap).unwrap();
    assert_eq!(cube.texture.depth_or_array_layers(), 6);
    assert_eq!(cube.format(), CUBEMAP_FORMAT);
    assert_eq!(resources.texture(irradiance).unwrap().width(), 8);
}

#[test]
fn missing_hdr_is_an_error_and_changes_nothing() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let mut env = Environment::new();
    env.set_hdr(&mut resources, &uniform_panorama(1.0));
    let hdr = env.hdr();

    let err = env.load_hdr(&mut resources, "does/not/exist.hdr").unwrap_err();
    assert!(matches!(err, EnvironmentError::HdrLoad { .. }));
    assert_eq!(env.stage(), EnvironmentStage::HdrLoaded);
    assert_eq!(env.hdr(), hdr);
}

#[test]
fn cubemap_faces_follow_the_panorama() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);
    let mut env = Environment::new();

    env.set_hdr(&mut resources, &sky_panorama());
    let cubemap = env.equirect_to_cubemap(&mut resources, &mut programs, 16).unwrap();

    let up = face_mean(&state, &resources, cubemap, CubeFace::PositiveY);
    let down = face_mean(&state, &resources, cubemap, CubeFace::NegativeY);
    assert!(up > 3.5, "sky face mean {up}");
    assert!(down < 0.5, "ground face mean {down}");
}

#[test]
fn uniform_environment_convolves_to_its_radiance() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);
    let mut env = Environment::new();

    env.set_hdr(&mut resources, &uniform_panorama(1.0));
    env.build(&mut resources, &mut programs, &small_settings()).unwrap();

    let irradiance = env.irradiance().unwrap();
    for face in CubeFace::ALL {
        let mean = face_mean(&state, &resources, irradiance, face);
        assert!((mean - 1.0).abs() < 0.1, "{face:?} mean {mean}");
    }
}

#[test]
fn reload_releases_the_previous_maps() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);
    let mut env = Environment::new();
    let path = write_hdr("reload", 2.0);

    env.reload(&mut resources, &mut programs, &path, &small_settings())
        .unwrap();
    let first = (env.cubemap(), env.irradiance());
    let baseline = resources.counts();
    assert_eq!(baseline.textures, 3);

    env.reload(&mut resources, &mut programs, &path, &small_settings())
        .unwrap();
    assert_eq!(env.stage(), EnvironmentStage::IrradianceBuilt);
    assert_ne!((env.cubemap(), env.irradiance()), first);
    assert!(resources.texture(first.0.unwrap()).is_none());
    assert!(resources.texture(first.1.unwrap()).is_none());
    assert_eq!(resources.counts(), baseline);

    let err = env
        .reload(&mut resources, &mut programs, "does/not/exist.hdr", &small_settings())
        .unwrap_err();
    assert!(matches!(err, EnvironmentError::HdrLoad { .. }));
    assert_eq!(resources.counts(), baseline);

    env.destroy(&mut resources, &mut programs);
    assert_eq!(resources.counts().textures, 0);
    assert_eq!(programs.counts().programs, 0);

    let _ = std::fs::remove_file(path);
}

#[test]
fn oversized_faces_are_rejected() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);
    let mut env = Environment::new();
    env.set_hdr(&mut resources, &uniform_panorama(1.0));

    let err = env.equirect_to_cubemap(&mut resources, &mut programs, 0).unwrap_err();
    assert!(matches!(err, EnvironmentError::FaceSize { size: 0, .. }));
    assert_eq!(env.stage(), EnvironmentStage::HdrLoaded);
}

#[test]
fn unusable_sample_steps_are_rejected() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);
    let mut env = Environment::new();
    env.set_hdr(&mut resources, &uniform_panorama(1.0));
    env.equirect_to_cubemap(&mut resources, &mut programs, 8).unwrap();
    let textures = resources.counts().textures;

    for delta in [0.0, -0.1, 1e-5, f32::NAN, f32::INFINITY] {
        let err = env
            .convolve_irradiance(&mut resources, &mut programs, 8, delta)
            .unwrap_err();
        assert!(matches!(err, EnvironmentError::SampleDelta { .. }), "delta {delta}");
    }
    assert_eq!(env.stage(), EnvironmentStage::CubemapBuilt);
    assert_eq!(resources.counts().textures, textures);

    env.destroy(&mut resources, &mut programs);
}
