mod common;

use sheen_asset::{LightState, MaterialState, Mesh, Texture2D, TextureRole};
use sheen_render::{
    Camera, FrameDriver, FrameSettings, GpuResources, OffscreenTarget, ProgramManager,
    SceneResources,
};
use wgpu::TextureFormat;

const SIZE: u32 = 64;

#[test]
fn checkerboard_quad_shows_both_cells() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);

    let mut scene = SceneResources::new(&mut resources, &Mesh::unit_quad());
    let checker = Texture2D::checkerboard(SIZE, 2, [255; 3], [0; 3]);
    scene
        .upload_texture(&mut resources, TextureRole::BaseColor, &checker, false)
        .unwrap();

    let settings = FrameSettings::builder().animate(false).build();
    let mut driver = FrameDriver::new(&mut resources, &mut programs, settings);
    driver.camera = Camera::identity();
    assert!(programs.link_status(driver.pbr_program()));
    assert!(programs.link_status(driver.skybox_program()));

    let target = OffscreenTarget::new(state.device(), SIZE, SIZE, TextureFormat::Rgba8Unorm);
    let material = MaterialState {
        use_base_texture: true,
        use_ibl: false,
        ..MaterialState::default()
    };

    let report = driver.render_frame(
        &resources,
        &mut programs,
        &scene,
        &material,
        &LightState::default(),
        0.0,
        &target.frame_target(),
    );
    assert!(report.mesh);
    assert!(!report.skybox);

    let pixels = target.read_rgba8(state.device(), state.queue()).unwrap();
    let red = |x: u32, y: u32| pixels[((y * SIZE + x) * 4) as usize];

    // uv (0.25, 0.25) is a light cell, uv (0.75, 0.25) a dark one
    let light = red(16, 48);
    let dark = red(48, 48);
    assert!(light > dark.saturating_add(64), "light {light}, dark {dark}");
}

#[test]
fn skybox_draws_once_a_cubemap_exists() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);

    let mut scene = SceneResources::new(&mut resources, &Mesh::unit_cube());
    let panorama = sheen_asset::HdrImage::from_rgb_f32(8, 4, vec![0.5; 8 * 4 * 3]).unwrap();
    scene.environment_mut().set_hdr(&mut resources, &panorama);
    scene
        .environment_mut()
        .equirect_to_cubemap(&mut resources, &mut programs, 8)
        .unwrap();

    let mut driver = FrameDriver::new(&mut resources, &mut programs, FrameSettings::default());
    let target = OffscreenTarget::new(state.device(), 32, 32, TextureFormat::Rgba8UnormSrgb);

    let report = driver.render_frame(
        &resources,
        &mut programs,
        &scene,
        &MaterialState::default(),
        &LightState::default(),
        1.5,
        &target.frame_target(),
    );
    assert!(report.mesh);
    assert!(report.skybox);

    let pixels = target.read_rgba8(state.device(), state.queue()).unwrap();
    // corners see only the sky around the cube
    assert!(pixels[0] > 0);

    driver.release(&mut resources, &mut programs);
    scene.release(&mut resources, &mut programs);
    assert_eq!(resources.counts().textures, 0);
    assert_eq!(resources.counts().vertex_arrays, 0);
}

#[test]
fn texture_reload_replaces_the_previous_map() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let mut scene = SceneResources::new(&mut resources, &Mesh::unit_quad());

    let first = scene
        .reload_texture(&mut resources, TextureRole::Normal, "missing_normal.png", true, false)
        .unwrap();
    let second = scene
        .reload_texture(&mut resources, TextureRole::Normal, "missing_normal.png", true, false)
        .unwrap();

    assert_ne!(first, second);
    assert!(resources.texture(first).is_none());
    assert_eq!(scene.textures().get(TextureRole::Normal), Some(second));
    assert_eq!(resources.counts().textures, 1);

    assert!(
        scene
            .reload_texture(&mut resources, TextureRole::Irradiance, "x.png", false, false)
            .is_none()
    );
}

#[test]
fn bind_groups_are_reused_until_a_texture_is_released() {
    let Some(state) = common::gpu() else { return };
    let mut resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);

    let mut scene = SceneResources::new(&mut resources, &Mesh::unit_quad());
    let checker = Texture2D::checkerboard(SIZE, 2, [255; 3], [0; 3]);
    scene
        .upload_texture(&mut resources, TextureRole::BaseColor, &checker, false)
        .unwrap();

    let settings = FrameSettings::builder().animate(false).build();
    let mut driver = FrameDriver::new(&mut resources, &mut programs, settings);
    driver.camera = Camera::identity();
    let target = OffscreenTarget::new(state.device(), SIZE, SIZE, TextureFormat::Rgba8Unorm);
    let material = MaterialState {
        use_base_texture: true,
        use_ibl: false,
        ..MaterialState::default()
    };

    let pbr = driver.pbr_program();
    let mut frame = |resources: &GpuResources,
                     programs: &mut ProgramManager,
                     scene: &SceneResources| {
        let report = driver.render_frame(
            resources,
            programs,
            scene,
            &material,
            &LightState::default(),
            0.0,
            &target.frame_target(),
        );
        assert!(report.mesh);
        target.read_rgba8(state.device(), state.queue()).unwrap()
    };

    let before = frame(&resources, &mut programs, &scene);
    frame(&resources, &mut programs, &scene);
    assert_eq!(programs.cached_bind_groups(pbr), 1);

    // the checkerboard is released when the solid blue map replaces it
    let blue = Texture2D::checkerboard(SIZE, 2, [0, 0, 255], [0, 0, 255]);
    scene
        .upload_texture(&mut resources, TextureRole::BaseColor, &blue, false)
        .unwrap();
    let after = frame(&resources, &mut programs, &scene);
    assert_eq!(programs.cached_bind_groups(pbr), 1);

    let red = |pixels: &[u8]| pixels[((48 * SIZE + 16) * 4) as usize];
    assert!(red(&after) < red(&before), "before {}, after {}", red(&before), red(&after));
}
