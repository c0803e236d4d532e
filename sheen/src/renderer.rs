use sheen_asset::{EnvironmentSettings, LightState, MaterialState, Mesh, Texture2D, TextureRole};
use sheen_render::readback::ReadbackError;
use sheen_render::{
    Camera, EnvironmentError, FrameDriver, FrameReport, FrameSettings, GpuResources,
    OffscreenTarget, ProgramManager, SceneResources, State, StateError, TextureId,
};
use nalgebra::{Point3, Vector3};
use snafu::{ResultExt, Snafu};
use std::path::Path;
use tracing::info;
use wgpu::TextureFormat;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum RendererError {
    #[snafu(display("Failed to set up the GPU: {source}"))]
    Gpu { source: StateError },

    #[snafu(display("{source}"))]
    Environment { source: EnvironmentError },

    #[snafu(display("Failed to read back the frame: {source}"))]
    Readback { source: ReadbackError },
}

/// A headless device rendering one scene into an offscreen colour target.
pub struct Renderer {
    state: State,
    resources: GpuResources,
    programs: ProgramManager,
    scene: SceneResources,
    driver: FrameDriver,
    target: OffscreenTarget,
    pub material: MaterialState,
    pub light: LightState,
}

impl Renderer {
    pub const FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

    pub fn headless(
        width: u32,
        height: u32,
        mesh: &Mesh,
        settings: FrameSettings,
    ) -> Result<Self, RendererError> {
        let state = State::headless().context(GpuErr)?;
        let mut resources = GpuResources::new(&state);
        let mut programs = ProgramManager::from_resources(&resources);

        let scene = SceneResources::new(&mut resources, mesh);
        let mut driver = FrameDriver::new(&mut resources, &mut programs, settings);
        driver.camera = Camera::look_at_perspective(
            Point3::new(0.0, 0.0, 3.0),
            Point3::origin(),
            Vector3::y(),
            45f32.to_radians(),
            width.max(1) as f32 / height.max(1) as f32,
            0.1,
            100.0,
        );
        let target = OffscreenTarget::new(state.device(), width, height, Self::FORMAT);

        Ok(Renderer {
            state,
            resources,
            programs,
            scene,
            driver,
            target,
            material: MaterialState::default(),
            light: LightState::default(),
        })
    }

    /// Loads a material map. Unreadable files show up as white.
    pub fn load_texture(&mut self, role: TextureRole, path: impl AsRef<Path>) -> Option<TextureId> {
        self.scene
            .reload_texture(&mut self.resources, role, path, true, true)
    }

    pub fn upload_texture(&mut self, role: TextureRole, image: &Texture2D) -> Option<TextureId> {
        self.scene
            .upload_texture(&mut self.resources, role, image, true)
    }

    /// Bakes a new environment from `path`. The previous one stays in use when this fails.
    pub fn load_environment(
        &mut self,
        path: impl AsRef<Path>,
        settings: &EnvironmentSettings,
    ) -> Result<(), RendererError> {
        let path = path.as_ref();
        self.scene
            .reload_environment(&mut self.resources, &mut self.programs, path, settings)
            .context(EnvironmentErr)?;
        info!("Loaded environment {}", path.display());
        Ok(())
    }

    pub fn set_mesh(&mut self, mesh: &Mesh) {
        self.scene.reload_mesh(&mut self.resources, mesh);
    }

    pub fn render_frame(&mut self, elapsed: f32) -> FrameReport {
        self.driver.render_frame(
            &self.resources,
            &mut self.programs,
            &self.scene,
            &self.material,
            &self.light,
            elapsed,
            &self.target.frame_target(),
        )
    }

    /// RGBA8 pixels of the last frame, rows top to bottom.
    pub fn read_pixels(&self) -> Result<Vec<u8>, RendererError> {
        self.target
            .read_rgba8(self.state.device(), self.state.queue())
            .context(ReadbackErr)
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), RendererError> {
        self.target
            .save_png(self.state.device(), self.state.queue(), path)
            .context(ReadbackErr)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.target.resize(self.state.device(), width, height);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.target.width(), self.target.height())
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.driver.camera
    }

    pub fn settings_mut(&mut self) -> &mut FrameSettings {
        &mut self.driver.settings
    }

    pub fn scene(&self) -> &SceneResources {
        &self.scene
    }

    pub fn resources(&self) -> &GpuResources {
        &self.resources
    }

    /// Releases every GPU resource the renderer created.
    pub fn shutdown(self) {
        let Renderer {
            mut resources,
            mut programs,
            scene,
            driver,
            ..
        } = self;

        driver.release(&mut resources, &mut programs);
        scene.release(&mut resources, &mut programs);
    }
}
