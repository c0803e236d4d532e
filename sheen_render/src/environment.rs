//! Image based lighting precomputation.
//!
//! An equirectangular HDR panorama is rendered onto the six faces of a
//! cubemap, which is then convolved into a small diffuse irradiance cubemap.
//! Each step needs the previous one:
//!
//! `Empty -> HdrLoaded -> CubemapBuilt -> IrradianceBuilt`

use crate::program::{PipelineKey, ProgramId, ProgramManager};
use crate::resources::{GpuResources, TextureId};
use crate::shaders;
use crate::textures::TextureUnits;
use futures::executor::block_on;
use sheen_asset::environment::{MIN_SAMPLE_DELTA, irradiance_sample_count};
use sheen_asset::{CubeFace, EnvironmentSettings, HdrImage, StageKind, TextureError, UniformSlot};
use snafu::{ResultExt, Snafu, ensure};
use std::fmt::{Display, Formatter};
use std::path::Path;
use tracing::{debug, info, instrument};
use wgpu::{
    Color, CommandEncoderDescriptor, ErrorFilter, LoadOp, Operations, RenderPassColorAttachment,
    RenderPassDescriptor, StoreOp, TextureFormat, TextureViewDescriptor, TextureViewDimension,
};

/// Format of both environment cubemaps.
pub const CUBEMAP_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnvironmentStage {
    Empty,
    HdrLoaded,
    CubemapBuilt,
    IrradianceBuilt,
}

impl Display for EnvironmentStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EnvironmentStage::Empty => "empty",
            EnvironmentStage::HdrLoaded => "HDR loaded",
            EnvironmentStage::CubemapBuilt => "cubemap built",
            EnvironmentStage::IrradianceBuilt => "irradiance built",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum EnvironmentError {
    #[snafu(display("Failed to load HDR panorama: {source}"))]
    HdrLoad { source: TextureError },

    #[snafu(display("Cannot {operation}, the environment is {current} but needs to be {required}"))]
    NotReady {
        operation: &'static str,
        current: EnvironmentStage,
        required: EnvironmentStage,
    },

    #[snafu(display("Ran out of GPU memory while building the {what}: {message}"))]
    OutOfMemory { what: &'static str, message: String },

    #[snafu(display("Environment pass {label:?} did not link:\n{info_log}"))]
    Program { label: &'static str, info_log: String },

    #[snafu(display("Cube face size {size} is outside 1..={limit}"))]
    FaceSize { size: u32, limit: u32 },

    #[snafu(display(
        "Irradiance sample step {delta} must be a finite angle of at least {min} radians"
    ))]
    SampleDelta { delta: f32, min: f32 },
}

/// A program rendering one full cube face, and its face basis uniforms.
#[derive(Debug, Copy, Clone)]
struct FacePass {
    program: ProgramId,
    forward: UniformSlot,
    right: UniformSlot,
    down: UniformSlot,
    sample_delta: UniformSlot,
}

impl FacePass {
    fn link(
        programs: &mut ProgramManager,
        label: &'static str,
        fragment: &str,
        source_name: &str,
    ) -> Result<Self, EnvironmentError> {
        let vs = programs.compile(StageKind::Vertex, "Cube Face Vertex", shaders::CUBE_FACE_VERTEX);
        let fs = programs.compile(StageKind::Fragment, label, fragment);
        let program = programs.link(label, vs, fs);
        programs.release_shader(vs);
        programs.release_shader(fs);

        if !programs.link_status(program) {
            let info_log = programs.info_log(program).unwrap_or_default().to_string();
            programs.release_program(program);
            return ProgramErr { label, info_log }.fail();
        }

        programs.assign_texture_unit(program, source_name, 0);

        Ok(FacePass {
            program,
            forward: programs.resolve(program, "face.forward"),
            right: programs.resolve(program, "face.right"),
            down: programs.resolve(program, "face.down"),
            sample_delta: programs.resolve(program, "sample_delta"),
        })
    }
}

#[derive(Debug, Copy, Clone)]
struct EnvironmentPasses {
    cubemap: FacePass,
    irradiance: FacePass,
}

impl EnvironmentPasses {
    fn link(programs: &mut ProgramManager) -> Result<Self, EnvironmentError> {
        let cubemap = FacePass::link(
            programs,
            "Equirect To Cubemap",
            shaders::EQUIRECT_TO_CUBE,
            "equirect_map",
        )?;
        let irradiance = match FacePass::link(
            programs,
            "Irradiance Convolution",
            shaders::IRRADIANCE,
            "environment_map",
        ) {
            Ok(pass) => pass,
            Err(e) => {
                programs.release_program(cubemap.program);
                return Err(e);
            }
        };

        Ok(EnvironmentPasses { cubemap, irradiance })
    }
}

/// The HDR source with the two cubemaps derived from it.
///
/// The environment is the only owner of these textures. Rebuilding a stage
/// releases everything derived from the previous one.
#[derive(Debug, Default)]
pub struct Environment {
    hdr: Option<TextureId>,
    cubemap: Option<TextureId>,
    irradiance: Option<TextureId>,
    passes: Option<EnvironmentPasses>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> EnvironmentStage {
        match (self.hdr, self.cubemap, self.irradiance) {
            (_, Some(_), Some(_)) => EnvironmentStage::IrradianceBuilt,
            (_, Some(_), None) => EnvironmentStage::CubemapBuilt,
            (Some(_), None, _) => EnvironmentStage::HdrLoaded,
            (None, None, _) => EnvironmentStage::Empty,
        }
    }

    pub fn hdr(&self) -> Option<TextureId> {
        self.hdr
    }

    pub fn cubemap(&self) -> Option<TextureId> {
        self.cubemap
    }

    pub fn irradiance(&self) -> Option<TextureId> {
        self.irradiance
    }

    /// Decodes and uploads a new panorama, dropping every previously built map.
    ///
    /// A panorama that fails to decode leaves the environment untouched.
    pub fn load_hdr(
        &mut self,
        resources: &mut GpuResources,
        path: impl AsRef<Path>,
    ) -> Result<(), EnvironmentError> {
        let image = HdrImage::load(path).context(HdrLoadErr)?;
        self.set_hdr(resources, &image);
        Ok(())
    }

    pub fn set_hdr(&mut self, resources: &mut GpuResources, image: &HdrImage) {
        let hdr = resources.upload_hdr(image);
        self.release(resources);
        self.hdr = Some(hdr);
        debug!("Environment panorama is {}x{}", image.width, image.height);
    }

    /// Renders the panorama onto a cubemap with `face_size` texels per side.
    #[instrument(skip(self, resources, programs))]
    pub fn equirect_to_cubemap(
        &mut self,
        resources: &mut GpuResources,
        programs: &mut ProgramManager,
        face_size: u32,
    ) -> Result<TextureId, EnvironmentError> {
        let hdr = self
            .hdr
            .ok_or_else(|| self.not_ready("build the cubemap", EnvironmentStage::HdrLoaded))?;
        check_face_size(resources, face_size)?;

        let pass = self.passes(programs)?.cubemap;
        let cubemap = render_faces(
            resources,
            programs,
            &pass,
            hdr,
            face_size,
            "environment cubemap",
        )?;

        self.release_derived(resources);
        self.cubemap = Some(cubemap);
        info!("Built {face_size}x{face_size} environment cubemap");

        Ok(cubemap)
    }

    /// Integrates the cubemap's radiance over the hemisphere of every output texel.
    ///
    /// `sample_delta` is the angular step in radians along both azimuth and elevation.
    #[instrument(skip(self, resources, programs))]
    pub fn convolve_irradiance(
        &mut self,
        resources: &mut GpuResources,
        programs: &mut ProgramManager,
        size: u32,
        sample_delta: f32,
    ) -> Result<TextureId, EnvironmentError> {
        let cubemap = self
            .cubemap
            .ok_or_else(|| self.not_ready("convolve irradiance", EnvironmentStage::CubemapBuilt))?;
        check_face_size(resources, size)?;
        ensure!(
            sample_delta.is_finite() && sample_delta >= MIN_SAMPLE_DELTA,
            SampleDeltaErr {
                delta: sample_delta,
                min: MIN_SAMPLE_DELTA,
            }
        );

        let pass = self.passes(programs)?.irradiance;
        programs.write(pass.program, pass.sample_delta, sample_delta);
        let irradiance = render_faces(resources, programs, &pass, cubemap, size, "irradiance map")?;

        if let Some(old) = self.irradiance.replace(irradiance) {
            resources.release_texture(old);
        }
        info!(
            "Convolved {size}x{size} irradiance map with {} samples per texel",
            irradiance_sample_count(sample_delta)
        );

        Ok(irradiance)
    }

    /// Runs every remaining stage up to [`EnvironmentStage::IrradianceBuilt`].
    pub fn build(
        &mut self,
        resources: &mut GpuResources,
        programs: &mut ProgramManager,
        settings: &EnvironmentSettings,
    ) -> Result<(), EnvironmentError> {
        if self.cubemap.is_none() {
            self.equirect_to_cubemap(resources, programs, settings.face_size)?;
        }
        if self.irradiance.is_none() {
            self.convolve_irradiance(
                resources,
                programs,
                settings.irradiance_size,
                settings.sample_delta,
            )?;
        }
        Ok(())
    }

    /// Builds a complete environment from `path` and swaps it in.
    ///
    /// The current maps stay bound until the new set is complete. On failure
    /// nothing changes and whatever was built on the way is released.
    pub fn reload(
        &mut self,
        resources: &mut GpuResources,
        programs: &mut ProgramManager,
        path: impl AsRef<Path>,
        settings: &EnvironmentSettings,
    ) -> Result<(), EnvironmentError> {
        let mut next = Environment {
            passes: Some(self.passes(programs)?),
            ..Environment::default()
        };

        let built = next
            .load_hdr(resources, path)
            .and_then(|()| next.build(resources, programs, settings));
        if let Err(e) = built {
            next.release(resources);
            return Err(e);
        }

        self.release(resources);
        *self = next;
        Ok(())
    }

    /// Releases the panorama and both cubemaps. The environment is empty afterwards.
    pub fn release(&mut self, resources: &mut GpuResources) {
        self.release_derived(resources);
        if let Some(hdr) = self.hdr.take() {
            resources.release_texture(hdr);
        }
    }

    /// Releases the textures and the precomputation programs.
    pub fn destroy(&mut self, resources: &mut GpuResources, programs: &mut ProgramManager) {
        self.release(resources);
        if let Some(passes) = self.passes.take() {
            programs.release_program(passes.cubemap.program);
            programs.release_program(passes.irradiance.program);
        }
    }

    fn release_derived(&mut self, resources: &mut GpuResources) {
        for texture in [self.irradiance.take(), self.cubemap.take()].into_iter().flatten() {
            resources.release_texture(texture);
        }
    }

    fn passes(
        &mut self,
        programs: &mut ProgramManager,
    ) -> Result<EnvironmentPasses, EnvironmentError> {
        if let Some(passes) = self.passes {
            return Ok(passes);
        }

        let passes = EnvironmentPasses::link(programs)?;
        self.passes = Some(passes);
        Ok(passes)
    }

    fn not_ready(&self, operation: &'static str, required: EnvironmentStage) -> EnvironmentError {
        EnvironmentError::NotReady {
            operation,
            current: self.stage(),
            required,
        }
    }
}

fn check_face_size(resources: &GpuResources, size: u32) -> Result<(), EnvironmentError> {
    let limit = resources.device().limits().max_texture_dimension_2d;
    ensure!(size > 0 && size <= limit, FaceSizeErr { size, limit });
    Ok(())
}

/// Renders `pass` once per cube face into a new cube texture, sampling `source` on unit 0.
#[profiling::function]
fn render_faces(
    resources: &mut GpuResources,
    programs: &mut ProgramManager,
    pass: &FacePass,
    source: TextureId,
    size: u32,
    what: &'static str,
) -> Result<TextureId, EnvironmentError> {
    let device = resources.device().clone();
    let queue = resources.queue().clone();

    let scope = device.push_error_scope(ErrorFilter::OutOfMemory);
    let target = resources.create_cube_target(what, size, CUBEMAP_FORMAT);

    let key = PipelineKey::color_only(CUBEMAP_FORMAT);
    programs.prepare(pass.program, key);

    let mut units = TextureUnits::new();
    units.bind_unit(0, Some(source));

    if let Some(cube) = resources.texture(target) {
        for face in CubeFace::ALL {
            let basis = face.basis();
            programs.write(pass.program, pass.forward, basis.forward);
            programs.write(pass.program, pass.right, basis.right);
            programs.write(pass.program, pass.down, basis.down);
            programs.flush_uniforms(pass.program);

            let view = cube.texture.create_view(&TextureViewDescriptor {
                label: Some("Cube Face View"),
                dimension: Some(TextureViewDimension::D2),
                base_array_layer: face.layer(),
                array_layer_count: Some(1),
                ..TextureViewDescriptor::default()
            });

            let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Cube Face Encoder"),
            });
            {
                let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                    label: Some("Cube Face Pass"),
                    color_attachments: &[Some(RenderPassColorAttachment {
                        view: &view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: Operations {
                            load: LoadOp::Clear(Color::BLACK),
                            store: StoreOp::Store,
                        },
                    })],
                    ..RenderPassDescriptor::default()
                });

                if programs.activate(&mut rpass, pass.program, key, resources, &units) {
                    rpass.draw(0..3, 0..1);
                }
            }
            queue.submit(Some(encoder.finish()));
        }
    }

    if let Some(error) = block_on(scope.pop()) {
        resources.release_texture(target);
        return OutOfMemoryErr {
            what,
            message: error.to_string(),
        }
        .fail();
    }

    Ok(target)
}
