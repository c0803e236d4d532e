//! Per-frame orchestration of the mesh and skybox draws.

use crate::program::{DepthMode, PipelineKey, ProgramId, ProgramManager};
use crate::resources::{GpuResources, VertexArrayId};
use crate::scene::SceneResources;
use crate::shaders;
use crate::textures::TextureUnits;
use bon::Builder;
use nalgebra::{Matrix4, Point3, Rotation3, Unit, Vector3};
use sheen_asset::{
    LightSlots, LightState, MaterialSlots, MaterialState, Mesh, StageKind, TextureRole, UniformSlot,
    UniformTable,
};
use sheen_utils::EngineArgs;
use tracing::{instrument, warn};
use wgpu::{
    Color, CommandEncoderDescriptor, CompareFunction, Device, Extent3d, LoadOp, Operations,
    RenderPass, RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    StoreOp, Texture, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages,
    TextureView, TextureViewDescriptor,
};

pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Maps OpenGL's -1..1 clip depth to the 0..1 range wgpu expects.
#[rustfmt::skip]
pub fn opengl_to_wgpu() -> Matrix4<f32> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.5, 0.5,
        0.0, 0.0, 0.0, 1.0,
    )
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub position: Vector3<f32>,
}

impl Camera {
    /// Identity view and projection, looking down -Z from one unit in front of the origin.
    pub fn identity() -> Self {
        Camera {
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
            position: Vector3::new(0.0, 0.0, 1.0),
        }
    }

    pub fn look_at_perspective(
        eye: Point3<f32>,
        target: Point3<f32>,
        up: Vector3<f32>,
        fovy: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Camera {
            view: Matrix4::look_at_rh(&eye, &target, &up),
            projection: opengl_to_wgpu() * Matrix4::new_perspective(aspect, fovy, near, far),
            position: eye.coords,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Camera::look_at_perspective(
            Point3::new(0.0, 0.0, 3.0),
            Point3::origin(),
            Vector3::y(),
            45f32.to_radians(),
            1.0,
            0.1,
            100.0,
        )
    }
}

/// `view` with its translation removed, so only the camera's rotation remains.
pub fn strip_translation(view: &Matrix4<f32>) -> Matrix4<f32> {
    let mut rotation = *view;
    rotation.fixed_view_mut::<3, 1>(0, 3).fill(0.0);
    rotation.fixed_view_mut::<1, 3>(3, 0).fill(0.0);
    rotation[(3, 3)] = 1.0;
    rotation
}

#[derive(Debug, Copy, Clone, PartialEq, Builder)]
pub struct FrameSettings {
    #[builder(default = Color { r: 0.1, g: 0.1, b: 0.1, a: 1.0 })]
    pub clear_color: Color,
    #[builder(default = Vector3::y())]
    pub rotation_axis: Vector3<f32>,
    /// Model rotation in radians per second of elapsed time.
    #[builder(default = 0.5)]
    pub rotation_speed: f32,
    #[builder(default = true)]
    pub animate: bool,
    #[builder(default = 1.0)]
    pub exposure: f32,
}

impl Default for FrameSettings {
    fn default() -> Self {
        FrameSettings::builder().build()
    }
}

impl FrameSettings {
    pub fn from_args() -> Self {
        let args = EngineArgs::get();
        let defaults = FrameSettings::default();

        FrameSettings {
            rotation_speed: args.rotation_speed.unwrap_or(defaults.rotation_speed),
            animate: !args.no_animation,
            ..defaults
        }
    }

    /// Model matrix after `elapsed` seconds.
    pub fn model_matrix(&self, elapsed: f32) -> Matrix4<f32> {
        if !self.animate || self.rotation_axis.norm_squared() == 0.0 {
            return Matrix4::identity();
        }

        let axis = Unit::new_normalize(self.rotation_axis);
        Rotation3::from_axis_angle(&axis, self.rotation_speed * elapsed).to_homogeneous()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransformSlots {
    pub model: UniformSlot,
    pub view: UniformSlot,
    pub projection: UniformSlot,
    pub normal_matrix: UniformSlot,
    pub camera_position: UniformSlot,
}

impl TransformSlots {
    pub fn resolve(table: &UniformTable) -> Self {
        TransformSlots {
            model: table.resolve("model"),
            view: table.resolve("view"),
            projection: table.resolve("projection"),
            normal_matrix: table.resolve("normal_matrix"),
            camera_position: table.resolve("camera_position"),
        }
    }

    pub fn write(
        &self,
        table: &mut UniformTable,
        model: &Matrix4<f32>,
        view: &Matrix4<f32>,
        camera: &Camera,
    ) {
        let normal_matrix = model.try_inverse().map_or(*model, |inverse| inverse.transpose());

        table.write(self.model, *model);
        table.write(self.view, *view);
        table.write(self.projection, camera.projection);
        table.write(self.normal_matrix, normal_matrix);
        table.write(self.camera_position, camera.position);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TonemapSlots {
    pub exposure: UniformSlot,
    pub apply_gamma: UniformSlot,
}

impl TonemapSlots {
    pub fn resolve(table: &UniformTable) -> Self {
        TonemapSlots {
            exposure: table.resolve("exposure"),
            apply_gamma: table.resolve("apply_gamma"),
        }
    }

    /// sRGB targets encode on store; everything else gets gamma in the shader.
    pub fn write(&self, table: &mut UniformTable, exposure: f32, format: TextureFormat) {
        table.write(self.exposure, exposure);
        table.write(self.apply_gamma, !format.is_srgb());
    }
}

#[derive(Debug, Copy, Clone)]
struct PbrSlots {
    material: MaterialSlots,
    light: LightSlots,
    transform: TransformSlots,
    tonemap: TonemapSlots,
}

#[derive(Debug, Copy, Clone)]
struct SkyboxSlots {
    transform: TransformSlots,
    tonemap: TonemapSlots,
}

/// Colour attachment a frame is rendered into.
#[derive(Debug, Copy, Clone)]
pub struct FrameTarget<'a> {
    pub view: &'a TextureView,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
}

struct DepthBuffer {
    texture: Texture,
    view: TextureView,
}

impl DepthBuffer {
    fn new(device: &Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("Frame Depth Texture"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());

        DepthBuffer { texture, view }
    }

    fn matches(&self, width: u32, height: u32) -> bool {
        self.texture.width() == width && self.texture.height() == height
    }
}

/// What a call to [`FrameDriver::render_frame`] ended up drawing.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub mesh: bool,
    pub skybox: bool,
}

pub struct FrameDriver {
    pbr: ProgramId,
    skybox: ProgramId,
    pbr_slots: PbrSlots,
    skybox_slots: SkyboxSlots,
    cube: VertexArrayId,
    depth: Option<DepthBuffer>,
    pub camera: Camera,
    pub settings: FrameSettings,
}

impl FrameDriver {
    /// Links the built-in programs and uploads the skybox cube.
    ///
    /// Programs that fail to link are logged and their draws skipped.
    pub fn new(
        resources: &mut GpuResources,
        programs: &mut ProgramManager,
        settings: FrameSettings,
    ) -> Self {
        let pbr = link_program(programs, "PBR", shaders::PBR_VERTEX, shaders::PBR_FRAGMENT);
        let skybox = link_program(
            programs,
            "Skybox",
            shaders::SKYBOX_VERTEX,
            shaders::SKYBOX_FRAGMENT,
        );

        for program in [pbr, skybox] {
            if let Some(table) = programs.uniforms_mut(program) {
                TextureRole::assign_units(table);
            }
        }

        let empty = UniformTable::empty();
        let pbr_table = programs.uniforms(pbr).unwrap_or(&empty);
        let pbr_slots = PbrSlots {
            material: MaterialSlots::resolve(pbr_table),
            light: LightSlots::resolve(pbr_table),
            transform: TransformSlots::resolve(pbr_table),
            tonemap: TonemapSlots::resolve(pbr_table),
        };
        let skybox_table = programs.uniforms(skybox).unwrap_or(&empty);
        let skybox_slots = SkyboxSlots {
            transform: TransformSlots::resolve(skybox_table),
            tonemap: TonemapSlots::resolve(skybox_table),
        };

        FrameDriver {
            pbr,
            skybox,
            pbr_slots,
            skybox_slots,
            cube: resources.create_vertex_array("Skybox Cube", &Mesh::unit_cube()),
            depth: None,
            camera: Camera::default(),
            settings,
        }
    }

    pub fn pbr_program(&self) -> ProgramId {
        self.pbr
    }

    pub fn skybox_program(&self) -> ProgramId {
        self.skybox
    }

    /// Renders one frame of `scene` into `target`.
    ///
    /// Binds the material maps and the environment to their units, uploads the
    /// material, light and transform uniforms, draws the mesh and then the
    /// skybox behind it when a cubemap exists.
    #[instrument(skip_all)]
    #[profiling::function]
    #[allow(clippy::too_many_arguments)]
    pub fn render_frame(
        &mut self,
        resources: &GpuResources,
        programs: &mut ProgramManager,
        scene: &SceneResources,
        material: &MaterialState,
        light: &LightState,
        elapsed: f32,
        target: &FrameTarget<'_>,
    ) -> FrameReport {
        let mut units = TextureUnits::new();
        for role in TextureRole::MATERIAL {
            units.bind(role, scene.textures().get(role));
        }
        let environment = scene.environment();
        units.bind(TextureRole::Irradiance, environment.irradiance());
        units.bind(TextureRole::Environment, environment.cubemap());

        let material = MaterialState {
            use_ibl: material.use_ibl && environment.irradiance().is_some(),
            ..*material
        };
        let model = self.settings.model_matrix(elapsed);

        if let Some(table) = programs.uniforms_mut(self.pbr) {
            let slots = &self.pbr_slots;
            slots.material.write(table, &material);
            slots.light.write(table, light);
            slots.transform.write(table, &model, &self.camera.view, &self.camera);
            slots.tonemap.write(table, self.settings.exposure, target.format);
        }
        if let Some(table) = programs.uniforms_mut(self.skybox) {
            let slots = &self.skybox_slots;
            let view = strip_translation(&self.camera.view);
            slots.transform.write(table, &Matrix4::identity(), &view, &self.camera);
            slots.tonemap.write(table, self.settings.exposure, target.format);
        }
        programs.flush_uniforms(self.pbr);
        programs.flush_uniforms(self.skybox);

        let mesh_key = PipelineKey {
            color_format: target.format,
            depth: Some(DepthMode {
                format: DEPTH_FORMAT,
                compare: CompareFunction::Less,
                write: true,
            }),
            cull: None,
        };
        let skybox_key = PipelineKey {
            depth: Some(DepthMode {
                format: DEPTH_FORMAT,
                compare: CompareFunction::LessEqual,
                write: false,
            }),
            ..mesh_key
        };
        programs.prepare(self.pbr, mesh_key);
        programs.prepare(self.skybox, skybox_key);

        let device = resources.device();
        if !self
            .depth
            .as_ref()
            .is_some_and(|depth| depth.matches(target.width, target.height))
        {
            self.depth = Some(DepthBuffer::new(device, target.width, target.height));
        }
        let Some(depth) = &self.depth else {
            return FrameReport::default();
        };

        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        let mut report = FrameReport::default();
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(self.settings.clear_color),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..RenderPassDescriptor::default()
            });

            report.mesh = draw(
                &mut pass,
                programs,
                resources,
                &units,
                self.pbr,
                mesh_key,
                scene.mesh(),
            );
            if environment.cubemap().is_some() {
                report.skybox = draw(
                    &mut pass,
                    programs,
                    resources,
                    &units,
                    self.skybox,
                    skybox_key,
                    self.cube,
                );
            }
        }
        resources.queue().submit(Some(encoder.finish()));

        report
    }

    /// Releases the built-in programs and the skybox cube.
    pub fn release(self, resources: &mut GpuResources, programs: &mut ProgramManager) {
        programs.release_program(self.pbr);
        programs.release_program(self.skybox);
        resources.release_vertex_array(self.cube);
    }
}

fn link_program(
    programs: &mut ProgramManager,
    label: &str,
    vertex: &str,
    fragment: &str,
) -> ProgramId {
    let vs = programs.compile(StageKind::Vertex, &format!("{label} Vertex"), vertex);
    let fs = programs.compile(StageKind::Fragment, &format!("{label} Fragment"), fragment);
    let program = programs.link(label, vs, fs);

    programs.release_shader(vs);
    programs.release_shader(fs);
    program
}

#[allow(clippy::too_many_arguments)]
fn draw(
    pass: &mut RenderPass<'_>,
    programs: &mut ProgramManager,
    resources: &GpuResources,
    units: &TextureUnits,
    program: ProgramId,
    key: PipelineKey,
    mesh: VertexArrayId,
) -> bool {
    if !programs.activate(pass, program, key, resources, units) {
        warn!("Skipping draw with unusable program {:?}", programs.label(program));
        return false;
    }

    let Some(index_count) = resources.bind_vertex_array(pass, mesh) else {
        warn!("Skipping draw of released vertex array {mesh:?}");
        return false;
    };

    pass.draw_indexed(0..index_count, 0, 0..1);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector4;

    #[test]
    fn stripped_view_keeps_rotation_only() {
        let eye = Point3::new(3.0, 2.0, 5.0);
        let view = Matrix4::look_at_rh(&eye, &Point3::origin(), &Vector3::y());
        let stripped = strip_translation(&view);

        assert_eq!(stripped.fixed_view::<3, 3>(0, 0), view.fixed_view::<3, 3>(0, 0));
        assert_eq!(stripped * Vector4::new(0.0, 0.0, 0.0, 1.0), Vector4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn model_rotates_with_elapsed_time() {
        let settings = FrameSettings::builder().rotation_speed(1.0).build();
        let model = settings.model_matrix(std::f32::consts::FRAC_PI_2);
        let x = model * Vector4::new(1.0, 0.0, 0.0, 0.0);

        assert!((x - Vector4::new(0.0, 0.0, -1.0, 0.0)).norm() < 1e-6);
        assert_eq!(settings.model_matrix(0.0), Matrix4::identity());
    }

    #[test]
    fn still_model_ignores_time() {
        let settings = FrameSettings::builder().animate(false).build();
        assert_eq!(settings.model_matrix(12.0), Matrix4::identity());
    }

    #[test]
    fn perspective_maps_near_plane_to_zero_depth() {
        let camera = Camera::look_at_perspective(
            Point3::origin(),
            Point3::new(0.0, 0.0, -1.0),
            Vector3::y(),
            90f32.to_radians(),
            1.0,
            0.5,
            10.0,
        );

        let near = camera.projection * Vector4::new(0.0, 0.0, -0.5, 1.0);
        let far = camera.projection * Vector4::new(0.0, 0.0, -10.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }
}
