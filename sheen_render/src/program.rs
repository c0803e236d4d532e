//! Shader stages and linked programs living on the device.
//!
//! Compilation and linking never fail outright. A stage or program that
//! doesn't work still gets an id, reports `false` from its status query and
//! keeps the diagnostics in its info log. Drawing with it is skipped.

use crate::resources::{GpuResources, TextureId, TextureKind};
use crate::textures::TextureUnits;
use sheen_asset::shader::{BindingKind, ProgramBinding};
use sheen_asset::{
    CompiledStage, ProgramLayout, StageKind, UniformSlot, UniformTable, UniformValue, Vertex3D,
    link_stages,
};
use sheen_utils::sizes::UNIFORM_ALIGNMENT;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, trace, warn};
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, BlendState, Buffer, BufferBindingType,
    BufferDescriptor, BufferUsages, ColorTargetState, ColorWrites, CompareFunction,
    DepthStencilState, Device, Face, FragmentState, FrontFace, MultisampleState,
    PipelineCompilationOptions, PipelineLayout, PipelineLayoutDescriptor, PrimitiveState,
    PrimitiveTopology, Queue, RenderPass, RenderPipeline, RenderPipelineDescriptor, ShaderModule,
    ShaderModuleDescriptor, ShaderSource, ShaderStages, TextureFormat, TextureViewDimension,
    VertexState,
};

new_key_type! {
    pub struct ShaderId;
    pub struct ProgramId;
}

struct ShaderEntry {
    stage: CompiledStage,
    module: Option<ShaderModule>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DepthMode {
    pub format: TextureFormat,
    pub compare: CompareFunction,
    pub write: bool,
}

/// Fixed-function state a pipeline is baked with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub color_format: TextureFormat,
    pub depth: Option<DepthMode>,
    pub cull: Option<Face>,
}

impl PipelineKey {
    pub const fn color_only(color_format: TextureFormat) -> Self {
        PipelineKey {
            color_format,
            depth: None,
            cull: None,
        }
    }
}

struct LinkedProgram {
    layout: ProgramLayout,
    vertex: ShaderModule,
    fragment: ShaderModule,
    group_layouts: Vec<BindGroupLayout>,
    pipeline_layout: PipelineLayout,
    uniform_buffers: Vec<Buffer>,
    pipelines: HashMap<PipelineKey, RenderPipeline>,
    bind_groups: BindGroupCache,
}

type BoundTextures = SmallVec<[Option<TextureId>; 8]>;
type BindGroups = SmallVec<[(u32, BindGroup); 4]>;

/// Bind groups per set of textures the program's bindings read.
#[derive(Default)]
struct BindGroupCache {
    texture_releases: u64,
    entries: HashMap<BoundTextures, BindGroups>,
}

impl BindGroupCache {
    const CAPACITY: usize = 16;

    fn prune(&mut self, texture_releases: u64) {
        if self.texture_releases != texture_releases || self.entries.len() >= Self::CAPACITY {
            self.entries.clear();
            self.texture_releases = texture_releases;
        }
    }
}

struct Program {
    label: String,
    uniforms: UniformTable,
    linked: Option<LinkedProgram>,
    info_log: String,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ProgramCounts {
    pub shaders: usize,
    pub programs: usize,
}

pub struct ProgramManager {
    device: Arc<Device>,
    queue: Arc<Queue>,
    shaders: SlotMap<ShaderId, ShaderEntry>,
    programs: SlotMap<ProgramId, Program>,
}

impl ProgramManager {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>) -> Self {
        ProgramManager {
            device,
            queue,
            shaders: SlotMap::with_key(),
            programs: SlotMap::with_key(),
        }
    }

    pub fn from_resources(resources: &GpuResources) -> Self {
        Self::new(resources.device().clone(), resources.queue().clone())
    }

    pub fn counts(&self) -> ProgramCounts {
        ProgramCounts {
            shaders: self.shaders.len(),
            programs: self.programs.len(),
        }
    }

    /// Compiles a stage from WGSL source.
    pub fn compile(&mut self, kind: StageKind, label: &str, source: &str) -> ShaderId {
        self.insert_stage(CompiledStage::compile(label, kind, source))
    }

    /// Compiles a stage from a WGSL file. An unreadable file gives an unusable stage.
    pub fn compile_file(&mut self, kind: StageKind, path: impl AsRef<Path>) -> ShaderId {
        self.insert_stage(CompiledStage::compile_file(kind, path))
    }

    fn insert_stage(&mut self, stage: CompiledStage) -> ShaderId {
        let module = stage.is_usable().then(|| {
            self.device.create_shader_module(ShaderModuleDescriptor {
                label: Some(stage.label()),
                source: ShaderSource::Wgsl(Cow::Owned(stage.source().to_string())),
            })
        });

        self.shaders.insert(ShaderEntry { stage, module })
    }

    pub fn stage_status(&self, id: ShaderId) -> bool {
        self.shaders.get(id).is_some_and(|s| s.module.is_some())
    }

    pub fn stage_info_log(&self, id: ShaderId) -> Option<&str> {
        self.shaders.get(id).map(|s| s.stage.info_log())
    }

    /// Links a vertex and a fragment stage into a program.
    ///
    /// Always returns an id. Check [`ProgramManager::link_status`] before trusting it.
    #[instrument(skip(self))]
    pub fn link(&mut self, label: &str, vertex: ShaderId, fragment: ShaderId) -> ProgramId {
        let program = match self.try_link(label, vertex, fragment) {
            Ok(linked) => {
                info!("Successfully linked shader program {label:?}");
                Program {
                    label: label.to_string(),
                    uniforms: UniformTable::new(&linked.layout),
                    linked: Some(linked),
                    info_log: String::new(),
                }
            }
            Err(log) => {
                error!("Failed to link shader program {label:?}. Info log:\n{log}");
                Program {
                    label: label.to_string(),
                    uniforms: UniformTable::empty(),
                    linked: None,
                    info_log: log,
                }
            }
        };

        self.programs.insert(program)
    }

    fn try_link(
        &self,
        label: &str,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<LinkedProgram, String> {
        let vs = self
            .shaders
            .get(vertex)
            .ok_or_else(|| format!("vertex stage {vertex:?} does not exist"))?;
        let fs = self
            .shaders
            .get(fragment)
            .ok_or_else(|| format!("fragment stage {fragment:?} does not exist"))?;

        let layout = link_stages(&vs.stage, &fs.stage).map_err(|e| e.to_string())?;
        let (Some(vertex), Some(fragment)) = (&vs.module, &fs.module) else {
            return Err("a stage has no device module".to_string());
        };

        let group_layouts: Vec<BindGroupLayout> = (0..layout.group_count())
            .map(|group| create_group_layout(&self.device, label, group, &layout))
            .collect();

        let layout_refs: Vec<&BindGroupLayout> = group_layouts.iter().collect();
        let pipeline_layout = self.device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &layout_refs,
            immediate_size: 0,
        });

        let uniforms = UniformTable::new(&layout);
        let uniform_buffers = uniforms
            .blocks()
            .iter()
            .map(|block| {
                let size = (block.data().len() as u64).max(UNIFORM_ALIGNMENT);
                let size = size.next_multiple_of(UNIFORM_ALIGNMENT);
                self.device.create_buffer(&BufferDescriptor {
                    label: Some(&format!("{label} {} Uniform Buffer", block.name)),
                    size,
                    usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        Ok(LinkedProgram {
            layout,
            vertex: vertex.clone(),
            fragment: fragment.clone(),
            group_layouts,
            pipeline_layout,
            uniform_buffers,
            pipelines: HashMap::new(),
            bind_groups: BindGroupCache::default(),
        })
    }

    pub fn link_status(&self, id: ProgramId) -> bool {
        self.programs.get(id).is_some_and(|p| p.linked.is_some())
    }

    pub fn info_log(&self, id: ProgramId) -> Option<&str> {
        self.programs.get(id).map(|p| p.info_log.as_str())
    }

    pub fn label(&self, id: ProgramId) -> Option<&str> {
        self.programs.get(id).map(|p| p.label.as_str())
    }

    pub fn layout(&self, id: ProgramId) -> Option<&ProgramLayout> {
        self.programs.get(id)?.linked.as_ref().map(|l| &l.layout)
    }

    pub fn uniforms(&self, id: ProgramId) -> Option<&UniformTable> {
        self.programs.get(id).map(|p| &p.uniforms)
    }

    pub fn uniforms_mut(&mut self, id: ProgramId) -> Option<&mut UniformTable> {
        self.programs.get_mut(id).map(|p| &mut p.uniforms)
    }

    /// Resolves `name` in the program's uniform table.
    ///
    /// Unknown programs resolve everything as absent.
    pub fn resolve(&self, id: ProgramId, name: &str) -> UniformSlot {
        self.uniforms(id)
            .map_or(UniformSlot::ABSENT, |table| table.resolve(name))
    }

    pub fn write(&mut self, id: ProgramId, slot: UniformSlot, value: impl Into<UniformValue>) {
        if let Some(table) = self.uniforms_mut(id) {
            table.write(slot, value);
        }
    }

    pub fn assign_texture_unit(&mut self, id: ProgramId, name: &str, unit: u32) -> bool {
        self.uniforms_mut(id)
            .is_some_and(|table| table.assign_texture_unit(name, unit))
    }

    /// Uploads every uniform block written since the last flush.
    pub fn flush_uniforms(&mut self, id: ProgramId) {
        let Some(program) = self.programs.get_mut(id) else {
            return;
        };
        let Some(linked) = &program.linked else {
            return;
        };

        let queue = &self.queue;
        program.uniforms.flush(|index, block| {
            if let Some(buffer) = linked.uniform_buffers.get(index) {
                queue.write_buffer(buffer, 0, block.data());
            }
        });
    }

    /// Builds the pipeline for `key` unless it is cached already.
    ///
    /// Returns false for programs that didn't link.
    pub fn prepare(&mut self, id: ProgramId, key: PipelineKey) -> bool {
        let Some(program) = self.programs.get_mut(id) else {
            return false;
        };
        let Some(linked) = &mut program.linked else {
            return false;
        };

        if !linked.pipelines.contains_key(&key) {
            debug!("Building pipeline for {:?} with {key:?}", program.label);
            let pipeline = create_pipeline(&self.device, &program.label, linked, key);
            linked.pipelines.insert(key, pipeline);
        }
        true
    }

    /// Sets the pipeline and every bind group of the program on `pass`.
    ///
    /// Texture bindings read whatever `units` holds for their unit, or the
    /// fallback texture of the matching kind. Bind groups are reused for as
    /// long as the same textures are bound and none was released. Call
    /// [`ProgramManager::prepare`] with the same key first.
    pub fn activate(
        &mut self,
        pass: &mut RenderPass<'_>,
        id: ProgramId,
        key: PipelineKey,
        resources: &GpuResources,
        units: &TextureUnits,
    ) -> bool {
        let Some(program) = self.programs.get_mut(id) else {
            return false;
        };
        let Some(linked) = &mut program.linked else {
            return false;
        };
        let Some(pipeline) = linked.pipelines.get(&key) else {
            warn!("No pipeline prepared for {:?} with {key:?}", program.label);
            return false;
        };

        pass.set_pipeline(pipeline);

        let table = &program.uniforms;
        let bound = bound_textures(table, &linked.layout, resources, units);
        linked.bind_groups.prune(resources.texture_releases());
        let groups = match linked.bind_groups.entries.entry(bound) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                trace!("Creating bind groups for {:?}", program.label);
                entry.insert(create_bind_groups(
                    &self.device,
                    &program.label,
                    table,
                    &linked.layout,
                    &linked.group_layouts,
                    &linked.uniform_buffers,
                    resources,
                    units,
                ))
            }
        };

        for (group, bind_group) in groups.iter() {
            pass.set_bind_group(*group, bind_group, &[]);
        }

        true
    }

    /// Number of bind group sets the program currently keeps around.
    pub fn cached_bind_groups(&self, id: ProgramId) -> usize {
        self.programs
            .get(id)
            .and_then(|p| p.linked.as_ref())
            .map_or(0, |linked| linked.bind_groups.entries.len())
    }

    pub fn release_shader(&mut self, id: ShaderId) -> bool {
        if self.shaders.remove(id).is_none() {
            warn!("Tried to release shader stage {id:?} which is not alive");
            return false;
        }
        true
    }

    pub fn release_program(&mut self, id: ProgramId) -> bool {
        let Some(program) = self.programs.remove(id) else {
            warn!("Tried to release shader program {id:?} which is not alive");
            return false;
        };

        if let Some(linked) = program.linked {
            for buffer in linked.uniform_buffers {
                buffer.destroy();
            }
        }
        true
    }
}

/// Unit a texture or sampler binding reads, and the kind of texture it expects there.
fn binding_source(table: &UniformTable, binding: &ProgramBinding) -> Option<(u32, TextureKind)> {
    let unit = table.texture_unit(&binding.name).unwrap_or(0);
    match &binding.kind {
        BindingKind::Uniform(_) => None,
        BindingKind::Texture { view_dimension, .. } => Some((unit, texture_kind(*view_dimension))),
        BindingKind::Sampler(_) => Some((unit, sampled_kind(table, unit))),
    }
}

/// The texture behind every texture and sampler binding, `None` where the fallback is read.
fn bound_textures(
    table: &UniformTable,
    layout: &ProgramLayout,
    resources: &GpuResources,
    units: &TextureUnits,
) -> BoundTextures {
    layout
        .bindings
        .iter()
        .filter_map(|binding| binding_source(table, binding))
        .map(|(unit, kind)| units.resolve_id(resources, unit, kind))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn create_bind_groups(
    device: &Device,
    label: &str,
    table: &UniformTable,
    layout: &ProgramLayout,
    group_layouts: &[BindGroupLayout],
    uniform_buffers: &[Buffer],
    resources: &GpuResources,
    units: &TextureUnits,
) -> BindGroups {
    group_layouts
        .iter()
        .enumerate()
        .map(|(group, group_layout)| {
            let group = group as u32;
            let entries: Vec<BindGroupEntry> = layout
                .group(group)
                .filter_map(|binding| {
                    let resource = match &binding.kind {
                        BindingKind::Uniform(_) => {
                            let index = table.block_index(binding.group, binding.binding)?;
                            uniform_buffers.get(index)?.as_entire_binding()
                        }
                        BindingKind::Texture { .. } => {
                            let (unit, kind) = binding_source(table, binding)?;
                            BindingResource::TextureView(&units.resolve(resources, unit, kind).view)
                        }
                        BindingKind::Sampler(_) => {
                            let (unit, kind) = binding_source(table, binding)?;
                            BindingResource::Sampler(&units.resolve(resources, unit, kind).sampler)
                        }
                    };
                    Some(BindGroupEntry {
                        binding: binding.binding,
                        resource,
                    })
                })
                .collect();

            let bind_group = device.create_bind_group(&BindGroupDescriptor {
                label: Some(label),
                layout: group_layout,
                entries: &entries,
            });
            (group, bind_group)
        })
        .collect()
}

fn texture_kind(dimension: TextureViewDimension) -> TextureKind {
    match dimension {
        TextureViewDimension::Cube => TextureKind::Cube,
        _ => TextureKind::Flat,
    }
}

/// Kind of texture a sampler on `unit` is paired with.
fn sampled_kind(table: &UniformTable, unit: u32) -> TextureKind {
    table
        .texture_bindings()
        .iter()
        .find_map(|b| match b.kind {
            BindingKind::Texture { view_dimension, .. } if b.unit == unit => {
                Some(texture_kind(view_dimension))
            }
            _ => None,
        })
        .unwrap_or(TextureKind::Flat)
}

fn visibility(binding: &ProgramBinding) -> ShaderStages {
    let mut stages = ShaderStages::NONE;
    if binding.vertex {
        stages |= ShaderStages::VERTEX;
    }
    if binding.fragment {
        stages |= ShaderStages::FRAGMENT;
    }
    stages
}

fn create_group_layout(
    device: &Device,
    label: &str,
    group: u32,
    layout: &ProgramLayout,
) -> BindGroupLayout {
    let entries: Vec<BindGroupLayoutEntry> = layout
        .group(group)
        .map(|binding| BindGroupLayoutEntry {
            binding: binding.binding,
            visibility: visibility(binding),
            ty: match &binding.kind {
                BindingKind::Uniform(_) => BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                BindingKind::Texture {
                    view_dimension,
                    sample_type,
                } => BindingType::Texture {
                    sample_type: *sample_type,
                    view_dimension: *view_dimension,
                    multisampled: false,
                },
                BindingKind::Sampler(ty) => BindingType::Sampler(*ty),
            },
            count: None,
        })
        .collect();

    device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some(&format!("{label} Group {group}")),
        entries: &entries,
    })
}

fn create_pipeline(
    device: &Device,
    label: &str,
    linked: &LinkedProgram,
    key: PipelineKey,
) -> RenderPipeline {
    let vertex_buffers = [Vertex3D::continuous_descriptor()];
    let buffers: &[_] = if linked.layout.uses_vertex_buffer() {
        &vertex_buffers
    } else {
        &[]
    };

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&linked.pipeline_layout),
        vertex: VertexState {
            module: &linked.vertex,
            entry_point: Some(&linked.layout.vertex_entry),
            compilation_options: PipelineCompilationOptions::default(),
            buffers,
        },
        fragment: Some(FragmentState {
            module: &linked.fragment,
            entry_point: Some(&linked.layout.fragment_entry),
            compilation_options: PipelineCompilationOptions::default(),
            targets: &[Some(ColorTargetState {
                format: key.color_format,
                blend: Some(BlendState::REPLACE),
                write_mask: ColorWrites::ALL,
            })],
        }),
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: key.cull,
            ..PrimitiveState::default()
        },
        depth_stencil: key.depth.map(|depth| DepthStencilState {
            format: depth.format,
            depth_write_enabled: depth.write,
            depth_compare: depth.compare,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}
