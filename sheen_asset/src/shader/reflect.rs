use naga::valid::ModuleInfo;
use naga::{
    AddressSpace, Binding, EntryPoint, Handle, ImageClass, ImageDimension, Module, Scalar,
    ScalarKind, Type, TypeInner, VectorSize,
};
use wgpu::{SamplerBindingType, TextureSampleType, TextureViewDimension};

/// Everything a linked program needs to know about one compiled stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReflection {
    pub entry_point: String,
    pub inputs: Vec<InterfaceVar>,
    pub outputs: Vec<InterfaceVar>,
    pub bindings: Vec<ResourceBinding>,
}

/// A user-defined stage input or output addressed by `@location`.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceVar {
    pub location: u32,
    pub name: String,
    pub ty: IoType,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IoType {
    pub kind: ScalarKind,
    pub width: u8,
    pub components: u8,
}

impl IoType {
    pub const VEC2: IoType = IoType::float(2);
    pub const VEC3: IoType = IoType::float(3);

    pub const fn float(components: u8) -> Self {
        IoType {
            kind: ScalarKind::Float,
            width: 4,
            components,
        }
    }

    fn from_inner(inner: &TypeInner) -> Option<Self> {
        let (Scalar { kind, width }, components) = match *inner {
            TypeInner::Scalar(scalar) => (scalar, 1),
            TypeInner::Vector { size, scalar } => (scalar, size as u8),
            _ => return None,
        };

        Some(IoType {
            kind,
            width,
            components,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBinding {
    pub group: u32,
    pub binding: u32,
    pub name: String,
    pub kind: BindingKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindingKind {
    Uniform(UniformBlockLayout),
    Texture {
        view_dimension: TextureViewDimension,
        sample_type: TextureSampleType,
    },
    Sampler(SamplerBindingType),
}

impl BindingKind {
    pub fn is_texture(&self) -> bool {
        matches!(self, BindingKind::Texture { .. })
    }

    pub fn is_sampler(&self) -> bool {
        matches!(self, BindingKind::Sampler(_))
    }
}

/// Byte layout of one `var<uniform>` as the shader sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlockLayout {
    pub type_name: Option<String>,
    pub size: u32,
    pub members: Vec<UniformMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
    pub kind: UniformKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UniformKind {
    F32,
    I32,
    U32,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    /// Anything without a writer, like arrays or nested structs.
    Opaque { size: u32 },
}

impl UniformKind {
    pub const fn size(self) -> u32 {
        match self {
            UniformKind::F32 | UniformKind::I32 | UniformKind::U32 => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat4 => 64,
            UniformKind::Opaque { size } => size,
        }
    }

    fn from_inner(inner: &TypeInner, size: u32) -> Self {
        match *inner {
            TypeInner::Scalar(Scalar::F32) => UniformKind::F32,
            TypeInner::Scalar(Scalar::I32) => UniformKind::I32,
            TypeInner::Scalar(Scalar::U32) => UniformKind::U32,
            TypeInner::Vector {
                size: VectorSize::Bi,
                scalar: Scalar::F32,
            } => UniformKind::Vec2,
            TypeInner::Vector {
                size: VectorSize::Tri,
                scalar: Scalar::F32,
            } => UniformKind::Vec3,
            TypeInner::Vector {
                size: VectorSize::Quad,
                scalar: Scalar::F32,
            } => UniformKind::Vec4,
            TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Quad,
                scalar: Scalar::F32,
            } => UniformKind::Mat4,
            _ => UniformKind::Opaque { size },
        }
    }
}

/// Collects the interface and the resources used by `entry`.
///
/// Globals the entry point never touches are left out, the same way a
/// driver strips inactive uniforms.
pub(crate) fn reflect_entry_point(
    module: &Module,
    info: &ModuleInfo,
    index: usize,
    entry: &EntryPoint,
) -> Result<StageReflection, String> {
    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        collect_locations(
            module,
            arg.ty,
            arg.binding.as_ref(),
            arg.name.as_deref(),
            &mut inputs,
        );
    }

    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_locations(module, result.ty, result.binding.as_ref(), None, &mut outputs);
    }

    let usage = info.get_entry_point(index);
    let mut bindings = Vec::new();

    for (handle, var) in module.global_variables.iter() {
        let Some(res) = &var.binding else {
            continue;
        };
        if usage[handle].is_empty() {
            continue;
        }

        let name = var
            .name
            .clone()
            .unwrap_or_else(|| format!("binding_{}_{}", res.group, res.binding));
        let inner = &module.types[var.ty].inner;

        let kind = match (var.space, inner) {
            (AddressSpace::Uniform, _) => {
                BindingKind::Uniform(uniform_layout(module, var.ty, &name))
            }
            (
                AddressSpace::Handle,
                TypeInner::Image {
                    dim,
                    arrayed: false,
                    class: ImageClass::Sampled { kind, multi: false },
                },
            ) => BindingKind::Texture {
                view_dimension: view_dimension(*dim)
                    .ok_or_else(|| format!("texture `{name}` has an unsupported dimension {dim:?}"))?,
                sample_type: sample_type(*kind),
            },
            (AddressSpace::Handle, TypeInner::Sampler { comparison }) => {
                BindingKind::Sampler(if *comparison {
                    SamplerBindingType::Comparison
                } else {
                    SamplerBindingType::Filtering
                })
            }
            (space, _) => {
                return Err(format!(
                    "resource `{name}` at @group({}) @binding({}) in address space {space:?} is not supported",
                    res.group, res.binding
                ));
            }
        };

        bindings.push(ResourceBinding {
            group: res.group,
            binding: res.binding,
            name,
            kind,
        });
    }

    bindings.sort_by_key(|b| (b.group, b.binding));
    inputs.sort_by_key(|v| v.location);
    outputs.sort_by_key(|v| v.location);

    Ok(StageReflection {
        entry_point: entry.name.clone(),
        inputs,
        outputs,
        bindings,
    })
}

fn collect_locations(
    module: &Module,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    name: Option<&str>,
    out: &mut Vec<InterfaceVar>,
) {
    let inner = &module.types[ty].inner;

    match binding {
        Some(Binding::Location { location, .. }) => {
            if let Some(io) = IoType::from_inner(inner) {
                out.push(InterfaceVar {
                    location: *location,
                    name: name.map_or_else(|| format!("location_{location}"), str::to_string),
                    ty: io,
                });
            }
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = inner {
                for member in members {
                    collect_locations(
                        module,
                        member.ty,
                        member.binding.as_ref(),
                        member.name.as_deref(),
                        out,
                    );
                }
            }
        }
    }
}

fn uniform_layout(module: &Module, ty: Handle<Type>, var_name: &str) -> UniformBlockLayout {
    let ty_def = &module.types[ty];
    let ctx = module.to_ctx();

    match &ty_def.inner {
        TypeInner::Struct { members, span } => UniformBlockLayout {
            type_name: ty_def.name.clone(),
            size: *span,
            members: members
                .iter()
                .enumerate()
                .map(|(i, member)| {
                    let inner = &module.types[member.ty].inner;
                    UniformMember {
                        name: member.name.clone().unwrap_or_else(|| format!("member_{i}")),
                        offset: member.offset,
                        kind: UniformKind::from_inner(inner, inner.size(ctx)),
                    }
                })
                .collect(),
        },
        inner => {
            let size = inner.size(ctx);
            UniformBlockLayout {
                type_name: None,
                size,
                members: vec![UniformMember {
                    name: var_name.to_string(),
                    offset: 0,
                    kind: UniformKind::from_inner(inner, size),
                }],
            }
        }
    }
}

fn view_dimension(dim: ImageDimension) -> Option<TextureViewDimension> {
    match dim {
        ImageDimension::D2 => Some(TextureViewDimension::D2),
        ImageDimension::Cube => Some(TextureViewDimension::Cube),
        _ => None,
    }
}

fn sample_type(kind: ScalarKind) -> TextureSampleType {
    match kind {
        ScalarKind::Sint => TextureSampleType::Sint,
        ScalarKind::Uint => TextureSampleType::Uint,
        _ => TextureSampleType::Float { filterable: true },
    }
}
