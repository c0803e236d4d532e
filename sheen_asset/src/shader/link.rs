use crate::mesh::Vertex3D;
use crate::shader::{BindingKind, CompiledStage, InterfaceVar, IoType, StageKind};
use itertools::Itertools;
use snafu::{OptionExt, Snafu, ensure};
use std::collections::BTreeMap;
use wgpu::VertexFormat;

#[derive(Debug, Clone, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum LinkError {
    #[snafu(display("{kind} shader {label:?} did not compile"))]
    UnusableStage { label: String, kind: StageKind },

    #[snafu(display("{label:?} is a {found} shader, expected a {expected} shader"))]
    WrongStage {
        label: String,
        expected: StageKind,
        found: StageKind,
    },

    #[snafu(display("fragment input `{name}` at location {location} is not written by the vertex shader"))]
    MissingVarying { name: String, location: u32 },

    #[snafu(display(
        "fragment input `{name}` at location {location} is {input:?}, but the vertex shader writes {output:?}"
    ))]
    VaryingMismatch {
        name: String,
        location: u32,
        input: IoType,
        output: IoType,
    },

    #[snafu(display("vertex input `{name}` at location {location} does not match the mesh vertex layout"))]
    VertexLayout { name: String, location: u32 },

    #[snafu(display(
        "@group({group}) @binding({binding}) is declared differently in the vertex and fragment shader"
    ))]
    BindingConflict { group: u32, binding: u32 },
}

/// A resource binding of a linked program with its stage visibility.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramBinding {
    pub group: u32,
    pub binding: u32,
    pub name: String,
    pub kind: BindingKind,
    pub vertex: bool,
    pub fragment: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramLayout {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub vertex_inputs: Vec<InterfaceVar>,
    /// Ordered by group, then binding.
    pub bindings: Vec<ProgramBinding>,
}

impl ProgramLayout {
    /// Number of bind groups the pipeline layout needs, including empty gaps.
    pub fn group_count(&self) -> u32 {
        self.bindings.iter().map(|b| b.group + 1).max().unwrap_or(0)
    }

    pub fn group(&self, group: u32) -> impl Iterator<Item = &ProgramBinding> {
        self.bindings.iter().filter(move |b| b.group == group)
    }

    /// True when the vertex stage reads mesh attributes rather than generating its own vertices.
    pub fn uses_vertex_buffer(&self) -> bool {
        !self.vertex_inputs.is_empty()
    }
}

/// Checks that `vertex` and `fragment` form a usable program.
pub fn link_stages(
    vertex: &CompiledStage,
    fragment: &CompiledStage,
) -> Result<ProgramLayout, LinkError> {
    check_kind(vertex, StageKind::Vertex)?;
    check_kind(fragment, StageKind::Fragment)?;

    let vs = vertex.reflection().context(UnusableStageErr {
        label: vertex.label(),
        kind: vertex.kind(),
    })?;
    let fs = fragment.reflection().context(UnusableStageErr {
        label: fragment.label(),
        kind: fragment.kind(),
    })?;

    for input in &vs.inputs {
        let expected = Vertex3D::attribute_format(input.location).and_then(io_type_of);
        ensure!(
            expected == Some(input.ty),
            VertexLayoutErr {
                name: &input.name,
                location: input.location,
            }
        );
    }

    for input in &fs.inputs {
        let output = vs
            .outputs
            .iter()
            .find(|o| o.location == input.location)
            .context(MissingVaryingErr {
                name: &input.name,
                location: input.location,
            })?;

        ensure!(
            output.ty == input.ty,
            VaryingMismatchErr {
                name: &input.name,
                location: input.location,
                input: input.ty,
                output: output.ty,
            }
        );
    }

    let mut merged: BTreeMap<(u32, u32), ProgramBinding> = BTreeMap::new();
    let stage_bindings = vs
        .bindings
        .iter()
        .map(|b| (StageKind::Vertex, b))
        .chain(fs.bindings.iter().map(|b| (StageKind::Fragment, b)));

    for (kind, res) in stage_bindings {
        let entry = merged
            .entry((res.group, res.binding))
            .or_insert_with(|| ProgramBinding {
                group: res.group,
                binding: res.binding,
                name: res.name.clone(),
                kind: res.kind.clone(),
                vertex: false,
                fragment: false,
            });

        ensure!(
            entry.kind == res.kind,
            BindingConflictErr {
                group: res.group,
                binding: res.binding,
            }
        );

        match kind {
            StageKind::Vertex => entry.vertex = true,
            StageKind::Fragment => entry.fragment = true,
        }
    }

    Ok(ProgramLayout {
        vertex_entry: vs.entry_point.clone(),
        fragment_entry: fs.entry_point.clone(),
        vertex_inputs: vs.inputs.clone(),
        bindings: merged.into_values().collect_vec(),
    })
}

fn check_kind(stage: &CompiledStage, expected: StageKind) -> Result<(), LinkError> {
    ensure!(
        stage.kind() == expected,
        WrongStageErr {
            label: stage.label(),
            expected,
            found: stage.kind(),
        }
    );
    Ok(())
}

fn io_type_of(format: VertexFormat) -> Option<IoType> {
    match format {
        VertexFormat::Float32x2 => Some(IoType::VEC2),
        VertexFormat::Float32x3 => Some(IoType::VEC3),
        VertexFormat::Float32x4 => Some(IoType::float(4)),
        _ => None,
    }
}
