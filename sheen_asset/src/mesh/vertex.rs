use bytemuck::{Pod, Zeroable};
use nalgebra::{Vector2, Vector3};
use sheen_utils::sizes::{VEC2_SIZE, VEC3_SIZE};
use wgpu::{BufferAddress, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};

/// A single mesh vertex as it is laid out in the GPU vertex buffer.
///
/// The tangent is derived from positions and texture coordinates, see
/// [`compute_tangents`](crate::mesh::compute_tangents).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex3D {
    pub position: Vector3<f32>,
    pub normal: Vector3<f32>,
    pub uv: Vector2<f32>,
    pub tangent: Vector3<f32>,
}

impl Vertex3D {
    pub const POSITION_LOCATION: u32 = 0;
    pub const NORMAL_LOCATION: u32 = 1;
    pub const UV_LOCATION: u32 = 2;
    pub const TANGENT_LOCATION: u32 = 3;

    pub const ATTRIBUTES: [VertexAttribute; 4] = [
        VertexAttribute {
            format: VertexFormat::Float32x3, // position
            offset: 0,
            shader_location: Self::POSITION_LOCATION,
        },
        VertexAttribute {
            format: VertexFormat::Float32x3, // normal
            offset: VEC3_SIZE,
            shader_location: Self::NORMAL_LOCATION,
        },
        VertexAttribute {
            format: VertexFormat::Float32x2, // uv
            offset: VEC3_SIZE * 2,
            shader_location: Self::UV_LOCATION,
        },
        VertexAttribute {
            format: VertexFormat::Float32x3, // tangent
            offset: VEC3_SIZE * 2 + VEC2_SIZE,
            shader_location: Self::TANGENT_LOCATION,
        },
    ];

    pub fn new(position: Vector3<f32>, normal: Vector3<f32>, uv: Vector2<f32>) -> Self {
        Vertex3D {
            position,
            normal,
            uv,
            tangent: Vector3::zeros(),
        }
    }

    pub const fn continuous_descriptor() -> VertexBufferLayout<'static> {
        VertexBufferLayout {
            array_stride: size_of::<Vertex3D>() as BufferAddress,
            step_mode: VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    /// Returns the vertex attribute format bound to `location`, if any.
    pub fn attribute_format(location: u32) -> Option<VertexFormat> {
        Self::ATTRIBUTES
            .iter()
            .find(|attr| attr.shader_location == location)
            .map(|attr| attr.format)
    }
}
