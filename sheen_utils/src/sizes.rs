use std::mem::size_of;
use wgpu::BufferAddress;

pub const F32_SIZE: BufferAddress = size_of::<f32>() as BufferAddress;
pub const VEC2_SIZE: BufferAddress = F32_SIZE * 2;
pub const VEC3_SIZE: BufferAddress = F32_SIZE * 3;
pub const VEC4_SIZE: BufferAddress = F32_SIZE * 4;
pub const MAT4_SIZE: BufferAddress = VEC4_SIZE * 4;

/// Uniform buffer bindings must start on this boundary.
pub const UNIFORM_ALIGNMENT: BufferAddress = 16;
