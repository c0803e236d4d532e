//! Built-in WGSL stages of the renderer.

pub const PBR_VERTEX: &str = include_str!("pbr_vertex.wgsl");
pub const PBR_FRAGMENT: &str = include_str!("pbr_fragment.wgsl");
pub const SKYBOX_VERTEX: &str = include_str!("skybox_vertex.wgsl");
pub const SKYBOX_FRAGMENT: &str = include_str!("skybox_fragment.wgsl");
pub const CUBE_FACE_VERTEX: &str = include_str!("cube_face_vertex.wgsl");
pub const EQUIRECT_TO_CUBE: &str = include_str!("equirect_to_cube.wgsl");
pub const IRRADIANCE: &str = include_str!("irradiance.wgsl");
