//! CPU-side data of the sheen renderer.
//!
//! Nothing in here touches a GPU device: meshes and their tangents, decoded
//! images, compiled and linked shader stages, uniform storage, and the
//! material and light state the frame driver uploads.

pub mod environment;
pub mod light;
pub mod material;
pub mod mesh;
pub mod shader;
pub mod texture;
pub mod uniforms;

pub use environment::{CubeFace, EnvironmentSettings};
pub use light::{LightSlots, LightState, LightType};
pub use material::{MaterialSlots, MaterialState, TextureRole};
pub use mesh::{Mesh, MeshBuilder, Vertex3D, compute_tangents};
pub use shader::{CompiledStage, LinkError, ProgramLayout, StageKind, link_stages};
pub use texture::{HdrImage, PixelFormat, Texture2D, TextureError};
pub use uniforms::{UniformSlot, UniformTable, UniformValue};
