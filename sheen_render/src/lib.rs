//! The GPU half of sheen.
//!
//! [`GpuResources`] owns every buffer and texture, [`ProgramManager`] every
//! shader stage and program. [`Environment`] precomputes the image based
//! lighting maps from an HDR panorama and [`FrameDriver`] draws a
//! [`SceneResources`] into a [`FrameTarget`] once per frame.

pub mod environment;
pub mod frame;
pub mod offscreen;
pub mod program;
pub mod readback;
pub mod resources;
pub mod scene;
pub mod shaders;
pub mod state;
pub mod textures;

pub use environment::{Environment, EnvironmentError, EnvironmentStage};
pub use frame::{Camera, FrameDriver, FrameReport, FrameSettings, FrameTarget};
pub use offscreen::OffscreenTarget;
pub use program::{PipelineKey, ProgramId, ProgramManager, ShaderId};
pub use resources::{
    BufferId, GpuResources, GpuTexture, ResourceCounts, TextureId, TextureKind, VertexArrayId,
};
pub use scene::{MaterialTextures, SceneResources};
pub use state::{State, StateError};
pub use textures::TextureUnits;
