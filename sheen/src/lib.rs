//! Physically based rendering of a single textured mesh, lit by one analytic
//! light and an image based environment baked from an HDR panorama.
//!
//! [`Renderer`] bundles a headless device with everything needed to draw a
//! frame offscreen. The pieces it is made of live in [`asset`] (CPU side)
//! and [`render`] (GPU side) for hosts that bring their own surface.

pub mod logging;
mod renderer;

pub use renderer::{Renderer, RendererError};

pub use sheen_asset as asset;
pub use sheen_render as render;
pub use sheen_utils as utils;

pub use sheen_asset::{
    EnvironmentSettings, HdrImage, LightState, LightType, MaterialState, Mesh, Texture2D,
    TextureRole,
};
pub use sheen_render::{
    Camera, Environment, EnvironmentStage, FrameDriver, FrameReport, FrameSettings, GpuResources,
    ProgramManager, SceneResources, State,
};
pub use sheen_utils::EngineArgs;

pub use ::tracing;
pub use ::wgpu;
