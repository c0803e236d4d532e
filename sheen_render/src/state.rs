//! GPU instance, adapter, device and queue.
//!
//! [`State`] either creates its own headless device or wraps one handed over
//! by a windowing collaborator that already owns the surface.

use futures::executor::block_on;
use sheen_utils::EngineArgs;
use snafu::{ResultExt, Snafu};
use std::sync::Arc;
use tracing::{debug, info};
use wgpu::{
    Adapter, Device, DeviceDescriptor, ExperimentalFeatures, Features, Instance,
    InstanceDescriptor, Limits, MemoryHints, PowerPreference, Queue, RequestAdapterError,
    RequestAdapterOptions, RequestDeviceError,
};

type Result<T, E = StateError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum StateError {
    #[snafu(display("No graphics adapter available: {source}"))]
    RequestAdapter { source: RequestAdapterError },

    #[snafu(display("Unable to get device: {source}"))]
    RequestDevice { source: RequestDeviceError },
}

pub struct State {
    pub(crate) instance: Instance,
    pub(crate) adapter: Adapter,
    pub(crate) device: Arc<Device>,
    pub(crate) queue: Arc<Queue>,
}

impl State {
    /// Creates a device without any surface, for offscreen rendering.
    pub fn headless() -> Result<State> {
        block_on(Self::headless_async())
    }

    async fn headless_async() -> Result<State> {
        let instance = Self::setup_instance();
        let adapter = Self::setup_adapter(&instance).await?;
        let (device, queue) = Self::get_device_and_queue(&adapter).await?;

        Ok(State {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Wraps a device created elsewhere, typically next to a window surface.
    pub fn from_parts(
        instance: Instance,
        adapter: Adapter,
        device: Arc<Device>,
        queue: Arc<Queue>,
    ) -> Self {
        State {
            instance,
            adapter,
            device,
            queue,
        }
    }

    fn setup_instance() -> Instance {
        let mut desc = InstanceDescriptor::from_env_or_default();

        if let Some(backend) = EngineArgs::backends().and_then(|b| b.first()) {
            desc.backends = *backend;
        }

        Instance::new(&desc)
    }

    async fn setup_adapter(instance: &Instance) -> Result<Adapter> {
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: None,
                ..RequestAdapterOptions::default()
            })
            .await
            .context(RequestAdapterErr)?;

        let adapter_info = adapter.get_info();
        info!(
            "Selected adapter {:?} on {:?}",
            adapter_info.name, adapter_info.backend
        );

        Ok(adapter)
    }

    /// Features used when the adapter has them.
    pub fn optional_features() -> Features {
        Features::FLOAT32_FILTERABLE
    }

    async fn get_device_and_queue(adapter: &Adapter) -> Result<(Arc<Device>, Arc<Queue>)> {
        let features = adapter.features() & Self::optional_features();
        debug!("Requesting optional device features {features:?}");

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("Renderer Hardware"),
                required_features: features,
                required_limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
                experimental_features: ExperimentalFeatures::disabled(),
                memory_hints: MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context(RequestDeviceErr)?;

        Ok((Arc::new(device), Arc::new(queue)))
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }
}
