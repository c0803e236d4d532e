//! Opaque GPU resource handles and their owning registry.
//!
//! Every buffer, texture and vertex array lives in [`GpuResources`] until it
//! is explicitly released. Handles are plain keys, so holders can copy them
//! freely; a released handle simply stops resolving.

use crate::state::State;
use sheen_asset::{Mesh, PixelFormat};
use slotmap::{SlotMap, new_key_type};
use std::sync::Arc;
use tracing::{trace, warn};
use wgpu::util::{BufferInitDescriptor, DeviceExt};
use wgpu::{
    Buffer, BufferUsages, Device, Features, IndexFormat, Queue, RenderPass, Sampler, Texture,
    TextureFormat, TextureView,
};

new_key_type! {
    pub struct BufferId;
    pub struct TextureId;
    pub struct VertexArrayId;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Flat,
    Cube,
}

#[derive(Debug)]
pub struct GpuTexture {
    pub texture: Texture,
    /// Full view, as a cube view for cube textures.
    pub view: TextureView,
    pub sampler: Sampler,
    pub kind: TextureKind,
    /// Decoded layout of the image this texture was uploaded from, if any.
    pub source_format: Option<PixelFormat>,
}

impl GpuTexture {
    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn format(&self) -> TextureFormat {
        self.texture.format()
    }

    pub fn has_mip_chain(&self) -> bool {
        self.texture.mip_level_count() > 1
    }
}

/// Vertex and index buffer of one uploaded mesh.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexArray {
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub index_count: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ResourceCounts {
    pub buffers: usize,
    pub textures: usize,
    pub vertex_arrays: usize,
}

pub struct GpuResources {
    device: Arc<Device>,
    queue: Arc<Queue>,
    buffers: SlotMap<BufferId, Buffer>,
    textures: SlotMap<TextureId, GpuTexture>,
    vertex_arrays: SlotMap<VertexArrayId, VertexArray>,
    fallback_flat: GpuTexture,
    fallback_cube: GpuTexture,
    hdr_format: TextureFormat,
    texture_releases: u64,
}

impl GpuResources {
    pub fn new(state: &State) -> Self {
        let device = state.device.clone();
        let queue = state.queue.clone();

        let hdr_format = if device.features().contains(Features::FLOAT32_FILTERABLE) {
            TextureFormat::Rgba32Float
        } else {
            TextureFormat::Rgba16Float
        };

        let fallback_flat = Self::white_texture(&device, &queue);
        let fallback_cube = Self::black_cube(&device, &queue);

        GpuResources {
            device,
            queue,
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            vertex_arrays: SlotMap::with_key(),
            fallback_flat,
            fallback_cube,
            hdr_format,
            texture_releases: 0,
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Format HDR panoramas are uploaded in. Full floats need filtering support from the device.
    pub fn hdr_format(&self) -> TextureFormat {
        self.hdr_format
    }

    /// Number of textures released so far.
    ///
    /// Cached bind groups are stale once this changes.
    pub fn texture_releases(&self) -> u64 {
        self.texture_releases
    }

    pub fn counts(&self) -> ResourceCounts {
        ResourceCounts {
            buffers: self.buffers.len(),
            textures: self.textures.len(),
            vertex_arrays: self.vertex_arrays.len(),
        }
    }

    pub fn create_buffer_init(
        &mut self,
        label: &str,
        contents: &[u8],
        usage: BufferUsages,
    ) -> BufferId {
        let buffer = self.device.create_buffer_init(&BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        });
        self.buffers.insert(buffer)
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(id)
    }

    pub fn release_buffer(&mut self, id: BufferId) -> bool {
        match self.buffers.remove(id) {
            Some(buffer) => {
                buffer.destroy();
                true
            }
            None => {
                warn!("Tried to release buffer {id:?} which is not alive");
                false
            }
        }
    }

    pub(crate) fn insert_texture(&mut self, texture: GpuTexture) -> TextureId {
        let id = self.textures.insert(texture);
        trace!("Created texture {id:?}");
        id
    }

    pub fn texture(&self, id: TextureId) -> Option<&GpuTexture> {
        self.textures.get(id)
    }

    pub fn release_texture(&mut self, id: TextureId) -> bool {
        match self.textures.remove(id) {
            Some(texture) => {
                texture.texture.destroy();
                self.texture_releases += 1;
                trace!("Released texture {id:?}");
                true
            }
            None => {
                warn!("Tried to release texture {id:?} which is not alive");
                false
            }
        }
    }

    /// Uploads `mesh` into a fresh vertex and index buffer pair.
    pub fn create_vertex_array(&mut self, label: &str, mesh: &Mesh) -> VertexArrayId {
        let vertex_buffer = self.create_buffer_init(
            &format!("{label} Vertex Buffer"),
            bytemuck::cast_slice(mesh.vertices()),
            BufferUsages::VERTEX,
        );
        let index_buffer = self.create_buffer_init(
            &format!("{label} Index Buffer"),
            bytemuck::cast_slice(mesh.indices()),
            BufferUsages::INDEX,
        );

        self.vertex_arrays.insert(VertexArray {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices_count() as u32,
        })
    }

    pub fn vertex_array(&self, id: VertexArrayId) -> Option<&VertexArray> {
        self.vertex_arrays.get(id)
    }

    /// Releases the vertex array together with the buffers it owns.
    pub fn release_vertex_array(&mut self, id: VertexArrayId) -> bool {
        let Some(array) = self.vertex_arrays.remove(id) else {
            warn!("Tried to release vertex array {id:?} which is not alive");
            return false;
        };

        self.release_buffer(array.vertex_buffer);
        self.release_buffer(array.index_buffer);
        true
    }

    /// Binds the vertex array's buffers and returns its index count.
    pub fn bind_vertex_array(&self, pass: &mut RenderPass<'_>, id: VertexArrayId) -> Option<u32> {
        let array = self.vertex_arrays.get(id)?;
        let vertices = self.buffers.get(array.vertex_buffer)?;
        let indices = self.buffers.get(array.index_buffer)?;

        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.set_index_buffer(indices.slice(..), IndexFormat::Uint32);
        Some(array.index_count)
    }

    /// Texture read by bindings whose unit holds nothing of the right kind.
    pub fn fallback(&self, kind: TextureKind) -> &GpuTexture {
        match kind {
            TextureKind::Flat => &self.fallback_flat,
            TextureKind::Cube => &self.fallback_cube,
        }
    }
}
