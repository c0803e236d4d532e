use crate::frame::FrameTarget;
use crate::readback::{ReadbackError, read_layer_rgba8, save_layer_png};
use std::path::Path;
use wgpu::{
    Device, Extent3d, Queue, Texture, TextureDescriptor, TextureDimension, TextureFormat,
    TextureUsages, TextureView, TextureViewDescriptor,
};

/// A colour texture frames can be rendered into and read back from.
pub struct OffscreenTarget {
    texture: Texture,
    view: TextureView,
}

impl OffscreenTarget {
    pub fn new(device: &Device, width: u32, height: u32, format: TextureFormat) -> Self {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("Offscreen Texture"),
            size: Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage: TextureUsages::RENDER_ATTACHMENT
                | TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let view = texture.create_view(&TextureViewDescriptor::default());

        OffscreenTarget { texture, view }
    }

    #[profiling::function]
    pub fn resize(&mut self, device: &Device, width: u32, height: u32) {
        if self.width() != width || self.height() != height {
            *self = Self::new(device, width, height, self.format());
        }
    }

    pub fn frame_target(&self) -> FrameTarget<'_> {
        FrameTarget {
            view: &self.view,
            format: self.format(),
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn read_rgba8(&self, device: &Device, queue: &Queue) -> Result<Vec<u8>, ReadbackError> {
        read_layer_rgba8(device, queue, &self.texture, 0)
    }

    pub fn save_png(
        &self,
        device: &Device,
        queue: &Queue,
        path: impl AsRef<Path>,
    ) -> Result<(), ReadbackError> {
        save_layer_png(device, queue, &self.texture, 0, path)
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn format(&self) -> TextureFormat {
        self.texture.format()
    }

    pub fn view(&self) -> &TextureView {
        &self.view
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }
}
