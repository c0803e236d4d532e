//! Decoding images from disk and uploading them as sampled textures.

use crate::resources::{GpuResources, GpuTexture, TextureId, TextureKind};
use half::f16;
use sheen_asset::{HdrImage, TextureError, TextureRole, Texture2D};
use std::path::Path;
use tracing::{debug, warn};
use wgpu::{
    AddressMode, Device, Extent3d, FilterMode, MipmapFilterMode, Origin3d, Queue, Sampler,
    SamplerDescriptor, TexelCopyBufferLayout, TexelCopyTextureInfo, TextureAspect,
    TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, TextureViewDescriptor,
    TextureViewDimension,
};

impl GpuResources {
    /// Loads a material image from `path`.
    ///
    /// Never fails: an unreadable or undecodable file yields a fresh 1x1 white
    /// texture so the material keeps rendering.
    pub fn load_2d(
        &mut self,
        path: impl AsRef<Path>,
        generate_mips: bool,
        flip_y: bool,
    ) -> TextureId {
        let path = path.as_ref();
        let image = match Texture2D::load(path, flip_y) {
            Ok(image) => image,
            Err(e) => {
                warn!("Failed to load texture {}: {e}. Using fallback", path.display());
                return self.upload_2d(&Texture2D::fallback(), false);
            }
        };

        debug!(
            "Loaded texture {} ({}x{}, {:?})",
            path.display(),
            image.width,
            image.height,
            image.format
        );
        self.upload_2d(&image, generate_mips)
    }

    #[profiling::function]
    pub fn upload_2d(&mut self, image: &Texture2D, generate_mips: bool) -> TextureId {
        let mipped;
        let image = if generate_mips && !image.has_mip_chain() {
            let mut chain = image.clone();
            chain.generate_mipmaps();
            mipped = chain;
            &mipped
        } else {
            image
        };

        let format = image.format.upload_format();
        let levels = image.mip_level_count();
        let texture = self.device().create_texture(&TextureDescriptor {
            label: Some("Material Texture"),
            size: Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: levels,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let bytes_per_pixel = image.upload_bytes_per_pixel();
        for level in 0..levels {
            let Some(data) = image.upload_data(level) else {
                continue;
            };
            let (width, height) = image.level_size(level);
            write_layer(
                self.queue(),
                &texture,
                level,
                0,
                &data,
                width * bytes_per_pixel,
                width,
                height,
            );
        }

        let view = texture.create_view(&TextureViewDescriptor::default());
        let sampler = material_sampler(self.device(), levels > 1);

        self.insert_texture(GpuTexture {
            texture,
            view,
            sampler,
            kind: TextureKind::Flat,
            source_format: Some(image.format),
        })
    }

    /// Loads an equirectangular HDR panorama from `path`.
    pub fn load_hdr(&mut self, path: impl AsRef<Path>) -> Result<TextureId, TextureError> {
        let path = path.as_ref();
        let image = HdrImage::load(path)?;
        debug!("Loaded HDR image {} ({}x{})", path.display(), image.width, image.height);
        Ok(self.upload_hdr(&image))
    }

    #[profiling::function]
    pub fn upload_hdr(&mut self, image: &HdrImage) -> TextureId {
        let format = self.hdr_format();
        let texture = self.device().create_texture(&TextureDescriptor {
            label: Some("HDR Panorama"),
            size: Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let rgba = image.to_rgba_f32();
        let (data, bytes_per_pixel) = match format {
            TextureFormat::Rgba32Float => (bytemuck::cast_slice::<f32, u8>(&rgba).to_vec(), 16),
            _ => {
                let halves: Vec<u16> = rgba.iter().map(|v| f16::from_f32(*v).to_bits()).collect();
                (bytemuck::cast_slice::<u16, u8>(&halves).to_vec(), 8)
            }
        };
        write_layer(
            self.queue(),
            &texture,
            0,
            0,
            &data,
            image.width * bytes_per_pixel,
            image.width,
            image.height,
        );

        let view = texture.create_view(&TextureViewDescriptor::default());
        let sampler = self.device().create_sampler(&SamplerDescriptor {
            label: Some("HDR Panorama Sampler"),
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: MipmapFilterMode::Nearest,
            ..SamplerDescriptor::default()
        });

        self.insert_texture(GpuTexture {
            texture,
            view,
            sampler,
            kind: TextureKind::Flat,
            source_format: Some(HdrImage::FORMAT),
        })
    }

    /// Creates an empty cube texture that the environment passes render into.
    pub fn create_cube_target(
        &mut self,
        label: &str,
        size: u32,
        format: TextureFormat,
    ) -> TextureId {
        let texture = self.device().create_texture(&TextureDescriptor {
            label: Some(label),
            size: Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
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

        let view = cube_view(&texture);
        let sampler = cube_sampler(self.device());

        self.insert_texture(GpuTexture {
            texture,
            view,
            sampler,
            kind: TextureKind::Cube,
            source_format: None,
        })
    }

    pub(crate) fn white_texture(device: &Device, queue: &Queue) -> GpuTexture {
        let image = Texture2D::fallback();
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("Fallback Texture"),
            size: Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(data) = image.upload_data(0) {
            write_layer(queue, &texture, 0, 0, &data, 4, 1, 1);
        }

        GpuTexture {
            view: texture.create_view(&TextureViewDescriptor::default()),
            sampler: material_sampler(device, false),
            texture,
            kind: TextureKind::Flat,
            source_format: Some(image.format),
        }
    }

    pub(crate) fn black_cube(device: &Device, queue: &Queue) -> GpuTexture {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("Fallback Cube"),
            size: Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for layer in 0..6 {
            write_layer(queue, &texture, 0, layer, &[0, 0, 0, u8::MAX], 4, 1, 1);
        }

        GpuTexture {
            view: cube_view(&texture),
            sampler: cube_sampler(device),
            texture,
            kind: TextureKind::Cube,
            source_format: None,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn write_layer(
    queue: &Queue,
    texture: &wgpu::Texture,
    mip_level: u32,
    layer: u32,
    data: &[u8],
    bytes_per_row: u32,
    width: u32,
    height: u32,
) {
    queue.write_texture(
        TexelCopyTextureInfo {
            texture,
            mip_level,
            origin: Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            aspect: TextureAspect::All,
        },
        data,
        TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_row),
            rows_per_image: Some(height),
        },
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

fn cube_view(texture: &wgpu::Texture) -> wgpu::TextureView {
    texture.create_view(&TextureViewDescriptor {
        label: Some("Cube View"),
        dimension: Some(TextureViewDimension::Cube),
        ..TextureViewDescriptor::default()
    })
}

fn material_sampler(device: &Device, mipmapped: bool) -> Sampler {
    device.create_sampler(&SamplerDescriptor {
        label: Some("Material Sampler"),
        address_mode_u: AddressMode::Repeat,
        address_mode_v: AddressMode::Repeat,
        address_mode_w: AddressMode::Repeat,
        mag_filter: FilterMode::Linear,
        min_filter: FilterMode::Linear,
        mipmap_filter: if mipmapped {
            MipmapFilterMode::Linear
        } else {
            MipmapFilterMode::Nearest
        },
        ..SamplerDescriptor::default()
    })
}

fn cube_sampler(device: &Device) -> Sampler {
    device.create_sampler(&SamplerDescriptor {
        label: Some("Cube Sampler"),
        address_mode_u: AddressMode::ClampToEdge,
        address_mode_v: AddressMode::ClampToEdge,
        address_mode_w: AddressMode::ClampToEdge,
        mag_filter: FilterMode::Linear,
        min_filter: FilterMode::Linear,
        mipmap_filter: MipmapFilterMode::Nearest,
        ..SamplerDescriptor::default()
    })
}

/// Which texture is bound to each of the renderer's texture units.
///
/// Units left empty read the resource registry's fallback of matching kind.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TextureUnits {
    units: [Option<TextureId>; TextureRole::UNIT_COUNT],
}

impl TextureUnits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, role: TextureRole, texture: Option<TextureId>) {
        self.units[role.unit() as usize] = texture;
    }

    pub fn bind_unit(&mut self, unit: u32, texture: Option<TextureId>) -> bool {
        match self.units.get_mut(unit as usize) {
            Some(slot) => {
                *slot = texture;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, unit: u32) -> Option<TextureId> {
        self.units.get(unit as usize).copied().flatten()
    }

    pub fn clear(&mut self) {
        self.units = [None; TextureRole::UNIT_COUNT];
    }

    /// Id of the texture [`TextureUnits::resolve`] picks, `None` when that is the fallback.
    pub fn resolve_id(
        &self,
        resources: &GpuResources,
        unit: u32,
        kind: TextureKind,
    ) -> Option<TextureId> {
        self.get(unit)
            .filter(|id| resources.texture(*id).is_some_and(|texture| texture.kind == kind))
    }

    /// Texture bound to `unit` if it is alive and of `kind`, otherwise the fallback.
    pub fn resolve<'a>(
        &self,
        resources: &'a GpuResources,
        unit: u32,
        kind: TextureKind,
    ) -> &'a GpuTexture {
        self.get(unit)
            .and_then(|id| resources.texture(id))
            .filter(|texture| texture.kind == kind)
            .unwrap_or_else(|| resources.fallback(kind))
    }
}
