//! Copying rendered textures back to the CPU.

use crossbeam_channel::bounded;
use half::f16;
use image::{ColorType, ImageFormat};
use sheen_utils::debug_panic;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use std::path::Path;
use wgpu::{
    BufferDescriptor, BufferUsages, COPY_BYTES_PER_ROW_ALIGNMENT, CommandEncoderDescriptor, Device,
    Extent3d, MapMode, Origin3d, PollType, Queue, TexelCopyBufferInfo, TexelCopyBufferLayout,
    TexelCopyTextureInfo, Texture, TextureAspect, TextureFormat,
};

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum ReadbackError {
    #[snafu(display("Unsupported texture format {format:?} for readback"))]
    UnsupportedFormat { format: TextureFormat },

    #[snafu(display("Texture has no layer {layer}, it only has {layers}"))]
    MissingLayer { layer: u32, layers: u32 },

    #[snafu(display("Failed to map readback buffer: {source:?}"))]
    Map { source: wgpu::BufferAsyncError },

    #[snafu(display("Failed to map readback buffer: channel closed"))]
    MapChannelClosed,

    #[snafu(display("Failed to write image: {source}"))]
    Image { source: image::ImageError },
}

/// Reads one array layer of `texture` into tightly packed rows.
fn read_layer_bytes(
    device: &Device,
    queue: &Queue,
    texture: &Texture,
    layer: u32,
) -> Result<Vec<u8>, ReadbackError> {
    let width = texture.width();
    let height = texture.height();
    let format = texture.format();
    let layers = texture.depth_or_array_layers();

    ensure!(layer < layers, MissingLayerErr { layer, layers });

    let bytes_per_pixel = format
        .block_copy_size(None)
        .context(UnsupportedFormatErr { format })?;
    let bytes_per_row = bytes_per_pixel * width;
    let padded_bytes_per_row =
        bytes_per_row.div_ceil(COPY_BYTES_PER_ROW_ALIGNMENT) * COPY_BYTES_PER_ROW_ALIGNMENT;

    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some("Texture Readback Buffer"),
        size: padded_bytes_per_row as u64 * height as u64,
        usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
        label: Some("Texture Readback Encoder"),
    });

    encoder.copy_texture_to_buffer(
        TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: Origin3d { x: 0, y: 0, z: layer },
            aspect: TextureAspect::All,
        },
        TexelCopyBufferInfo {
            buffer: &buffer,
            layout: TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );

    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = bounded(1);
    slice.map_async(MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    let _ = device.poll(PollType::wait_indefinitely());

    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(source)) => return Err(source).context(MapErr),
        Err(_) => return MapChannelClosedErr.fail(),
    }

    let data = slice.get_mapped_range();
    let mut bytes = Vec::with_capacity((bytes_per_row * height) as usize);
    for row in 0..height as usize {
        let start = row * padded_bytes_per_row as usize;
        bytes.extend_from_slice(&data[start..start + bytes_per_row as usize]);
    }

    drop(data);
    buffer.unmap();

    Ok(bytes)
}

/// Reads an 8-bit colour layer as RGBA8, without any gamma conversion.
pub fn read_layer_rgba8(
    device: &Device,
    queue: &Queue,
    texture: &Texture,
    layer: u32,
) -> Result<Vec<u8>, ReadbackError> {
    let format = texture.format();
    ensure!(
        matches!(
            format,
            TextureFormat::Rgba8Unorm
                | TextureFormat::Rgba8UnormSrgb
                | TextureFormat::Bgra8Unorm
                | TextureFormat::Bgra8UnormSrgb
        ),
        UnsupportedFormatErr { format }
    );

    let mut pixels = read_layer_bytes(device, queue, texture, layer)?;
    if matches!(format, TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb) {
        for chunk in pixels.chunks_exact_mut(4) {
            chunk.swap(0, 2);
        }
    }

    Ok(pixels)
}

/// Reads a floating point colour layer as RGBA `f32` values.
pub fn read_layer_rgba_f32(
    device: &Device,
    queue: &Queue,
    texture: &Texture,
    layer: u32,
) -> Result<Vec<f32>, ReadbackError> {
    let format = texture.format();
    ensure!(
        matches!(format, TextureFormat::Rgba16Float | TextureFormat::Rgba32Float),
        UnsupportedFormatErr { format }
    );

    let bytes = read_layer_bytes(device, queue, texture, layer)?;
    let values = match format {
        TextureFormat::Rgba16Float => bytes
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        TextureFormat::Rgba32Float => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        _ => {
            debug_panic!("Set format {format:?} as supported, but not actually supported.");
            return UnsupportedFormatErr { format }.fail();
        }
    };

    Ok(values)
}

pub fn save_layer_png(
    device: &Device,
    queue: &Queue,
    texture: &Texture,
    layer: u32,
    path: impl AsRef<Path>,
) -> Result<(), ReadbackError> {
    let pixels = read_layer_rgba8(device, queue, texture, layer)?;

    image::save_buffer_with_format(
        path,
        &pixels,
        texture.width(),
        texture.height(),
        ColorType::Rgba8,
        ImageFormat::Png,
    )
    .context(ImageErr)
}
