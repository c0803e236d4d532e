use image::DynamicImage;
use snafu::{ResultExt, Snafu, ensure};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use wgpu::TextureFormat;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum TextureError {
    #[snafu(display("Failed to read image file {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to decode image: {source}"))]
    Decode { source: image::ImageError },

    #[snafu(display("Image has no pixels: {width}x{height}"))]
    Empty { width: u32, height: u32 },

    #[snafu(display(
        "{len} bytes of pixel data do not describe a {width}x{height} {format:?} image"
    ))]
    DataSize {
        len: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    },
}

/// Decoded pixel layout of an image, before any upload conversion.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    R8,
    Rgb8,
    Rgba8,
    Rgb32Float,
}

impl PixelFormat {
    pub const fn channels(self) -> usize {
        match self {
            PixelFormat::R8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Rgb32Float => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb32Float => 12,
            other => other.channels(),
        }
    }

    pub const fn is_hdr(self) -> bool {
        matches!(self, PixelFormat::Rgb32Float)
    }

    /// Texture format this pixel layout is uploaded with.
    ///
    /// There is no three channel texture format, so RGB data is widened to RGBA.
    pub const fn upload_format(self) -> TextureFormat {
        match self {
            PixelFormat::R8 => TextureFormat::R8Unorm,
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => TextureFormat::Rgba8Unorm,
            PixelFormat::Rgb32Float => TextureFormat::Rgba32Float,
        }
    }
}

/// An 8-bit image with an optional CPU-generated mip chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture2D {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    levels: Vec<Vec<u8>>,
}

impl Texture2D {
    pub fn from_pixels(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, TextureError> {
        ensure!(width > 0 && height > 0, EmptyErr { width, height });
        ensure!(
            !format.is_hdr() && data.len() == width as usize * height as usize * format.channels(),
            DataSizeErr {
                len: data.len(),
                width,
                height,
                format,
            }
        );

        Ok(Texture2D {
            width,
            height,
            format,
            levels: vec![data],
        })
    }

    /// 1x1 opaque white, substituted whenever a material image can't be decoded.
    pub fn fallback() -> Self {
        Texture2D {
            width: 1,
            height: 1,
            format: PixelFormat::Rgba8,
            levels: vec![vec![255, 255, 255, 255]],
        }
    }

    /// Square RGB checkerboard of `cells` x `cells` tiles.
    ///
    /// The first tile of the first row is `light`.
    pub fn checkerboard(size: u32, cells: u32, light: [u8; 3], dark: [u8; 3]) -> Self {
        let size = size.max(1);
        let cell = (size / cells.max(1)).max(1);

        let mut data = Vec::with_capacity((size * size * 3) as usize);
        for y in 0..size {
            for x in 0..size {
                let is_light = (x / cell + y / cell) % 2 == 0;
                data.extend_from_slice(if is_light { &light } else { &dark });
            }
        }

        Texture2D {
            width: size,
            height: size,
            format: PixelFormat::Rgb8,
            levels: vec![data],
        }
    }

    pub fn load(path: impl AsRef<Path>, flip_y: bool) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let bytes = fs::read(path).context(ReadErr { path })?;
        Self::load_from_memory(&bytes, flip_y)
    }

    pub fn load_from_memory(bytes: &[u8], flip_y: bool) -> Result<Self, TextureError> {
        let image = image::load_from_memory(bytes).context(DecodeErr)?;
        let image = if flip_y { image.flipv() } else { image };
        Self::from_dynamic(image)
    }

    fn from_dynamic(image: DynamicImage) -> Result<Self, TextureError> {
        let (width, height) = (image.width(), image.height());

        // everything that isn't plain grey, rgb or rgba is widened to rgba8
        let (format, data) = match image.color().channel_count() {
            1 => (PixelFormat::R8, image.into_luma8().into_raw()),
            3 => (PixelFormat::Rgb8, image.into_rgb8().into_raw()),
            _ => (PixelFormat::Rgba8, image.into_rgba8().into_raw()),
        };

        Self::from_pixels(width, height, format, data)
    }

    pub fn has_mip_chain(&self) -> bool {
        self.levels.len() > 1
    }

    pub fn mip_level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn level_size(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }

    pub fn level(&self, level: u32) -> Option<&[u8]> {
        self.levels.get(level as usize).map(Vec::as_slice)
    }

    /// Builds the full mip chain down to 1x1 with a 2x2 box filter.
    pub fn generate_mipmaps(&mut self) {
        self.levels.truncate(1);
        let count = max_mip_levels(self.width, self.height);
        let channels = self.format.channels();

        for level in 1..count {
            let (src_w, src_h) = self.level_size(level - 1);
            let (dst_w, dst_h) = self.level_size(level);
            let src = &self.levels[level as usize - 1];
            let next = downsample(src, src_w, src_h, dst_w, dst_h, channels);
            self.levels.push(next);
        }
    }

    /// Pixel data of `level` in the layout of [`PixelFormat::upload_format`].
    pub fn upload_data(&self, level: u32) -> Option<Cow<'_, [u8]>> {
        let data = self.level(level)?;
        if self.format != PixelFormat::Rgb8 {
            return Some(Cow::Borrowed(data));
        }

        let mut rgba = Vec::with_capacity(data.len() / 3 * 4);
        for px in data.chunks_exact(3) {
            rgba.extend_from_slice(&[px[0], px[1], px[2], u8::MAX]);
        }
        Some(Cow::Owned(rgba))
    }

    pub fn upload_bytes_per_pixel(&self) -> u32 {
        match self.format {
            PixelFormat::R8 => 1,
            _ => 4,
        }
    }
}

/// A floating point RGB image, as decoded from a radiance (.hdr) panorama.
#[derive(Debug, Clone, PartialEq)]
pub struct HdrImage {
    pub width: u32,
    pub height: u32,
    pixels: Vec<f32>,
}

impl HdrImage {
    pub const FORMAT: PixelFormat = PixelFormat::Rgb32Float;

    pub fn from_rgb_f32(width: u32, height: u32, pixels: Vec<f32>) -> Result<Self, TextureError> {
        ensure!(width > 0 && height > 0, EmptyErr { width, height });
        ensure!(
            pixels.len() == width as usize * height as usize * 3,
            DataSizeErr {
                len: pixels.len() * size_of::<f32>(),
                width,
                height,
                format: Self::FORMAT,
            }
        );

        Ok(HdrImage {
            width,
            height,
            pixels,
        })
    }

    /// Rows are kept top to bottom so `v = 0` is the panorama's zenith.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let bytes = fs::read(path).context(ReadErr { path })?;
        Self::load_from_memory(&bytes)
    }

    pub fn load_from_memory(bytes: &[u8]) -> Result<Self, TextureError> {
        let image = image::load_from_memory(bytes).context(DecodeErr)?;
        let image = image.into_rgb32f();
        let (width, height) = image.dimensions();
        Self::from_rgb_f32(width, height, image.into_raw())
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        let i = (y * self.width as usize + x) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    /// Interleaved RGBA with an alpha of one.
    pub fn to_rgba_f32(&self) -> Vec<f32> {
        let mut rgba = Vec::with_capacity(self.pixels.len() / 3 * 4);
        for px in self.pixels.chunks_exact(3) {
            rgba.extend_from_slice(&[px[0], px[1], px[2], 1.0]);
        }
        rgba
    }
}

pub fn max_mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

fn downsample(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    dst_w: u32,
    dst_h: u32,
    channels: usize,
) -> Vec<u8> {
    let mut out = vec![0u8; dst_w as usize * dst_h as usize * channels];

    for y in 0..dst_h {
        for x in 0..dst_w {
            let sx = (x * 2).min(src_w - 1);
            let sy = (y * 2).min(src_h - 1);
            let sx1 = (sx + 1).min(src_w - 1);
            let sy1 = (sy + 1).min(src_h - 1);

            let di = (y * dst_w + x) as usize * channels;
            for c in 0..channels {
                let sum: u32 = [(sx, sy), (sx1, sy), (sx, sy1), (sx1, sy1)]
                    .into_iter()
                    .map(|(px, py)| src[(py * src_w + px) as usize * channels + c] as u32)
                    .sum();
                out[di + c] = ((sum + 2) / 4) as u8;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode_png(image: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn fallback_is_single_opaque_white_pixel() {
        let fallback = Texture2D::fallback();
        assert_eq!((fallback.width, fallback.height), (1, 1));
        assert_eq!(fallback.format, PixelFormat::Rgba8);
        assert_eq!(fallback.level(0), Some(&[255u8, 255, 255, 255][..]));
        assert!(!fallback.has_mip_chain());
    }

    #[test]
    fn channel_count_selects_format() {
        let grey = DynamicImage::new_luma8(2, 2);
        let rgb = DynamicImage::new_rgb8(2, 2);
        let rgba = DynamicImage::new_rgba8(2, 2);
        let grey_alpha = DynamicImage::new_luma_a8(2, 2);

        let load = |img| Texture2D::load_from_memory(&encode_png(img), false).unwrap().format;
        assert_eq!(load(grey), PixelFormat::R8);
        assert_eq!(load(rgb), PixelFormat::Rgb8);
        assert_eq!(load(rgba), PixelFormat::Rgba8);
        assert_eq!(load(grey_alpha), PixelFormat::Rgba8);
    }

    #[test]
    fn flip_reverses_rows() {
        let mut img = RgbImage::new(1, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(0, 1, Rgb([0, 0, 255]));
        let png = encode_png(DynamicImage::ImageRgb8(img));

        let upright = Texture2D::load_from_memory(&png, false).unwrap();
        let flipped = Texture2D::load_from_memory(&png, true).unwrap();

        assert_eq!(&upright.level(0).unwrap()[..3], &[255, 0, 0]);
        assert_eq!(&flipped.level(0).unwrap()[..3], &[0, 0, 255]);
    }

    #[test]
    fn rgb_is_widened_for_upload() {
        let tex = Texture2D::checkerboard(2, 2, [10, 20, 30], [0, 0, 0]);
        let data = tex.upload_data(0).unwrap();
        assert_eq!(data.len(), 16);
        assert_eq!(&data[..4], &[10, 20, 30, 255]);
        assert_eq!(tex.format.upload_format(), TextureFormat::Rgba8Unorm);
    }

    #[test]
    fn mip_chain_halves_down_to_one_pixel() {
        let mut tex = Texture2D::checkerboard(8, 2, [255, 255, 255], [0, 0, 0]);
        tex.generate_mipmaps();

        assert!(tex.has_mip_chain());
        assert_eq!(tex.mip_level_count(), 4);
        assert_eq!(tex.level_size(3), (1, 1));
        assert_eq!(tex.level(3).unwrap().len(), 3);
        // a 2x2 checkerboard averages to mid grey
        assert_eq!(tex.level(3).unwrap()[0], 128);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Texture2D::load("does/not/exist.png", true).unwrap_err();
        assert!(matches!(err, TextureError::Read { .. }));

        let err = HdrImage::load("does/not/exist.hdr").unwrap_err();
        assert!(matches!(err, TextureError::Read { .. }));
    }

    #[test]
    fn malformed_data_is_a_decode_error() {
        let err = HdrImage::load_from_memory(b"#?RADIANCE\nnot really").unwrap_err();
        assert!(matches!(err, TextureError::Decode { .. }));
    }

    #[test]
    fn hdr_pixels_keep_float_range() {
        let hdr = HdrImage::from_rgb_f32(2, 1, vec![4.0, 0.5, 0.0, 0.0, 0.0, 12.5]).unwrap();
        assert_eq!(hdr.pixel(1, 0), [0.0, 0.0, 12.5]);
        assert_eq!(&hdr.to_rgba_f32()[..4], &[4.0, 0.5, 0.0, 1.0]);
        assert!(HdrImage::from_rgb_f32(2, 2, vec![0.0; 3]).is_err());
    }
}
