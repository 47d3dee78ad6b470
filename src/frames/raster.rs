use crate::warn_once;
use image::{imageops, GrayImage, Rgb, RgbImage};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb24,
    /// 8-bit grayscale.
    R8,
    /// 16-bit depth, native byte order.
    R16,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::R8 => 1,
            Self::R16 => 2,
        }
    }
}

/// A tightly packed image with its first row at the bottom, the way textures are uploaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Image {
    /// Builds an image from a top-down camera buffer by flipping its rows.
    pub fn from_camera(width: usize, height: usize, format: PixelFormat, raw: &[u8]) -> Option<Self> {
        let len = width * height * format.bytes_per_pixel();
        let Some(raw) = raw.get(..len) else {
            warn_once!("camera buffer is smaller than its reported image size");
            return None;
        };
        Some(Self {
            width,
            height,
            format,
            data: flip_rows(raw, width * format.bytes_per_pixel()),
        })
    }

    /// Converts a top-down NV12 camera buffer into a flipped RGB image.
    pub fn from_nv12(width: usize, height: usize, raw: &[u8]) -> Option<Self> {
        let rgb = nv12_to_rgb(raw, width, height);
        if rgb.is_none() {
            warn_once!("NV12 buffer is smaller than its reported image size");
        }
        Self::from_camera(width, height, PixelFormat::Rgb24, &rgb?)
    }
}

/// Reverses the order of rows `stride` bytes long. A trailing partial row is dropped.
pub fn flip_rows(src: &[u8], stride: usize) -> Vec<u8> {
    if stride == 0 {
        return Vec::new();
    }
    let rows = src.len() / stride;
    let (Ok(width), Ok(height)) = (u32::try_from(stride), u32::try_from(rows)) else {
        return Vec::new();
    };
    // rows are opaque bytes here, whatever the pixel format
    let Some(mut image) = GrayImage::from_raw(width, height, src[..stride * rows].to_vec()) else {
        return Vec::new();
    };
    imageops::flip_vertical_in_place(&mut image);
    image.into_raw()
}

/// Converts NV12 (a full Y plane followed by interleaved half resolution U and V) into packed
/// RGB24 using full range BT.601 coefficients.
pub fn nv12_to_rgb(src: &[u8], width: usize, height: usize) -> Option<Vec<u8>> {
    let luma_len = width * height;
    let chroma_stride = width.div_ceil(2) * 2;
    let chroma_len = chroma_stride * height.div_ceil(2);
    if src.len() < luma_len + chroma_len {
        return None;
    }
    let (luma, chroma) = src.split_at(luma_len);

    let image = RgbImage::from_fn(u32::try_from(width).ok()?, u32::try_from(height).ok()?, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let uv = (y / 2) * chroma_stride + (x / 2) * 2;
        let l = luma[y * width + x] as f32;
        let u = chroma[uv] as f32 - 128.0;
        let v = chroma[uv + 1] as f32 - 128.0;

        let r = l + 1.402 * v;
        let g = l - 0.344_136 * u - 0.714_136 * v;
        let b = l + 1.772 * u;
        Rgb([r, g, b].map(|c| c.round().clamp(0.0, 255.0) as u8))
    });
    Some(image.into_raw())
}
