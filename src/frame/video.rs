//! Video frame type and pixel format conversion

use bytes::Bytes;

use crate::constants::VIDEO_TIME_BASE;
use crate::error::MixError;
use crate::frame::TimeBase;

/// Pixel layout of a decoded image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit RGB, 3 bytes per pixel
    Rgb24,
    /// Planar YUV 4:2:0, Y plane followed by quarter-size U and V planes
    Yuv420p,
}

impl PixelFormat {
    /// Expected buffer length for the given dimensions
    pub fn buffer_len(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Rgb24 => pixels * 3,
            Self::Yuv420p => pixels + pixels / 2,
        }
    }
}

/// One decoded video frame
///
/// The pixel buffer is reference-counted (`Bytes`), so cloning for several
/// recipients is free. Tiling always composes into a fresh buffer.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Pixel data in `format` layout
    pub pixels: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Presentation timestamp in `time_base` ticks
    pub pts: i64,
    pub time_base: TimeBase,
}

impl VideoFrame {
    pub fn new(
        pixels: Bytes,
        width: u32,
        height: u32,
        format: PixelFormat,
        pts: i64,
        time_base: TimeBase,
    ) -> Self {
        Self {
            pixels,
            width,
            height,
            format,
            pts,
            time_base,
        }
    }

    /// A single-color RGB24 frame
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], pts: i64) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&rgb);
        }
        Self::new(
            Bytes::from(pixels),
            width,
            height,
            PixelFormat::Rgb24,
            pts,
            TimeBase::new(1, VIDEO_TIME_BASE),
        )
    }

    /// Buffer consistent with the declared geometry?
    pub fn is_well_formed(&self) -> bool {
        self.pixels.len() == self.format.buffer_len(self.width, self.height)
    }

    /// Pixel data as packed RGB24, converting from planar YUV if needed
    ///
    /// Conversion uses BT.601 integer math. A buffer inconsistent with the
    /// declared geometry is reported as `UnsupportedBuffer` rather than read
    /// out of bounds.
    pub fn to_rgb24(&self) -> Result<Bytes, MixError> {
        if !self.is_well_formed() {
            return Err(MixError::UnsupportedBuffer(format!(
                "{}x{} {:?} frame with {} byte buffer",
                self.width,
                self.height,
                self.format,
                self.pixels.len()
            )));
        }

        match self.format {
            PixelFormat::Rgb24 => Ok(self.pixels.clone()),
            PixelFormat::Yuv420p => Ok(Bytes::from(yuv420p_to_rgb24(
                &self.pixels,
                self.width as usize,
                self.height as usize,
            ))),
        }
    }
}

fn yuv420p_to_rgb24(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let y_plane = &data[..width * height];
    let chroma_w = width.div_ceil(2);
    let chroma_h = height.div_ceil(2);
    let u_plane = &data[width * height..width * height + chroma_w * chroma_h];
    let v_plane = &data[width * height + chroma_w * chroma_h..];

    let mut rgb = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            let luma = i32::from(y_plane[y * width + x]);
            let chroma_idx = (y / 2) * chroma_w + x / 2;
            let cb = i32::from(u_plane[chroma_idx]);
            let cr = i32::from(v_plane[chroma_idx]);

            let c = 298 * (luma - 16);
            let d = cb - 128;
            let e = cr - 128;

            rgb.push(clamp_u8((c + 409 * e + 128) >> 8));
            rgb.push(clamp_u8((c - 100 * d - 208 * e + 128) >> 8));
            rgb.push(clamp_u8((c + 516 * d + 128) >> 8));
        }
    }
    rgb
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
