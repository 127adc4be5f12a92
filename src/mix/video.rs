//! Side-by-side video tiling
//!
//! Every contributor of a pass is converted to RGB24, scaled to a fixed tile
//! size, and concatenated left to right in aggregation-iteration order. That
//! order follows current membership, so a pruned member shifts later tiles
//! left between passes. The composite timestamp is copied from the last
//! processed input, a dependent clock, unlike the audio mixer's own counter.

use bytes::Bytes;

use crate::config::VideoTileConfig;
use crate::constants::VIDEO_TIME_BASE;
use crate::error::MixError;
use crate::frame::{Frame, MediaKind, PixelFormat, TimeBase, VideoFrame};
use crate::mix::FrameCombiner;

/// Fixed-tile side-by-side video combiner
pub struct VideoTiler {
    tile_width: u32,
    tile_height: u32,
}

impl VideoTiler {
    pub fn new() -> Self {
        Self::with_config(&VideoTileConfig::default())
    }

    pub fn with_config(config: &VideoTileConfig) -> Self {
        Self {
            tile_width: config.tile_width,
            tile_height: config.tile_height,
        }
    }

    fn scale_to_tile(&self, frame: &VideoFrame) -> Result<Vec<u8>, MixError> {
        let rgb = frame.to_rgb24()?;
        if frame.width == self.tile_width && frame.height == self.tile_height {
            return Ok(rgb.to_vec());
        }
        Ok(scale_rgb24(
            &rgb,
            frame.width,
            frame.height,
            self.tile_width,
            self.tile_height,
        ))
    }
}

impl Default for VideoTiler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCombiner for VideoTiler {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn combine(&mut self, frames: Vec<Frame>) -> Result<Frame, MixError> {
        let mut tiles: Vec<Vec<u8>> = Vec::new();
        let mut last_clock: Option<(i64, TimeBase)> = None;

        for frame in &frames {
            let Some(video) = frame.as_video() else {
                continue;
            };
            tiles.push(self.scale_to_tile(video)?);
            last_clock = Some((video.pts, video.time_base));
        }

        let Some((pts, time_base)) = last_clock else {
            return Err(MixError::EmptyPass);
        };

        let tile_row = self.tile_width as usize * 3;
        let out_width = self.tile_width * tiles.len() as u32;
        let mut pixels = Vec::with_capacity(tiles.len() * tile_row * self.tile_height as usize);
        for row in 0..self.tile_height as usize {
            for tile in &tiles {
                pixels.extend_from_slice(&tile[row * tile_row..(row + 1) * tile_row]);
            }
        }

        Ok(Frame::Video(VideoFrame::new(
            Bytes::from(pixels),
            out_width,
            self.tile_height,
            PixelFormat::Rgb24,
            pts,
            time_base,
        )))
    }

    fn empty_fallback(&mut self) -> Option<Frame> {
        // Bootstrap frame for a pipeline that has produced nothing yet.
        Some(Frame::Video(VideoFrame::new(
            Bytes::from(vec![
                0u8;
                self.tile_width as usize * self.tile_height as usize * 3
            ]),
            self.tile_width,
            self.tile_height,
            PixelFormat::Rgb24,
            0,
            TimeBase::new(1, VIDEO_TIME_BASE),
        )))
    }
}

fn scale_rgb24(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    let (src_w, src_h) = (src_w as usize, src_h as usize);
    let (dst_w, dst_h) = (dst_w as usize, dst_h as usize);
    let mut dst = Vec::with_capacity(dst_w * dst_h * 3);
    for y in 0..dst_h {
        let sy = y * src_h / dst_h;
        for x in 0..dst_w {
            let sx = x * src_w / dst_w;
            let offset = (sy * src_w + sx) * 3;
            dst.extend_from_slice(&src[offset..offset + 3]);
        }
    }
    dst
}
