//! Audio frame type

use std::sync::Arc;

use crate::frame::TimeBase;

/// One frame of interleaved signed 16-bit PCM
///
/// The sample buffer is shared, so cloning a frame for several recipients never
/// copies audio data. Mixing always writes into a fresh buffer; a frame handed
/// out is never mutated.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Interleaved PCM samples
    pub samples: Arc<[i16]>,
    /// Number of channels
    pub channels: u16,
    /// Samples per second per channel
    pub sample_rate: u32,
    /// Presentation timestamp on a sample-count clock
    pub pts: i64,
    /// Relation of pts ticks to seconds
    pub time_base: TimeBase,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, channels: u16, sample_rate: u32, pts: i64) -> Self {
        Self {
            samples: samples.into(),
            channels,
            sample_rate,
            pts,
            time_base: TimeBase::new(1, sample_rate),
        }
    }

    /// A zero-filled frame of the given length
    pub fn silence(samples_per_channel: usize, channels: u16, sample_rate: u32, pts: i64) -> Self {
        Self::new(
            vec![0i16; samples_per_channel * channels as usize],
            channels,
            sample_rate,
            pts,
        )
    }

    /// Number of samples per channel
    pub fn samples_per_channel(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Frame duration in microseconds
    pub fn duration_us(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples_per_channel() as u64 * 1_000_000) / u64::from(self.sample_rate)
    }

    /// Buffer geometry as (channels, total samples); mixing drops contributors
    /// whose shape differs from the first frame of a pass
    pub fn shape(&self) -> (u16, usize) {
        (self.channels, self.samples.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_geometry() {
        let frame = AudioFrame::new(vec![0i16; 1280], 2, 32_000, 0);
        assert_eq!(frame.samples_per_channel(), 640);
        assert_eq!(frame.duration_us(), 20_000);
        assert_eq!(frame.shape(), (2, 1280));
    }

    #[test]
    fn test_silence_is_zero_filled() {
        let frame = AudioFrame::silence(640, 1, 32_000, 1280);
        assert_eq!(frame.samples.len(), 640);
        assert!(frame.samples.iter().all(|&s| s == 0));
        assert_eq!(frame.pts, 1280);
        assert_eq!(frame.time_base, TimeBase::new(1, 32_000));
    }

    #[test]
    fn test_clone_shares_buffer() {
        let frame = AudioFrame::new(vec![7i16; 64], 1, 32_000, 0);
        let copy = frame.clone();
        assert!(Arc::ptr_eq(&frame.samples, &copy.samples));
    }
}
