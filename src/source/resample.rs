//! Resampling adapter
//!
//! Wraps a fan-out distributor (audio only) so every pulled frame is converted
//! to the fixed mix format before being handed to registrants. Conversion runs
//! inside the distributor's resolve step, exactly once per pulled frame, never
//! once per registrant. Ended/failure semantics are inherited unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::AudioMixConfig;
use crate::error::SourceError;
use crate::frame::{AudioFrame, Frame, MediaKind};
use crate::source::{FanoutSource, MediaSource};

/// Stateful converter to the fixed mix format: signed 16-bit, mono, target rate
///
/// Channel layout is collapsed by integer averaging; the rate is converted with
/// linear interpolation. The output pts is a running sample counter over the
/// converted stream, independent of the input clock.
pub struct Resampler {
    target_rate: u32,
    next_pts: i64,
}

impl Resampler {
    pub fn new(target_rate: u32) -> Self {
        Self {
            target_rate,
            next_pts: 0,
        }
    }

    /// Convert one frame to the target format
    pub fn convert(&mut self, frame: &AudioFrame) -> AudioFrame {
        let mono = downmix_mono(&frame.samples, frame.channels);
        let samples = if frame.sample_rate == self.target_rate {
            mono
        } else {
            resample_linear(&mono, frame.sample_rate, self.target_rate)
        };

        let out = AudioFrame::new(samples, 1, self.target_rate, self.next_pts);
        self.next_pts += out.samples.len() as i64;
        out
    }
}

fn downmix_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| i32::from(s)).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if samples.is_empty() || from_rate == 0 {
        return Vec::new();
    }
    let out_len = (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let mut out = Vec::with_capacity(out_len);
    let step = from_rate as f64 / to_rate as f64;
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = pos as usize;
        let frac = pos - idx as f64;
        let a = f64::from(samples[idx.min(samples.len() - 1)]);
        let b = f64::from(samples[(idx + 1).min(samples.len() - 1)]);
        out.push((a + (b - a) * frac).round() as i16);
    }
    out
}

/// Fan-out distributor whose frames arrive already converted to the mix format
pub struct ResampledSource {
    inner: FanoutSource,
}

impl ResampledSource {
    pub fn new(upstream: Arc<dyn MediaSource>) -> Self {
        Self::with_config(upstream, &AudioMixConfig::default())
    }

    pub fn with_config(upstream: Arc<dyn MediaSource>, config: &AudioMixConfig) -> Self {
        let resampler = Mutex::new(Resampler::new(config.sample_rate));
        let inner = FanoutSource::with_transform(
            upstream,
            Arc::new(move |frame| match frame {
                Frame::Audio(audio) => Ok(Frame::Audio(resampler.lock().convert(&audio))),
                Frame::Video(_) => Err(SourceError::Failed(
                    "resampling adapter received a video frame".into(),
                )),
            }),
        );
        Self { inner }
    }

    /// Request the next converted frame, sharing any in-flight pull
    pub async fn request_next(&self) -> Result<Frame, SourceError> {
        self.inner.request_next().await
    }
}

#[async_trait]
impl MediaSource for ResampledSource {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    async fn produce_next(&self) -> Result<Frame, SourceError> {
        self.inner.produce_next().await
    }

    fn is_ended(&self) -> bool {
        self.inner.is_ended()
    }

    fn stop(&self) {
        self.inner.stop();
    }
}
