//! N-way audio mixing
//!
//! Sums the contributors of one aggregation pass with a fixed attenuation
//! weight, clamps to the 16-bit range, and stamps the output from an internal
//! sample counter advanced by a fixed amount per cycle. The counter, not any
//! input timestamp, is the output clock: jitter or silence in a contributor
//! never produces gaps in the outgoing stream.

use tracing::debug;

use crate::config::AudioMixConfig;
use crate::constants::CLIP_LIMIT;
use crate::error::MixError;
use crate::frame::{AudioFrame, Frame, MediaKind};
use crate::mix::FrameCombiner;

/// Fixed-cadence audio mix combiner
pub struct AudioMixer {
    sample_rate: u32,
    channels: u16,
    cycle_samples: usize,
    weight: f64,
    /// Output pts clock, in samples
    clock: i64,
    stats: MixerStats,
}

impl AudioMixer {
    pub fn new() -> Self {
        Self::with_config(&AudioMixConfig::default())
    }

    pub fn with_config(config: &AudioMixConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            cycle_samples: config.cycle_samples(),
            weight: config.mix_weight,
            clock: 0,
            stats: MixerStats::default(),
        }
    }

    /// Mix counters
    pub fn stats(&self) -> MixerStats {
        self.stats
    }

    fn accumulate(
        acc: &mut Option<(Vec<f64>, u16)>,
        frame: &AudioFrame,
        weight: f64,
    ) -> Result<(), MixError> {
        match acc {
            None => {
                let sum: Vec<f64> = frame
                    .samples
                    .iter()
                    .map(|&s| f64::from(s) * weight)
                    .collect();
                *acc = Some((sum, frame.channels));
                Ok(())
            }
            Some((sum, channels)) => {
                if sum.len() != frame.samples.len() || *channels != frame.channels {
                    return Err(MixError::ShapeMismatch {
                        expected_channels: *channels,
                        expected_samples: sum.len(),
                        channels: frame.channels,
                        samples: frame.samples.len(),
                    });
                }
                for (dst, &src) in sum.iter_mut().zip(frame.samples.iter()) {
                    *dst += f64::from(src) * weight;
                }
                Ok(())
            }
        }
    }
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCombiner for AudioMixer {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn combine(&mut self, frames: Vec<Frame>) -> Result<Frame, MixError> {
        let mut acc: Option<(Vec<f64>, u16)> = None;

        for frame in &frames {
            // Non-audio entries are ignored rather than failing the pass.
            let Some(audio) = frame.as_audio() else {
                continue;
            };
            if let Err(e) = Self::accumulate(&mut acc, audio, self.weight) {
                // Shape mismatch drops this contributor from this pass only.
                debug!(error = %e, "dropping mix contributor");
                self.stats.contributors_dropped += 1;
            }
        }

        let frame = match acc {
            Some((sum, channels)) => {
                let samples: Vec<i16> = sum
                    .iter()
                    .map(|&v| v.clamp(-CLIP_LIMIT, CLIP_LIMIT) as i16)
                    .collect();
                AudioFrame::new(samples, channels, self.sample_rate, self.clock)
            }
            None => {
                // The outgoing stream must never stall: emit one cycle of
                // silence and keep the clock moving.
                self.stats.silent_cycles += 1;
                AudioFrame::silence(self.cycle_samples, self.channels, self.sample_rate, self.clock)
            }
        };

        self.clock += self.cycle_samples as i64;
        self.stats.cycles += 1;
        Ok(Frame::Audio(frame))
    }
}

/// Mix counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerStats {
    /// Cycles produced, silent ones included
    pub cycles: u64,
    /// Cycles that had no valid contributor
    pub silent_cycles: u64,
    /// Contributors dropped for buffer shape mismatch
    pub contributors_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SAMPLES_PER_CYCLE;
    use proptest::prelude::*;

    fn audio(samples: Vec<i16>) -> Frame {
        Frame::Audio(AudioFrame::new(samples, 1, 32_000, 0))
    }

    #[test]
    fn test_single_contributor_is_attenuated_not_passed_through() {
        let mut mixer = AudioMixer::new();
        let out = mixer
            .combine(vec![audio(vec![10_000, -10_000, 0, 100])])
            .unwrap()
            .into_audio()
            .unwrap();
        assert_eq!(out.samples.as_ref(), &[9_000, -9_000, 0, 90]);
    }

    #[test]
    fn test_two_contributors_sum_with_weight() {
        let mut mixer = AudioMixer::new();
        let out = mixer
            .combine(vec![audio(vec![1_000, 2_000]), audio(vec![3_000, -2_000])])
            .unwrap()
            .into_audio()
            .unwrap();
        assert_eq!(out.samples.as_ref(), &[3_600, 0]);
    }

    #[test]
    fn test_clipping_clamps_to_boundary_without_wraparound() {
        let mut mixer = AudioMixer::new();
        let loud = vec![i16::MAX; 4];
        let out = mixer
            .combine(vec![audio(loud.clone()), audio(loud.clone()), audio(loud)])
            .unwrap()
            .into_audio()
            .unwrap();
        assert!(out.samples.iter().all(|&s| s == 32_767));

        let quiet = vec![i16::MIN; 4];
        let out = mixer
            .combine(vec![audio(quiet.clone()), audio(quiet.clone()), audio(quiet)])
            .unwrap()
            .into_audio()
            .unwrap();
        assert!(out.samples.iter().all(|&s| s == -32_767));
    }

    #[test]
    fn test_clock_advances_by_fixed_cycle_regardless_of_input() {
        let mut mixer = AudioMixer::new();

        let first = mixer
            .combine(vec![audio(vec![1; 640])])
            .unwrap()
            .into_audio()
            .unwrap();
        // Empty pass: silence, clock still advances.
        let second = mixer.combine(vec![]).unwrap().into_audio().unwrap();
        // Short input frame: clock still advances by the full cycle.
        let third = mixer
            .combine(vec![audio(vec![1; 100])])
            .unwrap()
            .into_audio()
            .unwrap();

        assert_eq!(first.pts, 0);
        assert_eq!(second.pts, SAMPLES_PER_CYCLE as i64);
        assert_eq!(third.pts, 2 * SAMPLES_PER_CYCLE as i64);
    }

    #[test]
    fn test_empty_pass_emits_full_cycle_of_silence() {
        let mut mixer = AudioMixer::new();
        let out = mixer.combine(vec![]).unwrap().into_audio().unwrap();
        assert_eq!(out.samples.len(), SAMPLES_PER_CYCLE);
        assert!(out.samples.iter().all(|&s| s == 0));
        assert_eq!(mixer.stats().silent_cycles, 1);
    }

    #[test]
    fn test_shape_mismatch_drops_contributor_not_pass() {
        let mut mixer = AudioMixer::new();
        let out = mixer
            .combine(vec![audio(vec![1_000; 4]), audio(vec![1_000; 8])])
            .unwrap()
            .into_audio()
            .unwrap();
        // Only the first contributor survives the pass.
        assert_eq!(out.samples.as_ref(), &[900, 900, 900, 900]);
        assert_eq!(mixer.stats().contributors_dropped, 1);
    }

    #[test]
    fn test_video_entries_are_ignored() {
        use crate::frame::VideoFrame;

        let mut mixer = AudioMixer::new();
        let out = mixer
            .combine(vec![
                Frame::Video(VideoFrame::solid(4, 4, [0, 0, 0], 0)),
                audio(vec![100, 200]),
            ])
            .unwrap()
            .into_audio()
            .unwrap();
        assert_eq!(out.samples.as_ref(), &[90, 180]);
    }

    proptest! {
        #[test]
        fn prop_mixed_output_never_leaves_clip_range(
            buffers in prop::collection::vec(
                prop::collection::vec(any::<i16>(), 64),
                1..5,
            )
        ) {
            let mut mixer = AudioMixer::new();
            let frames = buffers.into_iter().map(audio).collect();
            let out = mixer.combine(frames).unwrap().into_audio().unwrap();
            prop_assert!(out.samples.iter().all(|&s| (-32_767..=32_767).contains(&s)));
        }
    }
}
