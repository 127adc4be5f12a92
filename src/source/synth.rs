//! Synthetic paced sources
//!
//! Stand-ins for live capture: a sine tone and a solid-color video feed, each
//! emitting one frame per fixed interval. Used by the demo binary and tests.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::constants::{MIX_CYCLE_MS, VIDEO_TIME_BASE};
use crate::error::SourceError;
use crate::frame::{AudioFrame, Frame, MediaKind, VideoFrame};
use crate::source::MediaSource;

fn paced(period: Duration) -> Mutex<Interval> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Mutex::new(ticker)
}

struct SynthState {
    phase: f32,
    pts: i64,
    frames_emitted: u64,
}

/// Paced sine tone source
pub struct SineSource {
    freq_hz: f32,
    sample_rate: u32,
    channels: u16,
    samples_per_frame: usize,
    frame_limit: Option<u64>,
    state: SyncMutex<SynthState>,
    ticker: Mutex<Interval>,
    stopped: AtomicBool,
}

impl SineSource {
    /// A tone emitting 20 ms frames at the given rate and channel count
    pub fn new(freq_hz: f32, sample_rate: u32, channels: u16) -> Self {
        let samples_per_frame = (sample_rate as usize * MIX_CYCLE_MS as usize) / 1000;
        Self {
            freq_hz,
            sample_rate,
            channels,
            samples_per_frame,
            frame_limit: None,
            state: SyncMutex::new(SynthState {
                phase: 0.0,
                pts: 0,
                frames_emitted: 0,
            }),
            ticker: paced(Duration::from_millis(u64::from(MIX_CYCLE_MS))),
            stopped: AtomicBool::new(false),
        }
    }

    /// End the source after the given number of frames
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }
}

#[async_trait]
impl MediaSource for SineSource {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    async fn produce_next(&self) -> Result<Frame, SourceError> {
        if self.is_ended() {
            return Err(SourceError::Ended);
        }
        self.ticker.lock().await.tick().await;
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SourceError::Ended);
        }

        let mut state = self.state.lock();
        if let Some(limit) = self.frame_limit {
            if state.frames_emitted >= limit {
                self.stopped.store(true, Ordering::SeqCst);
                return Err(SourceError::Ended);
            }
        }

        let step = TAU * self.freq_hz / self.sample_rate as f32;
        let mut samples = Vec::with_capacity(self.samples_per_frame * self.channels as usize);
        for _ in 0..self.samples_per_frame {
            let value = (state.phase.sin() * 8000.0) as i16;
            for _ in 0..self.channels {
                samples.push(value);
            }
            state.phase = (state.phase + step) % TAU;
        }

        let frame = AudioFrame::new(samples, self.channels, self.sample_rate, state.pts);
        state.pts += self.samples_per_frame as i64;
        state.frames_emitted += 1;
        Ok(Frame::Audio(frame))
    }

    fn is_ended(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

struct TickState {
    pts: i64,
    frames_emitted: u64,
}

/// Paced solid-color video source
pub struct SolidColorSource {
    rgb: [u8; 3],
    width: u32,
    height: u32,
    pts_step: i64,
    frame_limit: Option<u64>,
    state: SyncMutex<TickState>,
    ticker: Mutex<Interval>,
    stopped: AtomicBool,
}

impl SolidColorSource {
    /// A single-color feed at the given geometry and frame rate
    pub fn new(rgb: [u8; 3], width: u32, height: u32, fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            rgb,
            width,
            height,
            pts_step: i64::from(VIDEO_TIME_BASE / fps),
            frame_limit: None,
            state: SyncMutex::new(TickState {
                pts: 0,
                frames_emitted: 0,
            }),
            ticker: paced(Duration::from_millis(u64::from(1000 / fps))),
            stopped: AtomicBool::new(false),
        }
    }

    /// End the source after the given number of frames
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }
}

#[async_trait]
impl MediaSource for SolidColorSource {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    async fn produce_next(&self) -> Result<Frame, SourceError> {
        if self.is_ended() {
            return Err(SourceError::Ended);
        }
        self.ticker.lock().await.tick().await;
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SourceError::Ended);
        }

        let mut state = self.state.lock();
        if let Some(limit) = self.frame_limit {
            if state.frames_emitted >= limit {
                self.stopped.store(true, Ordering::SeqCst);
                return Err(SourceError::Ended);
            }
        }

        let frame = VideoFrame::solid(self.width, self.height, self.rgb, state.pts);
        state.pts += self.pts_step;
        state.frames_emitted += 1;
        Ok(Frame::Video(frame))
    }

    fn is_ended(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
