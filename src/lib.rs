//! # Call Media Mixer
//!
//! Low-latency media-plane engine for multi-party real-time calls.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                              CALL GROUP                                  │
//! │                                                                          │
//! │  participant A            participant B            participant C         │
//! │  ┌───────────┐            ┌───────────┐            ┌───────────┐         │
//! │  │ raw source│            │ raw source│            │ raw source│         │
//! │  └─────┬─────┘            └─────┬─────┘            └─────┬─────┘         │
//! │        ▼                        ▼                        ▼               │
//! │  ┌───────────┐            ┌───────────┐            ┌───────────┐         │
//! │  │  Fan-out  │            │  Fan-out  │            │  Fan-out  │         │
//! │  │(+resample │            │(+resample │            │(+resample │         │
//! │  │ for audio)│            │ for audio)│            │ for audio)│         │
//! │  └─────┬─────┘            └─────┬─────┘            └─────┬─────┘         │
//! │        │  single upstream pull, shared by every consumer │               │
//! │        ├──────────────┬─────────┴──────────┬─────────────┤               │
//! │        ▼              ▼                    ▼             ▼               │
//! │  ┌───────────────────────┐        ┌───────────────────────┐  ┌─────────┐ │
//! │  │ Aggregator (recipient │  ....  │ Aggregator (recipient │  │Recording│ │
//! │  │ A: members = B + C)   │        │ C: members = A + B)   │  │  Sink   │ │
//! │  │ AudioMixer/VideoTiler │        │ AudioMixer/VideoTiler │  └─────────┘ │
//! │  └───────────┬───────────┘        └───────────┬───────────┘              │
//! │              ▼                                ▼                          │
//! │      mixed/tiled stream                mixed/tiled stream                │
//! │      delivered to A                    delivered to C                    │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each fan-out distributor guarantees its wrapped source is pulled at most once
//! per frame interval no matter how many recipients consume it. Aggregators pull
//! all of their members concurrently each cycle and hand the surviving frames to
//! a kind-specific combiner: the audio mixer sums with a fixed attenuation weight
//! on a gap-free sample clock, the video tiler concatenates fixed-size tiles side
//! by side. The call group decides when the call is live (presence gate with a
//! settle delay) and drives the recording sink.

pub mod config;
pub mod error;
pub mod frame;
pub mod group;
pub mod mix;
pub mod sink;
pub mod source;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate every audio contribution is resampled to before mixing
    pub const MIX_SAMPLE_RATE: u32 = 32_000;

    /// Channel count of the mixed stream (mono)
    pub const MIX_CHANNELS: u16 = 1;

    /// Duration of one mix cycle in milliseconds
    pub const MIX_CYCLE_MS: u32 = 20;

    /// Samples emitted per mix cycle (20 ms at 32 kHz)
    pub const SAMPLES_PER_CYCLE: usize = 640;

    /// Fixed per-contributor attenuation weight applied while summing
    pub const MIX_WEIGHT: f64 = 0.9;

    /// Hard clamp applied to the mixed sum before casting back to i16
    pub const CLIP_LIMIT: f64 = 32_767.0;

    /// Width every video contribution is scaled to before tiling
    pub const TILE_WIDTH: u32 = 640;

    /// Height every video contribution is scaled to before tiling
    pub const TILE_HEIGHT: u32 = 360;

    /// Time base denominator used for video timestamps
    pub const VIDEO_TIME_BASE: u32 = 90_000;

    /// Delay between the last expected contribution and the call going live
    pub const SETTLE_DELAY_MS: u64 = 300;
}
