//! Frame model
//!
//! A [`Frame`] is one timestamped unit of decoded media: interleaved PCM samples
//! or a decoded image. Frames are immutable once produced and cheap to clone
//! (reference-counted buffers), so a fan-out distributor can hand the same frame
//! to every registered consumer.

pub mod audio;
pub mod video;

pub use audio::AudioFrame;
pub use video::{PixelFormat, VideoFrame};

/// Media kind of a source or frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Rational time base relating pts ticks to seconds (e.g. 1/32000)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Seconds represented by one pts tick
    pub fn tick_secs(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

impl std::fmt::Display for TimeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// One decoded media frame
#[derive(Debug, Clone)]
pub enum Frame {
    Audio(AudioFrame),
    Video(VideoFrame),
}

impl Frame {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Audio(_) => MediaKind::Audio,
            Self::Video(_) => MediaKind::Video,
        }
    }

    pub fn pts(&self) -> i64 {
        match self {
            Self::Audio(a) => a.pts,
            Self::Video(v) => v.pts,
        }
    }

    pub fn time_base(&self) -> TimeBase {
        match self {
            Self::Audio(a) => a.time_base,
            Self::Video(v) => v.time_base,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioFrame> {
        match self {
            Self::Audio(a) => Some(a),
            Self::Video(_) => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoFrame> {
        match self {
            Self::Video(v) => Some(v),
            Self::Audio(_) => None,
        }
    }

    pub fn into_audio(self) -> Option<AudioFrame> {
        match self {
            Self::Audio(a) => Some(a),
            Self::Video(_) => None,
        }
    }

    pub fn into_video(self) -> Option<VideoFrame> {
        match self {
            Self::Video(v) => Some(v),
            Self::Audio(_) => None,
        }
    }
}
