//! Media sources
//!
//! A source is anything that can be asked for its next frame asynchronously and
//! may end permanently. Exactly one logical reader should ever pull a raw
//! source; [`FanoutSource`] is the mechanism that lets many consumers share
//! that single reader.

pub mod fanout;
pub mod file;
pub mod resample;
pub mod synth;

pub use fanout::{FanoutSource, FanoutStats};
pub use file::PcmFileSource;
pub use resample::{ResampledSource, Resampler};
pub use synth::{SineSource, SolidColorSource};

use async_trait::async_trait;

use crate::error::SourceError;
use crate::frame::{Frame, MediaKind};

/// Asynchronous producer of a (possibly finite) sequence of frames
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Whether this source yields audio or video frames
    fn kind(&self) -> MediaKind;

    /// Produce the next frame, or a terminal condition
    ///
    /// After the first terminal result the source must keep reporting terminal
    /// results; callers are free to race concurrent calls only through a
    /// [`FanoutSource`].
    async fn produce_next(&self) -> Result<Frame, SourceError>;

    /// Has the source reported a terminal condition (or been stopped)?
    fn is_ended(&self) -> bool;

    /// Ask the source to stop producing; subsequent pulls report `Ended`
    fn stop(&self);
}
