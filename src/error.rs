//! Error types for the media mixing engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Mix error: {0}")]
    Mix(#[from] MixError),

    #[error("Group error: {0}")]
    Group(#[from] GroupError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal conditions reported by a media source.
///
/// Both variants are values, not faults: an aggregator reacts to either by
/// pruning the member, never by crashing the cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Source ended")]
    Ended,

    #[error("Source failed: {0}")]
    Failed(String),
}

/// Frame combination errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MixError {
    #[error(
        "Buffer shape mismatch: expected {expected_channels}ch x {expected_samples}, \
         got {channels}ch x {samples}"
    )]
    ShapeMismatch {
        expected_channels: u16,
        expected_samples: usize,
        channels: u16,
        samples: usize,
    },

    #[error("Combine pass had no valid contributors")]
    EmptyPass,

    #[error("Unsupported frame buffer: {0}")]
    UnsupportedBuffer(String),
}

/// Call group errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("Call has already ended")]
    CallEnded,

    #[error("Group already exists: {0}")]
    GroupExists(uuid::Uuid),

    #[error("Group not found: {0}")]
    GroupNotFound(uuid::Uuid),
}

/// Recording sink errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Sink failed: {0}")]
    Failed(String),
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
