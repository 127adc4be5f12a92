//! Call lifecycle
//!
//! A [`CallGroup`] owns everything one multi-party call needs on the media
//! plane: the participant → contributed-sources map, one personalized
//! aggregation pipeline per recipient, the presence gate deciding when the
//! call is live, and the recording sink. Groups live in a [`GroupRegistry`]
//! created at application startup and torn down at shutdown.

pub mod call;
pub mod registry;

pub use call::{CallGroup, CallState, ParticipantId, RecipientPipeline};
pub use registry::GroupRegistry;
