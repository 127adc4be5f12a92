//! Call group state machine
//!
//! `Assembling → Live → Ended`, with `Ended` terminal. While assembling, each
//! contribution restarts a short settle window; once every expected
//! participant has contributed at least one source and the window elapses
//! undisturbed, the call goes live: the recording sink starts, the call-start
//! time is stamped and everyone awaiting the gate is released. The window
//! absorbs near-simultaneous joins so the recording does not start
//! mid-negotiation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::GroupError;
use crate::frame::MediaKind;
use crate::mix::{Aggregator, AudioMixer, VideoTiler};
use crate::sink::RecordingSink;
use crate::source::{FanoutSource, MediaSource, ResampledSource};

/// Identity of one call participant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Call lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Assembling,
    Live,
    Ended,
}

/// The personalized outgoing pipelines of one recipient
///
/// Membership is every *other* participant's contributed sources of the
/// matching kind; a recipient never receives its own contribution back.
#[derive(Clone)]
pub struct RecipientPipeline {
    pub audio: Arc<Aggregator<AudioMixer>>,
    pub video: Arc<Aggregator<VideoTiler>>,
}

struct GroupInner {
    state: CallState,
    contributions: HashMap<ParticipantId, Vec<Arc<dyn MediaSource>>>,
    pipelines: HashMap<ParticipantId, RecipientPipeline>,
    settle: Option<JoinHandle<()>>,
    call_start: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
}

/// One multi-party call on the media plane
pub struct CallGroup {
    uid: Uuid,
    config: EngineConfig,
    inner: Mutex<GroupInner>,
    state_tx: watch::Sender<CallState>,
    recorder: Arc<dyn RecordingSink>,
}

impl std::fmt::Debug for CallGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallGroup").field("uid", &self.uid).finish()
    }
}

impl CallGroup {
    /// Declare a call with its expected participants
    pub fn new(
        uid: Uuid,
        participants: impl IntoIterator<Item = ParticipantId>,
        recorder: Arc<dyn RecordingSink>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let mut contributions = HashMap::new();
        let mut pipelines = HashMap::new();
        for participant in participants {
            contributions.insert(participant.clone(), Vec::new());
            pipelines.insert(
                participant,
                RecipientPipeline {
                    audio: Arc::new(Aggregator::new(AudioMixer::with_config(&config.audio))),
                    video: Arc::new(Aggregator::new(VideoTiler::with_config(&config.video))),
                },
            );
        }

        let (state_tx, _) = watch::channel(CallState::Assembling);
        info!(uid = %uid, participants = contributions.len(), "call group created");
        Arc::new(Self {
            uid,
            config,
            inner: Mutex::new(GroupInner {
                state: CallState::Assembling,
                contributions,
                pipelines,
                settle: None,
                call_start: None,
                started_at: None,
            }),
            state_tx,
            recorder,
        })
    }

    pub fn uid(&self) -> Uuid {
        self.uid
    }

    pub fn state(&self) -> CallState {
        self.inner.lock().state
    }

    /// Wall-clock time the call went live
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().started_at
    }

    pub fn has_participant(&self, id: &ParticipantId) -> bool {
        self.inner.lock().contributions.contains_key(id)
    }

    /// Every other participant's contributed sources, any kind
    pub fn contributions_excluding(&self, id: &ParticipantId) -> Vec<Arc<dyn MediaSource>> {
        let inner = self.inner.lock();
        inner
            .contributions
            .iter()
            .filter(|(participant, _)| *participant != id)
            .flat_map(|(_, sources)| sources.iter().cloned())
            .collect()
    }

    /// The outgoing pipelines built for one recipient
    pub fn pipeline_for(&self, id: &ParticipantId) -> Option<RecipientPipeline> {
        self.inner.lock().pipelines.get(id).cloned()
    }

    /// Accept a contributed source for a participant
    ///
    /// The raw source is wrapped at this boundary (audio behind a resampling
    /// fan-out, video behind a plain fan-out) so exactly one logical reader
    /// ever touches it. Audio contributions are also attached to the recording
    /// sink. Contributions keep being accepted while the call is live (the
    /// presence gate never re-arms); after the call ends they are rejected.
    pub fn contribute(
        self: &Arc<Self>,
        participant: &ParticipantId,
        raw: Arc<dyn MediaSource>,
    ) -> Result<(), GroupError> {
        let kind = raw.kind();
        let wrapped: Arc<dyn MediaSource> = match kind {
            MediaKind::Audio => Arc::new(ResampledSource::with_config(raw, &self.config.audio)),
            MediaKind::Video => Arc::new(FanoutSource::new(raw)),
        };

        let mut inner = self.inner.lock();
        if inner.state == CallState::Ended {
            warn!(uid = %self.uid, %participant, "contribution after end rejected");
            return Err(GroupError::CallEnded);
        }
        if !inner.contributions.contains_key(participant) {
            return Err(GroupError::UnknownParticipant(participant.to_string()));
        }

        if kind == MediaKind::Audio {
            self.recorder.add_source(wrapped.clone());
        }
        for (other, pipeline) in &inner.pipelines {
            if other == participant {
                continue;
            }
            match kind {
                MediaKind::Audio => pipeline.audio.add_member(wrapped.clone()),
                MediaKind::Video => pipeline.video.add_member(wrapped.clone()),
            }
        }
        if let Some(sources) = inner.contributions.get_mut(participant) {
            sources.push(wrapped);
        }

        info!(uid = %self.uid, %participant, %kind, "contribution accepted");

        if inner.state == CallState::Assembling {
            // Every contribution restarts the settle window.
            if let Some(settle) = inner.settle.take() {
                settle.abort();
            }
            let all_present = inner.contributions.values().all(|s| !s.is_empty());
            if all_present {
                let group = Arc::clone(self);
                let delay = self.config.group.settle_delay();
                inner.settle = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    group.go_live().await;
                }));
            }
        }
        Ok(())
    }

    /// Resolves once the call is live; fails if the call ends first
    pub async fn await_live(&self) -> Result<(), GroupError> {
        let mut rx = self.state_tx.subscribe();
        loop {
            match *rx.borrow_and_update() {
                CallState::Live => return Ok(()),
                CallState::Ended => return Err(GroupError::CallEnded),
                CallState::Assembling => {}
            }
            if rx.changed().await.is_err() {
                return Err(GroupError::CallEnded);
            }
        }
    }

    async fn go_live(self: Arc<Self>) {
        // Trip the gate exactly once; it never resets.
        {
            let mut inner = self.inner.lock();
            if inner.state != CallState::Assembling {
                return;
            }
            inner.state = CallState::Live;
        }

        if let Err(e) = self.recorder.start().await {
            // The call proceeds unrecorded; recording is best-effort.
            error!(uid = %self.uid, error = %e, "recording sink failed to start");
        }

        {
            let mut inner = self.inner.lock();
            if inner.state != CallState::Live {
                // The call was torn down while the sink was starting.
                return;
            }
            inner.call_start = Some(Instant::now());
            inner.started_at = Some(Utc::now());
            self.state_tx.send_replace(CallState::Live);
        }
        info!(uid = %self.uid, "call is live");
    }

    /// End the call: stop the recording sink, tear down every owned source
    /// and pipeline. Returns the elapsed call duration, `None` when the call
    /// never went live. Idempotent.
    pub async fn end(&self) -> Result<Option<Duration>, GroupError> {
        let (was_live, call_start, settle, sources, pipelines) = {
            let mut inner = self.inner.lock();
            if inner.state == CallState::Ended {
                return Ok(None);
            }
            let was_live = inner.state == CallState::Live;
            inner.state = CallState::Ended;
            let sources: Vec<Arc<dyn MediaSource>> = inner
                .contributions
                .values()
                .flat_map(|s| s.iter().cloned())
                .collect();
            let pipelines: Vec<RecipientPipeline> = inner.pipelines.values().cloned().collect();
            self.state_tx.send_replace(CallState::Ended);
            (
                was_live,
                inner.call_start.take(),
                inner.settle.take(),
                sources,
                pipelines,
            )
        };

        if let Some(settle) = settle {
            settle.abort();
        }
        if was_live {
            if let Err(e) = self.recorder.stop().await {
                error!(uid = %self.uid, error = %e, "recording sink failed to stop");
            }
        }
        for source in sources {
            source.stop();
        }
        for pipeline in pipelines {
            pipeline.audio.stop();
            pipeline.video.stop();
        }

        let duration = call_start.map(|start| start.elapsed());
        info!(uid = %self.uid, ?duration, "call ended");
        Ok(duration)
    }
}
