//! Generic N-way aggregation
//!
//! Holds a dynamic set of member sources, pulls all of them concurrently each
//! cycle, prunes members that have ended or failed, and delegates the
//! combination step to the injected [`FrameCombiner`]. Per-member faults are
//! contained here: a member that ends or fails mid-pull is excluded from the
//! current pass and removed from membership, and the cycle carries on with the
//! survivors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{MixError, SourceError};
use crate::frame::{Frame, MediaKind};
use crate::mix::FrameCombiner;
use crate::source::MediaSource;

/// Combines a dynamic set of sources into one outgoing frame per cycle
pub struct Aggregator<C: FrameCombiner> {
    kind: MediaKind,
    members: Mutex<Vec<Arc<dyn MediaSource>>>,
    combiner: Mutex<C>,
    last_output: Mutex<Option<Frame>>,
    stopped: AtomicBool,
}

impl<C: FrameCombiner> Aggregator<C> {
    pub fn new(combiner: C) -> Self {
        let kind = combiner.kind();
        Self {
            kind,
            members: Mutex::new(Vec::new()),
            combiner: Mutex::new(combiner),
            last_output: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn add_member(&self, source: Arc<dyn MediaSource>) {
        self.members.lock().push(source);
    }

    /// Remove a member by handle identity
    pub fn remove_member(&self, source: &Arc<dyn MediaSource>) {
        self.members
            .lock()
            .retain(|member| !Arc::ptr_eq(member, source));
    }

    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }

    /// Run one aggregation cycle
    ///
    /// Member pulls run in parallel, so cycle latency tracks the slowest
    /// member, not the sum; the cycle completes only once every pull has
    /// settled. A permanently stalled member therefore stalls the cycle;
    /// no per-frame timeout is enforced.
    pub async fn produce_next(&self) -> Result<Frame, MixError> {
        // Prune members already known to be over; they must not be polled again.
        let members: Vec<Arc<dyn MediaSource>> = {
            let mut members = self.members.lock();
            members.retain(|member| !member.is_ended());
            members.clone()
        };

        let pulls = members.iter().map(|member| member.produce_next());
        let results = join_all(pulls).await;

        let mut frames = Vec::with_capacity(results.len());
        for (member, result) in members.iter().zip(results) {
            match result {
                Ok(frame) => frames.push(frame),
                Err(reason) => {
                    // Ended and failed members are treated alike: out of this
                    // pass, out of the membership set.
                    debug!(kind = %self.kind, %reason, "dropping aggregation member");
                    self.remove_member(member);
                }
            }
        }

        let combined = self.combiner.lock().combine(frames);
        match combined {
            Ok(frame) => {
                *self.last_output.lock() = Some(frame.clone());
                Ok(frame)
            }
            Err(MixError::EmptyPass) => {
                // Zero survivors: freeze on the previous composite rather than
                // dropping the recipient's stream; fall back to the combiner's
                // bootstrap frame when nothing was ever produced.
                warn!(kind = %self.kind, "combine pass had no contributors, repeating last frame");
                let frozen = self
                    .last_output
                    .lock()
                    .clone()
                    .or_else(|| self.combiner.lock().empty_fallback());
                frozen.ok_or(MixError::EmptyPass)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<C: FrameCombiner + 'static> MediaSource for Aggregator<C> {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn produce_next(&self) -> Result<Frame, SourceError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SourceError::Ended);
        }
        Aggregator::produce_next(self)
            .await
            .map_err(|e| SourceError::Failed(e.to_string()))
    }

    fn is_ended(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Latches this aggregator ended without touching its members: they are
    /// shared with sibling recipients' pipelines.
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::AudioFrame;
    use crate::mix::{AudioMixer, VideoTiler};
    use crate::source::SolidColorSource;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Source that replays a scripted list of results, then ends
    struct QueueSource {
        kind: MediaKind,
        script: Mutex<VecDeque<Result<Frame, SourceError>>>,
        polls: AtomicUsize,
    }

    impl QueueSource {
        fn audio(script: Vec<Result<Frame, SourceError>>) -> Arc<Self> {
            Arc::new(Self {
                kind: MediaKind::Audio,
                script: Mutex::new(script.into()),
                polls: AtomicUsize::new(0),
            })
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MediaSource for QueueSource {
        fn kind(&self) -> MediaKind {
            self.kind
        }

        async fn produce_next(&self) -> Result<Frame, SourceError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .pop_front()
                .unwrap_or(Err(SourceError::Ended))
        }

        fn is_ended(&self) -> bool {
            self.script.lock().is_empty()
        }

        fn stop(&self) {}
    }

    fn tone(value: i16) -> Result<Frame, SourceError> {
        Ok(Frame::Audio(AudioFrame::new(vec![value; 4], 1, 32_000, 0)))
    }

    #[tokio::test]
    async fn test_members_are_mixed_together() {
        let aggregator = Aggregator::new(AudioMixer::new());
        aggregator.add_member(QueueSource::audio(vec![tone(1_000)]));
        aggregator.add_member(QueueSource::audio(vec![tone(2_000)]));

        let out = aggregator
            .produce_next()
            .await
            .unwrap()
            .into_audio()
            .unwrap();
        assert_eq!(out.samples.as_ref(), &[2_700, 2_700, 2_700, 2_700]);
    }

    #[tokio::test]
    async fn test_ended_member_is_pruned_without_being_polled() {
        let aggregator = Aggregator::new(AudioMixer::new());
        let live = QueueSource::audio(vec![tone(1_000), tone(1_000)]);
        let dead = QueueSource::audio(vec![]);
        aggregator.add_member(live.clone());
        aggregator.add_member(dead.clone());

        aggregator.produce_next().await.unwrap();
        assert_eq!(dead.polls(), 0);
        assert_eq!(aggregator.member_count(), 1);
    }

    #[tokio::test]
    async fn test_mid_pull_failure_drops_member_from_future_passes() {
        let aggregator = Aggregator::new(AudioMixer::new());
        let healthy = QueueSource::audio(vec![tone(1_000), tone(1_000)]);
        let flaky = Arc::new(QueueSource {
            kind: MediaKind::Audio,
            script: Mutex::new(
                vec![
                    Err(SourceError::Failed("decode fault".into())),
                    tone(9_000),
                ]
                .into(),
            ),
            polls: AtomicUsize::new(0),
        });
        aggregator.add_member(healthy.clone());
        aggregator.add_member(flaky.clone());

        // The failing member is tolerated: the pass still produces output.
        let out = aggregator
            .produce_next()
            .await
            .unwrap()
            .into_audio()
            .unwrap();
        assert_eq!(out.samples.as_ref(), &[900, 900, 900, 900]);
        assert_eq!(aggregator.member_count(), 1);

        // And it is gone: the scripted follow-up frame is never pulled.
        aggregator.produce_next().await.unwrap();
        assert_eq!(flaky.polls(), 1);
    }

    #[tokio::test]
    async fn test_zero_members_yields_silence_for_audio() {
        let aggregator = Aggregator::new(AudioMixer::new());
        let out = aggregator
            .produce_next()
            .await
            .unwrap()
            .into_audio()
            .unwrap();
        assert!(out.samples.iter().all(|&s| s == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_video_freeze_frame_after_members_end() {
        let aggregator = Aggregator::new(VideoTiler::new());
        let source: Arc<dyn MediaSource> =
            Arc::new(SolidColorSource::new([200, 10, 10], 640, 360, 25).with_frame_limit(1));
        aggregator.add_member(source);

        let first = aggregator
            .produce_next()
            .await
            .unwrap()
            .into_video()
            .unwrap();
        assert_eq!(&first.pixels[..3], &[200, 10, 10]);

        // Member exhausted: the composite freezes instead of going dark.
        let second = aggregator
            .produce_next()
            .await
            .unwrap()
            .into_video()
            .unwrap();
        assert_eq!(second.pixels, first.pixels);
        assert_eq!(second.pts, first.pts);
    }

    #[tokio::test]
    async fn test_video_bootstrap_blank_with_no_members() {
        let aggregator = Aggregator::new(VideoTiler::new());
        let out = aggregator
            .produce_next()
            .await
            .unwrap()
            .into_video()
            .unwrap();
        assert!(out.pixels.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_stop_latches_the_pipeline_not_the_members() {
        let aggregator = Aggregator::new(AudioMixer::new());
        let member = QueueSource::audio(vec![tone(1_000), tone(1_000)]);
        aggregator.add_member(member.clone());

        aggregator.stop();
        assert_eq!(
            MediaSource::produce_next(&aggregator).await.unwrap_err(),
            SourceError::Ended
        );
        // Members remain usable by sibling pipelines.
        assert!(!member.is_ended());
    }
}
