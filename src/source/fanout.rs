//! Shared-pull fan-out distributor
//!
//! Wraps one upstream source so that any number of concurrent consumers can
//! request "the next frame" while the upstream is pulled at most once per frame
//! interval. All consumers registered while a pull is in flight receive the
//! same resolved frame; a consumer arriving after resolution starts the next
//! pull. Without this coalescing, every recipient of a track would trigger its
//! own upstream decode, multiplying cost and skewing timestamps between
//! recipients.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::SourceError;
use crate::frame::{Frame, MediaKind};
use crate::source::MediaSource;

/// Conversion applied to each pulled frame before it is handed to registrants
pub type FrameTransform =
    Arc<dyn Fn(Frame) -> Result<Frame, SourceError> + Send + Sync + 'static>;

type PullResult = Result<Frame, SourceError>;

struct PullState {
    /// An upstream pull is currently in flight
    pulling: bool,
    /// Terminal result observed; the upstream is never touched again
    ended: bool,
    /// Consumers waiting on the in-flight pull
    waiters: Vec<oneshot::Sender<PullResult>>,
}

struct Shared {
    state: Mutex<PullState>,
    polls: AtomicU64,
    delivered: AtomicU64,
}

impl Shared {
    /// Hand the pull result to every registered waiter and clear the list.
    /// Runs exactly once per pull, so a per-frame transform applied by the
    /// caller has already happened exactly once.
    fn resolve(&self, result: PullResult) {
        let waiters = {
            let mut state = self.state.lock();
            state.pulling = false;
            if result.is_err() {
                state.ended = true;
            }
            std::mem::take(&mut state.waiters)
        };
        self.delivered
            .fetch_add(waiters.len() as u64, Ordering::Relaxed);
        for tx in waiters {
            // A waiter that dropped its request is simply skipped.
            let _ = tx.send(result.clone());
        }
    }
}

/// Fan-out distributor over a single upstream source
pub struct FanoutSource {
    upstream: Arc<dyn MediaSource>,
    kind: MediaKind,
    transform: Option<FrameTransform>,
    shared: Arc<Shared>,
}

impl FanoutSource {
    pub fn new(upstream: Arc<dyn MediaSource>) -> Self {
        Self::build(upstream, None)
    }

    /// A distributor that converts every pulled frame exactly once before
    /// handing it to registrants (the resampling adapter hook)
    pub fn with_transform(upstream: Arc<dyn MediaSource>, transform: FrameTransform) -> Self {
        Self::build(upstream, Some(transform))
    }

    fn build(upstream: Arc<dyn MediaSource>, transform: Option<FrameTransform>) -> Self {
        let kind = upstream.kind();
        Self {
            upstream,
            kind,
            transform,
            shared: Arc::new(Shared {
                state: Mutex::new(PullState {
                    pulling: false,
                    ended: false,
                    waiters: Vec::new(),
                }),
                polls: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
            }),
        }
    }

    /// Request the next upstream frame, sharing any in-flight pull
    pub async fn request_next(&self) -> PullResult {
        let rx = {
            let mut state = self.shared.state.lock();
            if state.ended {
                return Err(SourceError::Ended);
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);

            if !state.pulling {
                state.pulling = true;
                self.shared.polls.fetch_add(1, Ordering::Relaxed);

                let upstream = Arc::clone(&self.upstream);
                let shared = Arc::clone(&self.shared);
                let transform = self.transform.clone();
                tokio::spawn(async move {
                    let mut result = upstream.produce_next().await;
                    if let Some(transform) = &transform {
                        result = result.and_then(|frame| transform(frame));
                    }
                    if result.is_err() {
                        debug!("fan-out upstream terminated, latching ended");
                    }
                    shared.resolve(result);
                });
            }
            rx
        };

        // A dropped resolver can only mean the runtime tore the pull task down.
        rx.await.unwrap_or(Err(SourceError::Ended))
    }

    /// Pull counters for diagnostics
    pub fn stats(&self) -> FanoutStats {
        FanoutStats {
            upstream_polls: self.shared.polls.load(Ordering::Relaxed),
            frames_delivered: self.shared.delivered.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl MediaSource for FanoutSource {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn produce_next(&self) -> PullResult {
        self.request_next().await
    }

    fn is_ended(&self) -> bool {
        self.shared.state.lock().ended || self.upstream.is_ended()
    }

    fn stop(&self) {
        self.shared.state.lock().ended = true;
        self.upstream.stop();
    }
}

/// Distributor counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutStats {
    /// Times the upstream was actually pulled
    pub upstream_polls: u64,
    /// Frames (or terminal signals) handed to registrants
    pub frames_delivered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::AudioFrame;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::sync::Notify;

    /// Source that blocks each pull on a gate and counts how often it is polled
    struct GatedSource {
        gate: Notify,
        polls: AtomicUsize,
        stopped: AtomicBool,
    }

    impl GatedSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: Notify::new(),
                polls: AtomicUsize::new(0),
                stopped: AtomicBool::new(false),
            })
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MediaSource for GatedSource {
        fn kind(&self) -> MediaKind {
            MediaKind::Audio
        }

        async fn produce_next(&self) -> Result<Frame, SourceError> {
            let seq = self.polls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Frame::Audio(AudioFrame::silence(
                640,
                1,
                32_000,
                seq as i64 * 640,
            )))
        }

        fn is_ended(&self) -> bool {
            self.stopped.load(Ordering::SeqCst)
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Source that is terminal from the first pull
    struct DeadSource {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl MediaSource for DeadSource {
        fn kind(&self) -> MediaKind {
            MediaKind::Audio
        }

        async fn produce_next(&self) -> Result<Frame, SourceError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Err(SourceError::Ended)
        }

        fn is_ended(&self) -> bool {
            true
        }

        fn stop(&self) {}
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce_into_one_poll() {
        let source = GatedSource::new();
        let fanout = Arc::new(FanoutSource::new(source.clone() as Arc<dyn MediaSource>));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let fanout = fanout.clone();
                tokio::spawn(async move { fanout.request_next().await })
            })
            .collect();

        // Let all three consumers register against the single in-flight pull.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(source.polls(), 1);

        source.gate.notify_one();

        let mut frames = Vec::new();
        for consumer in consumers {
            frames.push(consumer.await.unwrap().unwrap());
        }
        assert_eq!(source.polls(), 1);
        let first_pts = frames[0].pts();
        assert!(frames.iter().all(|f| f.pts() == first_pts));

        let stats = fanout.stats();
        assert_eq!(stats.upstream_polls, 1);
        assert_eq!(stats.frames_delivered, 3);
    }

    #[tokio::test]
    async fn test_request_after_resolution_starts_new_pull() {
        let source = GatedSource::new();
        let fanout = FanoutSource::new(source.clone() as Arc<dyn MediaSource>);

        source.gate.notify_one();
        let first = fanout.request_next().await.unwrap();
        source.gate.notify_one();
        let second = fanout.request_next().await.unwrap();

        assert_eq!(source.polls(), 2);
        assert_ne!(first.pts(), second.pts());
    }

    #[tokio::test]
    async fn test_terminal_result_latches_without_repolling() {
        let source = Arc::new(DeadSource {
            polls: AtomicUsize::new(0),
        });
        let fanout = FanoutSource::new(source.clone() as Arc<dyn MediaSource>);

        assert_eq!(
            fanout.request_next().await.unwrap_err(),
            SourceError::Ended
        );
        assert_eq!(
            fanout.request_next().await.unwrap_err(),
            SourceError::Ended
        );
        assert_eq!(
            fanout.request_next().await.unwrap_err(),
            SourceError::Ended
        );

        // Only the first request ever reached the upstream.
        assert_eq!(source.polls.load(Ordering::SeqCst), 1);
        assert!(fanout.is_ended());
    }

    #[tokio::test]
    async fn test_pending_waiters_all_receive_terminal_signal() {
        struct GatedDead {
            gate: Notify,
            polls: AtomicUsize,
        }

        #[async_trait]
        impl MediaSource for GatedDead {
            fn kind(&self) -> MediaKind {
                MediaKind::Audio
            }
            async fn produce_next(&self) -> Result<Frame, SourceError> {
                self.polls.fetch_add(1, Ordering::SeqCst);
                self.gate.notified().await;
                Err(SourceError::Failed("transport reset".into()))
            }
            fn is_ended(&self) -> bool {
                false
            }
            fn stop(&self) {}
        }

        let source = Arc::new(GatedDead {
            gate: Notify::new(),
            polls: AtomicUsize::new(0),
        });
        let fanout = Arc::new(FanoutSource::new(source.clone() as Arc<dyn MediaSource>));

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let fanout = fanout.clone();
                tokio::spawn(async move { fanout.request_next().await })
            })
            .collect();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        source.gate.notify_one();

        for consumer in consumers {
            assert_eq!(
                consumer.await.unwrap().unwrap_err(),
                SourceError::Failed("transport reset".into())
            );
        }
        assert_eq!(source.polls.load(Ordering::SeqCst), 1);

        // Latched: later consumers see Ended without another upstream pull.
        assert_eq!(
            fanout.request_next().await.unwrap_err(),
            SourceError::Ended
        );
        assert_eq!(source.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transform_runs_once_per_pull() {
        let source = GatedSource::new();
        let conversions = Arc::new(AtomicUsize::new(0));
        let counter = conversions.clone();
        let fanout = Arc::new(FanoutSource::with_transform(
            source.clone() as Arc<dyn MediaSource>,
            Arc::new(move |frame| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(frame)
            }),
        ));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let fanout = fanout.clone();
                tokio::spawn(async move { fanout.request_next().await })
            })
            .collect();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        source.gate.notify_one();
        for consumer in consumers {
            consumer.await.unwrap().unwrap();
        }

        assert_eq!(conversions.load(Ordering::SeqCst), 1);
    }
}
