//! Recording sinks
//!
//! The engine drives a recording sink over a narrow contract: attach sources,
//! start, stop. What a sink does with the frames (disk, transcription, wire)
//! is an external concern. Two implementations live here: [`NullSink`] drains
//! attached sources to nowhere, [`BufferSink`] collects frames in memory for
//! diagnostics and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::SinkError;
use crate::frame::Frame;
use crate::source::MediaSource;

/// Consumer of contributed sources, started and stopped with the call
#[async_trait]
pub trait RecordingSink: Send + Sync {
    /// Attach a source; allowed before or after `start`
    fn add_source(&self, source: Arc<dyn MediaSource>);

    /// Begin consuming all attached sources
    async fn start(&self) -> Result<(), SinkError>;

    /// Stop consuming; idempotent
    async fn stop(&self) -> Result<(), SinkError>;
}

type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync>;

struct DrainInner {
    sources: Vec<Arc<dyn MediaSource>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Sink that pulls every attached source until it ends and discards the frames
///
/// Keeps fan-out distributors draining even when no recipient is consuming a
/// track yet, so pending frames are always released.
pub struct NullSink {
    inner: Mutex<DrainInner>,
    started: AtomicBool,
    on_frame: Option<FrameCallback>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::build(None)
    }

    fn with_on_frame(on_frame: FrameCallback) -> Self {
        Self::build(Some(on_frame))
    }

    fn build(on_frame: Option<FrameCallback>) -> Self {
        Self {
            inner: Mutex::new(DrainInner {
                sources: Vec::new(),
                tasks: Vec::new(),
            }),
            started: AtomicBool::new(false),
            on_frame,
        }
    }

    fn spawn_drain(&self, source: Arc<dyn MediaSource>) -> JoinHandle<()> {
        let on_frame = self.on_frame.clone();
        let kind = source.kind();
        tokio::spawn(async move {
            loop {
                match source.produce_next().await {
                    Ok(frame) => {
                        if let Some(on_frame) = &on_frame {
                            on_frame(frame);
                        }
                    }
                    Err(reason) => {
                        debug!(%kind, %reason, "drain loop finished");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordingSink for NullSink {
    fn add_source(&self, source: Arc<dyn MediaSource>) {
        let mut inner = self.inner.lock();
        if self.started.load(Ordering::SeqCst) {
            let task = self.spawn_drain(source.clone());
            inner.tasks.push(task);
        }
        inner.sources.push(source);
    }

    async fn start(&self) -> Result<(), SinkError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        let sources = inner.sources.clone();
        for source in sources {
            let task = self.spawn_drain(source);
            inner.tasks.push(task);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), SinkError> {
        self.started.store(false, Ordering::SeqCst);
        let tasks = std::mem::take(&mut self.inner.lock().tasks);
        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

/// Sink that collects every drained frame in memory
pub struct BufferSink {
    frames: Arc<Mutex<Vec<Frame>>>,
    drain: NullSink,
}

impl BufferSink {
    pub fn new() -> Self {
        let frames: Arc<Mutex<Vec<Frame>>> = Arc::new(Mutex::new(Vec::new()));
        let collected = frames.clone();
        let drain = NullSink::with_on_frame(Arc::new(move |frame| {
            collected.lock().push(frame);
        }));
        Self { frames, drain }
    }

    /// Frames collected so far
    pub fn collected(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }
}

impl Default for BufferSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordingSink for BufferSink {
    fn add_source(&self, source: Arc<dyn MediaSource>) {
        self.drain.add_source(source);
    }

    async fn start(&self) -> Result<(), SinkError> {
        self.drain.start().await
    }

    async fn stop(&self) -> Result<(), SinkError> {
        self.drain.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SineSource;

    #[tokio::test(start_paused = true)]
    async fn test_buffer_sink_collects_until_source_ends() {
        let sink = BufferSink::new();
        let source: Arc<dyn MediaSource> =
            Arc::new(SineSource::new(440.0, 32_000, 1).with_frame_limit(3));
        sink.add_source(source.clone());

        sink.start().await.unwrap();
        // Let the drain loop run the source dry.
        while !source.is_ended() {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        tokio::task::yield_now().await;

        assert_eq!(sink.frame_count(), 3);
        sink.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_attached_after_start_is_drained() {
        let sink = BufferSink::new();
        sink.start().await.unwrap();

        let source: Arc<dyn MediaSource> =
            Arc::new(SineSource::new(220.0, 32_000, 1).with_frame_limit(2));
        sink.add_source(source.clone());

        while !source.is_ended() {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        tokio::task::yield_now().await;

        assert_eq!(sink.frame_count(), 2);
        sink.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let sink = NullSink::new();
        sink.start().await.unwrap();
        sink.start().await.unwrap();
        sink.stop().await.unwrap();
        sink.stop().await.unwrap();
    }
}
