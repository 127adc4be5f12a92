//! File-backed audio source
//!
//! Reads raw s16le interleaved PCM from disk in fixed 20 ms chunks, paced in
//! real time, and ends at EOF. Lets a pre-recorded bed (hold music, announce
//! tones) join a call the same way a live participant does.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::sync::Mutex;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::constants::MIX_CYCLE_MS;
use crate::error::SourceError;
use crate::frame::{AudioFrame, Frame, MediaKind};
use crate::source::MediaSource;

struct FileState {
    reader: BufReader<File>,
    pts: i64,
}

/// Raw PCM file source (s16le, interleaved)
pub struct PcmFileSource {
    sample_rate: u32,
    channels: u16,
    chunk_samples: usize,
    state: Mutex<FileState>,
    ticker: Mutex<Interval>,
    ended: AtomicBool,
}

impl PcmFileSource {
    /// Open a raw PCM file with the given interpretation
    pub async fn open(
        path: impl AsRef<Path>,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, crate::Error> {
        let file = File::open(path).await?;
        let chunk_samples = (sample_rate as usize * MIX_CYCLE_MS as usize) / 1000;
        let mut ticker = interval(Duration::from_millis(u64::from(MIX_CYCLE_MS)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Self {
            sample_rate,
            channels,
            chunk_samples,
            state: Mutex::new(FileState {
                reader: BufReader::new(file),
                pts: 0,
            }),
            ticker: Mutex::new(ticker),
            ended: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl MediaSource for PcmFileSource {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    async fn produce_next(&self) -> Result<Frame, SourceError> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(SourceError::Ended);
        }
        self.ticker.lock().await.tick().await;
        if self.ended.load(Ordering::SeqCst) {
            return Err(SourceError::Ended);
        }

        let mut state = self.state.lock().await;
        let byte_len = self.chunk_samples * self.channels as usize * 2;
        let mut buf = vec![0u8; byte_len];

        let mut filled = 0;
        while filled < byte_len {
            match state.reader.read(&mut buf[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    self.ended.store(true, Ordering::SeqCst);
                    return Err(SourceError::Failed(e.to_string()));
                }
            }
        }
        if filled == 0 {
            self.ended.store(true, Ordering::SeqCst);
            return Err(SourceError::Ended);
        }

        // A short final chunk is still emitted; the next pull reports EOF.
        let samples: Vec<i16> = buf[..filled - filled % 2]
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        let frame = AudioFrame::new(samples, self.channels, self.sample_rate, state.pts);
        state.pts += frame.samples_per_channel() as i64;
        Ok(Frame::Audio(frame))
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}
