//! Mixdown Demo
//!
//! Runs a synthetic two-party call entirely in-process: two sine "voices" and
//! two solid-color "cameras" join a group, the call goes live after the settle
//! window, and each recipient's personalized mix/tile pipeline is pulled for a
//! short while before the call is ended.

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use call_media_mixer::{
    config::EngineConfig,
    group::{GroupRegistry, ParticipantId},
    sink::{BufferSink, RecordingSink},
    source::{MediaSource, SineSource, SolidColorSource},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting mixdown demo");

    // Load config from the optional first argument, falling back to defaults.
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    let registry = GroupRegistry::new(config);
    let recorder = Arc::new(BufferSink::new());
    let uid = Uuid::new_v4();
    let alice = ParticipantId::new("alice");
    let bob = ParticipantId::new("bob");

    let group = registry.create(
        uid,
        [alice.clone(), bob.clone()],
        recorder.clone() as Arc<dyn RecordingSink>,
    )?;

    // Each participant contributes one voice and one camera.
    group.contribute(
        &alice,
        Arc::new(SineSource::new(440.0, 48_000, 2)) as Arc<dyn MediaSource>,
    )?;
    group.contribute(
        &alice,
        Arc::new(SolidColorSource::new([200, 40, 40], 320, 180, 25)) as Arc<dyn MediaSource>,
    )?;
    group.contribute(
        &bob,
        Arc::new(SineSource::new(660.0, 48_000, 2)) as Arc<dyn MediaSource>,
    )?;
    group.contribute(
        &bob,
        Arc::new(SolidColorSource::new([40, 40, 200], 320, 180, 25)) as Arc<dyn MediaSource>,
    )?;

    group.await_live().await?;
    tracing::info!("Call is live, pulling recipient pipelines");

    let for_alice = group
        .pipeline_for(&alice)
        .expect("alice has a pipeline");

    // One second of mixed audio for alice (50 cycles at 20 ms).
    let mut last_pts = -1;
    for _ in 0..50 {
        let frame = for_alice.audio.produce_next().await?;
        assert!(frame.pts() > last_pts, "audio clock must be monotonic");
        last_pts = frame.pts();
    }
    tracing::info!(last_pts, "mixed audio clock after one second");

    // A few tiled composites.
    for _ in 0..5 {
        let frame = for_alice.video.produce_next().await?;
        if let Some(video) = frame.as_video() {
            tracing::info!(
                width = video.width,
                height = video.height,
                pts = video.pts,
                "tiled composite"
            );
        }
    }

    let duration = registry.end(&uid).await?;
    tracing::info!(
        ?duration,
        recorded_frames = recorder.frame_count(),
        "call ended"
    );

    registry.shutdown().await;
    Ok(())
}
