use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};

use crate::database::repo::ResultStore;
use crate::events::{MediaItem, MediaKind, MediaLibrary, PlaybackEvent};
use crate::media::extractor;
use crate::media::frames::FrameProvider;
use crate::recognizer::RecognizerClient;
use crate::sampler;
use crate::utils::config::PipelineConfig;

/// Stage of the per-event flow a failure occurred in. Sampling is absent:
/// it is pure math and an empty sample set is a normal outcome, not a
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extracting,
    Recognizing,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extracting => "extracting",
            Stage::Recognizing => "recognizing",
            Stage::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    source: anyhow::Error,
}

impl PipelineError {
    fn new(stage: Stage, source: anyhow::Error) -> Self {
        Self { stage, source }
    }
}

/// How one pause event ended, for logging and tests.
#[derive(Debug, PartialEq, Eq)]
enum PauseOutcome {
    /// All sample candidates were at or before the start of the video.
    NoOffsets,
    /// Recognizer saw the frames but found nobody.
    NoFaces,
    /// A persisted result already covers this instant.
    DuplicateWindow,
    /// Rows written.
    Persisted(usize),
}

/// Wires sampler, frame provider, recognizer, and store together. One
/// independent task per pause event; failures never propagate past
/// `handle_event`.
pub struct PipelineController {
    store: Arc<ResultStore>,
    library: Arc<dyn MediaLibrary>,
    provider: Arc<dyn FrameProvider>,
    recognizer: RecognizerClient,
    config: PipelineConfig,
    scratch_dir: PathBuf,
}

impl PipelineController {
    pub fn new(
        store: Arc<ResultStore>,
        library: Arc<dyn MediaLibrary>,
        provider: Arc<dyn FrameProvider>,
        recognizer: RecognizerClient,
        config: PipelineConfig,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            library,
            provider,
            recognizer,
            config,
            scratch_dir,
        }
    }

    /// Consumes playback events until the channel closes, spawning one task
    /// per event so concurrent pauses run independently.
    pub fn spawn(self: Arc<Self>, mut rx: UnboundedReceiver<PlaybackEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let controller = Arc::clone(&self);
                tokio::spawn(async move {
                    controller.handle_event(event).await;
                });
            }
            info!("Playback event channel closed, pipeline stopping");
        })
    }

    /// Entry point for one playback event. Ignores everything that is not a
    /// pause of a resolvable video item with a known position.
    pub async fn handle_event(&self, event: PlaybackEvent) {
        if !event.is_paused {
            debug!("Ignoring non-pause event for {}", event.item_id);
            return;
        }
        let Some(ticks) = event.position_ticks else {
            debug!("Ignoring pause without playback position for {}", event.item_id);
            return;
        };
        let Some(item) = self.library.item(event.item_id) else {
            debug!("Ignoring pause for unknown item {}", event.item_id);
            return;
        };
        if item.kind != MediaKind::Video {
            debug!("Ignoring pause for non-video item {}", item.id);
            return;
        }

        match self.process_pause(&item, ticks).await {
            Ok(PauseOutcome::Persisted(count)) => {
                info!("Persisted {} face matches for {} at {} ticks", count, item.id, ticks);
            }
            Ok(PauseOutcome::DuplicateWindow) => {
                info!("Recent result already covers {} at {} ticks, skipping", item.id, ticks);
            }
            Ok(PauseOutcome::NoFaces) => {
                debug!("No faces recognized for {} at {} ticks", item.id, ticks);
            }
            Ok(PauseOutcome::NoOffsets) => {
                debug!("No usable sample offsets for {} at {} ticks", item.id, ticks);
            }
            Err(e) => {
                error!("Pause processing for {} failed: {:#}", item.id, anyhow!(e));
            }
        }
    }

    async fn process_pause(
        &self,
        item: &MediaItem,
        ticks: i64,
    ) -> Result<PauseOutcome, PipelineError> {
        let pivot_secs = sampler::ticks_to_seconds(ticks);
        let offsets = sampler::sample_offsets(
            pivot_secs,
            self.config.frame_window_seconds,
            self.config.num_frames,
        );
        if offsets.is_empty() {
            return Ok(PauseOutcome::NoOffsets);
        }

        let batch =
            extractor::extract_frames(self.provider.as_ref(), item, &offsets, &self.scratch_dir)
                .await;

        // Temp files are deleted on every path out of here, including stage
        // failures above this line in recognize_and_persist.
        let result = self.recognize_and_persist(item, ticks, batch.produced()).await;
        batch.cleanup();
        result
    }

    async fn recognize_and_persist(
        &self,
        item: &MediaItem,
        ticks: i64,
        frames: &[PathBuf],
    ) -> Result<PauseOutcome, PipelineError> {
        if frames.is_empty() {
            return Err(PipelineError::new(
                Stage::Extracting,
                anyhow!("no frames could be extracted"),
            ));
        }

        let matches = self
            .recognizer
            .recognize_batch(frames)
            .await
            .map_err(|e| PipelineError::new(Stage::Recognizing, e))?;

        if matches.is_empty() {
            return Ok(PauseOutcome::NoFaces);
        }

        let saved = self
            .store
            .save_unless_recent(item.id, ticks, &matches)
            .map_err(|e| PipelineError::new(Stage::Persisting, e))?;

        Ok(if saved {
            PauseOutcome::Persisted(matches.len())
        } else {
            PauseOutcome::DuplicateWindow
        })
    }
}
