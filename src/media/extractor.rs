use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::MediaItem;
use crate::media::frames::{FrameProvider, FrameRequest};
use crate::sampler;

/// Temp frame files produced for one pause event. Every attempted path is
/// tracked so cleanup covers frames the provider failed on as well.
pub struct FrameBatch {
    attempted: Vec<PathBuf>,
    produced: Vec<PathBuf>,
}

impl FrameBatch {
    pub fn produced(&self) -> &[PathBuf] {
        &self.produced
    }

    /// Deletes every attempted temp file. Failure to delete is logged and
    /// never propagated.
    pub fn cleanup(&self) {
        for path in &self.attempted {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete temp frame {:?}: {}", path, e),
            }
        }
    }
}

/// Drives the frame provider over the sampled offsets, writing stills into
/// `scratch_dir`. A failed extraction skips that offset; the batch as a whole
/// only comes back empty if every offset failed or none were sampled.
pub async fn extract_frames(
    provider: &dyn FrameProvider,
    item: &MediaItem,
    offsets_secs: &[f64],
    scratch_dir: &Path,
) -> FrameBatch {
    let mut batch = FrameBatch {
        attempted: Vec::with_capacity(offsets_secs.len()),
        produced: Vec::with_capacity(offsets_secs.len()),
    };

    for &offset in offsets_secs {
        let output = frame_path(scratch_dir, item.id, offset);
        batch.attempted.push(output.clone());

        let request = FrameRequest::new(item, offset);
        match provider.extract(&request, &output).await {
            Ok(()) => {
                debug!("Extracted frame at {:.3}s to {:?}", offset, output);
                batch.produced.push(output);
            }
            Err(e) => {
                warn!(
                    "Frame extraction failed for {:?} at {:.3}s: {:#}",
                    item.path, offset, e
                );
            }
        }
    }

    batch
}

// Item id and offset in the name keep concurrent events from colliding.
fn frame_path(scratch_dir: &Path, item_id: Uuid, offset_secs: f64) -> PathBuf {
    scratch_dir.join(format!(
        "{}_{}.jpg",
        item_id,
        sampler::seconds_to_ticks(offset_secs)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MediaKind;
    use anyhow::{Result, bail};
    use async_trait::async_trait;

    struct FakeProvider {
        fail_offsets: Vec<f64>,
    }

    #[async_trait]
    impl FrameProvider for FakeProvider {
        async fn extract(&self, request: &FrameRequest, output: &Path) -> Result<()> {
            if self.fail_offsets.contains(&request.offset_secs) {
                bail!("decode error");
            }
            std::fs::write(output, b"jpeg")?;
            Ok(())
        }
    }

    fn test_item() -> MediaItem {
        MediaItem {
            id: Uuid::new_v4(),
            path: PathBuf::from("/media/movie.mkv"),
            container: "mkv".to_string(),
            kind: MediaKind::Video,
        }
    }

    #[tokio::test]
    async fn test_partial_failure_skips_frame() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider {
            fail_offsets: vec![9.0],
        };

        let batch =
            extract_frames(&provider, &test_item(), &[8.0, 9.0, 10.0], dir.path()).await;

        assert_eq!(batch.produced().len(), 2);
        assert_eq!(batch.attempted.len(), 3);
        for path in batch.produced() {
            assert!(path.exists());
        }
    }

    #[tokio::test]
    async fn test_cleanup_removes_all_produced_files() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider {
            fail_offsets: vec![],
        };

        let batch = extract_frames(&provider, &test_item(), &[1.0, 2.0], dir.path()).await;
        assert_eq!(batch.produced().len(), 2);

        batch.cleanup();
        for path in &batch.attempted {
            assert!(!path.exists());
        }
    }

    #[tokio::test]
    async fn test_paths_unique_per_item_and_offset() {
        let dir = tempfile::tempdir().unwrap();
        let a = frame_path(dir.path(), Uuid::new_v4(), 8.0);
        let b = frame_path(dir.path(), Uuid::new_v4(), 8.0);
        let c = frame_path(dir.path(), Uuid::nil(), 8.0);
        let d = frame_path(dir.path(), Uuid::nil(), 9.0);
        assert_ne!(a, b);
        assert_ne!(c, d);
    }
}
