use std::path::{Path, PathBuf};
use std::process::Stdio;
use anyhow::{Result, Context, anyhow, bail};
use async_trait::async_trait;
use tokio::process::Command;

use crate::events::MediaItem;

/// One still-image request against a media source.
#[derive(Debug, Clone)]
pub struct FrameRequest {
    pub media_path: PathBuf,
    pub container: String,
    /// Offset into the media in seconds.
    pub offset_secs: f64,
}

impl FrameRequest {
    pub fn new(item: &MediaItem, offset_secs: f64) -> Self {
        Self {
            media_path: item.path.clone(),
            container: item.container.clone(),
            offset_secs,
        }
    }
}

/// External capability that decodes a single still image from a media source.
/// Each call may fail independently.
#[async_trait]
pub trait FrameProvider: Send + Sync {
    async fn extract(&self, request: &FrameRequest, output: &Path) -> Result<()>;
}

/// Shells out to ffmpeg for one frame per invocation.
pub struct FfmpegFrameProvider;

#[async_trait]
impl FrameProvider for FfmpegFrameProvider {
    async fn extract(&self, request: &FrameRequest, output: &Path) -> Result<()> {
        // -ss before -i: seek on the demuxer, cheap for single stills.
        let status = Command::new("ffmpeg")
            .arg("-ss")
            .arg(format!("{:.3}", request.offset_secs))
            .arg("-i")
            .arg(&request.media_path)
            .arg("-frames:v")
            .arg("1")
            .arg("-q:v")
            .arg("2")
            .arg("-y")
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("Failed to spawn ffmpeg command")?;

        if !status.success() {
            bail!(
                "ffmpeg exited with non-zero status for {:?} at {:.3}s",
                request.media_path,
                request.offset_secs
            );
        }

        if !output.exists() {
            return Err(anyhow!("ffmpeg produced no output at {:?}", output));
        }

        Ok(())
    }
}
