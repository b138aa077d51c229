use std::fs::File;
use std::io::{Write, BufRead, BufReader};
use std::path::Path;
use anyhow::{Result, Context};
use tracing::info;

/// Tunables for the recognition pipeline, loaded from a simple `Key=Value`
/// file. A missing file or missing keys fall back to the defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of frames sampled around the pause point.
    pub num_frames: usize,
    /// Width in seconds of the sampling window centered on the pause point.
    pub frame_window_seconds: f64,
    /// Base URL of the face recognizer service.
    pub recognizer_api_url: String,
    /// Request timeout for the recognizer batch call.
    pub recognize_timeout_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_frames: 5,
            frame_window_seconds: 5.0,
            recognizer_api_url: "http://localhost:5000".to_string(),
            recognize_timeout_seconds: 30,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let file =
            File::open(path).with_context(|| format!("Failed to open config {:?}", path))?;
        let reader = BufReader::new(file);

        let mut config = Self::default();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim();
                match key.trim() {
                    "NumFrames" => {
                        config.num_frames = value
                            .parse()
                            .with_context(|| format!("Invalid NumFrames value '{}'", value))?;
                    }
                    "FrameWindowSeconds" => {
                        config.frame_window_seconds = value.parse().with_context(|| {
                            format!("Invalid FrameWindowSeconds value '{}'", value)
                        })?;
                    }
                    "RecognizerApiUrl" => {
                        config.recognizer_api_url = value.to_string();
                    }
                    "RecognizeTimeoutSeconds" => {
                        config.recognize_timeout_seconds = value.parse().with_context(|| {
                            format!("Invalid RecognizeTimeoutSeconds value '{}'", value)
                        })?;
                    }
                    _ => {}
                }
            }
        }

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path).context("Failed to create config file")?;
        writeln!(file, "NumFrames={}", self.num_frames)?;
        writeln!(file, "FrameWindowSeconds={}", self.frame_window_seconds)?;
        writeln!(file, "RecognizerApiUrl={}", self.recognizer_api_url)?;
        writeln!(file, "RecognizeTimeoutSeconds={}", self.recognize_timeout_seconds)?;
        Ok(())
    }
}
