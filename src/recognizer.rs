use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Result, Context, anyhow, bail};
use reqwest::multipart;
use serde::Deserialize;
use tracing::info;

/// One face found in one frame, as reported by the recognizer.
#[derive(Debug, Clone, Deserialize)]
pub struct FaceMatch {
    /// Bounding box: left, top, width, height.
    pub bbox: Vec<i64>,
    #[serde(rename = "match")]
    pub label: String,
    pub score: f64,
}

/// Response body of `/recognize_batch`: per-frame keys mapping to the faces
/// found in that frame.
#[derive(Debug, Deserialize)]
pub struct RecognitionBatchResponse {
    pub results: HashMap<String, Vec<FaceMatch>>,
}

/// Client for the remote face-recognition service. One batch request covers
/// all frames sampled for a single pause event.
pub struct RecognizerClient {
    client: reqwest::Client,
    base_url: String,
}

impl RecognizerClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build recognizer HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Posts all frame files as one multipart request and returns the
    /// flattened match list. Non-2xx status or an undecodable body fails the
    /// whole batch; there is no partial recognition.
    pub async fn recognize_batch(&self, frames: &[PathBuf]) -> Result<Vec<FaceMatch>> {
        if frames.is_empty() {
            bail!("recognize_batch called with no frames");
        }

        let mut form = multipart::Form::new();
        for frame in frames {
            let bytes = tokio::fs::read(frame)
                .await
                .with_context(|| format!("Failed to read frame file {:?}", frame))?;
            let filename = frame
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("Frame path {:?} has no valid file name", frame))?
                .to_string();
            form = form.part("files", multipart::Part::bytes(bytes).file_name(filename));
        }

        let url = format!("{}/recognize_batch", self.base_url);
        info!("Sending {} frames to {}", frames.len(), url);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Recognizer request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Recognizer returned status {}", status);
        }

        let parsed: RecognitionBatchResponse = response
            .json()
            .await
            .context("Failed to decode recognizer response body")?;

        // Frame provenance is dropped here: the consumer only cares which
        // identities were on screen around the pause point.
        Ok(parsed.results.into_values().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_response() {
        let json = r#"{
            "results": {
                "frame_0.jpg": [
                    {"bbox": [10, 20, 100, 120], "match": "Ada Lovelace", "score": 0.92},
                    {"bbox": [300, 40, 90, 110], "match": "Grace Hopper", "score": 0.71}
                ],
                "frame_1.jpg": [],
                "frame_2.jpg": [
                    {"bbox": [12, 22, 98, 118], "match": "Ada Lovelace", "score": 0.88}
                ]
            }
        }"#;

        let parsed: RecognitionBatchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 3);

        let all: Vec<FaceMatch> = parsed.results.into_values().flatten().collect();
        assert_eq!(all.len(), 3);
        assert!(all.iter().any(|m| m.label == "Grace Hopper"));
    }

    #[test]
    fn test_malformed_response_is_error() {
        let err = serde_json::from_str::<RecognitionBatchResponse>("{\"faces\": []}");
        assert!(err.is_err());
        let err = serde_json::from_str::<RecognitionBatchResponse>("not json");
        assert!(err.is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            RecognizerClient::new("http://localhost:5000/".to_string(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.base_url, "http://localhost:5000");
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let client =
            RecognizerClient::new("http://localhost:5000".to_string(), Duration::from_secs(5))
                .unwrap();
        assert!(client.recognize_batch(&[]).await.is_err());
    }
}
