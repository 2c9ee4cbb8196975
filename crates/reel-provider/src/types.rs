//! Wire types for the long-running-operation API.

use reel_models::{OperationError, OperationStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct PredictRequest {
    pub instances: Vec<PredictInstance>,
    pub parameters: PredictParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictInstance {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictParameters {
    pub aspect_ratio: String,
}

/// A long-running operation as returned by both start and status calls.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub metadata: Option<OperationMetadata>,
    #[serde(default)]
    pub response: Option<OperationResponse>,
    #[serde(default)]
    pub error: Option<WireError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationMetadata {
    #[serde(default)]
    pub progress: Option<Progress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    #[serde(default)]
    pub generated_videos: Vec<GeneratedVideo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneratedVideo {
    #[serde(default)]
    pub video: Option<VideoRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoRef {
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

impl Operation {
    pub fn video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generated_videos
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
            .filter(|u| !u.is_empty())
    }

    pub fn progress_percent(&self) -> Option<u8> {
        let pct = self.metadata.as_ref()?.progress.as_ref()?.percentage?;
        if !pct.is_finite() {
            return None;
        }
        Some(pct.clamp(0.0, 100.0).round() as u8)
    }

    pub fn into_status(self) -> OperationStatus {
        OperationStatus {
            done: self.done,
            progress_percent: self.progress_percent(),
            result_uri: self.video_uri().map(str::to_string),
            error: self.error.map(|e| OperationError { message: e.message }),
        }
    }
}
