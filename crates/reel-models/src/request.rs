//! Generation request payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output frame shape supported by the video providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    /// 16:9
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    /// 9:16
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Portrait),
            other if other.contains(':') => Err(AspectRatioParseError::Unsupported(other.to_string())),
            other => Err(AspectRatioParseError::InvalidFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum AspectRatioParseError {
    #[error("Invalid aspect ratio format: {0}, expected 'W:H'")]
    InvalidFormat(String),
    #[error("Unsupported aspect ratio: {0}")]
    Unsupported(String),
}

/// Speed/quality tier; providers map it to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoQuality {
    #[default]
    Fast,
    Standard,
}

/// Payload for a generation start call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub quality: VideoQuality,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: AspectRatio::default(),
            quality: VideoQuality::default(),
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_quality(mut self, quality: VideoQuality) -> Self {
        self.quality = quality;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aspect_ratio() {
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::Landscape);
        assert_eq!(" 9:16 ".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait);
        assert!(matches!(
            "4:3".parse::<AspectRatio>(),
            Err(AspectRatioParseError::Unsupported(_))
        ));
        assert!(matches!(
            "wide".parse::<AspectRatio>(),
            Err(AspectRatioParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_aspect_ratio_wire_format() {
        assert_eq!(serde_json::to_string(&AspectRatio::Portrait).unwrap(), "\"9:16\"");
    }
}
