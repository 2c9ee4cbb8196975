//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between status polls of active jobs
    pub poll_interval: Duration,
    /// Deadline for a standalone test clip
    pub test_timeout: Duration,
    /// Deadline for scene jobs (none by default)
    pub scene_timeout: Option<Duration>,
    /// Where saved videos and merges land when no dialog is available
    pub output_dir: PathBuf,
    /// FFmpeg executable
    pub ffmpeg_path: PathBuf,
    /// Whether native (FFmpeg) merging is available
    pub native_merge: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            test_timeout: Duration::from_secs(300), // 5 minutes
            scene_timeout: None,
            output_dir: PathBuf::from("output"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            native_merge: true,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(
                std::env::var("REEL_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(5),
            ),
            test_timeout: Duration::from_secs(
                std::env::var("REEL_TEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            scene_timeout: std::env::var("REEL_SCENE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            output_dir: std::env::var("REEL_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("output")),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            native_merge: std::env::var("REEL_NATIVE_MERGE")
                .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.test_timeout, Duration::from_secs(300));
        assert!(config.scene_timeout.is_none());
        assert!(config.native_merge);
    }
}
