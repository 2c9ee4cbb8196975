//! FFmpeg process runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_progress_line, FfmpegProgress};

/// Receives FFmpeg diagnostic output one line at a time.
///
/// Purely advisory: what the sink sees never affects the result of a run.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A sink that discards everything.
pub fn noop_sink() -> LogSink {
    Arc::new(|_| {})
}

/// Number of trailing stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 40;

/// Runner for FFmpeg invocations with streamed diagnostics.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// Executable to launch
    program: PathBuf,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a runner that launches `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            timeout_secs: None,
        }
    }

    /// Use a specific executable (e.g. a bundled static build).
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the program with `args`, forwarding every stderr line to `sink`.
    ///
    /// Success is decided by the exit status alone.
    pub async fn run(&self, args: &[String], sink: LogSink) -> MediaResult<()> {
        debug!("Running FFmpeg: {} {}", self.program.display(), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    MediaError::FfmpegNotFound(self.program.display().to_string())
                }
                _ => MediaError::Io(e),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::invalid_input("FFmpeg stderr was not captured"))?;

        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail: Vec<String> = Vec::new();
            let mut progress = FfmpegProgress::default();

            while let Ok(Some(line)) = lines.next_line().await {
                sink(&line);
                if let Some(snapshot) = parse_progress_line(&line, &mut progress) {
                    debug!(
                        out_time_ms = snapshot.out_time_ms,
                        speed = snapshot.speed,
                        complete = snapshot.is_complete,
                        "FFmpeg progress"
                    );
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(line);
            }

            tail.join("\n")
        });

        let result = self.wait_for_completion(&mut child).await;
        let stderr_text = reader_handle.await.unwrap_or_default();

        match result {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(stderr_text).filter(|s| !s.is_empty()),
                status.code(),
            )),
            Err(e) => Err(e),
        }
    }

    /// Wait for the child, killing it if the timeout elapses.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<std::process::ExitStatus> {
        match self.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
                Ok(status) => Ok(status?),
                Err(_) => {
                    warn!("FFmpeg timed out after {} seconds, killing process", secs);
                    let _ = child.kill().await;
                    Err(MediaError::Timeout(secs))
                }
            },
            None => Ok(child.wait().await?),
        }
    }
}

/// Resolve the FFmpeg executable, either an explicit path or a `PATH` lookup.
pub fn check_ffmpeg(program: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let program = program.as_ref();
    which::which(program).map_err(|_| MediaError::FfmpegNotFound(program.display().to_string()))
}
