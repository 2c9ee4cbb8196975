//! Stream-copy concatenation with the FFmpeg concat demuxer.
//!
//! Inputs are listed in a temporary `file '<path>'` list and joined with
//! `-c copy`, so frame data is never re-encoded. Buffer inputs are first
//! written into a scratch directory; both the list file and the directory
//! are `tempfile` guards and disappear on every exit path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::{FfmpegRunner, LogSink};
use crate::error::{MediaError, MediaResult};

/// An in-memory clip handed over for concatenation.
#[derive(Debug, Clone)]
pub struct NamedBuffer {
    /// Suggested file name, e.g. `scene_1.mp4`
    pub name: String,
    pub data: Vec<u8>,
}

impl NamedBuffer {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Something that can join clips into one output file.
#[async_trait]
pub trait ConcatExecutor: Send + Sync {
    /// Concatenate local files, in order, straight into `output`.
    async fn concat_paths(&self, inputs: &[PathBuf], output: &Path, sink: LogSink) -> MediaResult<()>;

    /// Concatenate in-memory clips, in order, into `output`.
    async fn concat_buffers(
        &self,
        files: Vec<NamedBuffer>,
        output: &Path,
        sink: LogSink,
    ) -> MediaResult<()>;
}

/// Render a concat demuxer list.
///
/// Single quotes inside a path are closed, escaped and reopened (`'\''`).
pub fn write_concat_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

/// Arguments for a stream-copy concat of `list` into `output`.
pub fn concat_args(list: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-progress".to_string(),
        "pipe:2".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list.to_string_lossy().to_string(),
        // Stream copy - no re-encoding
        "-c".to_string(),
        "copy".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

/// Native FFmpeg implementation of [`ConcatExecutor`].
#[derive(Debug, Clone, Default)]
pub struct FfmpegConcat {
    runner: FfmpegRunner,
}

impl FfmpegConcat {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    /// Write the list file into `list_dir` and run the concat.
    async fn run_concat(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        list_dir: Option<&Path>,
        sink: LogSink,
    ) -> MediaResult<()> {
        if inputs.is_empty() {
            return Err(MediaError::invalid_input("No input files provided"));
        }
        for input in inputs {
            if !tokio::fs::try_exists(input).await.unwrap_or(false) {
                return Err(MediaError::FileNotFound(input.clone()));
            }
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("ffmpeg-list-").suffix(".txt");
        let list = match list_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        tokio::fs::write(list.path(), write_concat_list(inputs)).await?;

        debug!(
            inputs = inputs.len(),
            output = %output.display(),
            "Running stream-copy concat"
        );

        self.runner
            .run(&concat_args(list.path(), output), sink)
            .await?;

        info!(inputs = inputs.len(), output = %output.display(), "Concat completed");
        Ok(())
    }
}

/// Keep only the final path component so a buffer name cannot escape the scratch dir.
fn scratch_file_name(index: usize, name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("clip-{}.mp4", index + 1));
    format!("{:03}_{}", index, base)
}

#[async_trait]
impl ConcatExecutor for FfmpegConcat {
    async fn concat_paths(&self, inputs: &[PathBuf], output: &Path, sink: LogSink) -> MediaResult<()> {
        self.run_concat(inputs, output, None, sink).await
    }

    async fn concat_buffers(
        &self,
        files: Vec<NamedBuffer>,
        output: &Path,
        sink: LogSink,
    ) -> MediaResult<()> {
        if files.is_empty() {
            return Err(MediaError::invalid_input("No files provided"));
        }

        let scratch = tempfile::Builder::new().prefix("reel-merge-").tempdir()?;
        let mut paths = Vec::with_capacity(files.len());

        for (index, file) in files.into_iter().enumerate() {
            let path = scratch.path().join(scratch_file_name(index, &file.name));
            tokio::fs::write(&path, &file.data).await?;
            paths.push(path);
        }

        // `scratch` is removed when it goes out of scope, success or not
        self.run_concat(&paths, output, Some(scratch.path()), sink).await
    }
}
