//! FFmpeg CLI wrapper for merging generated clips.
//!
//! This crate provides:
//! - Concat-demuxer list files with proper quoting
//! - A process runner that streams FFmpeg diagnostics line by line
//! - Stream-copy concatenation from local paths or in-memory buffers
//! - Progress parsing from `-progress pipe:2`

pub mod command;
pub mod concat;
pub mod error;
pub mod progress;

pub use command::{check_ffmpeg, noop_sink, FfmpegRunner, LogSink};
pub use concat::{concat_args, write_concat_list, ConcatExecutor, FfmpegConcat, NamedBuffer};
pub use error::{MediaError, MediaResult};
pub use progress::FfmpegProgress;
