//! Merging finished clips into one video.
//!
//! Local files go straight to stream-copy concatenation. If any input only
//! lives in memory, or the direct concatenation fails, every input is read
//! into a named buffer and the executor concatenates from a scratch
//! directory instead. Without a native executor the byte streams are
//! stitched in order into one in-memory object.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use metrics::counter;
use reel_media::{ConcatExecutor, LogSink, NamedBuffer};
use reel_models::{AssetRef, MergeRequest};
use reel_storage::{AssetReader, BlobStore};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// Where the merged video ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutput {
    File(PathBuf),
    Ephemeral(AssetRef),
}

impl MergeOutput {
    pub fn playback_url(&self) -> String {
        match self {
            MergeOutput::File(path) => AssetRef::local(path.clone()).playback_url(),
            MergeOutput::Ephemeral(asset) => asset.playback_url(),
        }
    }
}

#[derive(Clone)]
pub struct MergePipeline {
    executor: Option<Arc<dyn ConcatExecutor>>,
    reader: AssetReader,
    blobs: BlobStore,
}

impl MergePipeline {
    /// Pipeline that concatenates with a native executor.
    pub fn native(executor: Arc<dyn ConcatExecutor>, reader: AssetReader, blobs: BlobStore) -> Self {
        Self {
            executor: Some(executor),
            reader,
            blobs,
        }
    }

    /// Pipeline for environments that cannot run processes.
    pub fn in_memory(reader: AssetReader, blobs: BlobStore) -> Self {
        Self {
            executor: None,
            reader,
            blobs,
        }
    }

    pub fn has_native_executor(&self) -> bool {
        self.executor.is_some()
    }

    pub async fn merge(&self, request: &MergeRequest, sink: LogSink) -> EngineResult<MergeOutput> {
        let assets = request.materialized_assets()?;

        let Some(executor) = &self.executor else {
            return self.stitch(&assets).await;
        };
        let output = request.output_path.as_path();
        let existing = fingerprint(output).await;

        if let Some(paths) = request.local_paths() {
            counter!("reel_merges_total", "path" => "local").increment(1);
            match executor.concat_paths(&paths, output, sink.clone()).await {
                Ok(()) => {
                    info!(output = %output.display(), inputs = paths.len(), "Merged local clips");
                    return Ok(MergeOutput::File(output.to_path_buf()));
                }
                Err(e) => {
                    warn!(error = %e, "Local concatenation failed, retrying from buffers");
                    remove_partial(output, existing).await;
                }
            }
        }

        counter!("reel_merges_total", "path" => "buffer").increment(1);
        let mut buffers = Vec::with_capacity(assets.len());
        for (index, asset) in assets.iter().enumerate() {
            let data = self.reader.read(asset).await?;
            buffers.push(NamedBuffer::new(format!("scene_{}.mp4", index + 1), data));
        }

        if let Err(e) = executor.concat_buffers(buffers, output, sink).await {
            remove_partial(output, existing).await;
            return Err(EngineError::concatenation_failed(format!(
                "{} (merging {} clips into {})",
                e,
                assets.len(),
                output.display()
            )));
        }

        info!(output = %output.display(), inputs = assets.len(), "Merged clips from buffers");
        Ok(MergeOutput::File(output.to_path_buf()))
    }

    async fn stitch(&self, assets: &[&AssetRef]) -> EngineResult<MergeOutput> {
        counter!("reel_merges_total", "path" => "stitch").increment(1);
        let mut stitched = Vec::new();
        for asset in assets {
            stitched.extend_from_slice(&self.reader.read(asset).await?);
        }
        info!(inputs = assets.len(), bytes = stitched.len(), "Stitched clips in memory");
        Ok(MergeOutput::Ephemeral(self.blobs.insert(stitched)))
    }
}

/// Size and modification time of `path`, if it exists.
async fn fingerprint(path: &Path) -> Option<(u64, SystemTime)> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    Some((meta.len(), meta.modified().ok()?))
}

/// Remove what a failed attempt left at `output`. A file that is unchanged
/// since before the merge belongs to the user and stays.
async fn remove_partial(output: &Path, existing: Option<(u64, SystemTime)>) {
    let current = fingerprint(output).await;
    if current.is_none() {
        return;
    }
    if current == existing {
        debug!(output = %output.display(), "Merge output untouched, keeping existing file");
        return;
    }
    match tokio::fs::remove_file(output).await {
        Ok(()) => info!(output = %output.display(), "Removed partial merge output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(output = %output.display(), error = %e, "Could not remove partial merge output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reel_media::{noop_sink, MediaError, MediaResult};
    use reel_models::MergeInput;
    use reel_storage::{AssetFetcher, StorageError, StorageResult};
    use std::sync::Mutex;

    struct NoFetch;

    #[async_trait]
    impl AssetFetcher for NoFetch {
        async fn fetch(&self, uri: &str) -> StorageResult<Vec<u8>> {
            Err(StorageError::fetch_failed(uri, "offline"))
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Paths(Vec<PathBuf>),
        Buffers(Vec<String>),
    }

    /// Executor that concatenates by appending bytes.
    #[derive(Default)]
    struct AppendExecutor {
        calls: Mutex<Vec<Call>>,
        fail_paths: bool,
        fail_paths_before_write: bool,
        fail_buffers: bool,
    }

    impl AppendExecutor {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConcatExecutor for AppendExecutor {
        async fn concat_paths(&self, inputs: &[PathBuf], output: &Path, _: LogSink) -> MediaResult<()> {
            self.calls.lock().unwrap().push(Call::Paths(inputs.to_vec()));
            if self.fail_paths_before_write {
                return Err(MediaError::FileNotFound(inputs[0].clone()));
            }
            if self.fail_paths {
                std::fs::write(output, b"partial")?;
                return Err(MediaError::ffmpeg_failed("exit status 1", None, Some(1)));
            }
            let mut out = Vec::new();
            for input in inputs {
                out.extend(std::fs::read(input)?);
            }
            std::fs::write(output, out)?;
            Ok(())
        }

        async fn concat_buffers(&self, buffers: Vec<NamedBuffer>, output: &Path, _: LogSink) -> MediaResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Buffers(buffers.iter().map(|b| b.name.clone()).collect()));
            if self.fail_buffers {
                return Err(MediaError::ffmpeg_failed("exit status 1", None, Some(1)));
            }
            let out: Vec<u8> = buffers.into_iter().flat_map(|b| b.data).collect();
            std::fs::write(output, out)?;
            Ok(())
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        blobs: BlobStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                blobs: BlobStore::new(),
            }
        }

        fn local(&self, name: &str, data: &[u8]) -> AssetRef {
            let path = self.dir.path().join(name);
            std::fs::write(&path, data).unwrap();
            AssetRef::local(path)
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("merged_video.mp4")
        }

        fn pipeline(&self, executor: Option<Arc<AppendExecutor>>) -> MergePipeline {
            let reader = AssetReader::new(Arc::new(NoFetch), self.blobs.clone());
            match executor {
                Some(executor) => MergePipeline::native(executor, reader, self.blobs.clone()),
                None => MergePipeline::in_memory(reader, self.blobs.clone()),
            }
        }
    }

    fn request(assets: Vec<AssetRef>, output: PathBuf) -> MergeRequest {
        let inputs = assets
            .into_iter()
            .enumerate()
            .map(|(i, asset)| MergeInput::new(format!("scene {}", i + 1), Some(asset)))
            .collect();
        MergeRequest::new(inputs, output)
    }

    #[tokio::test]
    async fn test_all_local_uses_fast_path_in_order() {
        let fx = Fixture::new();
        let executor = Arc::new(AppendExecutor::default());
        let assets = vec![fx.local("a.mp4", b"AAA"), fx.local("b.mp4", b"BBB"), fx.local("c.mp4", b"CCC")];

        let output = fx
            .pipeline(Some(executor.clone()))
            .merge(&request(assets, fx.output()), noop_sink())
            .await
            .unwrap();

        assert_eq!(output, MergeOutput::File(fx.output()));
        assert_eq!(std::fs::read(fx.output()).unwrap(), b"AAABBBCCC");
        assert!(matches!(&executor.calls()[..], [Call::Paths(paths)] if paths.len() == 3));
    }

    #[tokio::test]
    async fn test_ephemeral_input_uses_buffer_path() {
        let fx = Fixture::new();
        let executor = Arc::new(AppendExecutor::default());
        let assets = vec![fx.local("a.mp4", b"AAA"), fx.blobs.insert(b"BBB".to_vec()), fx.local("c.mp4", b"CCC")];

        fx.pipeline(Some(executor.clone()))
            .merge(&request(assets, fx.output()), noop_sink())
            .await
            .unwrap();

        assert_eq!(std::fs::read(fx.output()).unwrap(), b"AAABBBCCC");
        assert_eq!(
            executor.calls(),
            vec![Call::Buffers(vec![
                "scene_1.mp4".to_string(),
                "scene_2.mp4".to_string(),
                "scene_3.mp4".to_string()
            ])]
        );
    }

    #[tokio::test]
    async fn test_fast_path_failure_falls_back_once() {
        let fx = Fixture::new();
        let executor = Arc::new(AppendExecutor {
            fail_paths: true,
            ..Default::default()
        });
        let assets = vec![fx.local("a.mp4", b"AAA"), fx.local("b.mp4", b"BBB")];

        fx.pipeline(Some(executor.clone()))
            .merge(&request(assets, fx.output()), noop_sink())
            .await
            .unwrap();

        assert_eq!(std::fs::read(fx.output()).unwrap(), b"AAABBB");
        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[1], Call::Buffers(_)));
    }

    #[tokio::test]
    async fn test_fallback_failure_is_terminal() {
        let fx = Fixture::new();
        let executor = Arc::new(AppendExecutor {
            fail_paths: true,
            fail_buffers: true,
            ..Default::default()
        });
        let assets = vec![fx.local("a.mp4", b"AAA"), fx.local("b.mp4", b"BBB")];

        let err = fx
            .pipeline(Some(executor.clone()))
            .merge(&request(assets, fx.output()), noop_sink())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::ConcatenationFailed(_)));
        assert_eq!(executor.calls().len(), 2);
        assert!(!fx.output().exists());
    }

    #[tokio::test]
    async fn test_failure_before_write_keeps_existing_output() {
        let fx = Fixture::new();
        std::fs::write(fx.output(), b"keep").unwrap();
        let executor = Arc::new(AppendExecutor {
            fail_paths_before_write: true,
            fail_buffers: true,
            ..Default::default()
        });
        let assets = vec![fx.local("a.mp4", b"AAA"), fx.local("b.mp4", b"BBB")];

        let err = fx
            .pipeline(Some(executor.clone()))
            .merge(&request(assets, fx.output()), noop_sink())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::ConcatenationFailed(_)));
        assert_eq!(executor.calls().len(), 2);
        assert_eq!(std::fs::read(fx.output()).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_unresolved_input_fails_without_writes() {
        let fx = Fixture::new();
        let executor = Arc::new(AppendExecutor::default());
        let mut req = request(vec![fx.local("a.mp4", b"AAA")], fx.output());
        req.inputs.push(MergeInput::new("scene 2", Some(AssetRef::remote("https://v/2.mp4"))));

        let err = fx
            .pipeline(Some(executor.clone()))
            .merge(&req, noop_sink())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::PreconditionFailed(_)));
        assert!(executor.calls().is_empty());
        assert!(!fx.output().exists());
    }

    #[tokio::test]
    async fn test_in_memory_stitch_preserves_order() {
        let fx = Fixture::new();
        let assets = vec![fx.blobs.insert(b"111".to_vec()), fx.local("b.mp4", b"222"), fx.blobs.insert(b"333".to_vec())];

        let output = fx
            .pipeline(None)
            .merge(&request(assets, fx.output()), noop_sink())
            .await
            .unwrap();

        let MergeOutput::Ephemeral(AssetRef::Ephemeral { id }) = output else {
            panic!("expected an ephemeral merge");
        };
        assert_eq!(fx.blobs.get(&id).unwrap().as_slice(), b"111222333");
        assert!(!fx.output().exists());
    }
}
