//! ReelForge command line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_engine::{EngineConfig, GenerationOrchestrator, MergePipeline, UnitId, UnitState};
use reel_media::{check_ffmpeg, FfmpegConcat, FfmpegRunner, LogSink};
use reel_models::{
    AspectRatio, AssetRef, CredentialSlot, GenerationRequest, MergeInput, MergeRequest, NotificationLevel, VideoQuality,
};
use reel_provider::{FlowClient, GenerationProvider, LroClient};
use reel_storage::{AssetFetcher, AssetReader, AssetResolver, BlobStore, DirectorySaver, HttpFetcher};

#[derive(Parser)]
#[command(name = "reel")]
#[command(about = "Generate video clips and merge them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a single test clip end to end
    Test {
        /// Prompt describing the clip
        prompt: String,

        /// Frame shape (16:9 or 9:16)
        #[arg(long, default_value = "16:9")]
        aspect_ratio: AspectRatio,

        #[arg(long, value_enum, default_value_t = Quality::Fast)]
        quality: Quality,

        #[arg(long, value_enum, default_value_t = Provider::Lro)]
        provider: Provider,
    },

    /// Merge local clips into one video
    Merge {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Clips in playback order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Quality {
    Fast,
    Standard,
}

impl From<Quality> for VideoQuality {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::Fast => VideoQuality::Fast,
            Quality::Standard => VideoQuality::Standard,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Provider {
    /// Long-running operation API keyed by GEMINI_API_KEY
    Lro,
    /// Flow web API keyed by REEL_FLOW_SESSION_KEY
    Flow,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("reel=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }

    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    info!("Engine config: {:?}", config);

    let result = match cli.command {
        Commands::Test {
            prompt,
            aspect_ratio,
            quality,
            provider,
        } => {
            let request = GenerationRequest::new(prompt)
                .with_aspect_ratio(aspect_ratio)
                .with_quality(quality.into());
            run_test(config, provider, request).await
        }
        Commands::Merge { output, files } => run_merge(config, output, files).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn stderr_sink() -> LogSink {
    Arc::new(|line: &str| eprintln!("{line}"))
}

fn build_merger(config: &EngineConfig, reader: AssetReader, blobs: BlobStore) -> MergePipeline {
    if !config.native_merge {
        return MergePipeline::in_memory(reader, blobs);
    }
    match check_ffmpeg(&config.ffmpeg_path) {
        Ok(program) => {
            let runner = FfmpegRunner::new().with_program(program);
            MergePipeline::native(Arc::new(FfmpegConcat::new(runner)), reader, blobs)
        }
        Err(e) => {
            warn!("FFmpeg unavailable, merging in memory: {}", e);
            MergePipeline::in_memory(reader, blobs)
        }
    }
}

async fn run_test(config: EngineConfig, provider: Provider, request: GenerationRequest) -> Result<()> {
    let (provider, credential, fetcher): (Arc<dyn GenerationProvider>, CredentialSlot, HttpFetcher) = match provider {
        Provider::Lro => {
            let client = LroClient::from_env()?;
            let credential = client.credential().clone();
            let fetcher = HttpFetcher::new(Duration::from_secs(300))?.with_credential(credential.clone());
            (Arc::new(client) as Arc<dyn GenerationProvider>, credential, fetcher)
        }
        Provider::Flow => {
            let client = FlowClient::from_env()?;
            let credential = client.session().clone();
            let fetcher = HttpFetcher::new(Duration::from_secs(300))?;
            (Arc::new(client) as Arc<dyn GenerationProvider>, credential, fetcher)
        }
    };
    if !credential.is_set() {
        bail!("No provider credential configured");
    }

    let blobs = BlobStore::new();
    let fetcher: Arc<dyn AssetFetcher> = Arc::new(fetcher);
    let resolver = AssetResolver::new(Arc::clone(&fetcher), blobs.clone())
        .with_saver(Arc::new(DirectorySaver::new(&config.output_dir)));
    let merger = build_merger(&config, AssetReader::new(fetcher, blobs.clone()), blobs);

    let (orchestrator, mut notifications) =
        GenerationOrchestrator::new(provider, resolver, merger, credential, config);

    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match notification.level {
                NotificationLevel::Error => eprintln!("error: {}", notification.message),
                _ => eprintln!("{}", notification.message),
            }
        }
    });

    // Failures are already reported through notifications.
    let started = orchestrator.generate_test_clip(request).await;
    let unit = match started {
        Ok(()) => orchestrator.settle(&UnitId::test_clip()).await,
        Err(_) => orchestrator.unit(&UnitId::test_clip()),
    };
    drop(orchestrator);
    printer.await.ok();

    match unit {
        Some(unit) if unit.state == UnitState::Ready => {
            let asset = unit.result.context("ready unit without a result")?;
            println!("{}", asset.playback_url());
            if matches!(asset, AssetRef::Ephemeral { .. }) {
                warn!("Video was kept in memory only and is gone once this process exits");
            }
            Ok(())
        }
        _ => bail!("Test generation did not produce a video"),
    }
}

async fn run_merge(config: EngineConfig, output: PathBuf, files: Vec<PathBuf>) -> Result<()> {
    let blobs = BlobStore::new();
    let fetcher: Arc<dyn AssetFetcher> = Arc::new(HttpFetcher::new(Duration::from_secs(300))?);
    let merger = build_merger(&config, AssetReader::new(fetcher, blobs.clone()), blobs);
    if !merger.has_native_executor() {
        bail!("Merging files requires FFmpeg");
    }

    let inputs = files
        .iter()
        .map(|path| {
            let name = path.display().to_string();
            MergeInput::new(name, Some(AssetRef::local(path.clone())))
        })
        .collect();
    let request = MergeRequest::new(inputs, output);

    let merged = merger.merge(&request, stderr_sink()).await?;
    println!("{}", merged.playback_url());
    Ok(())
}
