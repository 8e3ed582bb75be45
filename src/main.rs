mod cli;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;
use vodforge::config;
use vodforge::options::ProcessingOptions;
use vodforge::state::JobRegistry;
use vodforge::workflow::Coordinator;
use vodforge_codec::{FfmpegCodec, MediaCodec};
use vodforge_common::JobId;
use vodforge_engine::LocalEngine;
use vodforge_store::FsStore;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vodforge=trace,vodforge_codec=debug,vodforge_engine=debug,vodforge_store=debug"
                .to_string()
        } else {
            "vodforge=info,vodforge_codec=info,vodforge_engine=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Run {
            input,
            options,
            json,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_job(&input, options.as_deref(), cli.config.as_deref(), json))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json))
        }
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vodforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_job(
    input: &Path,
    options_path: Option<&Path>,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let options: ProcessingOptions = match options_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read options file: {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse options file: {:?}", path))?
        }
        None => ProcessingOptions::default(),
    };

    let source = Bytes::from(
        std::fs::read(input).with_context(|| format!("Failed to read input: {:?}", input))?,
    );

    let store = Arc::new(FsStore::new(config.storage.root.clone()));
    let codec = Arc::new(FfmpegCodec::new().context("ffmpeg/ffprobe are required to run jobs")?);
    let engine = LocalEngine::new(config.pipeline.worker_concurrency);
    let registry = JobRegistry::new();
    let coordinator = Coordinator::new(store, codec, engine, registry, config.pipeline.clone());

    let job_id = JobId::new();
    tracing::info!("Submitting job {job_id} for {:?}", input);

    let record = coordinator
        .run_job(job_id, source, &options)
        .await
        .with_context(|| format!("Job {job_id} failed"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("Job {} completed", record.job_id);
        println!(
            "Resolutions: {}",
            record
                .resolutions
                .iter()
                .map(|r| r.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!("Master playlist: {}", record.master_playlist);
        println!(
            "Thumbnail: {}",
            record.thumbnail.as_deref().unwrap_or("none")
        );
        println!(
            "Chapters: {}",
            record
                .chapters
                .as_ref()
                .map(|keys| keys.join(", "))
                .unwrap_or_else(|| "none".to_string())
        );
        for stage in &record.stages {
            println!("  {:<10} {:?} ({} ms)", stage.stage, stage.status, stage.elapsed_ms);
        }
    }
    Ok(())
}

async fn probe_file(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let codec = FfmpegCodec::new().context("ffprobe is required to probe files")?;
    let source = Bytes::from(std::fs::read(file)?);
    let metadata = codec.probe(&source).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
    } else {
        println!("File: {}", file.display());
        println!("Codec: {}", metadata.codec);
        println!("Resolution: {}x{}", metadata.width, metadata.height);
        println!("Duration: {:.1}s", metadata.duration_secs);
    }
    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let mut all_ok = true;
    for info in vodforge_codec::check_tools() {
        if info.available {
            println!(
                "  [ok] {} - {}",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            all_ok = false;
            println!("  [missing] {}", info.name);
        }
    }

    if !all_ok {
        anyhow::bail!("Some required tools are missing");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(path)?;
    println!("Configuration OK");
    println!("  storage root: {:?}", config.storage.root);
    println!("  chunk duration: {}s", config.pipeline.chunk_secs);
    println!("  worker concurrency: {}", config.pipeline.worker_concurrency);
    Ok(())
}
