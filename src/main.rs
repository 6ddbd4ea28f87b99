//! Polysub - Video Subtitle Localization Pipeline
//!
//! This is the main entry point for the Polysub application, which turns
//! spoken video into aligned, translated subtitles using ffmpeg, a
//! word-level transcriber, and a sentence splitting / translation backend.

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use polysub::batch::cache::PreprocessCache;
use polysub::batch::{BatchProcessor, CACHE_DIR_NAME, WORK_DIR_NAME};
use polysub::cli::{Args, CacheAction, Commands};
use polysub::config::Config;
use polysub::media::{MediaToolkit, MediaToolkitFactory};
use polysub::segment::AudioSegmenter;
use polysub::workflow::{TaskRequest, VideoPipeline, Workflow};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    // Load configuration
    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load config.toml from current directory first
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    // Execute command
    match args.command {
        Commands::Process { input, source_lang, target_lang, output_dir } => {
            info!("Processing video file: {}", input.display());

            let mut config = config;
            if let Some(source) = source_lang {
                config.language.source = source;
            }
            if let Some(target) = target_lang {
                config.language.target = target;
            }

            let work_dir = output_dir.unwrap_or_else(|| WORK_DIR_NAME.into());
            let cache_root = work_dir.join(CACHE_DIR_NAME);
            let request = TaskRequest {
                video_path: input,
                source_language: config.language.source.clone(),
                target_language: config.language.target.clone(),
                dubbing: false,
                is_retry: false,
                skip_preprocess: false,
            };

            let workflow = Workflow::new(config, work_dir, cache_root);
            let context = workflow.process(&request).await?;
            let bundle = workflow.save_bundle(&request).await?;
            println!(
                "Finished in {} ({} tokens). Subtitles: {}",
                context.format_elapsed(),
                context.total_tokens(),
                bundle.display()
            );
        }
        Commands::Batch { input_dir } => {
            info!("Processing batch folder: {}", input_dir.display());

            let batch = BatchProcessor::new(&input_dir, config.clone())?;
            let media = MediaToolkitFactory::create_toolkit(config.media.clone());
            media.check_availability()?;

            let workflow = Workflow::new(
                config,
                input_dir.join(WORK_DIR_NAME),
                input_dir.join(CACHE_DIR_NAME),
            );
            let totals = batch.run(&workflow, media.as_ref()).await?;
            println!(
                "Batch finished in {} ({} tokens)",
                totals.format_elapsed(),
                totals.total_tokens()
            );
        }
        Commands::Preprocess { input_dir } => {
            info!("Preprocessing batch folder: {}", input_dir.display());

            let batch = BatchProcessor::new(&input_dir, config.clone())?;
            let media = MediaToolkitFactory::create_toolkit(config.media.clone());
            media.check_availability()?;

            let workflow = Workflow::new(
                config,
                input_dir.join(WORK_DIR_NAME),
                input_dir.join(CACHE_DIR_NAME),
            );
            batch.run_preprocess(&workflow, media.as_ref()).await?;
        }
        Commands::Tasks { input_dir } => {
            let batch = BatchProcessor::new(&input_dir, config)?;
            let tasks = batch.tasks().await?;

            if tasks.is_empty() {
                println!("No tasks found.");
            } else {
                println!("{:<40} {:<8} {:<8} {:<40}", "Video", "Source", "Target", "Status");
                println!("{}", "-".repeat(96));
                for task in tasks {
                    println!(
                        "{:<40} {:<8} {:<8} {:<40}",
                        task.video_file,
                        task.source_language,
                        task.target_language,
                        task.status.display()
                    );
                }
            }
        }
        Commands::Segment { input } => {
            info!("Planning segments for: {}", input.display());

            let media = MediaToolkitFactory::create_toolkit(config.media.clone());
            media.check_availability()?;

            let segmenter = AudioSegmenter::new(config.segment.clone(), media.as_ref());
            let segments = segmenter.split(&input).await?;

            println!("{:<6} {:<12} {:<12} {:<12}", "#", "Start (s)", "End (s)", "Length (s)");
            println!("{}", "-".repeat(42));
            for (i, (start, end)) in segments.iter().enumerate() {
                println!("{:<6} {:<12.2} {:<12.2} {:<12.2}", i + 1, start, end, end - start);
            }
        }
        Commands::Cache { input_dir, action } => {
            let cache = PreprocessCache::new(input_dir.join(CACHE_DIR_NAME));
            match action {
                CacheAction::Clear => {
                    cache.clear_all().await?;
                    println!("Preprocessing cache cleared.");
                }
                CacheAction::Info => {
                    let count = cache.entry_count().await?;
                    println!("Staged cache entries: {}", count);
                }
            }
        }
    }

    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let polysub_dir = std::env::current_dir()?.join(".polysub");
    let log_dir = polysub_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "polysub.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    // Determine log level
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Create console layer
    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    // Create file layer
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    // Setup layered subscriber
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer);

    // Initialize the subscriber
    subscriber.try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("polysub.log").display());

    Ok(())
}
