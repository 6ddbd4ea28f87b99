use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process a single video file into localized subtitles
    Process {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Source language hint ("auto" enables detection)
        #[arg(short, long)]
        source_lang: Option<String>,

        /// Target language for translation
        #[arg(short, long)]
        target_lang: Option<String>,

        /// Working directory for pipeline artifacts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Process all video files in a directory with durable task state
    Batch {
        /// Batch folder containing video files
        #[arg(short, long)]
        input_dir: PathBuf,
    },

    /// Run only the early pipeline stages and stage artifacts in the cache
    Preprocess {
        /// Batch folder containing video files
        #[arg(short, long)]
        input_dir: PathBuf,
    },

    /// Show the task table for a batch folder
    Tasks {
        /// Batch folder containing video files
        #[arg(short, long)]
        input_dir: PathBuf,
    },

    /// Plan transcription segments for an audio file
    Segment {
        /// Input audio file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Manage the preprocessing cache of a batch folder
    Cache {
        /// Batch folder containing video files
        #[arg(short, long)]
        input_dir: PathBuf,

        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Clear all staged preprocessing artifacts
    Clear,

    /// Show how many cache entries are staged
    Info,
}
