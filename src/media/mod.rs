// Media processing layer
//
// Everything ffmpeg-shaped lives behind the MediaToolkit trait so that the
// segmenter and the batch machine can be exercised against mocks:
// - Commands: command value type and builders
// - Processor: ffmpeg-backed implementation and output parsers

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Main trait for media operations consumed by the pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Extract the high-quality raw audio artifact from a video
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()>;

    /// Produce the downsampled transcription-ready audio artifact
    async fn downsample_audio(&self, input_path: &Path, output_path: &Path) -> Result<()>;

    /// Mux an audio-only input against a black video track
    async fn mux_black_video(&self, audio_path: &Path, video_path: &Path) -> Result<()>;

    /// Probe the duration of an audio file in seconds
    async fn audio_duration(&self, audio_path: &Path) -> Result<f64>;

    /// Detect silence points (absolute timestamps of silence ends) in a range
    async fn silence_points(&self, audio_path: &Path, start: f64, end: f64) -> Result<Vec<f64>>;

    /// Check if the media processor binary is available
    fn check_availability(&self) -> Result<()>;
}

/// Factory for creating media toolkit instances
pub struct MediaToolkitFactory;

impl MediaToolkitFactory {
    /// Create the default media toolkit implementation (ffmpeg-based)
    pub fn create_toolkit(config: MediaConfig) -> Box<dyn MediaToolkit> {
        Box::new(processor::FfmpegToolkit::new(config))
    }
}
