use async_trait::async_trait;
use std::path::Path;
use std::process::Command;
use tracing::{info, debug};

use crate::config::MediaConfig;
use crate::error::{Result, PolysubError};
use super::{MediaToolkit, MediaCommandBuilder};

/// Silence detection threshold in dB below full scale
const SILENCE_NOISE_DB: i32 = -30;
/// Minimum silence length in seconds for a region to count
const SILENCE_MIN_LEN: f64 = 0.5;

/// ffmpeg-backed implementation of the media toolkit
pub struct FfmpegToolkit {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegToolkit {
    /// Create a new ffmpeg toolkit
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());

        let command = self.command_builder.extract_audio(
            video_path,
            audio_path,
            &self.config.raw_bitrate,
            self.config.raw_sample_rate,
        );
        command.execute().await?;

        info!("Audio extraction completed");
        Ok(())
    }

    async fn downsample_audio(&self, input_path: &Path, output_path: &Path) -> Result<()> {
        info!("Downsampling {} to {}", input_path.display(), output_path.display());

        let command = self.command_builder.downsample_audio(
            input_path,
            output_path,
            &self.config.transcribe_bitrate,
            self.config.transcribe_sample_rate,
        );
        command.execute().await?;

        info!("Audio downsampling completed");
        Ok(())
    }

    async fn mux_black_video(&self, audio_path: &Path, video_path: &Path) -> Result<()> {
        info!("Muxing {} against black video into {}",
              audio_path.display(), video_path.display());

        let command = self.command_builder.mux_black_video(audio_path, video_path);
        command.execute().await?;

        info!("Black video muxing completed");
        Ok(())
    }

    async fn audio_duration(&self, audio_path: &Path) -> Result<f64> {
        if !audio_path.exists() {
            return Err(PolysubError::FileNotFound(audio_path.display().to_string()));
        }

        let command = self.command_builder.probe_duration(audio_path);
        let stderr = command.execute_capture_stderr().await?;

        let duration = parse_duration(&stderr).ok_or_else(|| {
            PolysubError::InvalidDuration(format!(
                "No duration information found for {}",
                audio_path.display()
            ))
        })?;

        if duration <= 0.0 {
            return Err(PolysubError::InvalidDuration(format!(
                "{} reported non-positive duration {:.2}s",
                audio_path.display(),
                duration
            )));
        }

        debug!("Audio duration: {:.2}s", duration);
        Ok(duration)
    }

    async fn silence_points(&self, audio_path: &Path, start: f64, end: f64) -> Result<Vec<f64>> {
        let command = self.command_builder.detect_silence(
            audio_path,
            start,
            end,
            SILENCE_NOISE_DB,
            SILENCE_MIN_LEN,
        );
        let stderr = command.execute_capture_stderr().await?;

        Ok(parse_silence_points(&stderr))
    }

    fn check_availability(&self) -> Result<()> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .map_err(|e| PolysubError::Media(format!("Media processor not found: {}", e)))?;

        if output.status.success() {
            info!("Media processor is available");
            Ok(())
        } else {
            Err(PolysubError::Media("Media processor version check failed".to_string()))
        }
    }
}

/// Parse "Duration: HH:MM:SS.cc" from ffmpeg stderr output
pub fn parse_duration(ffmpeg_output: &str) -> Option<f64> {
    let line = ffmpeg_output.lines().find(|l| l.contains("Duration"))?;
    let rest = line.split("Duration: ").nth(1)?;
    let timecode = rest.split(',').next()?;

    let mut parts = timecode.trim().split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parse "silence_end: X" events from ffmpeg silencedetect stderr output
pub fn parse_silence_points(ffmpeg_output: &str) -> Vec<f64> {
    ffmpeg_output
        .lines()
        .filter(|line| line.contains("silence_end"))
        .filter_map(|line| {
            line.split("silence_end: ")
                .nth(1)?
                .split(' ')
                .next()?
                .parse::<f64>()
                .ok()
        })
        .collect()
}
