use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::error::{Result, PolysubError};

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Add audio filter
    pub fn audio_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-af").arg(filter)
    }

    /// Seek to position (output option, timestamps stay absolute)
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(seconds.to_string())
    }

    /// Stop at position
    pub fn until(self, seconds: f64) -> Self {
        self.arg("-to").arg(seconds.to_string())
    }

    /// Set container format
    pub fn format<S: Into<String>>(self, fmt: S) -> Self {
        self.arg("-f").arg(fmt)
    }

    /// Execute the command, requiring a successful exit status
    pub async fn execute(&self) -> Result<()> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args);

        let output = cmd.output()
            .map_err(|e| PolysubError::Media(format!("Failed to execute media processor: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PolysubError::Media(format!(
                "{} failed: {}",
                self.description,
                stderr
            )));
        }

        Ok(())
    }

    /// Execute the command and return its stderr regardless of exit status.
    /// ffmpeg reports stream metadata and filter events on stderr, and exits
    /// nonzero for probe-style invocations with no output file.
    pub async fn execute_capture_stderr(&self) -> Result<String> {
        debug!("Executing media probe command: {} {:?}", self.binary_path, self.args);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args);

        let output = cmd.output()
            .map_err(|e| PolysubError::Media(format!("Failed to execute media processor: {}", e)))?;

        Ok(String::from_utf8_lossy(&output.stderr).to_string())
    }
}

/// Builder for the media operations the pipeline needs
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build high-quality audio extraction command (raw audio artifact)
    pub fn extract_audio<P: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: P,
        bitrate: &str,
        sample_rate: u32,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio extraction")
            .overwrite()
            .input(video_path)
            .no_video()
            .audio_codec("libmp3lame")
            .audio_bitrate(bitrate)
            .audio_sample_rate(sample_rate)
            .audio_channels(1)
            .arg("-metadata").arg("encoding=UTF-8")
            .output(audio_path)
    }

    /// Build low-quality downsampling command (transcription-ready artifact)
    pub fn downsample_audio<P: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: P,
        bitrate: &str,
        sample_rate: u32,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio downsampling")
            .overwrite()
            .input(input_path)
            .no_video()
            .audio_bitrate(bitrate)
            .audio_sample_rate(sample_rate)
            .audio_channels(1)
            .arg("-metadata").arg("encoding=UTF-8")
            .format("mp3")
            .output(output_path)
    }

    /// Build silence detection command over a time range.
    /// Silence events are reported on stderr with absolute input timestamps.
    pub fn detect_silence<P: AsRef<Path>>(
        &self,
        audio_path: P,
        start: f64,
        end: f64,
        noise_db: i32,
        min_silence_len: f64,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Silence detection")
            .overwrite()
            .input(audio_path)
            .seek(start)
            .until(end)
            .audio_filter(format!("silencedetect=n={}dB:d={}", noise_db, min_silence_len))
            .format("null")
            .arg("-")
    }

    /// Build duration probe command (duration parsed from stderr)
    pub fn probe_duration<P: AsRef<Path>>(&self, audio_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Duration probe")
            .input(audio_path)
    }

    /// Build command muxing an audio-only input against a black video track,
    /// producing a placeholder video container
    pub fn mux_black_video<P: AsRef<Path>>(
        &self,
        audio_path: P,
        video_path: P,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Black video muxing")
            .overwrite()
            .format("lavfi")
            .input("color=c=black:s=1280x720:r=25")
            .input(audio_path)
            .arg("-shortest")
            .video_codec("libx264")
            .audio_codec("aac")
            .output(video_path)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check")
            .arg("-version")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_command_args() {
        let builder = MediaCommandBuilder::new("ffmpeg");
        let cmd = builder.detect_silence("audio.mp3", 1740.0, 1860.0, -30, 0.5);
        assert_eq!(
            cmd.args,
            vec![
                "-y", "-i", "audio.mp3", "-ss", "1740", "-to", "1860",
                "-af", "silencedetect=n=-30dB:d=0.5", "-f", "null", "-"
            ]
        );
    }

    #[test]
    fn test_extract_audio_command_args() {
        let builder = MediaCommandBuilder::new("ffmpeg");
        let cmd = builder.extract_audio("in.mp4", "raw.mp3", "128k", 32000);
        assert!(cmd.args.contains(&"-vn".to_string()));
        assert!(cmd.args.contains(&"libmp3lame".to_string()));
        assert!(cmd.args.contains(&"32000".to_string()));
        assert_eq!(cmd.args.last().unwrap(), "raw.mp3");
    }

    #[test]
    fn test_mux_black_video_args() {
        let builder = MediaCommandBuilder::new("ffmpeg");
        let cmd = builder.mux_black_video("song.mp3", "song.mp4");
        assert!(cmd.args.contains(&"lavfi".to_string()));
        assert!(cmd.args.contains(&"-shortest".to_string()));
        assert_eq!(cmd.args.last().unwrap(), "song.mp4");
    }
}
