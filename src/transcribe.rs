// Transcription seam
//
// The ASR engine is an external collaborator: anything that can produce
// word-level timestamps for a time range of an audio file can sit behind
// the Transcriber trait. The default implementation shells out to a
// configured binary that prints word-level JSON on stdout.

use async_trait::async_trait;
use std::path::Path;
use std::process::Command;
use tracing::{info, debug};

use crate::config::TranscriberConfig;
use crate::error::{Result, PolysubError};
use crate::segment::AudioSegment;
use crate::transcript::RawTranscription;

/// Main trait for word-level transcription over one audio segment
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a time range of an audio file with word-level timestamps
    async fn transcribe_segment(
        &self,
        audio_path: &Path,
        segment: &AudioSegment,
        language: &str,
    ) -> Result<RawTranscription>;
}

/// Transcriber calling an external binary:
/// `<binary> <audio> <start> <end> <language>` with JSON on stdout
pub struct CommandTranscriber {
    config: TranscriberConfig,
}

impl CommandTranscriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe_segment(
        &self,
        audio_path: &Path,
        segment: &AudioSegment,
        language: &str,
    ) -> Result<RawTranscription> {
        info!(
            "Transcribing {} [{:.2}s - {:.2}s]",
            audio_path.display(),
            segment.0,
            segment.1
        );

        let output = Command::new(&self.config.binary_path)
            .arg(audio_path)
            .arg(segment.0.to_string())
            .arg(segment.1.to_string())
            .arg(language)
            .output()
            .map_err(|e| PolysubError::Transcriber(format!("Failed to execute transcriber: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PolysubError::Transcriber(format!(
                "Transcription failed: {}",
                stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("Transcriber returned {} bytes", stdout.len());
        RawTranscription::from_json(&stdout)
    }
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    /// Create the default transcriber implementation (external binary)
    pub fn create_default(config: TranscriberConfig) -> Box<dyn Transcriber> {
        Box::new(CommandTranscriber::new(config))
    }
}
