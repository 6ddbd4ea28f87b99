use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, PolysubError};

// Default values for alignment configuration
fn default_min_score() -> f64 {
    0.0
}

fn default_max_misses() -> u32 {
    5
}

fn default_unspaced_languages() -> Vec<String> {
    vec!["zh".to_string(), "ja".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub language: LanguageConfig,
    pub segment: SegmentConfig,
    pub align: AlignConfig,
    pub pipeline: PipelineConfig,
    pub batch: BatchConfig,
    pub media: MediaConfig,
    pub transcriber: TranscriberConfig,
    pub sentences: SentenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Source language hint for transcription ("auto" enables detection)
    pub source: String,
    /// Target language for translation
    pub target: String,
    /// Language reported by the transcriber when source is "auto"
    pub detected: Option<String>,
    /// Languages written without inter-word spacing (empty phrase joiner)
    #[serde(default = "default_unspaced_languages")]
    pub unspaced: Vec<String>,
}

impl LanguageConfig {
    /// Language used for joiner selection: the configured source, or the
    /// detected one when transcription ran with auto-detection.
    pub fn effective_source(&self) -> &str {
        if self.source == "auto" {
            self.detected.as_deref().unwrap_or(&self.source)
        } else {
            &self.source
        }
    }

    /// The string used to concatenate words when reconstructing phrases.
    pub fn joiner(&self) -> &'static str {
        let lang = self.effective_source();
        let root = lang.split(['-', '_']).next().unwrap_or(lang);
        if self.unspaced.iter().any(|u| u == root) {
            ""
        } else {
            " "
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Target segment length in seconds (30 min at 16 kHz / 96 kbps stays under 25 MB)
    pub target_len: f64,
    /// Half-width of the silence search window in seconds
    pub window: f64,
    /// Minimum acceptable segment length in seconds
    pub min_segment_len: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignConfig {
    /// Minimum acceptable similarity for a sentence's best phrase match.
    /// 0.0 accepts any best-seen candidate; raise it to surface suspected
    /// misalignments as errors instead of silently keeping poor matches.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Consecutive non-improving phrase extensions before giving up
    #[serde(default = "default_max_misses")]
    pub max_misses: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Attempts per pipeline step before recording a terminal failure
    pub max_attempts: u32,
    /// Base delay in seconds for the exponential retry backoff
    pub retry_base_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Recurse into subdirectories when discovering videos
    pub process_subdirs: bool,
    /// Restore preprocessing artifacts from cache instead of recomputing
    pub skip_preprocess: bool,
    /// Daily processing window start, "HH:MM" (unset disables gating)
    pub work_window_start: Option<String>,
    /// Daily processing window end, "HH:MM" (may wrap past midnight)
    pub work_window_end: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Bitrate for the raw extracted audio artifact
    pub raw_bitrate: String,
    /// Sample rate for the raw extracted audio artifact
    pub raw_sample_rate: u32,
    /// Bitrate for the downsampled transcription-ready artifact
    pub transcribe_bitrate: String,
    /// Sample rate for the downsampled transcription-ready artifact
    pub transcribe_sample_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberConfig {
    /// Path to the word-level transcription binary
    pub binary_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceConfig {
    /// Path to the sentence splitting / translation binary
    pub binary_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: LanguageConfig {
                source: "en".to_string(),
                target: "zh".to_string(),
                detected: None,
                unspaced: default_unspaced_languages(),
            },
            segment: SegmentConfig {
                target_len: 1800.0,
                window: 60.0,
                min_segment_len: 0.5,
            },
            align: AlignConfig {
                min_score: default_min_score(),
                max_misses: default_max_misses(),
            },
            pipeline: PipelineConfig {
                max_attempts: 4,
                retry_base_delay_secs: 5,
            },
            batch: BatchConfig {
                process_subdirs: false,
                skip_preprocess: false,
                work_window_start: None,
                work_window_end: None,
            },
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                raw_bitrate: "128k".to_string(),
                raw_sample_rate: 32000,
                transcribe_bitrate: "96k".to_string(),
                transcribe_sample_rate: 16000,
            },
            transcriber: TranscriberConfig {
                binary_path: "whisper-words".to_string(),
            },
            sentences: SentenceConfig {
                binary_path: "sentence-split".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PolysubError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| PolysubError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PolysubError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| PolysubError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.segment.target_len, 1800.0);
        assert_eq!(parsed.align.max_misses, 5);
        assert_eq!(parsed.pipeline.max_attempts, 4);
    }

    #[test]
    fn test_joiner_selection() {
        let mut lang = Config::default().language;
        lang.source = "en".to_string();
        assert_eq!(lang.joiner(), " ");

        lang.source = "zh".to_string();
        assert_eq!(lang.joiner(), "");

        lang.source = "zh-CN".to_string();
        assert_eq!(lang.joiner(), "");

        lang.source = "auto".to_string();
        lang.detected = Some("ja".to_string());
        assert_eq!(lang.joiner(), "");

        lang.detected = Some("fr".to_string());
        assert_eq!(lang.joiner(), " ");
    }
}
