// Sentence splitting and translation seam
//
// Sentence segmentation and machine translation are external collaborators.
// The default implementation shells out to a configured binary that reads
// the plain-text transcript on stdin and prints a JSON object holding
// `{index, source, translation}` records in document order plus token usage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::info;

use crate::align::SentenceRecord;
use crate::config::SentenceConfig;
use crate::error::{Result, PolysubError};

/// Sentences in document order plus the token cost of producing them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentenceBatch {
    pub sentences: Vec<SentenceRecord>,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// Main trait for producing ordered, optionally translated sentences
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SentenceProvider: Send + Sync {
    /// Split the transcript into sentences and translate them
    async fn sentences(
        &self,
        transcript_text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<SentenceBatch>;
}

/// Provider calling an external binary:
/// `<binary> <source-lang> <target-lang>`, transcript on stdin, JSON on stdout
pub struct CommandSentenceProvider {
    config: SentenceConfig,
}

impl CommandSentenceProvider {
    pub fn new(config: SentenceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SentenceProvider for CommandSentenceProvider {
    async fn sentences(
        &self,
        transcript_text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<SentenceBatch> {
        info!("Splitting and translating {} -> {}", source_language, target_language);

        let mut child = Command::new(&self.config.binary_path)
            .arg(source_language)
            .arg(target_language)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PolysubError::Sentences(format!("Failed to execute sentence provider: {}", e)))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(transcript_text.as_bytes())
                .map_err(|e| PolysubError::Sentences(format!("Failed to write transcript: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| PolysubError::Sentences(format!("Sentence provider failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PolysubError::Sentences(format!(
                "Sentence provider failed: {}",
                stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let batch: SentenceBatch = serde_json::from_str(&stdout)?;
        Ok(batch)
    }
}

/// Factory for creating sentence provider instances
pub struct SentenceProviderFactory;

impl SentenceProviderFactory {
    /// Create the default sentence provider implementation (external binary)
    pub fn create_default(config: SentenceConfig) -> Box<dyn SentenceProvider> {
        Box::new(CommandSentenceProvider::new(config))
    }
}
