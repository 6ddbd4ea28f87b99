use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, debug};

use crate::error::{Result, PolysubError};

/// Filenames of the three staged artifacts inside a cache entry
pub const RAW_AUDIO_FILE: &str = "raw.mp3";
pub const DOWNSAMPLED_AUDIO_FILE: &str = "downsampled.mp3";
pub const WORD_TABLE_FILE: &str = "word_table.tsv";

/// Destination paths for a cache restore
pub struct RestoreTargets<'a> {
    pub raw_audio: &'a Path,
    pub downsampled_audio: &'a Path,
    pub word_table: &'a Path,
}

/// Durable per-video staging area for expensive early-pipeline artifacts:
/// raw extracted audio, downsampled transcription-ready audio, and the
/// normalized word table. One subdirectory per video, keyed by the video
/// basename without extension.
pub struct PreprocessCache {
    root: PathBuf,
}

impl PreprocessCache {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn entry_dir(&self, video_stem: &str) -> PathBuf {
        self.root.join(video_stem)
    }

    /// Stash the three preprocessing artifacts for a video
    pub async fn store(
        &self,
        video_stem: &str,
        raw_audio: &Path,
        downsampled_audio: &Path,
        word_table: &Path,
    ) -> Result<()> {
        let entry = self.entry_dir(video_stem);
        fs::create_dir_all(&entry).await?;

        fs::copy(raw_audio, entry.join(RAW_AUDIO_FILE)).await?;
        fs::copy(downsampled_audio, entry.join(DOWNSAMPLED_AUDIO_FILE)).await?;
        fs::copy(word_table, entry.join(WORD_TABLE_FILE)).await?;

        info!("Preprocessing artifacts cached for {}", video_stem);
        Ok(())
    }

    /// Restore the three artifacts into the working directory.
    ///
    /// Fails with a `Cache` error when any required artifact is missing or
    /// zero-length; the caller recovers by reprocessing from scratch.
    pub async fn restore(&self, video_stem: &str, targets: &RestoreTargets<'_>) -> Result<()> {
        let entry = self.entry_dir(video_stem);
        let pairs = [
            (entry.join(RAW_AUDIO_FILE), targets.raw_audio),
            (entry.join(DOWNSAMPLED_AUDIO_FILE), targets.downsampled_audio),
            (entry.join(WORD_TABLE_FILE), targets.word_table),
        ];

        for (source, _) in &pairs {
            let metadata = fs::metadata(source).await.map_err(|_| {
                PolysubError::Cache(format!(
                    "required cached artifact missing: {}",
                    source.display()
                ))
            })?;
            if metadata.len() == 0 {
                return Err(PolysubError::Cache(format!(
                    "required cached artifact is empty: {}",
                    source.display()
                )));
            }
        }

        for (source, target) in &pairs {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::copy(source, target).await?;
            debug!("Restored {} -> {}", source.display(), target.display());
        }

        info!("Preprocessing artifacts restored for {}", video_stem);
        Ok(())
    }

    /// Drop one video's cache entry (after its task completes)
    pub async fn clear_entry(&self, video_stem: &str) -> Result<()> {
        let entry = self.entry_dir(video_stem);
        if entry.exists() {
            fs::remove_dir_all(&entry).await?;
            debug!("Cleared cache entry for {}", video_stem);
        }
        Ok(())
    }

    /// Wipe the whole cache directory
    pub async fn clear_all(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).await?;
        }
        fs::create_dir_all(&self.root).await?;
        info!("Preprocessing cache cleared");
        Ok(())
    }

    /// Number of cache entries currently staged
    pub async fn entry_count(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut count = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                count += 1;
            }
        }
        Ok(count)
    }
}
