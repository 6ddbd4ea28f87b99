use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, debug};

use crate::error::{Result, PolysubError};

/// Lifecycle of a batch task.
///
/// `Pending`, `Processing` (stale from an interrupted run), and `Failed`
/// rows are picked up by the next batch run; `Done` and `Skipped` are
/// terminal until the table is rebuilt. `Preprocessed` marks a task whose
/// early-pipeline artifacts are staged in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Preprocessed,
    Done,
    Skipped,
    Failed { step: String, message: String },
}

impl TaskStatus {
    /// Whether a fresh batch run should (re)process this task
    pub fn needs_processing(&self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Processing | TaskStatus::Failed { .. }
        )
    }

    /// Whether this task previously failed (retry re-copies the input fresh)
    pub fn is_retry(&self) -> bool {
        matches!(self, TaskStatus::Failed { .. })
    }

    /// Status string for the snapshot and the progress display
    pub fn display(&self) -> String {
        match self {
            TaskStatus::Pending => "Pending".to_string(),
            TaskStatus::Processing => "Processing...".to_string(),
            TaskStatus::Preprocessed => "Preprocessed".to_string(),
            TaskStatus::Done => "Done".to_string(),
            TaskStatus::Skipped => "Skipped".to_string(),
            TaskStatus::Failed { step, message } => format!("Error: {} - {}", step, message),
        }
    }
}

/// One row of the persistent task table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTask {
    /// Video path relative to the batch folder
    pub video_file: String,
    pub source_language: String,
    pub target_language: String,
    pub dubbing: bool,
    pub status: TaskStatus,
}

/// Persistent task table, the single source of truth for resumability.
///
/// Every mutation re-reads and fully re-writes the file, so a concurrent
/// status viewer always sees committed state and a crash mid-run loses at
/// most one task's progress.
pub struct TaskTable {
    path: PathBuf,
    template_path: PathBuf,
}

impl TaskTable {
    pub fn new<P: AsRef<Path>>(path: P, template_path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            template_path: template_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rebuild the table from the template, appending one pending row per
    /// newly discovered video with the configured default languages.
    pub async fn rebuild(
        &self,
        video_files: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<BatchTask>> {
        if !self.template_path.exists() {
            let empty: Vec<BatchTask> = Vec::new();
            write_tasks(&self.template_path, &empty).await?;
        }

        if self.path.exists() {
            fs::remove_file(&self.path).await?;
        }
        fs::copy(&self.template_path, &self.path).await?;

        let mut tasks = self.load().await?;
        for video in video_files {
            tasks.push(BatchTask {
                video_file: video.clone(),
                source_language: source_language.to_string(),
                target_language: target_language.to_string(),
                dubbing: false,
                status: TaskStatus::Pending,
            });
        }

        self.save(&tasks).await?;
        info!("Task table rebuilt with {} task(s)", tasks.len());
        Ok(tasks)
    }

    pub async fn load(&self) -> Result<Vec<BatchTask>> {
        if !self.path.exists() {
            return Err(PolysubError::FileNotFound(self.path.display().to_string()));
        }
        let content = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn save(&self, tasks: &[BatchTask]) -> Result<()> {
        write_tasks(&self.path, tasks).await
    }

    /// Read-modify-write a single row's status
    pub async fn set_status(&self, index: usize, status: TaskStatus) -> Result<()> {
        let mut tasks = self.load().await?;
        let task = tasks.get_mut(index).ok_or_else(|| {
            PolysubError::Config(format!("task index {} out of range", index))
        })?;
        debug!("Task {} -> {}", task.video_file, status.display());
        task.status = status;
        self.save(&tasks).await
    }
}

async fn write_tasks(path: &Path, tasks: &[BatchTask]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(tasks)?;
    fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_processing() {
        assert!(TaskStatus::Pending.needs_processing());
        assert!(TaskStatus::Processing.needs_processing());
        assert!(TaskStatus::Failed {
            step: "Transcribing".to_string(),
            message: "timeout".to_string()
        }
        .needs_processing());

        assert!(!TaskStatus::Done.needs_processing());
        assert!(!TaskStatus::Skipped.needs_processing());
        assert!(!TaskStatus::Preprocessed.needs_processing());
    }

    #[test]
    fn test_status_serde_is_tagged() {
        let status = TaskStatus::Failed {
            step: "Aligning subtitles".to_string(),
            message: "no match".to_string(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"state\":\"failed\""));
        let back: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    #[tokio::test]
    async fn test_rebuild_and_set_status() {
        let dir = tempfile::tempdir().unwrap();
        let table = TaskTable::new(
            dir.path().join("tasks.json"),
            dir.path().join("tasks-template.json"),
        );

        let videos = vec!["a.mp4".to_string(), "sub/b.mkv".to_string()];
        let tasks = table.rebuild(&videos, "en", "zh").await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert!(!tasks[1].dubbing);

        table.set_status(1, TaskStatus::Done).await.unwrap();
        let tasks = table.load().await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert_eq!(tasks[1].status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn test_rebuild_resets_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = TaskTable::new(
            dir.path().join("tasks.json"),
            dir.path().join("tasks-template.json"),
        );

        table.rebuild(&["a.mp4".to_string()], "en", "zh").await.unwrap();
        table.set_status(0, TaskStatus::Done).await.unwrap();

        // A rebuild starts from the template again
        let tasks = table.rebuild(&["a.mp4".to_string()], "en", "zh").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Pending);
    }
}
