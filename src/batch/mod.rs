// Batch orchestration
//
// Drives many videos through the pipeline with durable state: a task table
// that survives crashes, a status snapshot for external viewers, a staging
// cache for preprocessed artifacts, and an optional daily work window.
// The orchestrator never dies with a task; every failure is contained,
// recorded on the row, and the loop moves on.

pub mod cache;
pub mod gate;
pub mod table;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn, error};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{PolysubError, Result};
use crate::media::MediaToolkit;
use crate::pipeline::RunContext;
use crate::workflow::{TaskRequest, VideoPipeline};

use cache::PreprocessCache;
use gate::WorkWindow;
use table::{BatchTask, TaskStatus, TaskTable};

/// Container formats picked up by discovery
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "wmv", "webm"];

/// Audio-only formats, muxed against a black video track before processing
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "flac", "aac"];

/// Batch-folder layout. Finished bundles land next to each video under
/// `output/`; `work/` holds the current task's pipeline artifacts and is
/// wiped between tasks.
pub const TASK_TABLE_FILE: &str = "tasks.json";
pub const TASK_TEMPLATE_FILE: &str = "tasks-template.json";
pub const STATUS_FILE: &str = "status.json";
pub const BUNDLE_DIR_NAME: &str = "output";
pub const WORK_DIR_NAME: &str = "work";
pub const CACHE_DIR_NAME: &str = "cache";

/// Committed view of the run for external status viewers, rewritten after
/// every task transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub current_file: String,
    pub task_number: usize,
    pub total_tasks: usize,
    pub status: String,
}

/// Orchestrates a folder of videos through the pipeline
pub struct BatchProcessor {
    folder: PathBuf,
    config: Config,
    table: TaskTable,
    cache: PreprocessCache,
    window: Option<WorkWindow>,
    status_lock: Mutex<()>,
}

impl BatchProcessor {
    pub fn new<P: AsRef<Path>>(folder: P, config: Config) -> Result<Self> {
        let folder = folder.as_ref().to_path_buf();
        let table = TaskTable::new(
            folder.join(TASK_TABLE_FILE),
            folder.join(TASK_TEMPLATE_FILE),
        );
        let cache = PreprocessCache::new(folder.join(CACHE_DIR_NAME));
        let window = WorkWindow::from_config(
            &config.batch.work_window_start,
            &config.batch.work_window_end,
        )?;
        Ok(Self {
            folder,
            config,
            table,
            cache,
            window,
            status_lock: Mutex::new(()),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn cache(&self) -> &PreprocessCache {
        &self.cache
    }

    fn has_extension(path: &Path, extensions: &[&str]) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                extensions.iter().any(|v| *v == e)
            })
            .unwrap_or(false)
    }

    /// A video with a same-stem `.srt` sidecar is considered already
    /// subtitled and is left alone.
    fn has_subtitle_sidecar(path: &Path) -> bool {
        path.with_extension("srt").exists()
    }

    fn is_own_artifact(&self, path: &Path) -> bool {
        let Some(relative) = pathdiff::diff_paths(path, &self.folder) else {
            return true;
        };
        relative.components().any(|c| {
            let name = c.as_os_str().to_string_lossy();
            name == BUNDLE_DIR_NAME
                || name == WORK_DIR_NAME
                || name == CACHE_DIR_NAME
                || name.starts_with('.')
        })
    }

    /// Scan the batch folder for processable media. Audio-only files are
    /// muxed against a black video track first, and the resulting video
    /// takes their place. Returned paths are relative to the folder.
    pub async fn discover(&self, media: &dyn MediaToolkit) -> Result<Vec<String>> {
        let depth = if self.config.batch.process_subdirs {
            usize::MAX
        } else {
            1
        };

        let mut videos: Vec<PathBuf> = Vec::new();
        let mut audio_files: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(&self.folder).max_depth(depth) {
            let entry = entry.map_err(|e| {
                PolysubError::Config(format!("batch folder scan failed: {}", e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if self.is_own_artifact(path) {
                continue;
            }
            if Self::has_extension(path, VIDEO_EXTENSIONS) {
                videos.push(path.to_path_buf());
            } else if Self::has_extension(path, AUDIO_EXTENSIONS) {
                audio_files.push(path.to_path_buf());
            }
        }

        for audio in &audio_files {
            // An already-subtitled audio file is left alone, same as a video
            if Self::has_subtitle_sidecar(audio) {
                continue;
            }
            let video = audio.with_extension("mp4");
            if video.exists() {
                continue;
            }
            info!("Muxing audio-only input {} against black video", audio.display());
            media.mux_black_video(audio, &video).await?;
            videos.push(video);
        }

        videos.retain(|v| !Self::has_subtitle_sidecar(v));
        videos.sort();

        let mut relative = Vec::with_capacity(videos.len());
        for video in &videos {
            let path = pathdiff::diff_paths(video, &self.folder).unwrap_or_else(|| video.clone());
            relative.push(path.to_string_lossy().to_string());
        }
        info!("Discovered {} video(s) in {}", relative.len(), self.folder.display());
        Ok(relative)
    }

    /// Load the task table, or build it from discovery when absent. Videos
    /// that appeared since the last build are appended as pending rows, so
    /// a resumed run picks up both unfinished and new work.
    pub async fn prepare_tasks(&self, media: &dyn MediaToolkit) -> Result<Vec<BatchTask>> {
        let discovered = self.discover(media).await?;

        if !self.table.path().exists() {
            return self.table.rebuild(
                &discovered,
                &self.config.language.source,
                &self.config.language.target,
            ).await;
        }

        let mut tasks = self.table.load().await?;
        for video in discovered {
            if tasks.iter().any(|t| t.video_file == video) {
                continue;
            }
            info!("New video since last run: {}", video);
            tasks.push(BatchTask {
                video_file: video,
                source_language: self.config.language.source.clone(),
                target_language: self.config.language.target.clone(),
                dubbing: false,
                status: TaskStatus::Pending,
            });
        }
        self.table.save(&tasks).await?;
        Ok(tasks)
    }

    fn request_for(&self, task: &BatchTask) -> TaskRequest {
        TaskRequest {
            video_path: self.folder.join(&task.video_file),
            source_language: task.source_language.clone(),
            target_language: task.target_language.clone(),
            dubbing: task.dubbing,
            is_retry: task.status.is_retry(),
            skip_preprocess: self.config.batch.skip_preprocess
                || task.status == TaskStatus::Preprocessed,
        }
    }

    fn write_snapshot(&self, snapshot: &StatusSnapshot) -> Result<()> {
        let _guard = self
            .status_lock
            .lock()
            .map_err(|_| PolysubError::Config("status lock poisoned".to_string()))?;
        let content = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(self.folder.join(STATUS_FILE), content)?;
        Ok(())
    }

    fn remove_snapshot(&self) {
        let path = self.folder.join(STATUS_FILE);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Could not remove status snapshot: {}", e);
            }
        }
    }

    async fn record_status(
        &self,
        index: usize,
        total: usize,
        video_file: &str,
        status: TaskStatus,
    ) -> Result<()> {
        self.table.set_status(index, status.clone()).await?;
        self.write_snapshot(&StatusSnapshot {
            current_file: video_file.to_string(),
            task_number: index + 1,
            total_tasks: total,
            status: status.display(),
        })
    }

    fn progress_bar(total: u64) -> ProgressBar {
        let bar = ProgressBar::new(total);
        bar.set_style(ProgressStyle::default_bar());
        bar
    }

    /// Process every eligible task in row order. Full runs pick up pending,
    /// stale-processing, failed, and preprocessed rows; done and skipped
    /// rows are never touched.
    pub async fn run(
        &self,
        pipeline: &dyn VideoPipeline,
        media: &dyn MediaToolkit,
    ) -> Result<RunContext> {
        let tasks = self.prepare_tasks(media).await?;

        // Stale staged artifacts are garbage unless this run is meant to
        // restore them
        let expects_restore = self.config.batch.skip_preprocess
            || tasks.iter().any(|t| t.status == TaskStatus::Preprocessed);
        if !expects_restore {
            self.cache.clear_all().await?;
        }

        let total = tasks.len();
        let progress = Self::progress_bar(total as u64);

        let mut totals = RunContext::new();
        let mut done = 0usize;
        let mut failed = 0usize;

        // The loop result is held so the cleanup below always runs, even
        // when a status write fails mid-batch
        let loop_result = async {
            for (index, task) in tasks.iter().enumerate() {
                let eligible =
                    task.status.needs_processing() || task.status == TaskStatus::Preprocessed;
                if !eligible {
                    progress.inc(1);
                    continue;
                }

                if let Some(window) = &self.window {
                    window.wait_until_open().await;
                }

                progress.set_message(task.video_file.clone());
                let request = self.request_for(task);
                self.record_status(index, total, &task.video_file, TaskStatus::Processing)
                    .await?;

                let result = async {
                    let context = pipeline.process(&request).await?;
                    pipeline.save_bundle(&request).await?;
                    Ok(context)
                }
                .await;

                match result {
                    Ok(context) => {
                        totals.absorb(&context);
                        if let Some(stem) = request.video_path.file_stem() {
                            if let Err(e) = self.cache.clear_entry(&stem.to_string_lossy()).await {
                                warn!("Could not clear cache entry for {}: {}", task.video_file, e);
                            }
                        }
                        self.record_status(index, total, &task.video_file, TaskStatus::Done)
                            .await?;
                        done += 1;
                    }
                    Err(e) => {
                        let status = failure_status(e);
                        error!("Task {} failed: {}", task.video_file, status.display());
                        self.record_status(index, total, &task.video_file, status)
                            .await?;
                        failed += 1;
                    }
                }
                progress.inc(1);
            }
            Ok::<(), PolysubError>(())
        }
        .await;

        progress.finish_and_clear();
        if let Err(e) = self.cache.clear_all().await {
            warn!("Could not clear preprocessing cache: {}", e);
        }
        self.remove_snapshot();
        loop_result?;

        info!(
            "Batch finished: {} done, {} failed, {} tokens, {} elapsed",
            done,
            failed,
            totals.total_tokens(),
            totals.format_elapsed()
        );
        Ok(totals)
    }

    /// Run only the early pipeline stages for every eligible task, staging
    /// their artifacts in the cache. Not gated by the work window; the
    /// cheap stages are meant to run ahead of the expensive ones.
    pub async fn run_preprocess(
        &self,
        pipeline: &dyn VideoPipeline,
        media: &dyn MediaToolkit,
    ) -> Result<()> {
        let tasks = self.prepare_tasks(media).await?;
        let total = tasks.len();
        let progress = Self::progress_bar(total as u64);

        for (index, task) in tasks.iter().enumerate() {
            if !task.status.needs_processing() {
                progress.inc(1);
                continue;
            }

            progress.set_message(task.video_file.clone());
            let request = self.request_for(task);
            self.record_status(index, total, &task.video_file, TaskStatus::Processing)
                .await?;

            match pipeline.preprocess(&request).await {
                Ok(_) => {
                    self.record_status(index, total, &task.video_file, TaskStatus::Preprocessed)
                        .await?;
                }
                Err(e) => {
                    let status = failure_status(e);
                    error!("Preprocessing {} failed: {}", task.video_file, status.display());
                    self.record_status(index, total, &task.video_file, status)
                        .await?;
                }
            }
            progress.inc(1);
        }

        progress.finish_and_clear();
        self.remove_snapshot();
        Ok(())
    }

    /// Current rows for the status display
    pub async fn tasks(&self) -> Result<Vec<BatchTask>> {
        self.table.load().await
    }
}

/// Map a pipeline failure onto a task-table row. Step-budget exhaustion
/// keeps its step name; anything else is an unhandled exception.
fn failure_status(error: PolysubError) -> TaskStatus {
    match error {
        PolysubError::Pipeline { step, message } => TaskStatus::Failed { step, message },
        other => TaskStatus::Failed {
            step: "Unhandled exception".to_string(),
            message: other.to_string(),
        },
    }
}
