// Single-video pipeline
//
// Workflow owns the collaborators (media toolkit, transcriber, sentence
// provider) and drives one video through ingest, audio extraction,
// segmentation, transcription, sentence splitting, alignment, and SRT
// rendering. Every stage runs under the retry runner so that a flaky
// collaborator does not kill a long batch. The batch orchestrator talks to
// it through the VideoPipeline trait.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tracing::{info, warn};

use crate::batch::cache::{
    PreprocessCache, RestoreTargets, DOWNSAMPLED_AUDIO_FILE, RAW_AUDIO_FILE, WORD_TABLE_FILE,
};
use crate::config::Config;
use crate::error::{PolysubError, Result};
use crate::media::{MediaToolkit, MediaToolkitFactory};
use crate::pipeline::{PipelineRunner, RunContext};
use crate::segment::AudioSegmenter;
use crate::sentences::{SentenceProvider, SentenceProviderFactory};
use crate::timeline::{build_timeline, SubtitleVariant};
use crate::transcribe::{Transcriber, TranscriberFactory};
use crate::transcript::{load_word_table, normalize, save_word_table, RawTranscription, WordToken};

/// Plain-text sentence transcript kept alongside the word table
const SENTENCE_LOG_FILE: &str = "sentences.txt";

/// Everything one task run needs, snapshotted up front. The batch loop
/// builds one per row so a task's languages and flags cannot drift while
/// it is in flight.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub video_path: PathBuf,
    pub source_language: String,
    pub target_language: String,
    pub dubbing: bool,
    /// Previous run failed: keep the working directory, re-copy the input
    pub is_retry: bool,
    /// Restore staged preprocessing artifacts instead of recomputing
    pub skip_preprocess: bool,
}

/// Main trait for processing one video end to end
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoPipeline: Send + Sync {
    /// Run the full pipeline for one video
    async fn process(&self, request: &TaskRequest) -> Result<RunContext>;

    /// Run only the early stages and stage their artifacts in the cache
    async fn preprocess(&self, request: &TaskRequest) -> Result<RunContext>;

    /// Copy the finished subtitle set next to the source video
    async fn save_bundle(&self, request: &TaskRequest) -> Result<PathBuf>;
}

/// The default pipeline implementation
pub struct Workflow {
    config: Config,
    media: Box<dyn MediaToolkit>,
    transcriber: Box<dyn Transcriber>,
    sentences: Box<dyn SentenceProvider>,
    runner: PipelineRunner,
    work_dir: PathBuf,
    cache: PreprocessCache,
}

impl Workflow {
    pub fn new<P: AsRef<Path>>(config: Config, work_dir: P, cache_root: P) -> Self {
        let media = MediaToolkitFactory::create_toolkit(config.media.clone());
        let transcriber = TranscriberFactory::create_default(config.transcriber.clone());
        let sentences = SentenceProviderFactory::create_default(config.sentences.clone());
        Self::with_collaborators(config, media, transcriber, sentences, work_dir, cache_root)
    }

    /// Assemble a workflow from explicit collaborators (tests swap in fakes)
    pub fn with_collaborators<P: AsRef<Path>>(
        config: Config,
        media: Box<dyn MediaToolkit>,
        transcriber: Box<dyn Transcriber>,
        sentences: Box<dyn SentenceProvider>,
        work_dir: P,
        cache_root: P,
    ) -> Self {
        let runner = PipelineRunner::new(&config.pipeline);
        Self {
            config,
            media,
            transcriber,
            sentences,
            runner,
            work_dir: work_dir.as_ref().to_path_buf(),
            cache: PreprocessCache::new(cache_root),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn audio_dir(&self) -> PathBuf {
        self.work_dir.join("audio")
    }

    fn log_dir(&self) -> PathBuf {
        self.work_dir.join("log")
    }

    fn raw_audio_path(&self) -> PathBuf {
        self.audio_dir().join(RAW_AUDIO_FILE)
    }

    fn downsampled_audio_path(&self) -> PathBuf {
        self.audio_dir().join(DOWNSAMPLED_AUDIO_FILE)
    }

    fn word_table_path(&self) -> PathBuf {
        self.log_dir().join(WORD_TABLE_FILE)
    }

    /// Reset the working directory. Retries keep previous artifacts so a
    /// task that failed late does not redo its early stages.
    async fn prepare_work_dir(&self, is_retry: bool) -> Result<()> {
        if !is_retry && self.work_dir.exists() {
            fs::remove_dir_all(&self.work_dir).await?;
        }
        fs::create_dir_all(self.audio_dir()).await?;
        fs::create_dir_all(self.log_dir()).await?;
        Ok(())
    }

    /// Copy the input video into the working directory
    async fn ingest(&self, request: &TaskRequest) -> Result<PathBuf> {
        let file_name = request
            .video_path
            .file_name()
            .ok_or_else(|| PolysubError::FileNotFound(request.video_path.display().to_string()))?;
        let local = self.work_dir.join(file_name);

        let source = request.video_path.as_path();
        let target = local.as_path();
        self.runner
            .run("Processing input file", || async move {
                if !source.exists() {
                    return Err(PolysubError::FileNotFound(source.display().to_string()));
                }
                fs::copy(source, target).await?;
                Ok(())
            })
            .await?;

        Ok(local)
    }

    /// Extract, downsample, segment, and transcribe; returns the normalized
    /// word table (also written to disk) and the detected language.
    async fn run_preprocessing(
        &self,
        local_video: &Path,
        source_language: &str,
    ) -> Result<(Vec<WordToken>, Option<String>)> {
        let media = self.media.as_ref();
        let raw_audio = self.raw_audio_path();
        let downsampled = self.downsampled_audio_path();

        let video = local_video;
        let raw = raw_audio.as_path();
        self.runner
            .run("Extracting audio", || async move {
                media.extract_audio(video, raw).await
            })
            .await?;

        let down = downsampled.as_path();
        self.runner
            .run("Downsampling audio", || async move {
                media.downsample_audio(raw, down).await
            })
            .await?;

        let transcriber = self.transcriber.as_ref();
        let segment_config = &self.config.segment;
        let raw_transcription = self
            .runner
            .run("Transcribing audio", || async move {
                let segmenter = AudioSegmenter::new(segment_config.clone(), media);
                let segments = segmenter.split(down).await?;
                info!("Transcribing {} segment(s)", segments.len());

                let mut combined: Option<RawTranscription> = None;
                for segment in &segments {
                    let part = transcriber
                        .transcribe_segment(down, segment, source_language)
                        .await?;
                    match combined.as_mut() {
                        Some(all) => all.extend(part),
                        None => combined = Some(part),
                    }
                }
                combined.ok_or_else(|| {
                    PolysubError::Transcriber("transcription produced no segments".to_string())
                })
            })
            .await?;

        let detected = raw_transcription.language.clone();
        let words = normalize(&raw_transcription)?;
        save_word_table(&words, &self.word_table_path()).await?;

        Ok((words, detected))
    }

    /// Per-task language view: request languages over the config defaults,
    /// plus whatever the transcriber detected this run.
    fn language_for(&self, request: &TaskRequest, detected: Option<String>) -> crate::config::LanguageConfig {
        let mut language = self.config.language.clone();
        language.source = request.source_language.clone();
        language.target = request.target_language.clone();
        if detected.is_some() {
            language.detected = detected;
        }
        language
    }

    fn video_stem(request: &TaskRequest) -> Result<String> {
        request
            .video_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| PolysubError::FileNotFound(request.video_path.display().to_string()))
    }
}

#[async_trait]
impl VideoPipeline for Workflow {
    async fn process(&self, request: &TaskRequest) -> Result<RunContext> {
        let started = Instant::now();
        let mut context = RunContext::new();
        let stem = Self::video_stem(request)?;

        self.prepare_work_dir(request.is_retry).await?;
        let local_video = self.ingest(request).await?;

        // Early stages: restore from the cache when asked, fall back to a
        // full preprocessing pass when the staged artifacts are unusable.
        let mut restored = false;
        if request.skip_preprocess {
            let raw_audio = self.raw_audio_path();
            let downsampled = self.downsampled_audio_path();
            let word_table = self.word_table_path();
            let targets = RestoreTargets {
                raw_audio: &raw_audio,
                downsampled_audio: &downsampled,
                word_table: &word_table,
            };
            match self.cache.restore(&stem, &targets).await {
                Ok(()) => restored = true,
                Err(e) => warn!("Cache restore failed ({}), preprocessing from scratch", e),
            }
        }

        let (words, detected) = if restored {
            // The word table does not record the detected language, so a
            // restored run leans on the configured source language.
            (load_word_table(&self.word_table_path()).await?, None)
        } else {
            self.run_preprocessing(&local_video, &request.source_language)
                .await?
        };

        let language = self.language_for(request, detected);
        let joiner = language.joiner();

        let transcript_text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(joiner);

        let provider = self.sentences.as_ref();
        let text = transcript_text.as_str();
        let source_language = language.effective_source();
        let target_language = request.target_language.as_str();
        let batch = self
            .runner
            .run("Splitting sentences", || async move {
                provider
                    .sentences(text, source_language, target_language)
                    .await
            })
            .await?;
        context.prompt_tokens += batch.prompt_tokens;
        context.completion_tokens += batch.completion_tokens;

        let sentence_log = batch
            .sentences
            .iter()
            .map(|s| s.source.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(self.log_dir().join(SENTENCE_LOG_FILE), sentence_log).await?;

        let word_slice = words.as_slice();
        let sentence_slice = batch.sentences.as_slice();
        let align_config = &self.config.align;
        let work_dir = self.work_dir.as_path();
        let audio_dir = self.audio_dir();
        let audio_dir = audio_dir.as_path();
        let entries = self
            .runner
            .run("Aligning subtitles", || async move {
                let entries = build_timeline(
                    word_slice,
                    sentence_slice,
                    &SubtitleVariant::display_set(),
                    Some(work_dir),
                    true,
                    joiner,
                    align_config,
                )
                .await?;
                build_timeline(
                    word_slice,
                    sentence_slice,
                    &SubtitleVariant::audio_set(),
                    Some(audio_dir),
                    false,
                    joiner,
                    align_config,
                )
                .await?;
                Ok(entries)
            })
            .await?;

        if request.dubbing {
            warn!("Dubbing requested for {} but no dubbing engine is configured, skipping", stem);
        }

        context.elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            "Pipeline finished for {}: {} cue(s) in {}",
            stem,
            entries.len(),
            context.format_elapsed()
        );
        Ok(context)
    }

    async fn preprocess(&self, request: &TaskRequest) -> Result<RunContext> {
        let started = Instant::now();
        let stem = Self::video_stem(request)?;

        self.prepare_work_dir(false).await?;
        let local_video = self.ingest(request).await?;
        self.run_preprocessing(&local_video, &request.source_language)
            .await?;

        self.cache
            .store(
                &stem,
                &self.raw_audio_path(),
                &self.downsampled_audio_path(),
                &self.word_table_path(),
            )
            .await?;

        let mut context = RunContext::new();
        context.elapsed_secs = started.elapsed().as_secs_f64();
        info!("Preprocessing finished for {} in {}", stem, context.format_elapsed());
        Ok(context)
    }

    async fn save_bundle(&self, request: &TaskRequest) -> Result<PathBuf> {
        let stem = Self::video_stem(request)?;
        let parent = request
            .video_path
            .parent()
            .ok_or_else(|| PolysubError::FileNotFound(request.video_path.display().to_string()))?;
        let bundle_dir = parent.join(crate::batch::BUNDLE_DIR_NAME).join(&stem);
        fs::create_dir_all(&bundle_dir).await?;

        // Stable per-video names; the trans+src variant doubles as the
        // default sidecar players auto-load.
        let renamed = [
            ("src_subtitles.srt", format!("{}_src.srt", stem)),
            ("trans_subtitles.srt", format!("{}_trans.srt", stem)),
            (
                "bilingual_src_trans_subtitles.srt",
                format!("{}_src_trans.srt", stem),
            ),
            (
                "bilingual_trans_src_subtitles.srt",
                format!("{}_trans_src.srt", stem),
            ),
            ("bilingual_trans_src_subtitles.srt", format!("{}.srt", stem)),
        ];
        let mut archived: Vec<(String, PathBuf)> = Vec::new();
        for (variant_name, bundle_name) in renamed {
            let source = self.work_dir.join(variant_name);
            if source.exists() {
                let target = bundle_dir.join(&bundle_name);
                fs::copy(&source, &target).await?;
                archived.push((bundle_name, target));
            }
        }
        let sentence_log = self.log_dir().join(SENTENCE_LOG_FILE);
        if sentence_log.exists() {
            let target = bundle_dir.join(SENTENCE_LOG_FILE);
            fs::copy(&sentence_log, &target).await?;
            archived.push((SENTENCE_LOG_FILE.to_string(), target));
        }

        let archive = bundle_dir.join(format!("{}_subtitles.zip", stem));
        write_bundle_archive(&archive, &archived)?;

        info!("Subtitle bundle saved to {}", bundle_dir.display());
        Ok(bundle_dir)
    }
}

/// Pack the renamed subtitle files and the sentence transcript into a
/// single zip archive for handing off out of the batch folder.
fn write_bundle_archive(archive_path: &Path, entries: &[(String, PathBuf)]) -> Result<()> {
    use std::io::Write;

    let file = std::fs::File::create(archive_path)?;
    let mut archive = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, source) in entries {
        archive.start_file(name.as_str(), options)?;
        archive.write_all(&std::fs::read(source)?)?;
    }
    archive.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::SentenceRecord;
    use crate::media::MockMediaToolkit;
    use crate::sentences::{MockSentenceProvider, SentenceBatch};
    use crate::transcribe::MockTranscriber;
    use crate::transcript::{RawSegment, RawWord};

    fn word(text: &str, start: f64, end: f64) -> RawWord {
        RawWord {
            text: text.to_string(),
            start: Some(start),
            end: Some(end),
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.pipeline.max_attempts = 1;
        config.pipeline.retry_base_delay_secs = 0;
        config
    }

    fn stub_media(duration: f64) -> MockMediaToolkit {
        let mut media = MockMediaToolkit::new();
        media.expect_extract_audio().returning(|_, raw| {
            std::fs::write(raw, b"raw").unwrap();
            Ok(())
        });
        media.expect_downsample_audio().returning(|_, down| {
            std::fs::write(down, b"down").unwrap();
            Ok(())
        });
        media
            .expect_audio_duration()
            .returning(move |_| Ok(duration));
        media.expect_silence_points().returning(|_, _, _| Ok(vec![]));
        media
    }

    fn stub_transcriber() -> MockTranscriber {
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe_segment().returning(|_, _, _| {
            Ok(RawTranscription {
                segments: vec![RawSegment {
                    words: vec![word("hello", 0.0, 0.4), word("world", 0.5, 1.0)],
                }],
                language: Some("en".to_string()),
            })
        });
        transcriber
    }

    fn stub_sentences() -> MockSentenceProvider {
        let mut provider = MockSentenceProvider::new();
        provider.expect_sentences().returning(|_, _, _| {
            Ok(SentenceBatch {
                sentences: vec![SentenceRecord {
                    index: 0,
                    source: "hello world".to_string(),
                    translation: Some("bonjour le monde".to_string()),
                }],
                prompt_tokens: 10,
                completion_tokens: 4,
            })
        });
        provider
    }

    fn request(dir: &Path) -> TaskRequest {
        TaskRequest {
            video_path: dir.join("clip.mp4"),
            source_language: "en".to_string(),
            target_language: "fr".to_string(),
            dubbing: false,
            is_retry: false,
            skip_preprocess: false,
        }
    }

    #[tokio::test]
    async fn test_process_writes_all_subtitle_variants() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"video-bytes").unwrap();

        let workflow = Workflow::with_collaborators(
            test_config(),
            Box::new(stub_media(1.0)),
            Box::new(stub_transcriber()),
            Box::new(stub_sentences()),
            dir.path().join("work"),
            dir.path().join("cache"),
        );

        let context = workflow.process(&request(dir.path())).await.unwrap();
        assert_eq!(context.total_tokens(), 14);

        for variant in SubtitleVariant::display_set() {
            let path = dir.path().join("work").join(&variant.filename);
            assert!(path.exists(), "missing {}", variant.filename);
        }
        for variant in SubtitleVariant::audio_set() {
            let path = dir.path().join("work/audio").join(&variant.filename);
            assert!(path.exists(), "missing {}", variant.filename);
        }

        let srt = std::fs::read_to_string(dir.path().join("work/src_subtitles.srt")).unwrap();
        assert!(srt.contains("hello world"));
    }

    #[tokio::test]
    async fn test_preprocess_stages_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"video-bytes").unwrap();

        let workflow = Workflow::with_collaborators(
            test_config(),
            Box::new(stub_media(1.0)),
            Box::new(stub_transcriber()),
            Box::new(stub_sentences()),
            dir.path().join("work"),
            dir.path().join("cache"),
        );

        workflow.preprocess(&request(dir.path())).await.unwrap();

        let entry = dir.path().join("cache/clip");
        assert!(entry.join(RAW_AUDIO_FILE).exists());
        assert!(entry.join(DOWNSAMPLED_AUDIO_FILE).exists());
        assert!(entry.join(WORD_TABLE_FILE).exists());
    }

    #[tokio::test]
    async fn test_skip_preprocess_uses_staged_word_table() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"video-bytes").unwrap();

        // Stage a cache entry, then run with a transcriber that would fail
        // if it were ever called.
        let cache = PreprocessCache::new(dir.path().join("cache"));
        let staged = dir.path().join("staged");
        std::fs::create_dir_all(&staged).unwrap();
        std::fs::write(staged.join("r.mp3"), b"raw").unwrap();
        std::fs::write(staged.join("d.mp3"), b"down").unwrap();
        std::fs::write(
            staged.join("w.tsv"),
            "text\tstart\tend\n\"hello\"\t0\t0.4\n\"world\"\t0.5\t1\n",
        )
        .unwrap();
        cache
            .store(
                "clip",
                &staged.join("r.mp3"),
                &staged.join("d.mp3"),
                &staged.join("w.tsv"),
            )
            .await
            .unwrap();

        let mut media = MockMediaToolkit::new();
        media.expect_extract_audio().never();
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe_segment().never();

        let workflow = Workflow::with_collaborators(
            test_config(),
            Box::new(media),
            Box::new(transcriber),
            Box::new(stub_sentences()),
            dir.path().join("work"),
            dir.path().join("cache"),
        );

        let mut request = request(dir.path());
        request.skip_preprocess = true;
        workflow.process(&request).await.unwrap();

        let srt = std::fs::read_to_string(dir.path().join("work/src_subtitles.srt")).unwrap();
        assert!(srt.contains("hello world"));
    }

    #[tokio::test]
    async fn test_save_bundle_collects_outputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"video-bytes").unwrap();

        let workflow = Workflow::with_collaborators(
            test_config(),
            Box::new(stub_media(1.0)),
            Box::new(stub_transcriber()),
            Box::new(stub_sentences()),
            dir.path().join("work"),
            dir.path().join("cache"),
        );

        let request = request(dir.path());
        workflow.process(&request).await.unwrap();
        let bundle = workflow.save_bundle(&request).await.unwrap();

        assert_eq!(bundle, dir.path().join("output/clip"));
        assert!(bundle.join("clip_src.srt").exists());
        assert!(bundle.join("clip_trans.srt").exists());
        assert!(bundle.join("clip_src_trans.srt").exists());
        assert!(bundle.join("clip_trans_src.srt").exists());
        assert!(bundle.join("clip.srt").exists());
        assert!(bundle.join(SENTENCE_LOG_FILE).exists());
    }

    #[tokio::test]
    async fn test_save_bundle_writes_zip_archive() {
        use std::io::Read;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"video-bytes").unwrap();

        let workflow = Workflow::with_collaborators(
            test_config(),
            Box::new(stub_media(1.0)),
            Box::new(stub_transcriber()),
            Box::new(stub_sentences()),
            dir.path().join("work"),
            dir.path().join("cache"),
        );

        let request = request(dir.path());
        workflow.process(&request).await.unwrap();
        let bundle = workflow.save_bundle(&request).await.unwrap();

        let file = std::fs::File::open(bundle.join("clip_subtitles.zip")).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();

        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        for expected in [
            "clip_src.srt",
            "clip_trans.srt",
            "clip_src_trans.srt",
            "clip_trans_src.srt",
            "clip.srt",
            SENTENCE_LOG_FILE,
        ] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }

        let mut entry = archive.by_name("clip.srt").unwrap();
        let mut text = String::new();
        entry.read_to_string(&mut text).unwrap();
        assert!(text.contains("bonjour le monde"));
    }
}
