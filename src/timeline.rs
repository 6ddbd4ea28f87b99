use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::align::{align, AlignedSentence, SentenceRecord};
use crate::config::AlignConfig;
use crate::error::Result;
use crate::transcript::WordToken;

/// Gaps shorter than this between adjacent cues are closed
const GAP_CLOSE_THRESHOLD: f64 = 1.0;

/// Which text column(s) a subtitle variant renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextColumn {
    Source,
    Translation,
}

/// One output file: a filename plus 1-2 text columns per cue
#[derive(Debug, Clone)]
pub struct SubtitleVariant {
    pub filename: String,
    pub columns: Vec<TextColumn>,
}

impl SubtitleVariant {
    pub fn new<S: Into<String>>(filename: S, columns: Vec<TextColumn>) -> Self {
        Self {
            filename: filename.into(),
            columns,
        }
    }

    /// The four display variants written next to the video
    pub fn display_set() -> Vec<SubtitleVariant> {
        vec![
            SubtitleVariant::new("src_subtitles.srt", vec![TextColumn::Source]),
            SubtitleVariant::new("trans_subtitles.srt", vec![TextColumn::Translation]),
            SubtitleVariant::new(
                "bilingual_src_trans_subtitles.srt",
                vec![TextColumn::Source, TextColumn::Translation],
            ),
            SubtitleVariant::new(
                "bilingual_trans_src_subtitles.srt",
                vec![TextColumn::Translation, TextColumn::Source],
            ),
        ]
    }

    /// The two audio-timing variants written to the audio staging directory
    pub fn audio_set() -> Vec<SubtitleVariant> {
        vec![
            SubtitleVariant::new("src_subs_for_audio.srt", vec![TextColumn::Source]),
            SubtitleVariant::new("trans_subs_for_audio.srt", vec![TextColumn::Translation]),
        ]
    }
}

/// An aligned sentence with its rendered SRT timecode
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub index: usize,
    pub source: String,
    pub translation: Option<String>,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub timecode: String,
}

/// Format seconds as an SRT timestamp, `HH:MM:SS,mmm`
pub fn format_srt_time(seconds: f64) -> String {
    let total_milliseconds = (seconds * 1000.0).round() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Parse an SRT timestamp back to seconds
pub fn parse_srt_time(timecode: &str) -> Option<f64> {
    let (hms, millis) = timecode.trim().split_once(',')?;
    let mut parts = hms.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    let millis: u64 = millis.parse().ok()?;

    Some((hours * 3600 + minutes * 60 + seconds) as f64 + millis as f64 / 1000.0)
}

/// Render a cue's time span, `HH:MM:SS,mmm --> HH:MM:SS,mmm`
pub fn format_srt_span(start: f64, end: f64) -> String {
    format!("{} --> {}", format_srt_time(start), format_srt_time(end))
}

/// Close sub-second gaps between adjacent cues by extending the earlier
/// cue's end to the next cue's start. Overlaps (gap <= 0) and gaps of a
/// second or more are left alone, which makes the pass idempotent.
pub fn close_gaps(timestamps: &mut [(f64, f64)]) {
    for i in 0..timestamps.len().saturating_sub(1) {
        let gap = timestamps[i + 1].0 - timestamps[i].1;
        if gap > 0.0 && gap < GAP_CLOSE_THRESHOLD {
            timestamps[i].1 = timestamps[i + 1].0;
        }
    }
}

/// Strip full-width punctuation that clutters burned-in subtitles.
/// Display-only: the audio-timing variants keep the text untouched.
fn polish_for_display(text: &str) -> String {
    text.replace(['，', '。'], " ").trim().to_string()
}

/// Align sentences against the word table and render SRT variants.
///
/// Aligner failures propagate unmodified; there is no partial-timeline
/// fallback.
pub async fn build_timeline(
    words: &[WordToken],
    sentences: &[SentenceRecord],
    variants: &[SubtitleVariant],
    output_dir: Option<&Path>,
    for_display: bool,
    joiner: &str,
    align_config: &AlignConfig,
) -> Result<Vec<TimelineEntry>> {
    let aligned = align(words, sentences, joiner, align_config)?;
    let entries = lay_out(&aligned, for_display);

    if let Some(output_dir) = output_dir {
        fs::create_dir_all(output_dir).await?;
        for variant in variants {
            let content = render_variant(&entries, &variant.columns);
            let path = output_dir.join(&variant.filename);
            fs::write(&path, content).await?;
            info!("Subtitle file written: {}", path.display());
        }
    }

    Ok(entries)
}

/// Gap-close aligned sentences and attach rendered timecodes
fn lay_out(aligned: &[AlignedSentence], for_display: bool) -> Vec<TimelineEntry> {
    let mut timestamps: Vec<(f64, f64)> = aligned.iter().map(|a| (a.start, a.end)).collect();
    close_gaps(&mut timestamps);

    aligned
        .iter()
        .zip(&timestamps)
        .map(|(sentence, &(start, end))| {
            let translation = sentence.translation.as_ref().map(|t| {
                if for_display {
                    polish_for_display(t)
                } else {
                    t.clone()
                }
            });
            TimelineEntry {
                index: sentence.index,
                source: sentence.source.clone(),
                translation,
                start,
                end,
                duration: end - start,
                timecode: format_srt_span(start, end),
            }
        })
        .collect()
}

/// Render sequential-numbered SRT blocks for the selected columns
fn render_variant(entries: &[TimelineEntry], columns: &[TextColumn]) -> String {
    let mut output = String::new();

    for (i, entry) in entries.iter().enumerate() {
        output.push_str(&format!("{}\n{}\n", i + 1, entry.timecode));
        for column in columns {
            let line = match column {
                TextColumn::Source => entry.source.trim().to_string(),
                TextColumn::Translation => entry
                    .translation
                    .as_deref()
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            };
            output.push_str(&line);
            output.push('\n');
        }
        output.push('\n');
    }

    output.trim_end().to_string()
}
