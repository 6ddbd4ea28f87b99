use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::error::{Result, PolysubError};

/// ASR artifacts rather than legitimate words run past this length
const MAX_WORD_CHARS: usize = 20;

/// One recognized speech unit with word-level timing.
/// `start <= end`; the sequence is non-decreasing in `start` (ties happen
/// when a timestamp was synthesized from a neighbour).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

// Structs for parsing word-level ASR JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawWord {
    #[serde(rename = "word")]
    pub text: String,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSegment {
    pub words: Vec<RawWord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTranscription {
    pub segments: Vec<RawSegment>,
    pub language: Option<String>,
}

impl RawTranscription {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Append another transcription's segments (multi-segment audio)
    pub fn extend(&mut self, other: RawTranscription) {
        self.segments.extend(other.segments);
        if self.language.is_none() {
            self.language = other.language;
        }
    }
}

/// Convert raw word-level ASR output into a clean, ordered word table.
///
/// Over-length tokens are dropped as recognition artifacts, directional
/// quotation glyphs used in French transcription are stripped (the fuzzy
/// matcher treats them as noise), and tokens without timestamps borrow
/// timing from a neighbour: the previous token's end when one exists, the
/// next timestamped token in the same segment for a leading token.
pub fn normalize(raw: &RawTranscription) -> Result<Vec<WordToken>> {
    let mut all_words: Vec<WordToken> = Vec::new();

    for segment in &raw.segments {
        for (word_idx, word) in segment.words.iter().enumerate() {
            if word.text.chars().count() > MAX_WORD_CHARS {
                warn!("Dropping over-length token: {}", word.text);
                continue;
            }

            let text = word.text.replace('»', "").replace('«', "");

            if word.start.is_none() && word.end.is_none() {
                if let Some(prev) = all_words.last() {
                    // Zero-duration token pinned to the previous token's end
                    let end = prev.end;
                    all_words.push(WordToken { text, start: end, end });
                } else {
                    // Leading token: borrow from the next timestamped token
                    let next = segment.words[word_idx..]
                        .iter()
                        .find(|w| w.start.is_some() && w.end.is_some());
                    match next {
                        Some(next) => {
                            all_words.push(WordToken {
                                text,
                                start: next.start.unwrap_or_default(),
                                end: next.end.unwrap_or_default(),
                            });
                        }
                        None => {
                            return Err(PolysubError::NoTimestamp(format!(
                                "no timestamped token follows '{}'",
                                text
                            )));
                        }
                    }
                }
            } else {
                let prev_end = all_words.last().map(|w| w.end).unwrap_or(0.0);
                let start = word.start.unwrap_or(prev_end);
                let end = word.end.unwrap_or(start);
                all_words.push(WordToken { text, start, end });
            }
        }
    }

    Ok(all_words)
}

/// Persist the normalized word table as tab-separated rows.
///
/// Rows with empty text after trimming and residual over-length rows are
/// dropped; the text field is quote-wrapped with embedded tabs flattened to
/// spaces and embedded quotes doubled, format details of the tabular
/// artifact that `load_word_table` undoes on read.
pub async fn save_word_table(words: &[WordToken], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let initial = words.len();
    let rows: Vec<&WordToken> = words
        .iter()
        .filter(|w| !w.text.trim().is_empty())
        .filter(|w| w.text.chars().count() <= MAX_WORD_CHARS)
        .collect();

    if rows.len() < initial {
        info!("Removed {} degenerate row(s) from word table", initial - rows.len());
    }

    let mut content = String::from("text\tstart\tend\n");
    for word in &rows {
        // Tabs would split the row, a quote would unbalance the wrapping
        let text = word.text.replace('\t', " ").replace('"', "\"\"");
        content.push_str(&format!("\"{}\"\t{}\t{}\n", text, word.start, word.end));
    }

    fs::write(path, content).await?;
    info!("Word table saved to {}", path.display());
    Ok(())
}

/// Load a word table previously written by `save_word_table`
pub async fn load_word_table(path: &Path) -> Result<Vec<WordToken>> {
    let content = fs::read_to_string(path).await?;
    let mut words = Vec::new();

    for line in content.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let (text, start, end) = match (fields.next(), fields.next(), fields.next()) {
            (Some(t), Some(s), Some(e)) => (t, s, e),
            _ => {
                return Err(PolysubError::UnsupportedFormat(format!(
                    "malformed word table row: {}",
                    line
                )))
            }
        };

        let text = text.trim();
        let text = text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(text);
        let text = text.replace("\"\"", "\"");
        let start: f64 = start.trim().parse().map_err(|_| {
            PolysubError::UnsupportedFormat(format!("bad start timestamp: {}", line))
        })?;
        let end: f64 = end.trim().parse().map_err(|_| {
            PolysubError::UnsupportedFormat(format!("bad end timestamp: {}", line))
        })?;

        words.push(WordToken { text, start, end });
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_word(text: &str, start: Option<f64>, end: Option<f64>) -> RawWord {
        RawWord {
            text: text.to_string(),
            start,
            end,
        }
    }

    fn single_segment(words: Vec<RawWord>) -> RawTranscription {
        RawTranscription {
            segments: vec![RawSegment { words }],
            language: None,
        }
    }

    #[test]
    fn test_normal_tokens_pass_through() {
        let raw = single_segment(vec![
            raw_word("hello", Some(0.0), Some(0.5)),
            raw_word("world", Some(0.5), Some(1.0)),
        ]);
        let words = normalize(&raw).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0], WordToken { text: "hello".to_string(), start: 0.0, end: 0.5 });
    }

    #[test]
    fn test_missing_timestamp_backfills_from_previous() {
        let raw = single_segment(vec![
            raw_word("so", Some(2.0), Some(2.3)),
            raw_word("um", None, None),
        ]);
        let words = normalize(&raw).unwrap();
        assert_eq!(words[1], WordToken { text: "um".to_string(), start: 2.3, end: 2.3 });
    }

    #[test]
    fn test_leading_token_borrows_forward() {
        let raw = single_segment(vec![
            raw_word("uh", None, None),
            raw_word("hello", Some(1.2), Some(1.8)),
        ]);
        let words = normalize(&raw).unwrap();
        assert_eq!(words[0], WordToken { text: "uh".to_string(), start: 1.2, end: 1.8 });
    }

    #[test]
    fn test_no_timestamp_anywhere_is_fatal() {
        let raw = single_segment(vec![raw_word("uh", None, None), raw_word("hm", None, None)]);
        assert!(matches!(normalize(&raw), Err(PolysubError::NoTimestamp(_))));
    }

    #[test]
    fn test_missing_start_defaults_to_previous_end() {
        let raw = single_segment(vec![
            raw_word("hello", Some(0.0), Some(0.5)),
            raw_word("there", None, Some(0.9)),
        ]);
        let words = normalize(&raw).unwrap();
        assert_eq!(words[1], WordToken { text: "there".to_string(), start: 0.5, end: 0.9 });
    }

    #[test]
    fn test_over_length_token_dropped() {
        let raw = single_segment(vec![
            raw_word("a".repeat(21).as_str(), Some(0.0), Some(0.4)),
            raw_word("ok", Some(0.4), Some(0.6)),
        ]);
        let words = normalize(&raw).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "ok");
    }

    #[test]
    fn test_guillemets_stripped() {
        let raw = single_segment(vec![raw_word("«bonjour»", Some(0.0), Some(0.5))]);
        let words = normalize(&raw).unwrap();
        assert_eq!(words[0].text, "bonjour");
    }

    #[tokio::test]
    async fn test_word_table_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("word_table.tsv");

        let words = vec![
            WordToken { text: "hello".to_string(), start: 0.0, end: 0.5 },
            WordToken { text: "  ".to_string(), start: 0.5, end: 0.6 },
            WordToken { text: "world".to_string(), start: 0.6, end: 1.0 },
        ];
        save_word_table(&words, &path).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("\"hello\""));

        let loaded = load_word_table(&path).await.unwrap();
        // The whitespace-only row was dropped on save
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].text, "hello");
        assert_eq!(loaded[1].end, 1.0);
    }

    #[tokio::test]
    async fn test_word_table_escapes_tabs_and_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("word_table.tsv");

        let words = vec![
            WordToken { text: "say\t\"hi\"".to_string(), start: 0.0, end: 0.4 },
            WordToken { text: "\"quoted\"".to_string(), start: 0.4, end: 0.8 },
        ];
        save_word_table(&words, &path).await.unwrap();

        let loaded = load_word_table(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        // The embedded tab is flattened, the quotes survive
        assert_eq!(loaded[0].text, "say \"hi\"");
        assert_eq!(loaded[1].text, "\"quoted\"");
        assert_eq!(loaded[1].end, 0.8);
    }

    #[test]
    fn test_raw_transcription_from_json() {
        let json = r#"{
            "language": "en",
            "segments": [
                {"words": [{"word": "hi", "start": 0.1, "end": 0.3}, {"word": "um"}]}
            ]
        }"#;
        let raw = RawTranscription::from_json(json).unwrap();
        assert_eq!(raw.language.as_deref(), Some("en"));
        assert_eq!(raw.segments[0].words[1].start, None);
    }
}
