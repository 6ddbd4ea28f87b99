use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tracing::{debug, warn};

use crate::config::AlignConfig;
use crate::error::{Result, PolysubError};
use crate::transcript::WordToken;

/// One sentence from the external splitting/translation stages,
/// in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceRecord {
    pub index: usize,
    pub source: String,
    pub translation: Option<String>,
}

/// A sentence with its word-span timestamps resolved against the audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedSentence {
    pub index: usize,
    pub source: String,
    pub translation: Option<String>,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone)]
struct BestMatch {
    score: f64,
    start: f64,
    end: f64,
    word_count: usize,
    phrase: String,
}

/// Collapse whitespace runs, strip punctuation, and lowercase, so ASR word
/// boundaries and human sentence text become comparable.
fn normalize_for_match(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Ratio of matching character blocks between two strings, in [0, 1]
fn similarity(a: &str, b: &str) -> f64 {
    TextDiff::from_chars(a, b).ratio() as f64
}

/// Find word-span timestamps for each sentence by fuzzy string matching.
///
/// A cursor walks the word sequence monotonically; each sentence greedily
/// extends a candidate phrase one word at a time (joined per the language's
/// spacing), keeps the best-scoring extension seen, and gives up after
/// `max_misses` consecutive non-improving extensions. Words consumed by one
/// sentence are never revisited by the next, so output order and length
/// always mirror the input sentences.
///
/// Exact matching is impossible here: ASR tokenization, casing, and
/// punctuation never reproduce the sentence text verbatim. The block-ratio
/// scoring with a bounded lookahead keeps the pass linear (amortized) and
/// deterministic while tolerating transcription noise.
pub fn align(
    words: &[WordToken],
    sentences: &[SentenceRecord],
    joiner: &str,
    config: &AlignConfig,
) -> Result<Vec<AlignedSentence>> {
    let mut aligned = Vec::with_capacity(sentences.len());
    let mut word_index = 0usize;

    for sentence in sentences {
        let target = normalize_for_match(&sentence.source);

        let mut best = BestMatch {
            score: 0.0,
            start: 0.0,
            end: 0.0,
            word_count: 0,
            phrase: String::new(),
        };
        let mut misses = 0u32;
        let mut current_phrase = String::new();
        let start_index = word_index;

        while word_index < words.len() {
            let word = normalize_for_match(&words[word_index].text);
            current_phrase.push_str(&word);
            current_phrase.push_str(joiner);

            let score = similarity(&target, current_phrase.trim());
            if score > best.score {
                best = BestMatch {
                    score,
                    start: words[start_index].start,
                    end: words[word_index].end,
                    word_count: word_index - start_index + 1,
                    phrase: current_phrase.clone(),
                };
                misses = 0;
            } else {
                misses += 1;
            }

            if misses >= config.max_misses {
                break;
            }
            word_index += 1;
        }

        if best.score >= config.min_score {
            debug!(
                "Sentence {} matched {} word(s) with score {:.3}",
                sentence.index, best.word_count, best.score
            );
            aligned.push(AlignedSentence {
                index: sentence.index,
                source: sentence.source.clone(),
                translation: sentence.translation.clone(),
                start: best.start,
                end: best.end,
            });
            word_index = start_index + best.word_count;
        } else {
            warn!(
                "No acceptable match for sentence: {:?} (best phrase {:?}, score {:.2})",
                target,
                best.phrase.trim(),
                best.score
            );
            return Err(PolysubError::Alignment(format!(
                "could not match sentence {} against the transcript (best score {:.2}). \
                 This typically happens when background music is too loud or the \
                 transcription language does not match the source audio.",
                sentence.index, best.score
            )));
        }
    }

    Ok(aligned)
}
