use std::path::Path;
use tracing::{info, debug, warn};

use crate::config::SegmentConfig;
use crate::error::{Result, PolysubError};
use crate::media::MediaToolkit;

/// One transcription segment, `(start, end)` in seconds. Segments are
/// contiguous and gapless: each segment's end is the next segment's start,
/// and together they cover the full audio duration.
pub type AudioSegment = (f64, f64);

/// Splits long audio into bounded-length segments for transcription,
/// preferring cuts at silence so no word is split across a boundary.
/// 30 minutes at 16 kHz / 96 kbps stays comfortably under the 25 MB
/// upload limit of hosted transcription services.
pub struct AudioSegmenter<'a> {
    config: SegmentConfig,
    media: &'a dyn MediaToolkit,
}

impl<'a> AudioSegmenter<'a> {
    pub fn new(config: SegmentConfig, media: &'a dyn MediaToolkit) -> Self {
        Self { config, media }
    }

    /// Split an audio file into contiguous segments.
    ///
    /// Cuts are placed near `pos + target_len`; a window of
    /// `[pos + target_len - window, pos + target_len + window]` is searched
    /// for silence, and the earliest silence point past the target offset
    /// that leaves the current segment at least `min_segment_len` long wins.
    /// Without one the cut lands exactly at `pos + target_len`. A trailing
    /// remainder shorter than `min_segment_len` is merged into the previous
    /// segment instead of becoming its own.
    pub async fn split(&self, audio_path: &Path) -> Result<Vec<AudioSegment>> {
        info!("Starting audio segmentation for {}", audio_path.display());

        let duration = self.media.audio_duration(audio_path).await?;
        if duration <= 0.0 {
            return Err(PolysubError::InvalidDuration(format!(
                "{} has duration {:.2}s",
                audio_path.display(),
                duration
            )));
        }
        debug!("Total audio duration: {:.2}s", duration);

        let target_len = self.config.target_len.min(duration);
        let window = self.config.window;
        let min_segment_len = self.config.min_segment_len;

        let mut segments: Vec<AudioSegment> = Vec::new();
        let mut pos = 0.0;

        while pos < duration {
            let remaining = duration - pos;

            if remaining < min_segment_len {
                // Too short to stand alone, fold into the previous segment
                if let Some(last) = segments.last_mut() {
                    debug!("Merging {:.2}s remainder into previous segment", remaining);
                    last.1 = duration;
                }
                break;
            } else if remaining < target_len {
                segments.push((pos, duration));
                break;
            }

            let win_start = pos + target_len - window;
            let win_end = (win_start + 2.0 * window).min(duration);
            debug!("Searching for silence between {:.2}s and {:.2}s", win_start, win_end);

            let silences = self.media.silence_points(audio_path, win_start, win_end).await?;
            if !silences.is_empty() {
                let target_offset = target_len - (win_start - pos);
                let split_at = silences.iter().copied().find(|&t| {
                    t - win_start > target_offset && t - pos >= min_segment_len
                });

                if let Some(split_at) = split_at {
                    debug!("Cutting at silence: {:.2}s -> {:.2}s", pos, split_at);
                    segments.push((pos, split_at));
                    pos = split_at;
                    continue;
                }
            }

            // No usable silence point, cut at the target length
            let next_pos = pos + target_len;
            if duration - next_pos < min_segment_len {
                segments.push((pos, duration));
                break;
            } else {
                segments.push((pos, next_pos));
                pos = next_pos;
            }
        }

        let total: f64 = segments.iter().map(|(s, e)| e - s).sum();
        info!("Audio split into {} segments covering {:.2}s", segments.len(), total);
        if (total - duration).abs() > 1.0 {
            warn!(
                "Total segment duration {:.2}s differs from audio duration {:.2}s",
                total, duration
            );
        }

        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MockMediaToolkit;

    fn segmenter_config() -> SegmentConfig {
        SegmentConfig {
            target_len: 1800.0,
            window: 60.0,
            min_segment_len: 0.5,
        }
    }

    fn toolkit_with_duration(duration: f64) -> MockMediaToolkit {
        let mut media = MockMediaToolkit::new();
        media.expect_audio_duration().returning(move |_| Ok(duration));
        media
    }

    #[tokio::test]
    async fn test_short_audio_single_segment() {
        let mut media = toolkit_with_duration(600.0);
        media.expect_silence_points().returning(|_, _, _| Ok(vec![]));

        let config = segmenter_config();
        let segmenter = AudioSegmenter::new(config, &media);
        let segments = segmenter.split(Path::new("a.mp3")).await.unwrap();

        assert_eq!(segments, vec![(0.0, 600.0)]);
    }

    #[tokio::test]
    async fn test_cut_at_silence_point() {
        let mut media = toolkit_with_duration(3600.0);
        // First window reports a silence end just past the target position
        media.expect_silence_points().returning(|_, win_start, _| {
            if win_start < 2000.0 {
                Ok(vec![win_start + 50.0, win_start + 70.0, win_start + 90.0])
            } else {
                Ok(vec![])
            }
        });

        let config = segmenter_config();
        let segmenter = AudioSegmenter::new(config, &media);
        let segments = segmenter.split(Path::new("a.mp3")).await.unwrap();

        // target offset inside the window is 60s; the first point past it is +70
        assert_eq!(segments[0], (0.0, 1740.0 + 70.0));
        // Contiguity
        for pair in segments.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
        assert_eq!(segments.last().unwrap().1, 3600.0);
    }

    #[tokio::test]
    async fn test_no_silence_cuts_at_target_len() {
        let mut media = toolkit_with_duration(3700.0);
        media.expect_silence_points().returning(|_, _, _| Ok(vec![]));

        let config = segmenter_config();
        let segmenter = AudioSegmenter::new(config, &media);
        let segments = segmenter.split(Path::new("a.mp3")).await.unwrap();

        assert_eq!(segments, vec![(0.0, 1800.0), (1800.0, 3600.0), (3600.0, 3700.0)]);
    }

    #[tokio::test]
    async fn test_short_remainder_stands_alone() {
        // 1805s total: the 5s remainder after the regular 1800s cut clears
        // min_segment_len, so it becomes the final segment on its own.
        let mut media = toolkit_with_duration(1805.0);
        media.expect_silence_points().returning(|_, _, _| Ok(vec![]));

        let config = segmenter_config();
        let segmenter = AudioSegmenter::new(config, &media);
        let segments = segmenter.split(Path::new("a.mp3")).await.unwrap();

        assert_eq!(segments, vec![(0.0, 1800.0), (1800.0, 1805.0)]);
    }

    #[tokio::test]
    async fn test_sub_min_remainder_extends_current_segment() {
        // 1800.3s: remainder after the 1800s cut is under min_segment_len
        // and must extend the only segment to the end instead.
        let mut media = toolkit_with_duration(1800.3);
        media.expect_silence_points().returning(|_, _, _| Ok(vec![]));

        let config = segmenter_config();
        let segmenter = AudioSegmenter::new(config, &media);
        let segments = segmenter.split(Path::new("a.mp3")).await.unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0], (0.0, 1800.3));
    }

    #[tokio::test]
    async fn test_sub_min_remainder_merges_into_previous() {
        // A silence cut at 1800.1 leaves a 0.1s remainder, which folds
        // back into the previous segment at the top of the loop.
        let mut media = toolkit_with_duration(1800.2);
        media.expect_silence_points().returning(|_, _, _| Ok(vec![1800.1]));

        let config = segmenter_config();
        let segmenter = AudioSegmenter::new(config, &media);
        let segments = segmenter.split(Path::new("a.mp3")).await.unwrap();

        assert_eq!(segments, vec![(0.0, 1800.2)]);
    }

    #[tokio::test]
    async fn test_silence_before_target_offset_ignored() {
        let mut media = toolkit_with_duration(3600.0);
        // All silence points land before the target offset inside the window
        media.expect_silence_points().returning(|_, win_start, _| {
            Ok(vec![win_start + 10.0, win_start + 30.0])
        });

        let config = segmenter_config();
        let segmenter = AudioSegmenter::new(config, &media);
        let segments = segmenter.split(Path::new("a.mp3")).await.unwrap();

        assert_eq!(segments[0], (0.0, 1800.0));
    }

    #[tokio::test]
    async fn test_invalid_duration_is_fatal() {
        let mut media = MockMediaToolkit::new();
        media.expect_audio_duration().returning(|_| {
            Err(PolysubError::InvalidDuration("no duration".to_string()))
        });

        let config = segmenter_config();
        let segmenter = AudioSegmenter::new(config, &media);
        let result = segmenter.split(Path::new("a.mp3")).await;

        assert!(matches!(result, Err(PolysubError::InvalidDuration(_))));
    }

    #[tokio::test]
    async fn test_coverage_property() {
        for duration in [0.6, 17.0, 1799.9, 1800.0, 5431.7, 9000.0] {
            let mut media = toolkit_with_duration(duration);
            // Silence points can only come from within the probed range
            media.expect_silence_points().returning(|_, win_start, win_end| {
                let point = win_start + 65.0;
                Ok(if point <= win_end { vec![point] } else { vec![] })
            });

            let config = segmenter_config();
            let segmenter = AudioSegmenter::new(config, &media);
            let segments = segmenter.split(Path::new("a.mp3")).await.unwrap();

            assert_eq!(segments[0].0, 0.0);
            assert!((segments.last().unwrap().1 - duration).abs() < 1e-9);
            for pair in segments.windows(2) {
                assert_eq!(pair[0].1, pair[1].0);
            }
            for (i, (start, end)) in segments.iter().enumerate() {
                // Only the merged final remainder may be shorter than the minimum
                if i + 1 < segments.len() {
                    assert!(end - start >= 0.5);
                }
            }
        }
    }
}
