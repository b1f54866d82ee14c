//! Captions Module
//!
//! Turns a free-text transcript into timed captions for subtitle burn-in,
//! writes them as SRT, and provides the transcript remix used by the
//! `sentence_pooper` plugin.

mod formats;
mod remix;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{CoreError, CoreResult, TimeSec};

pub use formats::{export_srt, format_srt_timestamp};
pub use remix::{remix_transcript, remix_transcript_seeded};

/// Display window given to every sentence, back to back from t=0.
pub const SENTENCE_WINDOW_SEC: TimeSec = 3.0;

/// A single timed caption.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caption {
    pub start_sec: TimeSec,
    pub end_sec: TimeSec,
    pub text: String,
}

/// Split a transcript into sentence units.
///
/// Lines are split on newlines, then each line on `.`; empty pieces are
/// dropped and the rest trimmed.
pub fn sentences_from_transcript(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| line.split('.'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sentence `i` (1-based) is shown during `[(i-1)*3, i*3)`.
pub fn captions_from_transcript(text: &str) -> Vec<Caption> {
    sentences_from_transcript(text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Caption {
            start_sec: i as f64 * SENTENCE_WINDOW_SEC,
            end_sec: (i + 1) as f64 * SENTENCE_WINDOW_SEC,
            text,
        })
        .collect()
}

/// Supplies transcript text for a source.
pub trait TranscriptProvider: Send + Sync {
    fn transcript(&self, source: &Path) -> CoreResult<String>;
}

/// Reads a UTF-8 transcript from a text file, ignoring the source.
#[derive(Clone, Debug)]
pub struct FileTranscriptProvider {
    path: PathBuf,
}

impl FileTranscriptProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TranscriptProvider for FileTranscriptProvider {
    fn transcript(&self, _source: &Path) -> CoreResult<String> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            CoreError::Resource(format!(
                "Failed to read transcript {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentences_split_on_lines_and_periods() {
        let text = "First one. Second one.\n\n  third line  \n. .";
        assert_eq!(
            sentences_from_transcript(text),
            vec!["First one", "Second one", "third line"]
        );
    }

    #[test]
    fn test_captions_are_back_to_back() {
        let captions = captions_from_transcript("a. b. c");
        assert_eq!(captions.len(), 3);
        assert_eq!(captions[0].start_sec, 0.0);
        assert_eq!(captions[0].end_sec, 3.0);
        assert_eq!(captions[2].start_sec, 6.0);
        assert_eq!(captions[2].end_sec, 9.0);
        for pair in captions.windows(2) {
            assert_eq!(pair[0].end_sec, pair[1].start_sec);
        }
    }

    #[test]
    fn test_empty_transcript_has_no_captions() {
        assert!(captions_from_transcript("").is_empty());
        assert!(captions_from_transcript("...\n \n").is_empty());
    }

    #[test]
    fn test_file_transcript_provider() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        std::fs::write(&path, "hello. world").unwrap();

        let provider = FileTranscriptProvider::new(&path);
        assert_eq!(provider.transcript(Path::new("x.mp4")).unwrap(), "hello. world");

        let missing = FileTranscriptProvider::new(dir.path().join("nope.txt"));
        assert!(matches!(
            missing.transcript(Path::new("x.mp4")),
            Err(CoreError::Resource(_))
        ));
    }
}
