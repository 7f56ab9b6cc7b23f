//! Document text chunking.
//!
//! Splits normalized document text into overlapping fixed-size character
//! windows. Blank windows are dropped before indices are assigned, so the
//! retained sequence indices are always contiguous from zero.

use serde::{Deserialize, Serialize};

use crate::core::errors::EngineError;

/// A retained window of document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextWindow {
    pub text: String,
    pub sequence_index: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    window: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails fast on an invalid window/overlap combination.
    pub fn new(window: usize, overlap: usize) -> Result<Self, EngineError> {
        if window == 0 {
            return Err(EngineError::invalid("chunk window must be at least 1"));
        }
        if overlap >= window {
            return Err(EngineError::invalid(format!(
                "chunk overlap ({overlap}) must be smaller than the window ({window})"
            )));
        }
        Ok(Self { window, overlap })
    }

    /// Deterministic: identical input and parameters always produce
    /// identical windows.
    pub fn split(&self, text: &str) -> Vec<TextWindow> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let step = self.window - self.overlap;
        let mut windows = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.window).min(chars.len());
            let slice: String = chars[start..end].iter().collect();
            let trimmed = slice.trim();
            if !trimmed.is_empty() {
                windows.push(TextWindow {
                    text: trimmed.to_string(),
                    sequence_index: windows.len(),
                });
            }
            start += step;
        }

        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_yields_exactly_one_window() {
        let chunker = Chunker::new(500, 50).unwrap();
        let windows = chunker.split("a short note");
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].text, "a short note");
        assert_eq!(windows[0].sequence_index, 0);
    }

    #[test]
    fn empty_text_yields_nothing() {
        let chunker = Chunker::new(500, 50).unwrap();
        assert!(chunker.split("").is_empty());
    }

    #[test]
    fn whitespace_only_windows_are_dropped_and_indices_stay_contiguous() {
        let chunker = Chunker::new(4, 0).unwrap();
        // Second window is all spaces and must not appear in the output.
        let windows = chunker.split("abcd    efgh");
        let texts: Vec<&str> = windows.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "efgh"]);
        let indices: Vec<usize> = windows.iter().map(|w| w.sequence_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        assert!(Chunker::new(40, 40).is_err());
        assert!(Chunker::new(40, 60).is_err());
        assert!(Chunker::new(0, 0).is_err());
    }

    #[test]
    fn rechunking_identical_text_is_byte_identical() {
        let chunker = Chunker::new(40, 10).unwrap();
        let text = "A quick primer on graphs. Graphs model relationships. Trees are special graphs.";
        assert_eq!(chunker.split(text), chunker.split(text));
    }

    #[test]
    fn overlapping_windows_cover_the_document() {
        let chunker = Chunker::new(40, 10).unwrap();
        let text = "A quick primer on graphs. Graphs model relationships. Trees are special graphs.";
        let windows = chunker.split(text);

        assert!(windows.len() >= 3);
        for (i, window) in windows.iter().enumerate() {
            assert!(window.text.chars().count() <= 40);
            assert!(!window.text.trim().is_empty());
            assert_eq!(window.sequence_index, i);
        }
    }

    #[test]
    fn windows_advance_by_window_minus_overlap() {
        let chunker = Chunker::new(10, 4).unwrap();
        let text = "0123456789abcdefghij";
        let windows = chunker.split(text);
        assert_eq!(windows[0].text, "0123456789");
        // Step is 6, so the second window starts at offset 6.
        assert!(windows[1].text.starts_with("6789"));
    }
}
