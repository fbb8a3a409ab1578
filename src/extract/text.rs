//! Page text selection and cleanup.

use crate::job::{JobKind, Rejection};

/// Candidate blocks shorter than this are skipped in favour of the body.
pub const MIN_CANDIDATE_CHARS: usize = 500;

/// Collapse every run of whitespace (newlines included) to one space and
/// trim both ends.
///
/// ```
/// use page_summarizer::extract::normalize_whitespace;
///
/// assert_eq!(normalize_whitespace("  Hello,\n\n\tworld  "), "Hello, world");
/// assert_eq!(normalize_whitespace(" \n "), "");
/// ```
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text blocks gathered from a page, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageBlocks {
    /// What the user highlighted, if anything.
    pub selection: Option<String>,
    /// Article-like containers (`article`, `main`, `.post-content`, …).
    pub candidates: Vec<String>,
    /// The whole page body.
    pub body: String,
}

impl PageBlocks {
    /// Pick the text worth summarizing.
    ///
    /// A non-blank selection wins.  Otherwise the first candidate longer
    /// than [`MIN_CANDIDATE_CHARS`], otherwise the body.  The result is
    /// whitespace-normalized.
    pub fn select_text(&self) -> String {
        if let Some(selection) = self.selection.as_deref() {
            if !selection.trim().is_empty() {
                return normalize_whitespace(selection);
            }
        }

        let chosen = self
            .candidates
            .iter()
            .find(|c| c.chars().count() > MIN_CANDIDATE_CHARS)
            .unwrap_or(&self.body);
        normalize_whitespace(chosen)
    }
}

/// Refuse summarization input shorter than `min` characters.
///
/// Length is measured after whitespace normalization, the same way the
/// orchestrator measures it.
pub fn require_min_length(text: &str, min: usize) -> Result<&str, Rejection> {
    let len = normalize_whitespace(text).chars().count();
    if len < min {
        return Err(Rejection::InsufficientInput {
            kind: JobKind::Summarize,
            len,
            min,
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_wins_when_present() {
        let blocks = PageBlocks {
            selection: Some("  picked\n text ".into()),
            candidates: vec!["a".repeat(600)],
            body: "body".into(),
        };
        assert_eq!(blocks.select_text(), "picked text");
    }

    #[test]
    fn blank_selection_falls_through_to_candidates() {
        let long = "word ".repeat(150);
        let blocks = PageBlocks {
            selection: Some(" \n ".into()),
            candidates: vec!["short teaser".into(), long.clone()],
            body: "body".into(),
        };
        assert_eq!(blocks.select_text(), long.trim());
    }

    #[test]
    fn short_candidates_fall_back_to_body() {
        let blocks = PageBlocks {
            selection: None,
            candidates: vec!["x".repeat(500)],
            body: "Whole\n\npage   body".into(),
        };
        assert_eq!(blocks.select_text(), "Whole page body");
    }

    #[test]
    fn min_length_gate() {
        assert!(require_min_length(&"z".repeat(100), 100).is_ok());
        let err = require_min_length("  tiny  ", 100).unwrap_err();
        assert_eq!(
            err,
            Rejection::InsufficientInput {
                kind: JobKind::Summarize,
                len: 4,
                min: 100
            }
        );
    }
}
