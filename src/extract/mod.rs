//! Page text extraction.
//!
//! Scraping a live page is someone else's job; this module defines the
//! contract ([`PageSource`]), the selection heuristic over scraped blocks
//! ([`PageBlocks`]) and the input gate applied before summarization.
//!
//! ```text
//! selection (non-blank)? ──yes──▶ selection
//!        │ no
//!        ▼
//! first candidate > 500 chars? ──yes──▶ candidate
//!        │ no
//!        ▼
//!      body
//! ```

pub mod source;
pub mod text;

pub use source::{ExtractError, FilePageSource, PageSource};
pub use text::{normalize_whitespace, require_min_length, PageBlocks, MIN_CANDIDATE_CHARS};
