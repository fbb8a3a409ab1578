//! Provider creation options and summary settings.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SummaryType / SummaryLength
// ---------------------------------------------------------------------------

/// The shape of summary to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryType {
    /// Short overview for a busy reader.
    Tldr,
    /// The most interesting parts, written to draw the reader in.
    Teaser,
    /// Bulleted list of the key points.
    KeyPoints,
    /// A single article headline.
    Headline,
}

impl SummaryType {
    pub const ALL: [SummaryType; 4] = [
        SummaryType::Tldr,
        SummaryType::Teaser,
        SummaryType::KeyPoints,
        SummaryType::Headline,
    ];

    /// Wire name, as used in job parameters and the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryType::Tldr => "tldr",
            SummaryType::Teaser => "teaser",
            SummaryType::KeyPoints => "key-points",
            SummaryType::Headline => "headline",
        }
    }

    /// Parse a wire name.  Returns `None` for unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for SummaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long the summary should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    Medium,
    Long,
}

impl SummaryLength {
    pub const ALL: [SummaryLength; 3] =
        [SummaryLength::Short, SummaryLength::Medium, SummaryLength::Long];

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLength::Short => "short",
            SummaryLength::Medium => "medium",
            SummaryLength::Long => "long",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == name)
    }
}

impl fmt::Display for SummaryLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one summarization run.  Echoed into the store on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryOptions {
    #[serde(rename = "type")]
    pub summary_type: SummaryType,
    pub length: SummaryLength,
}

impl SummaryOptions {
    pub fn new(summary_type: SummaryType, length: SummaryLength) -> Self {
        Self {
            summary_type,
            length,
        }
    }
}

// ---------------------------------------------------------------------------
// CreateOptions
// ---------------------------------------------------------------------------

/// Options passed to [`Provider::availability`](super::Provider::availability)
/// and [`Provider::create`](super::Provider::create).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOptions {
    Summarize(SummaryOptions),
    DetectLanguage,
    Translate { target_language: String },
}
