//! Job requests from observers and the synchronous acknowledgement they get.

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::record::{ErrorKind, JobKind};
use crate::extract::normalize_whitespace;
use crate::provider::{CreateOptions, SummaryOptions};

// ---------------------------------------------------------------------------
// JobParameters / JobRequest
// ---------------------------------------------------------------------------

/// Kind-specific settings of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobParameters {
    Summarize(SummaryOptions),
    DetectLanguage,
    Translate { target_language: String },
}

impl JobParameters {
    pub fn kind(&self) -> JobKind {
        match self {
            JobParameters::Summarize(_) => JobKind::Summarize,
            JobParameters::DetectLanguage => JobKind::DetectLanguage,
            JobParameters::Translate { .. } => JobKind::Translate,
        }
    }

    /// Options handed to the provider's availability probe and `create`.
    pub fn create_options(&self) -> CreateOptions {
        match self {
            JobParameters::Summarize(options) => CreateOptions::Summarize(*options),
            JobParameters::DetectLanguage => CreateOptions::DetectLanguage,
            JobParameters::Translate { target_language } => CreateOptions::Translate {
                target_language: target_language.clone(),
            },
        }
    }

    /// What gets recorded as `inputEcho` on success.
    pub fn echo(&self) -> Value {
        match self {
            JobParameters::Summarize(options) => json!({
                "type": options.summary_type.as_str(),
                "length": options.length.as_str(),
            }),
            JobParameters::DetectLanguage => json!({}),
            JobParameters::Translate { target_language } => {
                json!({ "targetLanguage": target_language })
            }
        }
    }
}

/// A request to run one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub kind: JobKind,
    pub input_text: String,
    pub parameters: JobParameters,
}

impl JobRequest {
    pub fn summarize(input_text: impl Into<String>, options: SummaryOptions) -> Self {
        Self {
            kind: JobKind::Summarize,
            input_text: input_text.into(),
            parameters: JobParameters::Summarize(options),
        }
    }

    pub fn detect_language(input_text: impl Into<String>) -> Self {
        Self {
            kind: JobKind::DetectLanguage,
            input_text: input_text.into(),
            parameters: JobParameters::DetectLanguage,
        }
    }

    pub fn translate(input_text: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            kind: JobKind::Translate,
            input_text: input_text.into(),
            parameters: JobParameters::Translate {
                target_language: target_language.into(),
            },
        }
    }

    /// Check the request before it may enter the state machine.
    ///
    /// Summarization input must hold at least `min_chars` characters after
    /// whitespace normalization; other kinds only need non-blank input.
    pub fn validate(&self, min_chars: usize) -> Result<(), Rejection> {
        if self.parameters.kind() != self.kind {
            return Err(Rejection::InvalidParameters {
                kind: self.kind,
                reason: format!("parameters are for {}", self.parameters.kind()),
            });
        }

        let len = normalize_whitespace(&self.input_text).chars().count();
        let min = match self.kind {
            JobKind::Summarize => min_chars.max(1),
            JobKind::DetectLanguage | JobKind::Translate => 1,
        };
        if len < min {
            return Err(Rejection::InsufficientInput {
                kind: self.kind,
                len,
                min,
            });
        }

        if let JobParameters::Translate { target_language } = &self.parameters {
            if !is_plausible_language_tag(target_language) {
                return Err(Rejection::InvalidParameters {
                    kind: self.kind,
                    reason: format!("{target_language:?} is not a BCP-47 language tag"),
                });
            }
        }
        Ok(())
    }
}

/// Loose BCP-47 shape check: `xx`, `xxx`, `xx-YY`, `zh-Hant-TW`, …
///
/// ```
/// use page_summarizer::job::is_plausible_language_tag;
///
/// assert!(is_plausible_language_tag("fr"));
/// assert!(is_plausible_language_tag("pt-BR"));
/// assert!(is_plausible_language_tag("zh-Hant-TW"));
/// assert!(!is_plausible_language_tag(""));
/// assert!(!is_plausible_language_tag("french please"));
/// assert!(!is_plausible_language_tag("f"));
/// ```
pub fn is_plausible_language_tag(tag: &str) -> bool {
    let mut subtags = tag.split('-');
    let primary = subtags.next().unwrap_or("");
    (2..=8).contains(&primary.len())
        && primary.chars().all(|c| c.is_ascii_alphabetic())
        && subtags.all(|s| (1..=8).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric()))
}

// ---------------------------------------------------------------------------
// Rejection / Ack
// ---------------------------------------------------------------------------

/// Why a request was refused before any store write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Not enough content to {kind}: {len} characters, at least {min} required")]
    InsufficientInput { kind: JobKind, len: usize, min: usize },

    #[error("Invalid {kind} request: {reason}")]
    InvalidParameters { kind: JobKind, reason: String },

    #[error("A {0} job is already in progress")]
    AlreadyInFlight(JobKind),
}

impl Rejection {
    /// The error class, when the rejection maps onto one.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Rejection::InsufficientInput { .. } => Some(ErrorKind::InsufficientInput),
            _ => None,
        }
    }
}

/// Synchronous answer to a job request, independent of how the job ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Ack {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(rejection: &Rejection) -> Self {
        Self {
            accepted: false,
            reason: Some(rejection.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
