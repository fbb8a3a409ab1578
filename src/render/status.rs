//! One-line status and result text for a job record.

use std::fmt;

use super::format::format_key_points;
use crate::job::{JobKind, JobRecord, Phase};
use crate::provider::SummaryType;

/// What an observer shows under the progress indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub is_error: bool,
}

impl StatusLine {
    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn from_record(record: &JobRecord) -> Self {
        match record.phase {
            Phase::Idle => Self::info(""),
            Phase::Initializing => Self::info("Initializing..."),
            Phase::DownloadingModel => Self::info(format!(
                "Downloading model: {}%",
                record.progress_percent.unwrap_or(0)
            )),
            Phase::Running => Self::info(match record.kind {
                JobKind::Summarize => "Generating summary...",
                JobKind::DetectLanguage => "Detecting language...",
                JobKind::Translate => "Translating summary...",
            }),
            Phase::Succeeded => Self::info(match record.kind {
                JobKind::Summarize => "Summary generated successfully!".to_string(),
                JobKind::DetectLanguage => format!(
                    "Detected language: {}",
                    record.final_result.as_deref().unwrap_or("unknown")
                ),
                JobKind::Translate => "Translation complete!".to_string(),
            }),
            Phase::Failed => Self {
                text: format!(
                    "An error occurred: {}",
                    record.error_message.as_deref().unwrap_or("unknown error")
                ),
                is_error: true,
            },
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Text to display for `record`: the final result once there is one,
/// otherwise whatever has streamed in so far.
///
/// Key-points summaries get their bullets reformatted.  While a summary is
/// still streaming its parameters are not recorded yet, so a leading `*`
/// is taken as the sign of a bullet list.
pub fn render_result(record: &JobRecord) -> Option<String> {
    let text = record
        .final_result
        .as_deref()
        .or_else(|| Some(record.partial_result.as_str()).filter(|p| !p.is_empty()))?;

    if record.kind == JobKind::Summarize && is_key_points(record, text) {
        Some(format_key_points(text))
    } else {
        Some(text.to_string())
    }
}

fn is_key_points(record: &JobRecord, text: &str) -> bool {
    match &record.input_echo {
        Some(echo) => {
            echo.get("type").and_then(|t| t.as_str()) == Some(SummaryType::KeyPoints.as_str())
        }
        None => text.trim_start().starts_with('*'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ErrorKind;
    use serde_json::json;

    fn record(kind: JobKind, phase: Phase) -> JobRecord {
        JobRecord {
            phase,
            ..JobRecord::idle(kind)
        }
    }

    #[test]
    fn summarize_status_messages() {
        let line = |phase| StatusLine::from_record(&record(JobKind::Summarize, phase)).text;
        assert_eq!(line(Phase::Initializing), "Initializing...");
        assert_eq!(line(Phase::Running), "Generating summary...");
        assert_eq!(line(Phase::Succeeded), "Summary generated successfully!");
        assert_eq!(line(Phase::Idle), "");
    }

    #[test]
    fn download_status_shows_percent() {
        let mut r = record(JobKind::Summarize, Phase::DownloadingModel);
        r.progress_percent = Some(42);
        assert_eq!(StatusLine::from_record(&r).text, "Downloading model: 42%");
    }

    #[test]
    fn failure_is_flagged_as_error() {
        let mut r = record(JobKind::Translate, Phase::Failed);
        r.error_message = Some("translator capability unavailable".into());
        r.error_kind = Some(ErrorKind::CapabilityUnavailable);

        let line = StatusLine::from_record(&r);
        assert!(line.is_error);
        assert_eq!(
            line.to_string(),
            "An error occurred: translator capability unavailable"
        );
    }

    #[test]
    fn detection_success_names_the_language() {
        let mut r = record(JobKind::DetectLanguage, Phase::Succeeded);
        r.final_result = Some("fr".into());
        assert_eq!(StatusLine::from_record(&r).text, "Detected language: fr");
    }

    #[test]
    fn result_prefers_final_over_partial() {
        let mut r = record(JobKind::Summarize, Phase::Running);
        assert_eq!(render_result(&r), None);

        r.partial_result = "Partial".into();
        assert_eq!(render_result(&r).as_deref(), Some("Partial"));

        r.phase = Phase::Succeeded;
        r.final_result = Some("Final".into());
        r.input_echo = Some(json!({"type": "tldr", "length": "short"}));
        assert_eq!(render_result(&r).as_deref(), Some("Final"));
    }

    #[test]
    fn key_points_result_is_formatted() {
        let mut r = record(JobKind::Summarize, Phase::Succeeded);
        r.final_result = Some("* One * Two".into());
        r.input_echo = Some(json!({"type": "key-points", "length": "medium"}));
        assert_eq!(render_result(&r).as_deref(), Some("• One\n\n• Two"));

        r.input_echo = Some(json!({"type": "teaser", "length": "medium"}));
        assert_eq!(render_result(&r).as_deref(), Some("* One * Two"));
    }

    #[test]
    fn streaming_bullets_are_formatted() {
        let mut r = record(JobKind::Summarize, Phase::Running);
        r.partial_result = "* One\n* Tw".into();
        assert_eq!(render_result(&r).as_deref(), Some("• One\n\n• Tw"));
    }
}
