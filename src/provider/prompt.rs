//! Prompt builder for the three chat-backed capabilities.
//!
//! [`PromptBuilder::build_chat`] returns a `(system_msg, user_msg)` tuple for
//! any OpenAI-compatible `/v1/chat/completions` endpoint.  The system message
//! is chosen from [`CreateOptions`]; the user message is always the input text.

use super::options::{CreateOptions, SummaryLength, SummaryOptions, SummaryType};

// ---------------------------------------------------------------------------
// System instructions
// ---------------------------------------------------------------------------

const SUMMARY_RULES: &str = "\
Rules:
1. Write plain text only. No markdown headings, no code fences.
2. Use only facts stated in the article.
3. Write in the same language as the article.
4. Reply with ONLY the summary, no preamble.";

const DETECT_INSTRUCTION: &str = "\
You identify the language of a text.
Reply with ONLY the BCP-47 language code of the text (for example: en, fr, pt-BR).
No explanation, no punctuation.";

const TRANSLATE_INSTRUCTION: &str = "\
You are a translation engine.
Translate the user's text into the language with BCP-47 code \"{target}\".
Preserve bullet markers, line breaks and proper nouns.
Reply with ONLY the translated text.";

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds capability prompts in chat-message format.
///
/// # Example
/// ```rust
/// use page_summarizer::provider::{CreateOptions, PromptBuilder};
///
/// let (system, user) = PromptBuilder::new().build_chat(&CreateOptions::DetectLanguage, "Bonjour");
/// assert!(system.contains("BCP-47"));
/// assert_eq!(user, "Bonjour");
/// ```
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a `(system_msg, user_msg)` pair for `options`.
    pub fn build_chat(&self, options: &CreateOptions, input: &str) -> (String, String) {
        let system = match options {
            CreateOptions::Summarize(summary) => self.summary_instruction(summary),
            CreateOptions::DetectLanguage => DETECT_INSTRUCTION.to_string(),
            CreateOptions::Translate { target_language } => {
                TRANSLATE_INSTRUCTION.replace("{target}", target_language)
            }
        };
        (system, input.to_string())
    }

    /// The system message for a summarization run.
    pub fn summary_instruction(&self, options: &SummaryOptions) -> String {
        let task = match options.summary_type {
            SummaryType::Tldr => format!(
                "Summarize the article as a short, direct overview for a busy reader, in {}.",
                tldr_length(options.length)
            ),
            SummaryType::Teaser => format!(
                "Write a teaser that highlights the most intriguing parts of the article \
                 and makes the reader want to read it, in {}.",
                tldr_length(options.length)
            ),
            SummaryType::KeyPoints => format!(
                "List the {} most important points of the article. \
                 Start every point with \"* \" on a single line.",
                key_point_count(options.length)
            ),
            SummaryType::Headline => format!(
                "Write a single headline for the article of at most {} words.",
                headline_words(options.length)
            ),
        };
        format!("You summarize web articles.\n{task}\n\n{SUMMARY_RULES}")
    }
}

fn tldr_length(length: SummaryLength) -> &'static str {
    match length {
        SummaryLength::Short => "one sentence",
        SummaryLength::Medium => "three sentences",
        SummaryLength::Long => "five sentences",
    }
}

fn key_point_count(length: SummaryLength) -> u8 {
    match length {
        SummaryLength::Short => 3,
        SummaryLength::Medium => 5,
        SummaryLength::Long => 7,
    }
}

fn headline_words(length: SummaryLength) -> u8 {
    match length {
        SummaryLength::Short => 12,
        SummaryLength::Medium => 17,
        SummaryLength::Long => 22,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
