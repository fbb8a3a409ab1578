//! Capability providers: summarization, language detection, translation.
//!
//! This module provides:
//! * [`Provider`] / [`Session`] — async traits every backend implements.
//! * [`ProviderSet`] — the three providers the orchestrator drives.
//! * [`ApiProvider`] — Ollama / OpenAI-compatible HTTP backend.
//! * [`PromptBuilder`] — system prompts per capability and summary setting.
//! * [`DownloadMonitor`] — model-download progress channel.
//! * [`ProviderError`] — typed failures (`Unavailable`, `CreateFailed`,
//!   `InvokeFailed`, `EmptyResult`).
//!
//! # Quick start
//!
//! ```rust,no_run
//! use page_summarizer::config::AppConfig;
//! use page_summarizer::provider::{ApiProvider, CreateOptions, DownloadMonitor, Invocation};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let providers = ApiProvider::provider_set(&config.provider);
//!
//!     let options = CreateOptions::DetectLanguage;
//!     let session = providers
//!         .language_detector
//!         .create(&options, DownloadMonitor::detached())
//!         .await
//!         .unwrap();
//!     if let Invocation::Complete(code) = session.invoke("Bonjour tout le monde").await.unwrap() {
//!         println!("{code}");
//!     }
//! }
//! ```

pub mod adapter;
pub mod api;
pub mod options;
pub mod prompt;
pub mod wire;

#[cfg(test)]
pub mod fake;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use adapter::{
    Availability, DownloadMonitor, DownloadProgress, Invocation, Provider, ProviderError,
    ProviderErrorKind, ProviderKind, ProviderSet, Session, TextStream,
};
pub use api::ApiProvider;
pub use options::{CreateOptions, SummaryLength, SummaryOptions, SummaryType};
pub use prompt::PromptBuilder;
