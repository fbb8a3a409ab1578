//! Core provider traits, error taxonomy and the download-progress channel.
//!
//! Every capability (summarization, language detection, translation) follows
//! the same three-step contract:
//!
//! ```text
//! availability(opts) ──▶ Unavailable  → caller fails fast, no retry
//!                    ──▶ Downloadable → create() will fetch the model first
//!                    ──▶ Available
//! create(opts, monitor) ──▶ Box<dyn Session>   (monitor fires 0..n times)
//! session.invoke(input) ──▶ Invocation::Complete(text)
//!                       ──▶ Invocation::Streaming(chunks)
//! ```
//!
//! Implementations are stateless between calls; everything a call needs is
//! passed in or captured by the returned [`Session`].

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;
use tokio::sync::mpsc;

use super::options::CreateOptions;

// ---------------------------------------------------------------------------
// ProviderKind / Availability
// ---------------------------------------------------------------------------

/// Which capability a provider implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Summarizer,
    LanguageDetector,
    Translator,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Summarizer => "summarizer",
            ProviderKind::LanguageDetector => "language detector",
            ProviderKind::Translator => "translator",
        };
        f.write_str(name)
    }
}

/// Result of an availability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// The capability is not present on this host.
    Unavailable,
    /// Usable once the model has been downloaded by `create`.
    Downloadable,
    /// Ready to use immediately.
    Available,
}

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// Failure classes a provider can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The capability is missing on the host.
    Unavailable,
    /// Model or session setup failed, including download failures.
    CreateFailed,
    /// The call itself failed.
    InvokeFailed,
    /// The call succeeded but produced no usable output.
    EmptyResult,
}

/// A typed provider failure with a human-readable message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, message)
    }

    pub fn create_failed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::CreateFailed, message)
    }

    pub fn invoke_failed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvokeFailed, message)
    }

    pub fn empty_result(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::EmptyResult, message)
    }
}

// ---------------------------------------------------------------------------
// Download progress
// ---------------------------------------------------------------------------

/// One model-download progress event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Fraction of the model loaded so far, nominally `0.0..=1.0`.
    pub loaded: f64,
}

impl DownloadProgress {
    /// Whole-number percentage, rounded and clamped to `0..=100`.
    ///
    /// ```
    /// use page_summarizer::provider::DownloadProgress;
    ///
    /// assert_eq!(DownloadProgress { loaded: 0.424 }.percent(), 42);
    /// assert_eq!(DownloadProgress { loaded: 1.7 }.percent(), 100);
    /// assert_eq!(DownloadProgress { loaded: f64::NAN }.percent(), 0);
    /// ```
    pub fn percent(&self) -> u8 {
        if !self.loaded.is_finite() {
            return 0;
        }
        (self.loaded * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Sending half of the download-progress channel handed to
/// [`Provider::create`].
///
/// A provider may call [`report`](Self::report) zero or more times before
/// `create` resolves.  Events sent after the receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct DownloadMonitor {
    tx: Option<mpsc::UnboundedSender<DownloadProgress>>,
}

impl DownloadMonitor {
    /// Create a monitor and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DownloadProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A monitor nobody listens to.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    /// Report that `loaded` (fraction) of the model is now available.
    pub fn report(&self, loaded: f64) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(DownloadProgress { loaded });
        }
    }
}

// ---------------------------------------------------------------------------
// Provider / Session traits
// ---------------------------------------------------------------------------

/// Lazily produced text chunks from a streaming invocation.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// What a [`Session::invoke`] call returns.
pub enum Invocation {
    /// A single result produced in one shot.
    Complete(String),
    /// Output delivered chunk by chunk, in order.
    Streaming(TextStream),
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            Invocation::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// A ready-to-use handle returned by [`Provider::create`].
#[async_trait]
pub trait Session: Send + Sync {
    /// Run the capability on `input`.
    async fn invoke(&self, input: &str) -> Result<Invocation, ProviderError>;
}

/// Object-safe interface for a capability provider.
///
/// Implementors must be `Send + Sync` so they can be held behind an
/// `Arc<dyn Provider>` and shared between orchestrator instances.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The capability this provider implements.
    fn kind(&self) -> ProviderKind;

    /// Probe whether the capability can be used with `options`.
    ///
    /// Must be called before [`create`](Self::create).
    async fn availability(&self, options: &CreateOptions) -> Result<Availability, ProviderError>;

    /// Build a session, downloading the model first if needed.
    ///
    /// Suspends until the session is ready or setup fails.
    async fn create(
        &self,
        options: &CreateOptions,
        monitor: DownloadMonitor,
    ) -> Result<Box<dyn Session>, ProviderError>;
}

// Compile-time assertion: Box<dyn Provider> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Provider>, _: Box<dyn Session>) {}
};

// ---------------------------------------------------------------------------
// ProviderSet
// ---------------------------------------------------------------------------

/// The three providers the orchestrator drives.
#[derive(Clone)]
pub struct ProviderSet {
    pub summarizer: Arc<dyn Provider>,
    pub language_detector: Arc<dyn Provider>,
    pub translator: Arc<dyn Provider>,
}

impl ProviderSet {
    pub fn new(
        summarizer: Arc<dyn Provider>,
        language_detector: Arc<dyn Provider>,
        translator: Arc<dyn Provider>,
    ) -> Self {
        Self {
            summarizer,
            language_detector,
            translator,
        }
    }

    /// The provider implementing `kind`.
    pub fn get(&self, kind: ProviderKind) -> &Arc<dyn Provider> {
        match kind {
            ProviderKind::Summarizer => &self.summarizer,
            ProviderKind::LanguageDetector => &self.language_detector,
            ProviderKind::Translator => &self.translator,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
