//! Job kinds, phases and the per-kind [`JobRecord`] kept in the store.
//!
//! Records are stored flattened: each field of each kind lives under its own
//! key (`summarize.phase`, `translate.partialResult`, …) so writes for
//! different kinds touch disjoint keys and can interleave freely.
//!
//! ```text
//! Idle ──accept──▶ Initializing ──download event──▶ DownloadingModel ─┐
//!                       │  ▲                              ▲  │         │
//!                       │  └──────── create begins ───────┘  └─(0..n)──┘
//!                       ▼
//!                    Running ──chunk──▶ Running (partialResult grows)
//!                       │
//!                       ├──non-empty result──▶ Succeeded
//!                       └──any error─────────▶ Failed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{ProviderErrorKind, ProviderKind};
use crate::store::{Patch, StoreState};

/// Field names within one kind's record.
pub mod field {
    pub const PHASE: &str = "phase";
    pub const PROGRESS_PERCENT: &str = "progressPercent";
    pub const PARTIAL_RESULT: &str = "partialResult";
    pub const FINAL_RESULT: &str = "finalResult";
    pub const ERROR_MESSAGE: &str = "errorMessage";
    pub const ERROR_KIND: &str = "errorKind";
    pub const INPUT_ECHO: &str = "inputEcho";
    /// Store handle running the job (see [`StateStore::owner_id`](crate::store::StateStore::owner_id)).
    pub const OWNER: &str = "owner";
}

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// A class of orchestrated task.  At most one job per kind is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Summarize,
    DetectLanguage,
    Translate,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Summarize, JobKind::DetectLanguage, JobKind::Translate];

    /// Store key prefix for this kind's fields.
    pub fn prefix(&self) -> &'static str {
        match self {
            JobKind::Summarize => "summarize",
            JobKind::DetectLanguage => "detectLanguage",
            JobKind::Translate => "translate",
        }
    }

    /// Full store key for `name` (one of [`field`]).
    pub fn key(&self, name: &str) -> String {
        format!("{}.{}", self.prefix(), name)
    }

    /// The provider that serves this kind.
    pub fn provider_kind(&self) -> ProviderKind {
        match self {
            JobKind::Summarize => ProviderKind::Summarizer,
            JobKind::DetectLanguage => ProviderKind::LanguageDetector,
            JobKind::Translate => ProviderKind::Translator,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Position of a kind's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    Initializing,
    DownloadingModel,
    Running,
    Succeeded,
    Failed,
}

impl Phase {
    /// `true` between acceptance and the terminal commit.
    ///
    /// ```
    /// use page_summarizer::job::Phase;
    ///
    /// assert!(!Phase::Idle.is_in_flight());
    /// assert!(Phase::Initializing.is_in_flight());
    /// assert!(Phase::DownloadingModel.is_in_flight());
    /// assert!(Phase::Running.is_in_flight());
    /// assert!(!Phase::Succeeded.is_in_flight());
    /// assert!(!Phase::Failed.is_in_flight());
    /// ```
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Phase::Initializing | Phase::DownloadingModel | Phase::Running
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Initializing => "Initializing",
            Phase::DownloadingModel => "DownloadingModel",
            Phase::Running => "Running",
            Phase::Succeeded => "Succeeded",
            Phase::Failed => "Failed",
        }
    }

    /// Decode a stored phase value.  Unknown values read as `Idle`.
    pub fn from_value(value: Option<&Value>) -> Self {
        value
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Why a job failed (or was refused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The provider is not present on this host.
    CapabilityUnavailable,
    /// Model or session setup failed, including download failure.
    CreateFailed,
    /// The call failed.
    InvokeFailed,
    /// The call succeeded but produced nothing usable.
    EmptyResult,
    /// Caller-side: input text too short or absent.  Never stored.
    InsufficientInput,
}

impl From<ProviderErrorKind> for ErrorKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::Unavailable => ErrorKind::CapabilityUnavailable,
            ProviderErrorKind::CreateFailed => ErrorKind::CreateFailed,
            ProviderErrorKind::InvokeFailed => ErrorKind::InvokeFailed,
            ProviderErrorKind::EmptyResult => ErrorKind::EmptyResult,
        }
    }
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// Typed view of one kind's fields in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub kind: JobKind,
    pub phase: Phase,
    /// Meaningful only while `phase == DownloadingModel`.
    pub progress_percent: Option<u8>,
    /// Output accumulated so far in the current run.
    pub partial_result: String,
    /// Set only when `phase == Succeeded`.
    pub final_result: Option<String>,
    /// Set only when `phase == Failed`.
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Parameters of the run that produced `final_result`.
    pub input_echo: Option<Value>,
    /// Store handle that accepted the current run, when persisted.
    pub owner: Option<String>,
}

impl JobRecord {
    /// A kind that has never run.
    pub fn idle(kind: JobKind) -> Self {
        Self {
            kind,
            phase: Phase::Idle,
            progress_percent: None,
            partial_result: String::new(),
            final_result: None,
            error_message: None,
            error_kind: None,
            input_echo: None,
            owner: None,
        }
    }

    /// Decode `kind`'s record from a store snapshot.
    pub fn from_state(kind: JobKind, state: &StoreState) -> Self {
        let get = |name: &str| state.get(&kind.key(name));
        let text = |name: &str| get(name).and_then(Value::as_str).map(str::to_string);

        Self {
            kind,
            phase: Phase::from_value(get(field::PHASE)),
            progress_percent: get(field::PROGRESS_PERCENT)
                .and_then(Value::as_u64)
                .map(|p| p.min(100) as u8),
            partial_result: text(field::PARTIAL_RESULT).unwrap_or_default(),
            final_result: text(field::FINAL_RESULT),
            error_message: text(field::ERROR_MESSAGE),
            error_kind: get(field::ERROR_KIND)
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok()),
            input_echo: get(field::INPUT_ECHO).cloned(),
            owner: text(field::OWNER),
        }
    }

    /// Just the phase of `kind` in `state`.
    pub fn phase_in(kind: JobKind, state: &StoreState) -> Phase {
        Phase::from_value(state.get(&kind.key(field::PHASE)))
    }
}

// ---------------------------------------------------------------------------
// JobPatch
// ---------------------------------------------------------------------------

/// Builds a store [`Patch`] touching only one kind's fields.
///
/// ```
/// use page_summarizer::job::{JobKind, JobPatch, JobRecord, Phase};
/// use page_summarizer::store::StateStore;
///
/// let store = StateStore::in_memory();
/// let change = store.merge_patch(
///     JobPatch::new(JobKind::Summarize)
///         .phase(Phase::Running)
///         .partial_result("Hello")
///         .into_patch(),
/// );
/// assert!(change.touches("summarize."));
/// assert_eq!(change.changes.len(), 2);
///
/// let record = JobRecord::from_state(JobKind::Summarize, &store.read_all());
/// assert_eq!(record.partial_result, "Hello");
/// ```
#[derive(Debug, Clone)]
pub struct JobPatch {
    kind: JobKind,
    patch: Patch,
}

impl JobPatch {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            patch: Patch::new(),
        }
    }

    fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.patch = self.patch.set(self.kind.key(name), value);
        self
    }

    fn unset(mut self, name: &str) -> Self {
        self.patch = self.patch.unset(self.kind.key(name));
        self
    }

    pub fn phase(self, phase: Phase) -> Self {
        self.set(field::PHASE, phase.as_str())
    }

    pub fn progress_percent(self, percent: u8) -> Self {
        self.set(field::PROGRESS_PERCENT, percent)
    }

    pub fn partial_result(self, text: &str) -> Self {
        self.set(field::PARTIAL_RESULT, text)
    }

    pub fn final_result(self, text: &str) -> Self {
        self.set(field::FINAL_RESULT, text)
    }

    pub fn error(self, kind: ErrorKind, message: &str) -> Self {
        let kind = serde_json::to_value(kind).unwrap_or(Value::Null);
        self.set(field::ERROR_KIND, kind)
            .set(field::ERROR_MESSAGE, message)
    }

    pub fn input_echo(self, echo: Value) -> Self {
        self.set(field::INPUT_ECHO, echo)
    }

    /// Record which store handle runs the job; `None` clears it.
    pub fn owner(self, owner: Option<&str>) -> Self {
        match owner {
            Some(id) => self.set(field::OWNER, id),
            None => self.unset(field::OWNER),
        }
    }

    /// Clear everything a previous run left behind, except the phase.
    pub fn reset_run(self) -> Self {
        self.partial_result("")
            .unset(field::PROGRESS_PERCENT)
            .unset(field::FINAL_RESULT)
            .unset(field::ERROR_MESSAGE)
            .unset(field::ERROR_KIND)
            .unset(field::INPUT_ECHO)
    }

    pub fn clear_progress(self) -> Self {
        self.unset(field::PROGRESS_PERCENT)
    }

    pub fn into_patch(self) -> Patch {
        self.patch
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
