//! Background jobs: one state machine per [`JobKind`], driven by the
//! [`Orchestrator`] and recorded in the shared store.
//!
//! | Kind             | Provider          | Streams | Parameters              |
//! |------------------|-------------------|---------|-------------------------|
//! | `summarize`      | summarizer        | yes     | summary type and length |
//! | `detectLanguage` | language detector | no      | none                    |
//! | `translate`      | translator        | no      | target language tag     |
//!
//! At most one job per kind is in flight; a second request for a busy kind
//! is rejected with a reason.  [`TranslationChain`] links a successful
//! detection to a translation of the latest summary.

pub mod chain;
pub mod orchestrator;
pub mod record;
pub mod request;

pub use chain::{translation_trigger, TranslationChain};
pub use orchestrator::{AcceptedJob, Orchestrator};
pub use record::{field, ErrorKind, JobKind, JobPatch, JobRecord, Phase};
pub use request::{is_plausible_language_tag, Ack, JobParameters, JobRequest, Rejection};
