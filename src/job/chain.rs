//! Detect → translate chain.
//!
//! Watches the store for a language detection that has just succeeded and
//! submits a translation of the latest summary into the detected language.
//!
//! ```text
//! detectLanguage.phase: * ──▶ Succeeded
//!        │  (store callback, reads snapshot)
//!        ▼
//!   Translate { input: summarize.finalResult, target: detected tag }
//!        │  (mpsc, outside the store's writer lock)
//!        ▼
//!   Orchestrator::submit
//! ```
//!
//! The trigger is computed inside the store callback so it sees the state
//! exactly as of the triggering commit.  The submission happens on a
//! separate task because callbacks must not merge synchronously.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::orchestrator::Orchestrator;
use super::record::{field, JobKind, JobRecord, Phase};
use super::request::JobRequest;
use crate::store::{StoreChange, StoreState, Subscription};

/// Running chain controller.  Dropping it stops the chain.
pub struct TranslationChain {
    subscription: Option<Subscription>,
    task: Option<JoinHandle<()>>,
}

impl TranslationChain {
    /// Start watching `orchestrator`'s store.
    pub fn spawn(orchestrator: Orchestrator) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobRequest>();

        let reader = orchestrator.store().clone();
        let subscription = orchestrator.store().subscribe(move |change| {
            if let Some(request) = translation_trigger(change, &reader.read_all()) {
                let _ = tx.send(request);
            }
        });

        let task = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let ack = orchestrator.submit(request);
                if ack.accepted {
                    log::info!("chain: translation submitted");
                } else {
                    log::warn!(
                        "chain: translation not started: {}",
                        ack.reason.unwrap_or_default()
                    );
                }
            }
            log::debug!("chain: stopped");
        });

        Self {
            subscription: Some(subscription),
            task: Some(task),
        }
    }

    /// Stop watching and wait until every trigger already seen has been
    /// submitted.
    pub async fn shutdown(mut self) {
        self.subscription.take();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("chain: task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for TranslationChain {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The translation `change` should trigger, if any.
///
/// Fires only on the commit that moves `detectLanguage.phase` into
/// `Succeeded`; rewrites of an already successful record do not count, and
/// neither do detections another store handle ran.
pub fn translation_trigger(change: &StoreChange, state: &StoreState) -> Option<JobRequest> {
    if change.external {
        return None;
    }
    let phase = change.get(&JobKind::DetectLanguage.key(field::PHASE))?;
    let succeeded = |value: Option<&serde_json::Value>| Phase::from_value(value) == Phase::Succeeded;
    if !succeeded(phase.new.as_ref()) || succeeded(phase.old.as_ref()) {
        return None;
    }

    let detected = JobRecord::from_state(JobKind::DetectLanguage, state);
    if detected.error_message.is_some() {
        return None;
    }
    let language = detected.final_result?;

    let summary = JobRecord::from_state(JobKind::Summarize, state)
        .final_result
        .filter(|s| !s.trim().is_empty());
    let Some(summary) = summary else {
        log::info!("chain: language detected ({language}) but no summary to translate");
        return None;
    };

    log::debug!("chain: translating summary into {language}");
    Some(JobRequest::translate(summary, language))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
