//! Job orchestrator — drives one provider call per job and commits every
//! step to the store.
//!
//! # Job flow
//!
//! ```text
//! accept(request)
//!   └─▶ validate, single-flight check      [Initializing, committed synchronously]
//! drive()
//!   ├─▶ provider.availability()
//!   │     └─ Unavailable → Failed(CapabilityUnavailable)
//!   ├─▶ provider.create(monitor)           [Initializing]
//!   │     └─ each download event           [DownloadingModel, progressPercent]
//!   ├─▶ session.invoke(input)              [Running]
//!   │     └─ each streamed chunk           [Running, partialResult += chunk]
//!   ├─ non-blank output                    [Succeeded, finalResult, inputEcho]
//!   └─ blank output / any error            [Failed, errorKind, errorMessage]
//! ```
//!
//! Every accepted job ends in exactly one terminal commit; errors never
//! escape [`AcceptedJob::drive`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use tokio::task::JoinHandle;

use serde_json::Value;

use super::record::{field, ErrorKind, JobKind, JobPatch, JobRecord, Phase};
use super::request::{Ack, JobRequest, Rejection};
use crate::config::OrchestratorConfig;
use crate::provider::{
    Availability, CreateOptions, DownloadMonitor, DownloadProgress, Invocation, Provider,
    ProviderError, ProviderSet, Session,
};
use crate::store::StateStore;

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs jobs against a [`ProviderSet`], recording progress in a [`StateStore`].
///
/// Cheap to clone; clones share the store and providers.  Several
/// orchestrators may share one store; the single-flight check goes through
/// the store, not through the orchestrator.
///
/// ```rust,no_run
/// use page_summarizer::config::AppConfig;
/// use page_summarizer::job::{JobRequest, Orchestrator};
/// use page_summarizer::provider::{ApiProvider, SummaryOptions, SummaryLength, SummaryType};
/// use page_summarizer::store::StateStore;
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let orchestrator = Orchestrator::new(
///     StateStore::in_memory(),
///     ApiProvider::provider_set(&config.provider),
///     config.orchestrator.clone(),
/// );
///
/// let options = SummaryOptions::new(SummaryType::Tldr, SummaryLength::Short);
/// let ack = orchestrator.submit(JobRequest::summarize("…page text…", options));
/// assert!(ack.accepted || ack.reason.is_some());
/// # }
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    store: StateStore,
    providers: ProviderSet,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(store: StateStore, providers: ProviderSet, config: OrchestratorConfig) -> Self {
        Self {
            store,
            providers,
            config,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Current record of `kind`.
    pub fn record(&self, kind: JobKind) -> JobRecord {
        JobRecord::from_state(kind, &self.store.read_all())
    }

    /// Fail every in-flight job whose store handle is gone.
    ///
    /// Call once after opening a persisted store, before accepting work;
    /// otherwise a crashed run would keep its kind busy forever.  Jobs run
    /// by a handle that is still open, here or in another process, are left
    /// alone.  Returns the kinds that were recovered.
    pub fn recover_interrupted(&self) -> Vec<JobKind> {
        let mut recovered = Vec::new();
        for kind in JobKind::ALL {
            let failed = JobPatch::new(kind)
                .phase(Phase::Failed)
                .error(ErrorKind::InvokeFailed, "interrupted before completion")
                .clear_progress()
                .into_patch();
            let change = self.store.merge_patch_if(
                |state| {
                    let owner_alive = state
                        .get(&kind.key(field::OWNER))
                        .and_then(Value::as_str)
                        .is_some_and(|owner| self.store.is_owner_alive(owner));
                    JobRecord::phase_in(kind, state).is_in_flight() && !owner_alive
                },
                failed,
            );
            if change.is_some() {
                log::warn!("orchestrator: {kind} job was interrupted; marked failed");
                recovered.push(kind);
            }
        }
        recovered
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate `request` and claim its kind.
    ///
    /// On success the `Initializing` record is already committed when this
    /// returns; nothing asynchronous has happened yet.  On rejection nothing
    /// is written.
    pub fn accept(&self, request: JobRequest) -> Result<AcceptedJob, Rejection> {
        request.validate(self.config.min_input_chars)?;

        let kind = request.kind;
        let initial = JobPatch::new(kind)
            .phase(Phase::Initializing)
            .reset_run()
            .owner(self.store.owner_id())
            .into_patch();

        self.store
            .merge_patch_if(
                |state| !JobRecord::phase_in(kind, state).is_in_flight(),
                initial,
            )
            .ok_or(Rejection::AlreadyInFlight(kind))?;

        log::info!(
            "orchestrator: accepted {kind} job ({} chars)",
            request.input_text.len()
        );
        Ok(AcceptedJob {
            orchestrator: self.clone(),
            request,
        })
    }

    /// Accept `request` and drive it on a tokio task.
    pub fn spawn(&self, request: JobRequest) -> Result<JoinHandle<JobRecord>, Rejection> {
        let job = self.accept(request)?;
        Ok(tokio::spawn(job.drive()))
    }

    /// Fire-and-forget submission.  The [`Ack`] only says whether the job
    /// started; its outcome arrives through the store.
    pub fn submit(&self, request: JobRequest) -> Ack {
        let kind = request.kind;
        match self.spawn(request) {
            Ok(_) => Ack::accepted(),
            Err(rejection) => {
                log::warn!("orchestrator: rejected {kind} job: {rejection}");
                Ack::rejected(&rejection)
            }
        }
    }

    /// Accept `request` and drive it to completion on the current task.
    pub async fn run(&self, request: JobRequest) -> Result<JobRecord, Rejection> {
        Ok(self.accept(request)?.drive().await)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    fn commit(&self, patch: JobPatch) {
        self.store.merge_patch(patch.into_patch());
    }

    /// Everything between acceptance and the terminal commit.
    async fn execute(&self, request: &JobRequest) -> Result<String, ProviderError> {
        let kind = request.kind;
        let provider = self.providers.get(kind.provider_kind());
        let options = request.parameters.create_options();

        match provider.availability(&options).await? {
            Availability::Unavailable => {
                return Err(ProviderError::unavailable(format!(
                    "{} capability unavailable",
                    provider.kind()
                )));
            }
            Availability::Downloadable => {
                log::info!("orchestrator: {kind} model must be downloaded first");
            }
            Availability::Available => {}
        }

        self.commit(JobPatch::new(kind).phase(Phase::Initializing));
        let session = self.create_session(kind, provider, &options).await?;

        self.commit(JobPatch::new(kind).phase(Phase::Running).clear_progress());
        log::debug!("orchestrator: {kind} invoking provider");

        let output = match session.invoke(&request.input_text).await? {
            Invocation::Complete(text) => text,
            Invocation::Streaming(mut chunks) => {
                let mut partial = String::new();
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk?;
                    if chunk.is_empty() {
                        continue;
                    }
                    partial.push_str(&chunk);
                    self.commit(
                        JobPatch::new(kind)
                            .phase(Phase::Running)
                            .partial_result(&partial),
                    );
                }
                partial
            }
        };

        if output.trim().is_empty() {
            return Err(ProviderError::empty_result(format!(
                "the {} produced no output",
                provider.kind()
            )));
        }
        Ok(output)
    }

    /// Run `provider.create` while committing its download progress.
    ///
    /// Progress events are handled as they arrive, before the create result,
    /// and any still queued when `create` resolves are committed in order.
    async fn create_session(
        &self,
        kind: JobKind,
        provider: &Arc<dyn Provider>,
        options: &CreateOptions,
    ) -> Result<Box<dyn Session>, ProviderError> {
        let (monitor, mut progress) = DownloadMonitor::channel();
        let mut create = provider.create(options, monitor);

        let result = loop {
            tokio::select! {
                biased;
                Some(event) = progress.recv() => self.commit_progress(kind, event),
                result = &mut create => break result,
            }
        };

        while let Ok(event) = progress.try_recv() {
            self.commit_progress(kind, event);
        }
        result
    }

    fn commit_progress(&self, kind: JobKind, event: DownloadProgress) {
        let percent = event.percent();
        log::debug!("orchestrator: {kind} model download {percent}%");
        self.commit(
            JobPatch::new(kind)
                .phase(Phase::DownloadingModel)
                .progress_percent(percent),
        );
    }
}

// ---------------------------------------------------------------------------
// AcceptedJob
// ---------------------------------------------------------------------------

/// A job whose `Initializing` record is committed and which must now be
/// driven to a terminal state.
pub struct AcceptedJob {
    orchestrator: Orchestrator,
    request: JobRequest,
}

impl AcceptedJob {
    pub fn kind(&self) -> JobKind {
        self.request.kind
    }

    /// Drive the job and commit exactly one terminal record.
    ///
    /// A panicking provider is reported as an `InvokeFailed` failure rather
    /// than leaving the kind stuck in flight.
    pub async fn drive(self) -> JobRecord {
        let kind = self.request.kind;
        let outcome = AssertUnwindSafe(self.orchestrator.execute(&self.request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::invoke_failed(format!(
                    "{kind} provider panicked"
                )))
            });

        let terminal = match outcome {
            Ok(output) => {
                log::info!("orchestrator: {kind} succeeded ({} chars)", output.len());
                JobPatch::new(kind)
                    .phase(Phase::Succeeded)
                    .partial_result(&output)
                    .final_result(&output)
                    .input_echo(self.request.parameters.echo())
                    .clear_progress()
            }
            Err(err) => {
                log::error!("orchestrator: {kind} failed: {err}");
                JobPatch::new(kind)
                    .phase(Phase::Failed)
                    .error(ErrorKind::from(err.kind), &err.message)
                    .clear_progress()
            }
        };

        let (_, record) = self
            .orchestrator
            .store
            .merge_patch_and_read(terminal.into_patch(), |state| {
                JobRecord::from_state(kind, state)
            });
        record
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::{ScriptedOutput, ScriptedProvider};
    use crate::provider::{ProviderKind, SummaryLength, SummaryOptions, SummaryType};
    use crate::store::StoreChange;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::{mpsc, Semaphore};

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn article() -> String {
        "The city council approved a new plan for public transport on Monday. ".repeat(9)
    }

    fn tldr_short() -> SummaryOptions {
        SummaryOptions::new(SummaryType::Tldr, SummaryLength::Short)
    }

    fn orchestrator_on(store: StateStore, summarizer: ScriptedProvider) -> Orchestrator {
        let providers = ProviderSet::new(
            Arc::new(summarizer),
            Arc::new(ScriptedProvider::completing(ProviderKind::LanguageDetector, "en")),
            Arc::new(ScriptedProvider::completing(ProviderKind::Translator, "translated")),
        );
        Orchestrator::new(store, providers, OrchestratorConfig::default())
    }

    fn orchestrator_with(summarizer: ScriptedProvider) -> Orchestrator {
        orchestrator_on(StateStore::in_memory(), summarizer)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StoreChange>) -> Vec<StoreChange> {
        let mut changes = Vec::new();
        while let Ok(change) = rx.try_recv() {
            changes.push(change);
        }
        changes
    }

    fn new_values(changes: &[StoreChange], key: &str) -> Vec<Value> {
        changes
            .iter()
            .filter_map(|c| c.get(key))
            .filter_map(|f| f.new.clone())
            .collect()
    }

    fn phases(changes: &[StoreChange], kind: JobKind) -> Vec<Value> {
        new_values(changes, &kind.key("phase"))
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn first_commit_is_initializing_before_provider_resolves() {
        let gate = Arc::new(Semaphore::new(0));
        let summarizer = ScriptedProvider::streaming(ProviderKind::Summarizer, &["Summary."])
            .gated(Arc::clone(&gate));
        let calls = summarizer.call_log();
        let orc = orchestrator_with(summarizer);
        let (_sub, mut rx) = orc.store().subscribe_channel();

        let handle = orc
            .spawn(JobRequest::summarize(article(), tldr_short()))
            .expect("accepted");

        let first = drain(&mut rx);
        assert_eq!(first.len(), 1);
        assert_eq!(phases(&first, JobKind::Summarize), vec![json!("Initializing")]);
        assert!(calls.lock().unwrap().is_empty());

        gate.add_permits(1);
        let record = handle.await.unwrap();
        assert_eq!(record.phase, Phase::Succeeded);
    }

    #[tokio::test]
    async fn streamed_chunks_accumulate_in_order() {
        let orc = orchestrator_with(ScriptedProvider::streaming(
            ProviderKind::Summarizer,
            &["Hello", " world"],
        ));
        let (_sub, mut rx) = orc.store().subscribe_channel();

        let record = orc
            .run(JobRequest::summarize(article(), tldr_short()))
            .await
            .unwrap();

        let partials: Vec<Value> = new_values(&drain(&mut rx), "summarize.partialResult")
            .into_iter()
            .filter(|v| v != &json!(""))
            .collect();
        assert_eq!(partials, vec![json!("Hello"), json!("Hello world")]);
        assert_eq!(record.final_result.as_deref(), Some("Hello world"));
    }

    #[tokio::test]
    async fn unavailable_fails_without_download_or_running() {
        let summarizer = ScriptedProvider::streaming(ProviderKind::Summarizer, &["never"])
            .availability(Availability::Unavailable)
            .download(&[0.5]);
        let calls = summarizer.call_log();
        let orc = orchestrator_with(summarizer);
        let (_sub, mut rx) = orc.store().subscribe_channel();

        let record = orc
            .run(JobRequest::summarize(article(), tldr_short()))
            .await
            .unwrap();

        let seen = phases(&drain(&mut rx), JobKind::Summarize);
        assert!(!seen.contains(&json!("DownloadingModel")));
        assert!(!seen.contains(&json!("Running")));
        assert_eq!(record.phase, Phase::Failed);
        assert_eq!(record.error_kind, Some(ErrorKind::CapabilityUnavailable));
        assert_eq!(
            record.error_message.as_deref(),
            Some("summarizer capability unavailable")
        );
        assert!(calls.lock().unwrap().iter().all(|c| !c.starts_with("create")));
    }

    #[tokio::test]
    async fn availability_error_is_a_single_failed_commit() {
        let summarizer = ScriptedProvider::streaming(ProviderKind::Summarizer, &["never"])
            .availability_error(ProviderError::unavailable("model server refused the connection"));
        let calls = summarizer.call_log();
        let orc = orchestrator_with(summarizer);
        let (_sub, mut rx) = orc.store().subscribe_channel();

        let record = orc
            .run(JobRequest::summarize(article(), tldr_short()))
            .await
            .unwrap();

        assert_eq!(
            phases(&drain(&mut rx), JobKind::Summarize),
            vec![json!("Initializing"), json!("Failed")]
        );
        assert_eq!(record.error_kind, Some(ErrorKind::CapabilityUnavailable));
        assert_eq!(
            record.error_message.as_deref(),
            Some("model server refused the connection")
        );
        assert!(calls.lock().unwrap().iter().all(|c| !c.starts_with("create")));
    }

    #[tokio::test]
    async fn invoke_error_fails_after_running() {
        let output = ScriptedOutput::Fail(ProviderError::invoke_failed("model crashed"));
        let orc = orchestrator_with(ScriptedProvider::with_output(ProviderKind::Summarizer, output));
        let (_sub, mut rx) = orc.store().subscribe_channel();

        let record = orc
            .run(JobRequest::summarize(article(), tldr_short()))
            .await
            .unwrap();

        assert_eq!(
            phases(&drain(&mut rx), JobKind::Summarize),
            vec![json!("Initializing"), json!("Running"), json!("Failed")]
        );
        assert_eq!(record.error_kind, Some(ErrorKind::InvokeFailed));
        assert_eq!(record.error_message.as_deref(), Some("model crashed"));
        assert_eq!(record.partial_result, "");
        assert!(record.final_result.is_none());
    }

    #[tokio::test]
    async fn blank_result_is_empty_result_failure() {
        let orc = orchestrator_with(ScriptedProvider::completing(
            ProviderKind::Summarizer,
            "  \n ",
        ));
        let record = orc
            .run(JobRequest::summarize(article(), tldr_short()))
            .await
            .unwrap();
        assert_eq!(record.phase, Phase::Failed);
        assert_eq!(record.error_kind, Some(ErrorKind::EmptyResult));
        assert!(record.final_result.is_none());
    }

    #[tokio::test]
    async fn empty_stream_is_empty_result_failure() {
        let orc = orchestrator_with(ScriptedProvider::streaming(ProviderKind::Summarizer, &[]));
        let record = orc
            .run(JobRequest::summarize(article(), tldr_short()))
            .await
            .unwrap();
        assert_eq!(record.error_kind, Some(ErrorKind::EmptyResult));
    }

    #[tokio::test]
    async fn tldr_short_article_succeeds_with_echo() {
        let orc = orchestrator_with(ScriptedProvider::streaming(
            ProviderKind::Summarizer,
            &["The council ", "approved a transport plan."],
        ));
        let text = "a".repeat(600);

        let record = orc
            .run(JobRequest::summarize(text, tldr_short()))
            .await
            .unwrap();

        assert_eq!(record.phase, Phase::Succeeded);
        assert!(!record.final_result.as_deref().unwrap_or("").is_empty());
        assert_eq!(record.input_echo, Some(json!({"type": "tldr", "length": "short"})));
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn download_progress_is_committed() {
        let summarizer = ScriptedProvider::streaming(ProviderKind::Summarizer, &["done"])
            .availability(Availability::Downloadable)
            .download(&[0.1, 0.5, 0.5, 1.0]);
        let orc = orchestrator_with(summarizer);
        let (_sub, mut rx) = orc.store().subscribe_channel();

        let record = orc
            .run(JobRequest::summarize(article(), tldr_short()))
            .await
            .unwrap();

        let changes = drain(&mut rx);
        assert_eq!(
            new_values(&changes, "summarize.progressPercent"),
            vec![json!(10), json!(50), json!(100)]
        );
        assert_eq!(
            phases(&changes, JobKind::Summarize),
            vec![
                json!("Initializing"),
                json!("DownloadingModel"),
                json!("Running"),
                json!("Succeeded")
            ]
        );
        assert_eq!(record.progress_percent, None);
    }

    #[tokio::test]
    async fn create_failure_is_recorded() {
        let summarizer = ScriptedProvider::streaming(ProviderKind::Summarizer, &["x"])
            .download(&[0.3])
            .create_error(ProviderError::create_failed("disk full"));
        let orc = orchestrator_with(summarizer);

        let record = orc
            .run(JobRequest::summarize(article(), tldr_short()))
            .await
            .unwrap();
        assert_eq!(record.phase, Phase::Failed);
        assert_eq!(record.error_kind, Some(ErrorKind::CreateFailed));
        assert_eq!(record.error_message.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn stream_error_keeps_partial_and_fails() {
        let output = ScriptedOutput::Stream(vec![
            Ok("Hello".into()),
            Err(ProviderError::invoke_failed("connection reset")),
            Ok(" never".into()),
        ]);
        let orc = orchestrator_with(ScriptedProvider::with_output(ProviderKind::Summarizer, output));

        let record = orc
            .run(JobRequest::summarize(article(), tldr_short()))
            .await
            .unwrap();
        assert_eq!(record.phase, Phase::Failed);
        assert_eq!(record.error_kind, Some(ErrorKind::InvokeFailed));
        assert_eq!(record.partial_result, "Hello");
        assert!(record.final_result.is_none());
    }

    #[tokio::test]
    async fn second_request_while_in_flight_is_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let orc = orchestrator_with(
            ScriptedProvider::streaming(ProviderKind::Summarizer, &["ok"]).gated(Arc::clone(&gate)),
        );

        let handle = orc
            .spawn(JobRequest::summarize(article(), tldr_short()))
            .unwrap();
        let ack = orc.submit(JobRequest::summarize(article(), tldr_short()));
        assert!(!ack.accepted);
        assert_eq!(
            ack.reason.as_deref(),
            Some("A summarize job is already in progress")
        );

        gate.add_permits(2);
        handle.await.unwrap();

        let again = orc.run(JobRequest::summarize(article(), tldr_short())).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn other_kinds_are_not_blocked_by_an_in_flight_job() {
        let gate = Arc::new(Semaphore::new(0));
        let orc = orchestrator_with(
            ScriptedProvider::streaming(ProviderKind::Summarizer, &["ok"]).gated(Arc::clone(&gate)),
        );

        let handle = orc
            .spawn(JobRequest::summarize(article(), tldr_short()))
            .unwrap();
        let detected = orc
            .run(JobRequest::detect_language("Guten Morgen"))
            .await
            .unwrap();
        assert_eq!(detected.final_result.as_deref(), Some("en"));

        gate.add_permits(1);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn insufficient_input_never_touches_the_store() {
        let orc = orchestrator_with(ScriptedProvider::streaming(ProviderKind::Summarizer, &["x"]));
        let (_sub, mut rx) = orc.store().subscribe_channel();

        let ack = orc.submit(JobRequest::summarize("short page", tldr_short()));

        assert!(!ack.accepted);
        assert!(ack.reason.unwrap().starts_with("Not enough content"));
        assert!(drain(&mut rx).is_empty());
        assert!(orc.store().read_all().is_empty());
    }

    #[tokio::test]
    async fn new_run_clears_previous_outcome() {
        let orc = orchestrator_with(ScriptedProvider::completing(ProviderKind::Summarizer, " "));
        let failed = orc
            .run(JobRequest::summarize(article(), tldr_short()))
            .await
            .unwrap();
        assert_eq!(failed.phase, Phase::Failed);

        let job = orc
            .accept(JobRequest::summarize(article(), tldr_short()))
            .unwrap();
        let fresh = orc.record(JobKind::Summarize);
        assert_eq!(fresh.phase, Phase::Initializing);
        assert!(fresh.error_message.is_none());
        assert!(fresh.error_kind.is_none());
        assert_eq!(fresh.partial_result, "");
        job.drive().await;
    }

    #[tokio::test]
    async fn single_shot_result_is_final_and_partial() {
        let orc = orchestrator_with(ScriptedProvider::streaming(ProviderKind::Summarizer, &["x"]));
        let record = orc
            .run(JobRequest::translate("Hello", "fr"))
            .await
            .unwrap();
        assert_eq!(record.phase, Phase::Succeeded);
        assert_eq!(record.final_result.as_deref(), Some("translated"));
        assert_eq!(record.partial_result, "translated");
        assert_eq!(record.input_echo, Some(json!({"targetLanguage": "fr"})));
    }

    struct PanickingProvider;

    #[async_trait]
    impl Provider for PanickingProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::LanguageDetector
        }

        async fn availability(&self, _: &CreateOptions) -> Result<Availability, ProviderError> {
            panic!("probe exploded");
        }

        async fn create(
            &self,
            _: &CreateOptions,
            _: DownloadMonitor,
        ) -> Result<Box<dyn Session>, ProviderError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn panicking_provider_still_ends_in_failed() {
        let providers = ProviderSet::new(
            Arc::new(ScriptedProvider::completing(ProviderKind::Summarizer, "s")),
            Arc::new(PanickingProvider),
            Arc::new(ScriptedProvider::completing(ProviderKind::Translator, "t")),
        );
        let orc = Orchestrator::new(
            StateStore::in_memory(),
            providers,
            OrchestratorConfig::default(),
        );

        let record = orc
            .run(JobRequest::detect_language("Bonjour"))
            .await
            .unwrap();
        assert_eq!(record.phase, Phase::Failed);
        assert_eq!(record.error_kind, Some(ErrorKind::InvokeFailed));
    }

    #[tokio::test]
    async fn interrupted_jobs_are_failed_on_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        {
            let store = StateStore::open(&path).unwrap();
            store.merge_patch(
                JobPatch::new(JobKind::Translate)
                    .phase(Phase::Running)
                    .partial_result("Bonj")
                    .into_patch(),
            );
        }

        let providers = ProviderSet::new(
            Arc::new(ScriptedProvider::completing(ProviderKind::Summarizer, "s")),
            Arc::new(ScriptedProvider::completing(ProviderKind::LanguageDetector, "fr")),
            Arc::new(ScriptedProvider::completing(ProviderKind::Translator, "Bonjour")),
        );
        let orc = Orchestrator::new(
            StateStore::open(&path).unwrap(),
            providers,
            OrchestratorConfig::default(),
        );

        assert_eq!(orc.recover_interrupted(), vec![JobKind::Translate]);
        let record = orc.record(JobKind::Translate);
        assert_eq!(record.phase, Phase::Failed);
        assert_eq!(record.partial_result, "Bonj");
        assert!(orc.recover_interrupted().is_empty());

        let again = orc.run(JobRequest::translate("Hello", "fr")).await.unwrap();
        assert_eq!(again.phase, Phase::Succeeded);
    }

    #[tokio::test]
    async fn orchestrators_sharing_a_store_share_single_flight() {
        let gate = Arc::new(Semaphore::new(0));
        let first = orchestrator_with(
            ScriptedProvider::streaming(ProviderKind::Summarizer, &["ok"]).gated(Arc::clone(&gate)),
        );
        let second = Orchestrator::new(
            first.store().clone(),
            first.providers.clone(),
            OrchestratorConfig::default(),
        );

        let handle = first
            .spawn(JobRequest::summarize(article(), tldr_short()))
            .unwrap();
        assert_eq!(
            second
                .accept(JobRequest::summarize(article(), tldr_short()))
                .err(),
            Some(Rejection::AlreadyInFlight(JobKind::Summarize))
        );

        gate.add_permits(1);
        handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn returned_record_is_the_runs_own_terminal_state() {
        const RUNS: usize = 20;
        let orc = orchestrator_with(ScriptedProvider::completing(ProviderKind::Summarizer, "done"));

        // Accept the next run the moment the previous one commits its result.
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let _sub = orc.store().subscribe(move |change| {
            let phase = change.get("summarize.phase").and_then(|f| f.new.clone());
            if phase == Some(json!("Succeeded")) {
                let _ = done_tx.send(());
            }
        });
        let (job_tx, mut job_rx) = mpsc::unbounded_channel();
        let racer = orc.clone();
        let accepter = std::thread::spawn(move || {
            for _ in 0..RUNS {
                if done_rx.recv().is_err() {
                    return;
                }
                let job = racer
                    .accept(JobRequest::summarize(article(), tldr_short()))
                    .expect("previous run is terminal");
                if job_tx.send(job).is_err() {
                    return;
                }
            }
        });

        let mut record = orc
            .run(JobRequest::summarize(article(), tldr_short()))
            .await
            .unwrap();
        for _ in 0..RUNS {
            assert_eq!(record.phase, Phase::Succeeded);
            assert_eq!(record.final_result.as_deref(), Some("done"));
            let job = job_rx.recv().await.unwrap();
            record = job.drive().await;
        }
        assert_eq!(record.phase, Phase::Succeeded);
        accepter.join().unwrap();
    }

    #[tokio::test]
    async fn accepted_job_records_its_store_handle() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("jobs.json")).unwrap();
        let owner = store.owner_id().map(str::to_string);
        let orc = orchestrator_on(store, ScriptedProvider::completing(ProviderKind::Summarizer, "s"));

        let job = orc
            .accept(JobRequest::summarize(article(), tldr_short()))
            .unwrap();
        assert!(owner.is_some());
        assert_eq!(orc.record(JobKind::Summarize).owner, owner);

        let record = job.drive().await;
        assert_eq!(record.owner, owner);
    }

    #[tokio::test]
    async fn recovery_leaves_jobs_of_open_handles_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let gate = Arc::new(Semaphore::new(0));
        let running = orchestrator_on(
            StateStore::open(&path).unwrap(),
            ScriptedProvider::streaming(ProviderKind::Summarizer, &["ok"]).gated(Arc::clone(&gate)),
        );
        let handle = running
            .spawn(JobRequest::summarize(article(), tldr_short()))
            .unwrap();

        let other = orchestrator_on(
            StateStore::open(&path).unwrap(),
            ScriptedProvider::completing(ProviderKind::Summarizer, "s"),
        );
        assert!(other.recover_interrupted().is_empty());
        assert_eq!(
            other
                .accept(JobRequest::summarize(article(), tldr_short()))
                .err(),
            Some(Rejection::AlreadyInFlight(JobKind::Summarize))
        );

        gate.add_permits(1);
        assert_eq!(handle.await.unwrap().phase, Phase::Succeeded);
    }

    #[tokio::test]
    async fn recovery_fails_jobs_whose_handle_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        {
            let abandoned = orchestrator_on(
                StateStore::open(&path).unwrap(),
                ScriptedProvider::completing(ProviderKind::Summarizer, "s"),
            );
            let job = abandoned
                .accept(JobRequest::summarize(article(), tldr_short()))
                .unwrap();
            drop(job);
        }

        let orc = orchestrator_on(
            StateStore::open(&path).unwrap(),
            ScriptedProvider::completing(ProviderKind::Summarizer, "s"),
        );
        assert_eq!(orc.recover_interrupted(), vec![JobKind::Summarize]);
        assert_eq!(orc.record(JobKind::Summarize).phase, Phase::Failed);
    }
}
