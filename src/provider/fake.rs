//! Scripted test double for [`Provider`] — no network, fully deterministic.
//!
//! Each [`ScriptedProvider`] replays a fixed script: an availability answer,
//! a list of download-progress fractions reported during `create`, and an
//! invocation outcome.  Every call is appended to a shared log so tests can
//! assert on what the orchestrator actually asked for.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::adapter::{
    Availability, DownloadMonitor, Invocation, Provider, ProviderError, ProviderKind, Session,
};
use super::options::CreateOptions;

/// What `invoke` should produce.
#[derive(Clone)]
pub enum ScriptedOutput {
    Complete(String),
    Stream(Vec<Result<String, ProviderError>>),
    Fail(ProviderError),
}

/// Shared record of the calls a scripted provider received.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct ScriptedProvider {
    kind: ProviderKind,
    availability: Result<Availability, ProviderError>,
    download: Vec<f64>,
    create_error: Option<ProviderError>,
    output: ScriptedOutput,
    gate: Option<Arc<Semaphore>>,
    calls: CallLog,
}

impl ScriptedProvider {
    pub fn completing(kind: ProviderKind, text: &str) -> Self {
        Self::with_output(kind, ScriptedOutput::Complete(text.to_string()))
    }

    pub fn streaming(kind: ProviderKind, chunks: &[&str]) -> Self {
        let chunks = chunks.iter().map(|c| Ok(c.to_string())).collect();
        Self::with_output(kind, ScriptedOutput::Stream(chunks))
    }

    pub fn with_output(kind: ProviderKind, output: ScriptedOutput) -> Self {
        Self {
            kind,
            availability: Ok(Availability::Available),
            download: Vec::new(),
            create_error: None,
            output,
            gate: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn availability(mut self, availability: Availability) -> Self {
        self.availability = Ok(availability);
        self
    }

    pub fn availability_error(mut self, err: ProviderError) -> Self {
        self.availability = Err(err);
        self
    }

    /// Report these fractions from `create`, in order.
    pub fn download(mut self, fractions: &[f64]) -> Self {
        self.download = fractions.to_vec();
        self
    }

    pub fn create_error(mut self, err: ProviderError) -> Self {
        self.create_error = Some(err);
        self
    }

    /// Hold `availability` until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn call_log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn availability(&self, options: &CreateOptions) -> Result<Availability, ProviderError> {
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
        self.record(format!("availability:{options:?}"));
        self.availability.clone()
    }

    async fn create(
        &self,
        options: &CreateOptions,
        monitor: DownloadMonitor,
    ) -> Result<Box<dyn Session>, ProviderError> {
        self.record(format!("create:{options:?}"));
        for fraction in &self.download {
            monitor.report(*fraction);
            tokio::task::yield_now().await;
        }
        if let Some(err) = &self.create_error {
            return Err(err.clone());
        }
        Ok(Box::new(ScriptedSession {
            output: self.output.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct ScriptedSession {
    output: ScriptedOutput,
    calls: CallLog,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn invoke(&self, input: &str) -> Result<Invocation, ProviderError> {
        self.calls.lock().unwrap().push(format!("invoke:{input}"));
        match &self.output {
            ScriptedOutput::Complete(text) => Ok(Invocation::Complete(text.clone())),
            ScriptedOutput::Stream(chunks) => Ok(Invocation::Streaming(Box::pin(
                futures_util::stream::iter(chunks.clone()),
            ))),
            ScriptedOutput::Fail(err) => Err(err.clone()),
        }
    }
}
