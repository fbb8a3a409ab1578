//! HTTP-backed providers talking to a local or remote model server.
//!
//! [`ApiProvider`] implements all three capabilities against the same server;
//! its [`ProviderKind`] selects the model, the prompt and whether the output
//! is streamed.  All connection details come from [`ProviderConfig`]; nothing
//! is hardcoded.
//!
//! | Step         | Ollama                     | OpenAI-compatible  |
//! |--------------|----------------------------|--------------------|
//! | availability | `GET /api/tags`            | `GET /v1/models`   |
//! | create       | `POST /api/pull` if absent | no download        |
//! | invoke       | `POST /v1/chat/completions` (both)              |
//!
//! Probes and single-shot completions run under the configured total
//! timeout.  Streamed completions and pulls only bound the connect; a stream
//! then fails when no bytes arrive for that long.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use super::adapter::{
    Availability, DownloadMonitor, Invocation, Provider, ProviderError, ProviderKind,
    ProviderSet, Session, TextStream,
};
use super::options::CreateOptions;
use super::prompt::PromptBuilder;
use super::wire::{parse_pull_line, parse_sse_line, LineBuffer, SseEvent};
use crate::config::{ProviderBackend, ProviderConfig};

// ---------------------------------------------------------------------------
// Model listing responses
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OpenAiModels {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Deserialize)]
struct OpenAiModel {
    id: String,
}

/// `true` when `wanted` names one of `installed`.  Ollama reports untagged
/// models with an implicit `:latest` suffix.
fn model_installed(installed: &[String], wanted: &str) -> bool {
    installed
        .iter()
        .any(|name| name == wanted || *name == format!("{wanted}:latest"))
}

/// Reduce a detector reply such as `"fr."` or `"Language: de"` to a bare tag.
pub fn normalize_language_tag(reply: &str) -> String {
    reply
        .split_whitespace()
        .last()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Server address and credentials shared by a provider and its sessions.
#[derive(Debug, Clone)]
struct Endpoint {
    base_url: String,
    api_key: Option<String>,
}

impl Endpoint {
    fn from_config(config: &ProviderConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach `Authorization: Bearer …` only when a non-empty key is configured.
    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }
}

// ---------------------------------------------------------------------------
// ApiProvider
// ---------------------------------------------------------------------------

/// One capability served by an Ollama or OpenAI-compatible server.
pub struct ApiProvider {
    kind: ProviderKind,
    endpoint: Endpoint,
    /// Client with the total request timeout, for probes and single-shot calls.
    client: reqwest::Client,
    /// Client bounding only the connect, for streamed completions and pulls.
    stream_client: reqwest::Client,
    /// Longest silence tolerated inside a streamed completion.
    idle_timeout: Duration,
    config: ProviderConfig,
    prompt_builder: PromptBuilder,
}

impl ApiProvider {
    /// Build a provider for `kind` from application config.
    ///
    /// A default (no-timeout) client is used as a last-resort fallback if a
    /// builder fails.
    pub fn from_config(kind: ProviderKind, config: &ProviderConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let stream_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            kind,
            endpoint: Endpoint::from_config(config),
            client,
            stream_client,
            idle_timeout: timeout,
            config: config.clone(),
            prompt_builder: PromptBuilder::new(),
        }
    }

    /// All three capabilities against the configured server.
    pub fn provider_set(config: &ProviderConfig) -> ProviderSet {
        use std::sync::Arc;
        ProviderSet::new(
            Arc::new(Self::from_config(ProviderKind::Summarizer, config)),
            Arc::new(Self::from_config(ProviderKind::LanguageDetector, config)),
            Arc::new(Self::from_config(ProviderKind::Translator, config)),
        )
    }

    fn model(&self) -> &str {
        match self.kind {
            ProviderKind::Summarizer => &self.config.summarizer_model,
            ProviderKind::LanguageDetector => &self.config.detector_model,
            ProviderKind::Translator => &self.config.translator_model,
        }
    }

    /// Names of the models the server currently has.
    async fn list_models(&self) -> Result<Vec<String>, reqwest::Error> {
        match self.config.backend {
            ProviderBackend::Ollama => {
                let tags: OllamaTags = self
                    .endpoint
                    .authorize(self.client.get(self.endpoint.url("/api/tags")))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                Ok(tags.models.into_iter().map(|m| m.name).collect())
            }
            ProviderBackend::OpenAiCompatible => {
                let models: OpenAiModels = self
                    .endpoint
                    .authorize(self.client.get(self.endpoint.url("/v1/models")))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                Ok(models.data.into_iter().map(|m| m.id).collect())
            }
        }
    }

    /// Stream an Ollama model pull, reporting per-layer progress.
    async fn pull_model(&self, monitor: &DownloadMonitor) -> Result<(), ProviderError> {
        let model = self.model();
        log::info!("provider: pulling model {model} for {}", self.kind);

        let body = serde_json::json!({ "model": model, "name": model, "stream": true });
        let response = self
            .endpoint
            .authorize(self.stream_client.post(self.endpoint.url("/api/pull")).json(&body))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProviderError::create_failed(format!("model download failed: {e}")))?;

        let mut lines = LineBuffer::new();
        let mut bytes = response.bytes_stream();
        let mut succeeded = false;

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| {
                ProviderError::create_failed(format!("model download interrupted: {e}"))
            })?;
            for line in lines.push(&chunk) {
                succeeded |= self.handle_pull_line(&line, monitor)?;
            }
        }
        if let Some(tail) = lines.finish() {
            succeeded |= self.handle_pull_line(&tail, monitor)?;
        }

        if succeeded {
            Ok(())
        } else {
            Err(ProviderError::create_failed(format!(
                "model download of {model} ended without success"
            )))
        }
    }

    fn handle_pull_line(&self, line: &str, monitor: &DownloadMonitor) -> Result<bool, ProviderError> {
        let Some(status) = parse_pull_line(line).map_err(ProviderError::create_failed)? else {
            return Ok(false);
        };
        if let Some(err) = status.error {
            return Err(ProviderError::create_failed(format!(
                "model download failed: {err}"
            )));
        }
        if let Some(fraction) = status.fraction() {
            monitor.report(fraction);
        }
        Ok(status.is_success())
    }
}

#[async_trait]
impl Provider for ApiProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn availability(&self, _options: &CreateOptions) -> Result<Availability, ProviderError> {
        let installed = match self.list_models().await {
            Ok(models) => models,
            Err(e) => {
                log::warn!("provider: {} probe failed: {e}", self.kind);
                return Ok(Availability::Unavailable);
            }
        };

        let availability = if model_installed(&installed, self.model()) {
            Availability::Available
        } else if self.config.backend == ProviderBackend::Ollama {
            Availability::Downloadable
        } else {
            Availability::Unavailable
        };
        log::debug!(
            "provider: {} model {} is {:?}",
            self.kind,
            self.model(),
            availability
        );
        Ok(availability)
    }

    async fn create(
        &self,
        options: &CreateOptions,
        monitor: DownloadMonitor,
    ) -> Result<Box<dyn Session>, ProviderError> {
        if self.config.backend == ProviderBackend::Ollama {
            let installed = self
                .list_models()
                .await
                .map_err(|e| ProviderError::create_failed(format!("model server unreachable: {e}")))?;
            if !model_installed(&installed, self.model()) {
                self.pull_model(&monitor).await?;
            }
        }

        let (system_msg, _) = self.prompt_builder.build_chat(options, "");
        let streams = self.kind == ProviderKind::Summarizer;
        Ok(Box::new(ApiSession {
            kind: self.kind,
            client: if streams {
                self.stream_client.clone()
            } else {
                self.client.clone()
            },
            endpoint: self.endpoint.clone(),
            idle_timeout: self.idle_timeout,
            model: self.model().to_string(),
            temperature: self.config.temperature,
            system_msg,
        }))
    }
}

// ---------------------------------------------------------------------------
// ApiSession
// ---------------------------------------------------------------------------

/// A configured chat-completions call for one capability.
struct ApiSession {
    kind: ProviderKind,
    client: reqwest::Client,
    endpoint: Endpoint,
    idle_timeout: Duration,
    model: String,
    temperature: f32,
    system_msg: String,
}

impl ApiSession {
    fn streams(&self) -> bool {
        self.kind == ProviderKind::Summarizer
    }

    async fn send(&self, input: &str) -> Result<reqwest::Response, ProviderError> {
        let body = serde_json::json!({
            "model":       self.model,
            "messages": [
                { "role": "system", "content": self.system_msg },
                { "role": "user",   "content": input           }
            ],
            "stream":      self.streams(),
            "temperature": self.temperature
        });

        let req = self
            .endpoint
            .authorize(self.client.post(self.endpoint.url("/v1/chat/completions")))
            .json(&body);
        let timed_out =
            || ProviderError::invoke_failed(format!("{} request timed out", self.kind));

        tokio::time::timeout(self.idle_timeout, req.send())
            .await
            .map_err(|_| timed_out())?
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                if e.is_timeout() {
                    timed_out()
                } else {
                    ProviderError::invoke_failed(format!("{} request failed: {e}", self.kind))
                }
            })
    }
}

/// Decode a streamed chat completion into text deltas.
///
/// Fails with `InvokeFailed` when the body errors or stays silent for longer
/// than `idle`; there is no bound on the total duration.
fn sse_text_stream<S, B, E>(bytes: S, idle: Duration) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut lines = LineBuffer::new();
        let mut bytes = Box::pin(bytes);

        'read: loop {
            let chunk = match tokio::time::timeout(idle, bytes.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => {
                    yield Err(ProviderError::invoke_failed(format!("stream interrupted: {e}")));
                    break 'read;
                }
                Ok(None) => break 'read,
                Err(_) => {
                    yield Err(ProviderError::invoke_failed(format!(
                        "stream stalled: no data for {idle:?}"
                    )));
                    break 'read;
                }
            };
            for line in lines.push(chunk.as_ref()) {
                match parse_sse_line(&line) {
                    Ok(SseEvent::Delta(text)) if !text.is_empty() => yield Ok(text),
                    Ok(SseEvent::Done) => break 'read,
                    Ok(_) => {}
                    Err(e) => {
                        yield Err(ProviderError::invoke_failed(e));
                        break 'read;
                    }
                }
            }
        }
    })
}

#[async_trait]
impl Session for ApiSession {
    async fn invoke(&self, input: &str) -> Result<Invocation, ProviderError> {
        let response = self.send(input).await?;

        if self.streams() {
            return Ok(Invocation::Streaming(sse_text_stream(
                response.bytes_stream(),
                self.idle_timeout,
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            ProviderError::invoke_failed(format!("failed to parse {} response: {e}", self.kind))
        })?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        let text = match self.kind {
            ProviderKind::LanguageDetector => normalize_language_tag(&text),
            _ => text,
        };
        Ok(Invocation::Complete(text))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
