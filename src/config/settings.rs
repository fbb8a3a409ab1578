//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::provider::{SummaryLength, SummaryType};

// ---------------------------------------------------------------------------
// ProviderBackend
// ---------------------------------------------------------------------------

/// Selects which model server backs the three capability providers.
///
/// | Variant          | Availability probe | Model download |
/// |------------------|--------------------|----------------|
/// | Ollama           | `GET /api/tags`    | `POST /api/pull` (streamed progress) |
/// | OpenAiCompatible | `GET /v1/models`   | not supported  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderBackend {
    /// Ollama running locally — no authentication required.
    Ollama,
    /// Any OpenAI-compatible REST API (OpenAI, Groq, LM Studio, vLLM …).
    OpenAiCompatible,
}

impl Default for ProviderBackend {
    fn default() -> Self {
        Self::Ollama
    }
}

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

/// Connection and model settings shared by the three providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Which backend speaks on `base_url`.
    pub backend: ProviderBackend,
    /// Base URL of the model server.
    ///
    /// - Ollama default: `http://localhost:11434`
    /// - OpenAI: `https://api.openai.com`
    pub base_url: String,
    /// API key — `None` for local servers.
    pub api_key: Option<String>,
    /// Model used for summarization.
    pub summarizer_model: String,
    /// Model used for language detection.
    pub detector_model: String,
    /// Model used for translation.
    pub translator_model: String,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Timeout in seconds.  Bounds probes and single-shot calls in total;
    /// for streamed completions and pulls it bounds the connect, and a
    /// streamed completion also fails after this long without data.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: ProviderBackend::default(),
            base_url: "http://localhost:11434".into(),
            api_key: None,
            summarizer_model: "qwen2.5:3b".into(),
            detector_model: "qwen2.5:3b".into(),
            translator_model: "qwen2.5:3b".into(),
            temperature: 0.3,
            timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

/// Job acceptance rules and pipeline switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Minimum number of characters (after whitespace normalization) a
    /// summarization input must have to be accepted.
    pub min_input_chars: usize,
    /// Automatically translate the latest summary into the detected language
    /// whenever a language-detection job succeeds.
    pub chain_translation: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_input_chars: 100,
            chain_translation: true,
        }
    }
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// Persistence settings for the shared job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Write every merge through to disk so job state survives restarts.
    pub persist: bool,
    /// Explicit store file.  `None` means `AppPaths::store_file`.
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            persist: true,
            path: None,
        }
    }
}

impl StoreConfig {
    /// The file the store should be opened from.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppPaths::new().store_file)
    }
}

// ---------------------------------------------------------------------------
// SummaryConfig
// ---------------------------------------------------------------------------

/// Defaults used when a summarization request does not name its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub default_type: SummaryType,
    pub default_length: SummaryLength,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            default_type: SummaryType::KeyPoints,
            default_length: SummaryLength::Medium,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use page_summarizer::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Job acceptance and chaining.
    pub orchestrator: OrchestratorConfig,
    /// Model server connection.
    pub provider: ProviderConfig,
    /// Job store persistence.
    pub store: StoreConfig,
    /// Summary defaults.
    pub summary: SummaryConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
