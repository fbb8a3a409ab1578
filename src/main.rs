//! Application entry point — page summarizer CLI.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse arguments and load [`AppConfig`] (defaults on first run).
//! 3. Open the job store (persistent unless disabled) and fail any job a
//!    previous process left in flight.
//! 4. Build the providers ([`ApiProvider`]) and the [`Orchestrator`].
//! 5. Start the detect → translate [`TranslationChain`] when enabled.
//! 6. Read the page text and run summarize, then detect language.
//! 7. Wait for the chained translation and print every result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::mpsc;

use page_summarizer::{
    config::{AppConfig, StoreConfig},
    extract::{require_min_length, FilePageSource, PageSource},
    job::{field, JobKind, JobRecord, JobRequest, Orchestrator, Phase, TranslationChain},
    provider::{ApiProvider, SummaryLength, SummaryOptions, SummaryType},
    render::{render_result, StatusLine},
    store::{StateStore, StoreChange, Subscription},
};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(
    name = "page-summarizer",
    version,
    about = "Summarize page text, detect its language and translate the summary"
)]
struct Cli {
    /// Text file holding the page content.  Reads stdin when omitted.
    input: Option<PathBuf>,

    /// Summary type: tldr, teaser, key-points or headline.
    #[arg(long = "type", value_parser = parse_summary_type)]
    summary_type: Option<SummaryType>,

    /// Summary length: short, medium or long.
    #[arg(long, value_parser = parse_summary_length)]
    length: Option<SummaryLength>,

    /// Skip language detection (and therefore translation).
    #[arg(long)]
    no_detect: bool,

    /// Do not translate the summary after detection.
    #[arg(long)]
    no_chain: bool,

    /// Settings file to use instead of the platform default.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep job state in memory only.
    #[arg(long)]
    in_memory: bool,
}

fn parse_summary_type(name: &str) -> Result<SummaryType, String> {
    SummaryType::parse(name).ok_or_else(|| {
        format!("unknown summary type {name:?} (expected tldr, teaser, key-points or headline)")
    })
}

fn parse_summary_length(name: &str) -> Result<SummaryLength, String> {
    SummaryLength::parse(name)
        .ok_or_else(|| format!("unknown summary length {name:?} (expected short, medium or long)"))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_store(config: &StoreConfig, in_memory: bool) -> StateStore {
    if in_memory || !config.persist {
        return StateStore::in_memory();
    }
    let path = config.resolved_path();
    match StateStore::open(&path) {
        Ok(store) => {
            log::info!("Job store: {}", path.display());
            store
        }
        Err(e) => {
            log::warn!(
                "Could not open job store {} ({e}); keeping state in memory",
                path.display()
            );
            StateStore::in_memory()
        }
    }
}

/// Print a job's status line whenever a change to its record alters it.
fn print_status(store: &StateStore) -> Subscription {
    let reader = store.clone();
    let shown: Mutex<HashMap<JobKind, String>> = Mutex::new(HashMap::new());
    store.subscribe(move |change| {
        let state = reader.read_all();
        let mut shown = shown.lock().unwrap_or_else(|e| e.into_inner());
        for kind in JobKind::ALL {
            if !change.touches(&format!("{}.", kind.prefix())) {
                continue;
            }
            let line = StatusLine::from_record(&JobRecord::from_state(kind, &state));
            if line.text.is_empty() || shown.get(&kind) == Some(&line.text) {
                continue;
            }
            eprintln!("[{kind}] {line}");
            shown.insert(kind, line.text);
        }
    })
}

fn print_result(title: &str, record: &JobRecord) {
    if let Some(text) = render_result(record) {
        println!("── {title} ──\n{text}\n");
    }
}

/// Wait for the translation the chain started, if it started one.
///
/// `changes` must have been subscribed before detection ran and the chain
/// must already be shut down, so every trigger it saw is in the channel.
async fn wait_for_translation(
    orchestrator: &Orchestrator,
    changes: &mut mpsc::UnboundedReceiver<StoreChange>,
) -> Option<JobRecord> {
    let key = JobKind::Translate.key(field::PHASE);
    let phase_of = |change: &StoreChange| {
        change
            .get(&key)
            .map(|f| Phase::from_value(f.new.as_ref()))
    };

    let mut started = false;
    while let Ok(change) = changes.try_recv() {
        match phase_of(&change) {
            Some(Phase::Initializing) => started = true,
            Some(p) if started && p.is_terminal() => {
                return Some(orchestrator.record(JobKind::Translate));
            }
            _ => {}
        }
    }
    if !started {
        return None;
    }

    while let Some(change) = changes.recv().await {
        if phase_of(&change).is_some_and(|p| p.is_terminal()) {
            return Some(orchestrator.record(JobKind::Translate));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Arguments + configuration
    let cli = Cli::parse();
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    log::info!("Page summarizer starting up");

    // 3. Store
    let store = open_store(&config.store, cli.in_memory);

    // 4. Providers + orchestrator
    let orchestrator = Orchestrator::new(
        store.clone(),
        ApiProvider::provider_set(&config.provider),
        config.orchestrator.clone(),
    );
    orchestrator.recover_interrupted();
    let _status = print_status(&store);

    // 5. Chain
    let chain = (config.orchestrator.chain_translation && !cli.no_chain && !cli.no_detect)
        .then(|| TranslationChain::spawn(orchestrator.clone()));

    // 6. Page text → summarize → detect
    let source = match &cli.input {
        Some(path) => FilePageSource::file(path),
        None => FilePageSource::stdin(),
    };
    let text = source.page_text().await.context("could not read page text")?;
    require_min_length(&text, config.orchestrator.min_input_chars)?;

    let options = SummaryOptions::new(
        cli.summary_type.unwrap_or(config.summary.default_type),
        cli.length.unwrap_or(config.summary.default_length),
    );
    let summary = orchestrator
        .run(JobRequest::summarize(text.clone(), options))
        .await?;
    print_result("Summary", &summary);
    if summary.phase != Phase::Succeeded {
        bail!(
            "summarization failed: {}",
            summary.error_message.unwrap_or_default()
        );
    }

    if cli.no_detect {
        return Ok(());
    }

    let (_watch, mut changes) = store.subscribe_channel();
    let detected = orchestrator.run(JobRequest::detect_language(text)).await?;
    print_result("Detected language", &detected);

    // 7. Chained translation
    if let Some(chain) = chain {
        chain.shutdown().await;
        if let Some(translated) = wait_for_translation(&orchestrator, &mut changes).await {
            print_result("Translation", &translated);
        }
    }
    Ok(())
}
