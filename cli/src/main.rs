//! caselog CLI - scanner and suggestion front end.
//!
//! ```text
//! caselog scan <image>                      read a barcode or patient identifier off a photo
//! caselog suggest <query> [--history FILE]  procedure-name suggestions
//! ```
//!
//! Logs go to `~/.caselog/logs/caselog.log` (`RUST_LOG` controls the filter).

mod still;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::time::Instant;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use caselog_capture::{
    CaptureSession, DecodingBackendSelector, ExclusiveCamera, NoFeedback, ScanStatus,
    SessionEvent, SoftwareProbe, VideoFrame,
};
use caselog_config::CaselogConfig;
use caselog_suggest::SuggestionAggregator;
use caselog_types::{CaptureState, ProcedureRecord, SuggestionOrigin, SuggestionSet};
use caselog_vision::{CircuitBreaker, DisableReason, VisionClient};

use crate::still::StillImageCamera;

#[derive(Parser)]
#[command(name = "caselog", version)]
#[command(about = "Patient identifier scanning and procedure suggestions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read an identifier from an image file: on-device barcode decoding
    /// first, then remote vision.
    Scan {
        /// Photo of a wristband, label or chart.
        image: PathBuf,
    },
    /// Suggest procedure names for a partial query.
    Suggest {
        query: String,
        /// JSON array of prior procedure records.
        #[arg(long)]
        history: Option<PathBuf>,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!("Failed to create log dir {}: {e}", parent.display()));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!("Failed to open log file {}: {e}", candidate.display()));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // ~/.caselog/logs/caselog.log
    if let Some(dir) = caselog_config::config_dir() {
        candidates.push(dir.join("logs").join("caselog.log"));
    }

    candidates.push(PathBuf::from(".caselog").join("logs").join("caselog.log"));

    candidates
}

fn vision_client(config: &CaselogConfig) -> Result<Arc<VisionClient>> {
    let breaker = Arc::new(CircuitBreaker::new());
    if !config.vision_enabled() {
        breaker.disable(DisableReason::Configured);
    }
    let client = VisionClient::new(config.vision_config(), breaker)
        .context("failed to build HTTP client")?;
    Ok(Arc::new(client))
}

/// Decode ticks given to the on-device decoder before asking remote vision.
const LOCAL_DECODE_TICKS: u32 = 3;

async fn scan(config: &CaselogConfig, image_path: &Path) -> Result<()> {
    let image = image::open(image_path)
        .with_context(|| format!("failed to read image {}", image_path.display()))?;
    let frame = VideoFrame::from_image(&image);
    let remote = vision_client(config)?;
    let scanner_config = config.scanner_config();
    let local_window = scanner_config.tick_interval * LOCAL_DECODE_TICKS;

    let camera = Arc::new(ExclusiveCamera::new(Arc::new(StillImageCamera::new(frame))));
    let selector = DecodingBackendSelector::new().with_software(Arc::new(SoftwareProbe::new()));
    let session = CaptureSession::new(
        camera,
        selector,
        remote.clone(),
        Arc::new(NoFeedback),
        scanner_config,
    );
    let (handle, mut events) = session.start(|id| {
        tracing::info!(source = %id.source(), "Identifier acquired");
    });

    // Set once scanning starts; cleared when the manual capture is sent.
    let mut capture_due: Option<Instant> = None;
    let mut requested = false;
    loop {
        let deadline = capture_due.unwrap_or_else(Instant::now);
        let event = tokio::select! {
            event = events.recv() => event,
            () = tokio::time::sleep_until(deadline), if capture_due.is_some() => {
                capture_due = None;
                requested = handle.capture();
                continue;
            }
        };
        let Some(event) = event else { break };
        match event {
            SessionEvent::State(CaptureState::Scanning) if !requested && capture_due.is_none() => {
                capture_due = Some(Instant::now() + local_window);
            }
            SessionEvent::Status(ScanStatus::ManualOnly) if !requested => {
                capture_due = None;
                requested = handle.capture();
            }
            SessionEvent::Status(status) => {
                if !status.is_error() {
                    eprintln!("{status}");
                    continue;
                }
                handle.cancel();
                let snapshot = remote.shared_breaker().snapshot();
                if !snapshot.is_closed() {
                    eprintln!(
                        "vision service: disabled={:?}, cooldown={}s",
                        snapshot.disabled, snapshot.cooldown_remaining_secs
                    );
                }
                bail!("{status}");
            }
            SessionEvent::Acquired(id) => {
                println!("{}", id.raw_value());
                return Ok(());
            }
            SessionEvent::Failed(err) => return Err(err.into()),
            _ => {}
        }
    }
    bail!("scan session ended without a result")
}

fn load_history(path: &Path) -> Result<Vec<ProcedureRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read history {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid history file {}", path.display()))
}

fn print_suggestions(set: &SuggestionSet) {
    if set.is_empty() {
        println!("(no suggestions)");
        return;
    }
    for item in set.items() {
        let label = match item.origin {
            SuggestionOrigin::Local => "frequent",
            SuggestionOrigin::Remote => "ai",
        };
        println!("{:<40} [{label}]", item.text);
    }
}

async fn suggest(config: &CaselogConfig, query: &str, history: Option<&Path>) -> Result<()> {
    let records = match history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    let suggestion_config = config.suggestion_config();
    let vision_config = config.vision_config();
    let wait_limit =
        suggestion_config.debounce + vision_config.request_timeout + Duration::from_secs(1);

    let aggregator = SuggestionAggregator::new(vision_client(config)?, suggestion_config);
    aggregator.rebuild_index(&records);
    let mut updates = aggregator.subscribe();

    let local = aggregator.on_input(query);
    updates.borrow_and_update();
    if !aggregator.is_fetching() {
        print_suggestions(&local);
        return Ok(());
    }

    let settled = tokio::time::timeout(wait_limit, async {
        while aggregator.is_fetching() {
            tokio::select! {
                _ = updates.changed() => {}
                () = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
        }
    })
    .await;
    if settled.is_err() {
        tracing::warn!("Timed out waiting for remote suggestions");
    }
    print_suggestions(&aggregator.get_suggestions(query));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = match CaselogConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("warning: {e}; using defaults");
            CaselogConfig::default()
        }
    };

    match cli.command {
        Command::Scan { image } => scan(&config, &image).await,
        Command::Suggest { query, history } => {
            suggest(&config, &query, history.as_deref()).await
        }
    }
}
