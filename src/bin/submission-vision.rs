//! CLI binary for submission-vision.
//!
//! A thin shim over the library crate: reads a submission record (and an
//! optional job payload) from JSON files, runs one extraction and prints the
//! Markdown. Exit codes follow `sysexits.h`: 65 for a permanent failure,
//! 75 for a transient one.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use submission_vision::{
    FailureClass, JobPayload, LlmProviderClient, OllamaClient, SubmissionRef, VisionClient,
    VisionConfig, VisionPipeline,
};
use tracing_subscriber::EnvFilter;

/// `EX_DATAERR`: the submission itself can never be processed.
const EXIT_PERMANENT: u8 = 65;
/// `EX_TEMPFAIL`: try again later.
const EXIT_TRANSIENT: u8 = 75;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract with settings from the environment
  submission-vision submission.json

  # Job payload overrides stored fields
  submission-vision submission.json --payload job.json

  # Local storage only, explicit model
  submission-vision --storage-root /srv/storage --model qwen2.5-vl:7b submission.json

  # JSON output with metadata
  submission-vision --json submission.json > result.json

ENVIRONMENT VARIABLES:
  STORAGE_VERIFY_ROOT          Sandbox root for local reads and derived artifacts
  SUPABASE_URL                 Object-storage base URL (enables remote fetch)
  SUPABASE_PUBLIC_URL          Public base URL of the same storage
  SUPABASE_SERVICE_ROLE_KEY    Storage service credential
  LEARNING_STORAGE_BUCKET      Bucket name (default: submissions)
  LEARNING_MAX_UPLOAD_BYTES    Remote fetch byte cap (default: 10485760)
  STORAGE_LOCAL_HOST_SUFFIXES  Comma-separated host suffixes allowed over http
  AI_VISION_MODEL              Vision model (default: qwen2.5-vl:7b)
  OLLAMA_BASE_URL              Ollama endpoint (default: http://ollama:11434)
  AI_TIMEOUT_VISION            Vision call timeout in seconds, 1-300 (default: 30)
  PDFIUM_LIB_PATH              Path to libpdfium or its directory

EXIT CODES:
  0   success
  65  permanent failure (unsupported_mime, path_escape, size_mismatch, ...)
  75  transient failure (image_unavailable, model_timeout, ...)
"#;

/// Extract Markdown from an image or scanned-PDF submission.
#[derive(Parser, Debug)]
#[command(
    name = "submission-vision",
    version,
    about = "Extract Markdown from image and scanned-PDF submissions with a vision model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Submission record (JSON).
    submission: PathBuf,

    /// Job payload (JSON) whose filled fields override the record.
    #[arg(long)]
    payload: Option<PathBuf>,

    /// Override STORAGE_VERIFY_ROOT.
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Override AI_VISION_MODEL.
    #[arg(long)]
    model: Option<String>,

    /// Override OLLAMA_BASE_URL.
    #[arg(long)]
    endpoint: Option<String>,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ...) instead
    /// of the native Ollama API.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Output structured JSON (text + metadata) instead of Markdown.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let client = build_client(&cli, &config)?;
    let pipeline = VisionPipeline::builder(config, client)
        .build()
        .context("Failed to assemble pipeline")?;

    let submission: SubmissionRef = read_json(&cli.submission).context("Failed to read submission")?;
    let payload: JobPayload = match cli.payload {
        Some(ref path) => read_json(path).context("Failed to read job payload")?,
        None => JobPayload::default(),
    };

    match pipeline.extract(&submission, &payload).await {
        Ok(result) => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            if cli.json {
                let json =
                    serde_json::to_string_pretty(&result).context("Failed to serialise output")?;
                writeln!(handle, "{json}").context("Failed to write to stdout")?;
            } else {
                handle
                    .write_all(result.text.as_bytes())
                    .context("Failed to write to stdout")?;
                if !result.text.ends_with('\n') {
                    handle.write_all(b"\n").ok();
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let class = e.class();
            eprintln!("error: {} ({})", e.reason(), class_name(class));
            Ok(ExitCode::from(match class {
                FailureClass::Permanent => EXIT_PERMANENT,
                FailureClass::Transient => EXIT_TRANSIENT,
            }))
        }
    }
}

/// Environment first, then CLI overrides.
fn build_config(cli: &Cli) -> Result<VisionConfig> {
    let config = VisionConfig::from_env().context("Invalid environment")?;
    let mut builder = config.into_builder();
    if let Some(ref root) = cli.storage_root {
        builder = builder.storage_root(root.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref endpoint) = cli.endpoint {
        builder = builder.model_endpoint(endpoint.clone());
    }
    builder.build().context("Invalid configuration")
}

fn build_client(cli: &Cli, config: &VisionConfig) -> Result<Arc<dyn VisionClient>> {
    match cli.provider.as_deref() {
        Some(name) if !name.eq_ignore_ascii_case("ollama") => {
            let client = LlmProviderClient::from_factory(name, &config.model)
                .with_context(|| format!("Failed to create provider '{name}'"))?;
            Ok(Arc::new(client))
        }
        _ => Ok(Arc::new(
            OllamaClient::from_config(config).context("Failed to create Ollama client")?,
        )),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn class_name(class: FailureClass) -> &'static str {
    match class {
        FailureClass::Transient => "transient",
        FailureClass::Permanent => "permanent",
    }
}
