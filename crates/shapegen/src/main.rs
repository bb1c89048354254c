//! Run the three-phase pipeline non-interactively and print the SHACL
//! document.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable. Logs go
//! to stderr (`RUST_LOG` overrides the level), the document to stdout or
//! `--output`.
//!
//! # Examples
//!
//! ```sh
//! # Basic run
//! shapegen --use-case "A Car has a name and an owner who is a Person."
//!
//! # Use case from a file, document to a file
//! shapegen --input use_case.txt --output shapes.ttl
//!
//! # Steer a phase with feedback and fail if the document does not conform
//! cat use_case.txt | shapegen --stdin \
//!   --property-feedback "Cars also need a vehicleIdentificationNumber." --strict
//! ```

use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use shapegen::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Generate SHACL shapes for a use case with an LLM.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "shapegen")]
struct Cli {
    // ── Input ──────────────────────────────────────────────────
    /// Use case text
    #[arg(long)]
    use_case: Option<String>,

    /// Read the use case from a file
    #[arg(long)]
    input: Option<PathBuf>,

    /// Read the use case from stdin
    #[arg(long)]
    stdin: bool,

    // ── Model settings ─────────────────────────────────────────
    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model identifier
    #[arg(long)]
    model: Option<String>,

    /// Sampling temperature (0.0 – 2.0)
    #[arg(long)]
    temperature: Option<f32>,

    /// Maximum tokens per completion
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Per-call timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Transport retries for transient provider errors
    #[arg(long)]
    retries: Option<u32>,

    /// OpenRouter-compatible API base URL
    #[arg(long)]
    base_url: Option<String>,

    // ── Feedback ───────────────────────────────────────────────
    /// Re-run entity extraction once with this note
    #[arg(long)]
    entity_feedback: Option<String>,

    /// Re-run property extraction once with this note
    #[arg(long)]
    property_feedback: Option<String>,

    /// Re-run document generation once with this note
    #[arg(long)]
    document_feedback: Option<String>,

    // ── Output ─────────────────────────────────────────────────
    /// Write the document here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Use the skeleton document when the model's Turtle does not parse
    #[arg(long)]
    fallback_skeleton: bool,

    /// Exit non-zero when the document does not conform
    #[arg(long)]
    strict: bool,
}

impl Cli {
    fn generator_config(&self) -> Result<GeneratorConfig, PipelineError> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::load(path)?,
            None => GeneratorConfig::default(),
        };
        if let Some(model) = &self.model {
            config = config.with_model(model);
        }
        if let Some(t) = self.temperature {
            config = config.with_temperature(t);
        }
        if let Some(n) = self.max_tokens {
            config = config.with_max_tokens(n);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout_secs(secs);
        }
        if let Some(n) = self.retries {
            config = config.with_retries(n);
        }
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url);
        }
        if self.fallback_skeleton {
            config = config.with_fallback_skeleton(true);
        }
        config.validate()?;
        Ok(config)
    }

    fn use_case(&self) -> Result<String, PipelineError> {
        let file_text = match &self.input {
            Some(path) => Some(std::fs::read_to_string(path)?),
            None => None,
        };
        let stdin_text = if self.stdin {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Some(buf)
        } else {
            None
        };

        let parts: Vec<String> = [self.use_case.clone(), file_text, stdin_text]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            return Err(PipelineError::Config(
                "provide --use-case, --input, or --stdin".to_string(),
            ));
        }
        Ok(parts.join("\n\n"))
    }
}

/// Run every phase and emit the document. Returns whether it conforms.
async fn run(cli: &Cli) -> Result<bool, PipelineError> {
    let config = cli.generator_config()?;
    let use_case = cli.use_case()?;

    let oracle = OpenRouterOracle::from_env(&config)?;
    let costs = oracle.costs();
    let mut session =
        Session::new(oracle, ShaclSyntaxValidator, &config).with_handler(LoggingHandler);

    session
        .dispatch_and_wait(Intent::SetInput(use_case))
        .await?;

    let feedback = [
        &cli.entity_feedback,
        &cli.property_feedback,
        &cli.document_feedback,
    ];
    for note in feedback {
        session.dispatch_and_wait(Intent::Advance).await?;
        if let Some(note) = note {
            session
                .dispatch_and_wait(Intent::GiveFeedback(note.clone()))
                .await?;
        }
    }

    let generated = session
        .controller()
        .document()
        .cloned()
        .ok_or_else(|| PipelineError::InvalidPhaseContext("no document was generated".into()))?;
    session.close();

    match &cli.output {
        Some(path) => {
            std::fs::write(path, generated.document.as_str())?;
            info!("Wrote {}", path.display());
        }
        None => print!("{}", generated.document),
    }

    if let Ok(costs) = costs.lock() {
        info!("Usage: {}", costs.summary());
    }

    for w in generated.warnings() {
        warn!("{w}");
    }
    Ok(generated.conforms())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(conforms) => {
            if cli.strict && !conforms {
                eprintln!("Error: document does not conform");
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
