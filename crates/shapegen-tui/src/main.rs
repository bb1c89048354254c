//! Interactive SHACL shape generation in the terminal.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Start idle and type the use case with [e]
//! shapegen-tui
//!
//! # Pre-fill the use case and choose where [w] writes the document
//! shapegen-tui --use-case "A Car has an owner who is a Person." --output car.ttl
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};

use clap::Parser;
use shapegen::prelude::*;
use shapegen::ui::{mark_stopped, set_use_case};
use shapegen_tui::{TuiConfig, spawn_tui};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Interactive SHACL shape generation.
#[derive(Parser)]
#[command(name = "shapegen-tui")]
struct Cli {
    /// Initial use case
    #[arg(long)]
    use_case: Option<String>,

    /// Read the initial use case from a file
    #[arg(long, conflicts_with = "use_case")]
    input: Option<PathBuf>,

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

    /// Where [w] writes the document
    #[arg(long, short, default_value = "shapes.ttl")]
    output: PathBuf,

    /// Use the skeleton document when the model's Turtle does not parse
    #[arg(long)]
    fallback_skeleton: bool,

    /// Show debug logs in the log pane
    #[arg(long, short)]
    verbose: bool,
}

fn generator_config(cli: &Cli) -> Result<GeneratorConfig, PipelineError> {
    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::load(path)?,
        None => GeneratorConfig::default(),
    };
    if let Some(model) = &cli.model {
        config = config.with_model(model);
    }
    if let Some(t) = cli.temperature {
        config = config.with_temperature(t);
    }
    if let Some(n) = cli.max_tokens {
        config = config.with_max_tokens(n);
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_timeout_secs(secs);
    }
    if let Some(n) = cli.retries {
        config = config.with_retries(n);
    }
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url);
    }
    if cli.fallback_skeleton {
        config = config.with_fallback_skeleton(true);
    }
    config.validate()?;
    Ok(config)
}

fn initial_use_case(cli: &Cli) -> Result<Option<String>, PipelineError> {
    match (&cli.use_case, &cli.input) {
        (Some(text), _) => Ok(Some(text.clone())),
        (None, Some(path)) => Ok(Some(std::fs::read_to_string(path)?.trim().to_string())),
        (None, None) => Ok(None),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match generator_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let use_case = match initial_use_case(&cli) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let oracle = match OpenRouterOracle::from_env(&config) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    // UI state shared between the session's event handler and the TUI.
    let ui_state = Arc::new(Mutex::new(UiState::new(&config.model)));

    // Tracing goes to the log pane, never to the terminal.
    let min_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let (tracing_layer, log_buffer) = UiTracingLayer::new(min_level);
    tracing_subscriber::registry().with(tracing_layer).init();

    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(UiEventHandler::new(ui_state.clone(), &config.model));
    let mut session = Session::new(oracle, ShaclSyntaxValidator, &config).with_handler(handler);

    let (intent_tx, intent_rx) = tokio::sync::mpsc::unbounded_channel();
    if let Some(use_case) = use_case {
        set_use_case(&ui_state, &use_case);
        let _ = intent_tx.send(Intent::SetInput(use_case));
    }

    let tui_config = TuiConfig {
        output_path: cli.output,
        log_buffer: Some(log_buffer),
    };
    let tui_handle = spawn_tui(ui_state.clone(), intent_tx, tui_config);

    session.run(intent_rx).await;
    mark_stopped(&ui_state);

    tui_handle.join().ok();
}
