//! Score a single conversation for end-of-utterance probability
//!
//! Reads a JSON array of `{"role": "user"|"assistant", "content": "..."}`
//! from a file or stdin and prints the probability that the last turn is
//! complete.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use eou_engine::{Backend, ChatTurn, DetectionConfig, EouDetector, Settings};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// End-of-utterance scorer
#[derive(Parser, Debug)]
#[command(name = "eou-score")]
#[command(about = "Score whether the last chat turn is complete", long_about = None)]
struct Cli {
    /// Conversation JSON file (reads stdin when omitted or "-")
    input: Option<PathBuf>,

    /// Model variant id (e.g. turn-detector-q8)
    #[arg(long)]
    model: Option<String>,

    /// Direct ONNX file path (overrides --model)
    #[arg(long)]
    onnx: Option<PathBuf>,

    /// Path to tokenizer.json (required when using --onnx)
    #[arg(long)]
    tokenizer_json: Option<PathBuf>,

    /// Settings file (defaults to the user config, then built-in defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Completion threshold (overrides the configured value)
    #[arg(long)]
    threshold: Option<f64>,

    /// Print a JSON object instead of the bare probability
    #[arg(long)]
    json: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct ScoreOutput<'a> {
    model: &'a str,
    probability: f64,
    threshold: f64,
    complete: bool,
}

fn read_conversation(input: Option<&PathBuf>) -> Result<Vec<ChatTurn>> {
    let data = match input {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    serde_json::from_str(&data).context("Failed to parse conversation JSON")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "eou_score=debug,eou_engine=debug"
    } else {
        "eou_score=info,eou_engine=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::load().context("Failed to load settings")?,
    };
    if let Some(variant) = &cli.model {
        settings.model.variant = Some(variant.clone());
    }
    if let Some(threshold) = cli.threshold {
        settings.detection.threshold = threshold;
    }
    settings.validate()?;

    let backend = match (&cli.onnx, &cli.tokenizer_json) {
        (Some(onnx), Some(tokenizer)) => Backend::from_paths(onnx, tokenizer)?,
        (Some(_), None) => anyhow::bail!("--tokenizer-json is required when using --onnx"),
        (None, Some(_)) => anyhow::bail!("--onnx is required when using --tokenizer-json"),
        (None, None) => Backend::from_settings(&settings)?,
    };
    tracing::info!("Model: {}", backend.onnx_path().display());
    tracing::info!("Tokenizer: {}", backend.tokenizer_json_path().display());

    let detector = EouDetector::with_config(backend, DetectionConfig::from_settings(&settings))
        .context("Failed to load model")?;

    let turns = read_conversation(cli.input.as_ref())?;
    let prediction = detector.predict(&turns)?;

    if cli.json {
        let output = ScoreOutput {
            model: detector.model_display_name(),
            probability: prediction.probability,
            threshold: prediction.threshold,
            complete: prediction.is_complete(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{:.4}", prediction.probability);
    }

    Ok(())
}
