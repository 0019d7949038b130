//! Evaluate end-of-utterance scoring on a labelled conversation set
//!
//! The dataset is a JSON array of
//! `{"id": "...", "turns": [{"role", "content"}, ...], "complete": true|false}`
//! where `complete` says whether the last turn is a finished utterance.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use eou_engine::{Backend, ChatTurn, DetectionConfig, EouDetector, EouError, Settings};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// End-of-utterance evaluation
#[derive(Parser)]
#[command(name = "eou-eval")]
struct Cli {
    /// Path to the labelled dataset (JSON array)
    dataset: PathBuf,

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

    /// Save detailed results to JSON
    #[arg(long)]
    output: Option<PathBuf>,

    /// Show only summary
    #[arg(long)]
    quiet: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,
}

/// A single labelled conversation
#[derive(Debug, Deserialize)]
struct EvalItem {
    #[serde(default)]
    id: Option<String>,
    turns: Vec<ChatTurn>,
    complete: bool,
}

/// Result for a single evaluation item
#[derive(Debug, Serialize)]
struct ItemResult {
    id: String,
    probability: f64,
    expected: bool,
    predicted: bool,
    correct: bool,
}

/// Overall evaluation metrics
#[derive(Debug, Serialize)]
struct Metrics {
    threshold: f64,
    num_examples: usize,
    skipped: usize,
    accuracy: f64,
    precision: f64,
    recall: f64,
    f1: f64,
    mean_probability_complete: f64,
    mean_probability_incomplete: f64,
    results: Vec<ItemResult>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 { num as f64 / den as f64 } else { 0.0 }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n > 0 { sum / n as f64 } else { 0.0 }
}

fn compute_metrics(threshold: f64, skipped: usize, results: Vec<ItemResult>) -> Metrics {
    let tp = results.iter().filter(|r| r.expected && r.predicted).count();
    let fp = results.iter().filter(|r| !r.expected && r.predicted).count();
    let fn_ = results.iter().filter(|r| r.expected && !r.predicted).count();
    let correct = results.iter().filter(|r| r.correct).count();

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Metrics {
        threshold,
        num_examples: results.len(),
        skipped,
        accuracy: ratio(correct, results.len()),
        precision,
        recall,
        f1,
        mean_probability_complete: mean(
            results.iter().filter(|r| r.expected).map(|r| r.probability),
        ),
        mean_probability_incomplete: mean(
            results.iter().filter(|r| !r.expected).map(|r| r.probability),
        ),
        results,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "eou_eval=debug,eou_engine=debug"
    } else {
        "eou_eval=info,eou_engine=info"
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

    // Load model
    let backend = match (&cli.onnx, &cli.tokenizer_json) {
        (Some(onnx), Some(tokenizer)) => Backend::from_paths(onnx, tokenizer)?,
        (Some(_), None) => anyhow::bail!("--tokenizer-json is required when using --onnx"),
        (None, Some(_)) => anyhow::bail!("--onnx is required when using --tokenizer-json"),
        (None, None) => Backend::from_settings(&settings)?,
    };
    eprintln!("Loading model from {}...", backend.onnx_path().display());
    let detector = EouDetector::with_config(backend, DetectionConfig::from_settings(&settings))
        .context("Failed to load model")?;
    let threshold = detector.config().threshold;

    // Load dataset
    eprintln!("Loading dataset from {}...", cli.dataset.display());
    let data = std::fs::read_to_string(&cli.dataset)
        .with_context(|| format!("Failed to read {}", cli.dataset.display()))?;
    let items: Vec<EvalItem> =
        serde_json::from_str(&data).context("Failed to parse evaluation dataset")?;
    eprintln!("Loaded {} examples", items.len());

    let pb = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(items.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")?
                .progress_chars("=>-"),
        );
        pb
    };

    let mut results: Vec<ItemResult> = Vec::with_capacity(items.len());
    let mut skipped = 0usize;

    for (idx, item) in items.iter().enumerate() {
        let id = item.id.clone().unwrap_or_else(|| (idx + 1).to_string());
        pb.inc(1);

        let probability = match detector.score(&item.turns) {
            Ok(p) => p,
            Err(EouError::EmptyConversation) => {
                tracing::warn!("Skipping example {}: no content after normalization", id);
                skipped += 1;
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to score example {}", id));
            }
        };

        let predicted = probability >= threshold;
        results.push(ItemResult {
            id,
            probability,
            expected: item.complete,
            predicted,
            correct: predicted == item.complete,
        });
    }

    pb.finish_and_clear();

    let metrics = compute_metrics(threshold, skipped, results);

    // Print summary
    println!("{}", "=".repeat(50));
    println!("Evaluation Results");
    println!("{}", "=".repeat(50));
    println!("Number of examples: {}", metrics.num_examples);
    println!("Skipped:            {}", metrics.skipped);
    println!("Threshold:          {:.4}", metrics.threshold);
    println!("{}", "-".repeat(50));
    println!("Accuracy:           {:.2}%", metrics.accuracy * 100.0);
    println!("Precision:          {:.2}%", metrics.precision * 100.0);
    println!("Recall:             {:.2}%", metrics.recall * 100.0);
    println!("F1:                 {:.4}", metrics.f1);
    println!("{}", "-".repeat(50));
    println!(
        "Mean P(eou) complete:   {:.4}",
        metrics.mean_probability_complete
    );
    println!(
        "Mean P(eou) incomplete: {:.4}",
        metrics.mean_probability_incomplete
    );
    println!("{}", "=".repeat(50));

    // Save detailed results if requested
    if let Some(output_path) = &cli.output {
        let json = serde_json::to_string_pretty(&metrics)?;
        std::fs::write(output_path, &json)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        eprintln!("Detailed results saved to {}", output_path.display());
    }

    Ok(())
}
