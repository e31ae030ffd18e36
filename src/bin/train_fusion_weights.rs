//! Fusion weight trainer for Glycofuse.
//!
//! Fits the retinal/lifestyle fusion weights on labelled model outputs and
//! writes a versioned `fusion_weights.json`. If a `manifest.json` sits next
//! to the output, its digest entry is refreshed.
//!
//! # Usage
//!
//! ```bash
//! train_fusion_weights --data validation.jsonl --output models/fusion_weights.json
//! train_fusion_weights --synthetic 1000 --seed 42
//! ```
//!
//! Each line of `--data` is one sample:
//! `{"retinal": 0.81, "lifestyle": 0.64, "label": 1}`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use glycofuse::adapters::artifact;
use glycofuse::application::weight_training::synthetic_samples;
use glycofuse::application::{TrainerConfig, TrainingSample, WeightTrainer};

#[derive(Parser)]
#[command(name = "train_fusion_weights")]
#[command(about = "Fit retinal/lifestyle fusion weights with k-fold validation")]
struct Cli {
    /// Labelled samples, one JSON object per line
    #[arg(short, long, conflicts_with = "synthetic")]
    data: Option<PathBuf>,

    /// Generate this many synthetic samples instead of reading --data
    #[arg(long)]
    synthetic: Option<usize>,

    /// Seed for the fold shuffle and synthetic data
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of cross-validation folds
    #[arg(short, long, default_value = "5")]
    folds: usize,

    /// L2 regularization strength
    #[arg(short, long, default_value = "0.001")]
    regularization: f64,

    /// Output artifact
    #[arg(short, long, default_value = "models/fusion_weights.json")]
    output: PathBuf,
}

fn read_samples(path: &Path) -> Result<Vec<TrainingSample>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("{}:{}", path.display(), i + 1))
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let samples = match (&cli.data, cli.synthetic) {
        (Some(path), _) => read_samples(path)?,
        (None, Some(n)) => {
            tracing::warn!("Training on {} synthetic samples (seed {})", n, cli.seed);
            synthetic_samples(n, cli.seed)
        }
        (None, None) => bail!("either --data or --synthetic is required"),
    };

    let trainer = WeightTrainer::new(TrainerConfig {
        regularization: cli.regularization,
        folds: cli.folds,
        seed: cli.seed,
        ..TrainerConfig::default()
    });
    let trained = trainer.train(&samples)?;

    if let Some(parent) = cli.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    artifact::write_json(&cli.output, &trained)?;

    if let Some(validation) = &trained.validation {
        println!(
            "Cross-validation: mean loss {:.6}, retinal weight std {:.4} over {} folds",
            validation.mean_validation_loss, validation.retinal_weight_std, validation.folds
        );
    }
    println!(
        "Wrote {} (retinal={:.4}, lifestyle={:.4})",
        cli.output.display(),
        trained.retinal_weight,
        trained.lifestyle_weight
    );
    Ok(())
}
