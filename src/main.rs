//! Glycofuse: diabetes-risk analysis from a retinal image and a lifestyle record.
//!
//! Main entry point for the command-line application. Results are printed to
//! stdout as JSON; logs go to stderr or a file.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use glycofuse::adapters::artifact;
use glycofuse::adapters::lifestyle::GradientBoostedModel;
use glycofuse::adapters::llm::{ChatCompletionAdvisor, RuleBasedAdvisor, WithRetry};
use glycofuse::adapters::retinal::{validate_image, RetinalHeadModel};
use glycofuse::adapters::sanitize::SanitizingMakeWriter;
use glycofuse::adapters::sqlite::SqliteStore;
use glycofuse::application::{AnalysisContext, AnalysisService, HistoryService};
use glycofuse::config::{llm_api_key, AppConfig};
use glycofuse::domain::{FusionWeights, PlanType};
use glycofuse::ports::AdviceGenerator;
use glycofuse::{GlycofuseError, LifestyleFeatures};

/// Exit status for rejected input.
const EXIT_INVALID_INPUT: i32 = 2;

#[derive(Parser)]
#[command(name = "glycofuse")]
#[command(version)]
#[command(about = "Fuse retinal and lifestyle diabetes risk", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Model directory (overrides GLYCOFUSE_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Fusion weights artifact (overrides GLYCOFUSE_FUSION_WEIGHTS)
    #[arg(long, global = true)]
    weights: Option<PathBuf>,

    /// SQLite database (overrides GLYCOFUSE_DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a complete analysis
    Analyze {
        /// Lifestyle record as JSON, or '-' for stdin
        #[arg(short, long)]
        features: PathBuf,

        /// Retinal fundus image (JPEG or PNG)
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Add what-if scenarios for this plan
        #[arg(short, long)]
        plan: Option<PlanType>,

        /// Store the report under this user id
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Project risk under lifestyle plans
    Simulate {
        /// Lifestyle record as JSON, or '-' for stdin
        #[arg(short, long)]
        features: PathBuf,

        /// Plan to simulate (all plans if omitted)
        #[arg(short, long)]
        plan: Option<PlanType>,

        /// Retinal risk held fixed during the projection
        #[arg(long, default_value = "0.0")]
        retinal_risk: f64,
    },

    /// Check a fundus image against the quality gate
    ValidateImage {
        /// Image file
        image: PathBuf,
    },

    /// Show stored analyses for a user
    History {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Page size
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Page offset
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Print the trend summary instead of reports
        #[arg(long)]
        summary: bool,
    },
}

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // stdout carries JSON results, so logs default to stderr.
    let log_mode = std::env::var("GLYCOFUSE_LOG_MODE").unwrap_or_else(|_| "stderr".to_string());

    let (writer, guard) = if log_mode == "file" {
        let log_file = std::env::var("GLYCOFUSE_LOG_FILE")
            .unwrap_or_else(|_| "data/glycofuse.log".to_string());

        if let Some(parent) = Path::new(&log_file).parent() {
            // Best-effort: a missing directory surfaces as the open error below.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("cannot open log file {log_file}"))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(SanitizingMakeWriter::new(writer)),
        )
        .init();

    Ok(guard)
}

fn read_features(path: &Path) -> Result<LifestyleFeatures> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("cannot read lifestyle record from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("cannot read lifestyle record {}", path.display()))?
    };
    serde_json::from_str(&raw).context("lifestyle record is not valid JSON")
}

fn load_weights(config: &AppConfig) -> Result<(FusionWeights, String)> {
    if !config.weights_path.exists() {
        tracing::warn!(
            "Fusion weights not found at {}; using equal weights",
            config.weights_path.display()
        );
        return Ok((FusionWeights::equal(), "equal-default".to_string()));
    }
    let (weights, artifact) = artifact::load_fusion_weights(&config.weights_path, config.manifest_policy)?;
    let version = format!("{}@{}", artifact.method, artifact.created_at.format("%Y-%m-%d"));
    Ok((weights, version))
}

fn build_advisor(config: &AppConfig) -> Result<Arc<dyn AdviceGenerator>> {
    match llm_api_key() {
        Some(key) => {
            let chat = ChatCompletionAdvisor::new(&config.llm, key)?;
            Ok(Arc::new(WithRetry::new(chat, config.retry)))
        }
        None => {
            tracing::info!("No LLM API key configured; using rule-based advice");
            Ok(Arc::new(RuleBasedAdvisor))
        }
    }
}

fn build_service(config: &AppConfig) -> Result<AnalysisService> {
    let mut retinal = RetinalHeadModel::new();
    let retinal_path = config.retinal_model_path();
    if retinal_path.exists() {
        if let Err(e) = retinal.load(&retinal_path, config.manifest_policy) {
            tracing::warn!("Retinal model not loaded: {}", e);
        }
    }
    if !retinal.is_loaded() {
        // Retinal analysis degrades per request; lifestyle results remain usable.
        tracing::warn!(
            "No retinal model from {}; retinal stage will be degraded",
            retinal_path.display()
        );
    }

    let lifestyle = GradientBoostedModel::load(&config.lifestyle_model_path(), config.manifest_policy)
        .context("cannot load lifestyle model")?;
    let (weights, fusion_version) = load_weights(config)?;

    let ctx = AnalysisContext {
        retinal: Arc::new(retinal),
        lifestyle: Arc::new(lifestyle),
        advisor: build_advisor(config)?,
        weights,
        fusion_version,
    };
    Ok(AnalysisService::new(ctx).with_budget(config.processing_budget))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a client error as JSON and exit, or hand anything else back.
fn exit_on_client_error(e: GlycofuseError) -> anyhow::Error {
    if e.is_client_error() {
        let body = serde_json::json!({
            "error": e.to_string(),
            "fields": e.invalid_fields(),
        });
        println!("{body}");
        std::process::exit(EXIT_INVALID_INPUT);
    }
    e.into()
}

fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::from_env_or_default();
    if let Some(dir) = cli.model_dir {
        config.set_model_dir(dir);
    }
    if let Some(weights) = cli.weights {
        config.weights_path = weights;
    }
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    match cli.command {
        Commands::Analyze {
            features,
            image,
            plan,
            user,
        } => {
            let features = read_features(&features)?;
            let image = image
                .map(|p| std::fs::read(&p).with_context(|| format!("cannot read image {}", p.display())))
                .transpose()?;
            let service = build_service(&config)?;

            let report = service
                .run_complete_analysis(image.as_deref(), &features, plan)
                .map_err(exit_on_client_error)?;

            if let Some(user) = user {
                let history = HistoryService::new(Arc::new(SqliteStore::new(&config.database_path)?));
                if let Err(e) = history.record(&user, &report) {
                    tracing::warn!("Failed to store report: {}", e);
                }
            }
            print_json(&report)
        }
        Commands::Simulate {
            features,
            plan,
            retinal_risk,
        } => {
            let features = read_features(&features)?;
            let service = build_service(&config)?;
            let generator = service.scenario_generator();
            let scenarios = match plan {
                Some(plan) => generator.generate_scenarios(&features, plan, retinal_risk),
                None => generator.generate_all(&features, retinal_risk),
            }
            .map_err(exit_on_client_error)?;
            print_json(&scenarios)
        }
        Commands::ValidateImage { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("cannot read image {}", image.display()))?;
            let quality = validate_image(&bytes)?;
            print_json(&quality)
        }
        Commands::History {
            user,
            limit,
            offset,
            summary,
        } => {
            let history = HistoryService::new(Arc::new(SqliteStore::new(&config.database_path)?));
            if summary {
                print_json(&history.summary(&user)?)
            } else {
                let page = history.page(&user, offset, limit)?;
                print_json(&serde_json::json!({
                    "total_count": page.total_count,
                    "offset": page.offset,
                    "has_more": page.has_more,
                    "next_offset": page.next_offset(),
                    "prev_offset": page.prev_offset(),
                    "items": page.items,
                }))
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging()?;

    tracing::info!("Starting Glycofuse...");
    let result = run(cli);
    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}
