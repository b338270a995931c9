//! CLI entry point for the outlier-removal pipeline.

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use lex_outliers::{
    ModelSpec, Pipeline, PipelineConfig, RemovalReport, StageConfig, source,
};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// CLI-compatible model choice
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliModel {
    /// Predict the mean target of the training rows
    Mean,
    /// Ordinary least squares with intercept
    Linear,
}

impl From<CliModel> for ModelSpec {
    fn from(cli: CliModel) -> Self {
        match cli {
            CliModel::Mean => ModelSpec::Mean,
            CliModel::Linear => ModelSpec::LinearRegression {
                ridge: lex_outliers::LinearRegression::DEFAULT_RIDGE,
            },
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author = "Lex Machina Team",
    version,
    about = "Iterative cross-validated outlier removal",
    long_about = "Removes rows whose held-out prediction error is an IQR outlier.\n\n\
                  EXAMPLES:\n  \
                  # One stage, fixed single iteration, default model\n  \
                  lex-outliers -i data.csv -t price -o clean.csv\n\n  \
                  # Iterate until two passes remove nothing, on all but one core\n  \
                  lex-outliers -i data.csv -t price --max-non-removal 2 --workers -1\n\n  \
                  # Multi-stage pipeline from a JSON file\n  \
                  lex-outliers -i data.csv -t price -c pipeline.json --json"
)]
struct Args {
    /// Path to the CSV file to clean
    #[arg(short, long)]
    input: PathBuf,

    /// Numeric target column; every other numeric column is a feature
    #[arg(short, long)]
    target: String,

    /// JSON pipeline configuration (replaces the single-stage flags)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model used by the single stage
    #[arg(long, value_enum, default_value = "linear", conflicts_with = "config")]
    model: CliModel,

    /// Number of cross-validation folds
    #[arg(long, default_value = "10", conflicts_with = "config")]
    folds: usize,

    /// IQR multiplier for the upper fence
    #[arg(long, default_value = "1.5", conflicts_with = "config")]
    iqr_multiplier: f64,

    /// Run exactly this many iterations
    #[arg(long, conflicts_with_all = ["max_non_removal", "config"])]
    iterations: Option<u32>,

    /// Stop after this many consecutive iterations that remove nothing
    #[arg(long, conflicts_with = "config")]
    max_non_removal: Option<u32>,

    /// Seed for fold assignment
    #[arg(long, default_value = "1", conflicts_with = "config")]
    seed: u64,

    /// Fold workers: 0/1 sequential, n > 1 that many, n < 0 all cores but |n|
    ///
    /// Defaults to 1, or to the config file's `worker_count` with `-c`.
    #[arg(long, allow_negative_numbers = true)]
    workers: Option<i32>,

    /// Use signed residuals instead of absolute errors
    #[arg(long)]
    signed_error: bool,

    /// Write surviving rows to this CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write a JSON report to this directory as <input_name>_report.json
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Output JSON to stdout instead of the human-readable table
    ///
    /// Disables all logs so stdout carries only the report.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and the final result)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    if let Some(path) = &args.config {
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config {}: {}", path.display(), e))?;
        let mut config = PipelineConfig::from_json(&json)?;
        // Run-level flags that were given still win over the file.
        if args.signed_error {
            config.use_absolute_error = false;
        }
        if let Some(workers) = args.workers {
            config.worker_count = workers.into();
        }
        return Ok(config);
    }

    let mut stage = StageConfig::builder()
        .model(ModelSpec::from(args.model))
        .num_folds(args.folds)
        .iqr_multiplier(args.iqr_multiplier)
        .seed(args.seed);
    stage = match (args.iterations, args.max_non_removal) {
        (_, Some(limit)) => stage.max_non_removal_iterations(limit),
        (Some(iterations), None) => stage.num_iterations(iterations),
        (None, None) => stage,
    };

    Ok(PipelineConfig::builder()
        .stage(stage.build()?)
        .use_absolute_error(!args.signed_error)
        .worker_count(args.workers.unwrap_or(1))
        .build()?)
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    if !args.input.exists() {
        return Err(anyhow!("Input file not found: {}", args.input.display()));
    }

    let config = build_config(&args)?;

    info!("Loading dataset from: {}", args.input.display());
    let (dataset, schema) = source::read_csv(&args.input, &args.target)?;
    info!(
        rows = dataset.len(),
        features = schema.features.len(),
        "Dataset loaded"
    );

    let pipeline = Pipeline::builder().config(config).build()?;
    let result = match pipeline.run(&dataset) {
        Ok(result) => result,
        Err(e) => {
            error!("Pipeline error: {}", e);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&e)?);
            }
            return Err(e.into());
        }
    };

    if let Some(output) = &args.output {
        source::write_csv(&result.dataset, &schema, output)?;
    }

    let report = RemovalReport::from_result(&result);
    if let Some(dir) = &args.report_dir {
        report.write_json(dir, &input_stem(&args.input))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.format_table());
    }

    Ok(())
}

fn input_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}
