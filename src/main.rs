//! Leaf-fragment area regression CLI
//!
//! Trains and evaluates an area regressor over one or more directories of
//! labeled ant images and writes every artefact to the output directory.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::{error, info};

use antleaf_area::backend::{backend_name, default_device, TrainingBackend};
use antleaf_area::model::BackboneKind;
use antleaf_area::training::{run, RunReport};
use antleaf_area::utils::error::{AreaError, EXIT_FAILURE, EXIT_OK};
use antleaf_area::utils::format_duration;
use antleaf_area::utils::logging::{init_logging, LogConfig};
use antleaf_area::RunConfig;

/// Leaf-fragment area regression from ant images
///
/// Labels are read from file names (`..._a<area>_...`). Every flag
/// overrides the matching value of the `--config` file.
#[derive(Parser, Debug)]
#[command(name = "antleaf-area")]
#[command(version)]
#[command(about = "Leaf-fragment area regression with Burn", long_about = None)]
struct Cli {
    /// TOML run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Real images of ants carrying leaf fragments (primary source)
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Real images of ants without a fragment
    #[arg(long)]
    non_carrying: Option<PathBuf>,

    /// Synthetic images of carrying ants
    #[arg(long)]
    synthetic_carrying: Option<PathBuf>,

    /// Synthetic images of non-carrying ants
    #[arg(long)]
    synthetic_non_carrying: Option<PathBuf>,

    /// Directory for checkpoints, predictions and reports [default: output]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// simple | Xception | EfficientNetB0 | EfficientNetB7 | None [default: simple]
    #[arg(long)]
    backbone: Option<String>,

    /// mse_keras | mape_keras | custom_<alpha>_<beta> [default: mse_keras]
    #[arg(long)]
    loss: Option<String>,

    /// Number of training epochs [default: 10]
    #[arg(long)]
    epochs: Option<usize>,

    /// Batch size [default: 32]
    #[arg(long)]
    batch_size: Option<usize>,

    /// Save a checkpoint every N epochs [default: 1]
    #[arg(long)]
    save_every: Option<usize>,

    /// Enable data augmentation (true/false) [default: false]
    #[arg(long)]
    augmentation: Option<bool>,

    /// Train on ln(area) instead of raw areas (true/false) [default: false]
    #[arg(long)]
    log_transform: Option<bool>,

    /// Held-out evaluation directory
    #[arg(long)]
    test_dataset: Option<PathBuf>,

    /// Adam learning rate [default: 0.0001]
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Train the backbone weights as well
    #[arg(long, default_value = "false")]
    fine_tune_backbone: bool,

    /// Checkpoint to resume from (.mpk full model or .bin weights)
    #[arg(long)]
    resume_from: Option<PathBuf>,

    /// Pretrained backbone record (.mpk)
    #[arg(long)]
    backbone_weights: Option<PathBuf>,

    /// Random seed [default: 42]
    #[arg(long)]
    seed: Option<u64>,

    /// Square input resolution [default: 224]
    #[arg(long)]
    image_size: Option<usize>,

    /// Fraction of the pool in the reported hold-out split [default: 0.2]
    #[arg(long)]
    validation_fraction: Option<f64>,

    /// Fail on unknown backbone or loss names instead of falling back
    #[arg(long, default_value = "false")]
    strict_selectors: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match execute(cli) {
        Ok(report) => {
            print_report(&report);
            ExitCode::from(EXIT_OK)
        }
        Err(err) => {
            error!("{:#}", err);
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            let code = err
                .downcast_ref::<AreaError>()
                .map(AreaError::exit_code)
                .unwrap_or(EXIT_FAILURE);
            ExitCode::from(code)
        }
    }
}

fn execute(cli: Cli) -> Result<RunReport> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load_toml(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => RunConfig::default(),
    };

    apply_overrides(&mut config, cli)?;

    info!("Backend: {}", backend_name());
    info!("Output directory: {:?}", config.output_dir);

    let start = std::time::Instant::now();
    let device = default_device();
    let report = run::<TrainingBackend>(&config, &device)?;
    info!("Run finished in {}", format_duration(start.elapsed().as_secs_f64()));

    Ok(report)
}

fn apply_overrides(config: &mut RunConfig, cli: Cli) -> Result<()> {
    let strict = cli.strict_selectors || config.training.strict_selectors;
    config.training.strict_selectors = strict;

    if let Some(dir) = cli.dataset {
        config.data.sources.real_carrying = dir;
    }
    if let Some(dir) = cli.non_carrying {
        config.data.sources.real_non_carrying = Some(dir);
    }
    if let Some(dir) = cli.synthetic_carrying {
        config.data.sources.synthetic_carrying = Some(dir);
    }
    if let Some(dir) = cli.synthetic_non_carrying {
        config.data.sources.synthetic_non_carrying = Some(dir);
    }
    if let Some(dir) = cli.test_dataset {
        config.data.test_dataset = Some(dir);
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(name) = cli.backbone {
        config.model.backbone = BackboneKind::select(&name, strict)?;
    }
    if let Some(loss) = cli.loss {
        config.training.loss = loss;
    }
    if let Some(epochs) = cli.epochs {
        config.training.epochs = epochs;
    }
    if let Some(batch_size) = cli.batch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(save_every) = cli.save_every {
        config.training.save_every = save_every;
    }
    if let Some(augmentation) = cli.augmentation {
        config.data.augmentation = augmentation;
    }
    if let Some(log_transform) = cli.log_transform {
        config.data.log_transform = log_transform;
    }
    if let Some(lr) = cli.learning_rate {
        config.training.learning_rate = lr;
    }
    if cli.fine_tune_backbone {
        config.model.fine_tune_backbone = true;
    }
    if let Some(path) = cli.resume_from {
        config.training.resume_from = Some(path);
    }
    if let Some(path) = cli.backbone_weights {
        config.training.backbone_weights = Some(path);
    }
    if let Some(seed) = cli.seed {
        config.training.seed = seed;
    }
    if let Some(size) = cli.image_size {
        config.model.image_size = size;
    }
    if let Some(fraction) = cli.validation_fraction {
        config.data.validation_fraction = fraction;
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +--------------------------------------------------+
 |   Leaf-Fragment Area Regression                  |
 |   Ant image regressors with Burn + Rust          |
 +--------------------------------------------------+
  "#
        .green()
    );
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", "Run complete".green().bold());
    println!("  Samples in pool:      {}", report.pool_size);
    println!("  Epochs trained:       {}", report.history.len());
    if let Some(loss) = report.history.final_loss() {
        println!("  Final training loss:  {:.6}", loss);
    }
    println!(
        "  Evaluation ({}):  {} samples, {:.2}% error",
        report.evaluation_source, report.evaluation_samples, report.evaluation_percentage_error
    );
    println!("  Artefacts:");
    for path in &report.artefacts {
        println!("    {}", path.display().to_string().cyan());
    }
}
