//! restauro-bench: CLI tool for running filter pipelines on image files.
//!
//! Loads an image, runs a saved or ad-hoc filter pipeline over it, prints
//! per-stage diagnostics and quality metrics, and optionally writes the
//! result. Useful for:
//!
//! - Replaying a pipeline saved as JSON against different inputs
//! - Measuring per-stage durations to find the slow filters
//! - Comparing restorations against a clean reference (PSNR, MSE, SSIM)
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin restauro-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{info, warn};
use restauro_pipeline::{
    CancellationToken, FilterKind, FilterParams, FilterSpec, Image, RunDiagnostics, config,
    metrics,
};

/// Filter pipeline runner and diagnostics for restauro.
///
/// Runs an ordered list of restoration and noise filters over an image and
/// prints per-stage timing, failures and quality metrics.
#[derive(Parser)]
#[command(name = "restauro-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    #[arg(required_unless_present = "list_filters")]
    image_path: Option<PathBuf>,

    /// Load the pipeline from a saved JSON file.
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Pipeline as a JSON string, in the saved-file format.
    #[arg(long)]
    config_json: Option<String>,

    /// Append a filter as `NAME` or `NAME=PARAMS`, where PARAMS is JSON
    /// (a number or an object). May be repeated; applied after any
    /// loaded pipeline.
    #[arg(long = "filter", value_name = "NAME[=PARAMS]")]
    filters: Vec<String>,

    /// Write the final image to this path (format from the extension).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Compare the result against this image instead of the input.
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Save the effective pipeline as JSON to this path.
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Print the known filter names and exit.
    #[arg(long)]
    list_filters: bool,
}

/// Parse one `--filter` argument.
fn parse_filter_arg(arg: &str) -> Result<FilterSpec, String> {
    let Some((name, params)) = arg.split_once('=') else {
        return Ok(FilterSpec::new(arg.trim(), FilterParams::None));
    };
    let params: FilterParams = serde_json::from_str(params)
        .map_err(|e| format!("Error parsing parameters of --filter {arg:?}: {e}"))?;
    Ok(FilterSpec::new(name.trim(), params))
}

/// Assemble the pipeline from `--config`, `--config-json` and `--filter`.
fn pipeline_from_cli(cli: &Cli) -> Result<Vec<FilterSpec>, String> {
    let mut specs = if let Some(ref path) = cli.config {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        config::from_json(&text).map_err(|e| format!("Error loading {}: {e}", path.display()))?
    } else if let Some(ref json) = cli.config_json {
        config::from_json(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        Vec::new()
    };
    for arg in &cli.filters {
        specs.push(parse_filter_arg(arg)?);
    }
    Ok(specs)
}

fn load_image(path: &Path) -> Result<Image, String> {
    let decoded =
        image::open(path).map_err(|e| format!("Error decoding {}: {e}", path.display()))?;
    Ok(Image::from_dynamic(&decoded))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if cli.list_filters {
        for kind in FilterKind::ALL {
            println!("{kind}");
        }
        return ExitCode::SUCCESS;
    }
    let Some(ref image_path) = cli.image_path else {
        eprintln!("No input image given");
        return ExitCode::FAILURE;
    };

    let specs = match pipeline_from_cli(&cli) {
        Ok(specs) => specs,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref path) = cli.save_config {
        let written = config::to_json(&specs)
            .map_err(|e| e.to_string())
            .and_then(|text| std::fs::write(path, text).map_err(|e| e.to_string()));
        match written {
            Ok(()) => eprintln!("Pipeline saved to {}", path.display()),
            Err(e) => {
                eprintln!("Error saving pipeline to {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    let base = match load_image(image_path) {
        Ok(image) => image,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({}, {} channel(s))",
        image_path.display(),
        base.dimensions(),
        base.channels(),
    );
    eprintln!("Filters: {}", specs.len());
    for (i, spec) in specs.iter().enumerate() {
        eprintln!("  {i}: {}", spec.name);
    }
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    let mut final_image = None;
    let cancel = CancellationToken::new();

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }
        info!("run {} of {}", run + 1, cli.runs);

        let result = match restauro_pipeline::execute(&base, &specs, &cancel) {
            Ok(outcome) => match outcome.completed() {
                Some(result) => result,
                None => {
                    eprintln!("Pipeline cancelled");
                    return ExitCode::FAILURE;
                }
            },
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        };

        for failure in &result.failures {
            warn!("{failure}");
        }

        if cli.json {
            match serde_json::to_string_pretty(&result.diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", result.diagnostics.report());
        }

        all_diagnostics.push(result.diagnostics);
        if run == 0 {
            final_image = Some(result.image);
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    let Some(restored) = final_image else {
        return ExitCode::SUCCESS;
    };

    let reference = match cli.reference {
        Some(ref path) => match load_image(path) {
            Ok(image) => image,
            Err(msg) => {
                eprintln!("{msg}");
                return ExitCode::FAILURE;
            }
        },
        None => base,
    };
    print_metrics(&reference, &restored);

    if let Some(ref path) = cli.output {
        if let Err(e) = restored.into_dynamic().save(path) {
            eprintln!("Error writing {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
        eprintln!("Output written to {}", path.display());
    }

    ExitCode::SUCCESS
}

/// Print MSE, PSNR and SSIM of `restored` against `reference`.
fn print_metrics(reference: &Image, restored: &Image) {
    println!();
    println!("Quality\n{}", "=".repeat(60));
    match metrics::mse(reference, restored) {
        Ok(mse) => println!("{:<24} {mse:>12.4}", "MSE"),
        Err(e) => {
            println!("Metrics unavailable: {e}");
            return;
        }
    }
    if let Ok(psnr) = metrics::psnr(reference, restored) {
        if psnr.is_infinite() {
            println!("{:<24} {:>12}", "PSNR (dB)", "inf");
        } else {
            println!("{:<24} {psnr:>12.4}", "PSNR (dB)");
        }
    }
    match metrics::ssim(reference, restored) {
        Ok(Some(ssim)) => println!("{:<24} {ssim:>12.4}", "SSIM"),
        Ok(None) => println!("{:<24} {:>12}", "SSIM", "n/a"),
        Err(e) => println!("SSIM unavailable: {e}"),
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[RunDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<4} {:<36} {:>12}", "#", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(56));

    let stage_count = all_diagnostics[0].stages.len();
    for index in 0..stage_count {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(|d| d.stages.get(index))
            .map(|s| s.duration.as_secs_f64() * 1000.0)
            .collect();
        let name = &all_diagnostics[0].stages[index].name;
        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{index:<4} {name:<36} {stage_mean:>10.3}ms");
    }
}
