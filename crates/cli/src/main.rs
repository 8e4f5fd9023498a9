//! Habitat CLI - species distribution modeling from the command line

mod config;
mod pipeline;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::{PipelineConfig, StackSource};
use habitat_algorithms::clip::clip_to_dir;
use habitat_algorithms::sampling::{
    build_feature_table, read_feature_table, write_feature_table, SamplingParams,
};
use habitat_algorithms::selection::{filter_collinear, CollinearityParams, VifPolicy};
use habitat_core::io::{read_boundary, read_geotiff, read_occurrences};
use habitat_core::{Raster, CRS};

#[derive(Parser)]
#[command(name = "habitat")]
#[command(
    author,
    version,
    about = "Habitat suitability modeling under climate scenarios",
    long_about = None
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Clip a predictor stack to a study-area polygon
    Clip {
        /// Directory of single-band GeoTIFFs or one multi-band GeoTIFF
        input: PathBuf,
        /// Boundary polygon (GeoJSON)
        #[arg(short, long)]
        boundary: PathBuf,
        /// Output directory for the clipped bands
        #[arg(short, long)]
        out_dir: PathBuf,
        /// Comma-separated band names for a multi-band input
        #[arg(long, value_delimiter = ',')]
        names: Option<Vec<String>>,
    },
    /// Build a presence/pseudo-absence feature table
    Table {
        /// Predictor stack (directory or multi-band file)
        #[arg(short, long)]
        stack: PathBuf,
        /// Occurrence CSV/TSV
        #[arg(short = 'p', long)]
        occurrences: PathBuf,
        /// Output CSV
        #[arg(short, long)]
        out: PathBuf,
        /// CRS of the occurrence coordinates (defaults to the stack's)
        #[arg(long)]
        crs: Option<String>,
        /// Pseudo-absences per presence
        #[arg(long, default_value = "2.0")]
        ratio: f64,
        /// Exact pseudo-absence count (overrides --ratio)
        #[arg(long)]
        absences: Option<usize>,
        #[arg(long, default_value = "1")]
        seed: u64,
    },
    /// Drop collinear predictors from a feature table
    Filter {
        /// Input feature table CSV
        input: PathBuf,
        /// Output CSV
        #[arg(short, long)]
        out: PathBuf,
        /// Absolute correlation threshold
        #[arg(short, long, default_value = "0.8")]
        threshold: f64,
        /// Also drop predictors stepwise while any VIF exceeds this value
        #[arg(long)]
        vif: Option<f64>,
    },
    /// Run the full pipeline from a TOML configuration
    Run {
        /// Pipeline configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,
        /// Override the configured output directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// Override the configured worker thread count
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn setup_threads(threads: Option<usize>) -> Result<()> {
    if let Some(n) = threads {
        if n == 0 {
            bail!("thread count must be at least 1");
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("Failed to configure worker threads")?;
        info!("Using {} worker thread(s)", n);
    }
    Ok(())
}

fn source(path: PathBuf, bands: Option<Vec<String>>) -> StackSource {
    StackSource { path, bands }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            let pb = spinner("Reading raster...");
            let raster: Raster<f64> = read_geotiff(&input).context("Failed to read raster")?;
            pb.finish_and_clear();
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            match raster.crs() {
                Some(crs) => println!("CRS: {}", crs),
                None => println!("CRS: (none)"),
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let (Some(min), Some(max)) = (stats.min, stats.max) {
                println!("  Range: {:.4} .. {:.4}", min, max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }

        Commands::Clip {
            input,
            boundary,
            out_dir,
            names,
        } => {
            let start = Instant::now();
            let stack = pipeline::load_stack(&source(input, names))?;
            let boundary = read_boundary(&boundary)
                .with_context(|| format!("Failed to read boundary {}", boundary.display()))?;
            let pb = spinner("Clipping...");
            let (clipped, paths) =
                clip_to_dir(&stack, &boundary, &out_dir).context("Clipping failed")?;
            pb.finish_and_clear();
            let (rows, cols) = clipped.shape();
            println!("Clipped {} band(s) to {} x {}", paths.len(), cols, rows);
            done("Clipped stack", &out_dir, start.elapsed());
        }

        Commands::Table {
            stack,
            occurrences,
            out,
            crs,
            ratio,
            absences,
            seed,
        } => {
            let start = Instant::now();
            let stack = pipeline::load_stack(&source(stack, None))?;
            let crs = match crs {
                Some(text) => Some(
                    CRS::parse(&text).with_context(|| format!("Unrecognized CRS '{}'", text))?,
                ),
                None => stack.crs().cloned(),
            };
            let load = read_occurrences(&occurrences, crs)
                .with_context(|| format!("Failed to read occurrences {}", occurrences.display()))?;
            let params = SamplingParams {
                absence_count: absences,
                absence_ratio: ratio,
                seed,
                ..SamplingParams::default()
            };
            let (table, summary) = build_feature_table(&stack, &load.occurrences, &params)?;
            write_feature_table(&table, &out, None)?;
            println!(
                "{} presences ({} skipped rows, {} outside the grid), {} pseudo-absences, \
                 {} dropped, {} rows",
                summary.presences,
                load.skipped,
                summary.outside_grid,
                summary.absences,
                summary.dropped,
                summary.rows
            );
            done("Feature table", &out, start.elapsed());
        }

        Commands::Filter {
            input,
            out,
            threshold,
            vif,
        } => {
            let start = Instant::now();
            let table = read_feature_table(&input)
                .with_context(|| format!("Failed to read feature table {}", input.display()))?;
            let params = CollinearityParams {
                threshold,
                vif: match vif {
                    Some(threshold) => VifPolicy::Stepwise { threshold },
                    None => VifPolicy::Report,
                },
                ..CollinearityParams::default()
            };
            let result = filter_collinear(&table, &params)?;
            write_feature_table(&result.table, &out, None)?;
            println!("Retained: {}", result.retained.join(", "));
            if !result.removed.is_empty() {
                println!("Removed:  {}", result.removed.join(", "));
            }
            for (name, v) in &result.vif {
                println!("  VIF {:<16} {:.3}", name, v);
            }
            done("Filtered table", &out, start.elapsed());
        }

        Commands::Run {
            config,
            seed,
            out_dir,
            threads,
        } => {
            let start = Instant::now();
            let mut config = PipelineConfig::from_path(&config)?;
            if let Some(seed) = seed {
                config.apply_seed(seed);
            }
            if let Some(dir) = out_dir {
                config.output_dir = dir;
            }
            setup_threads(threads.or(config.threads))?;

            let report = pipeline::run(&config)?;
            println!(
                "\n{} training rows, {} test rows, predictors: {}",
                report.train_rows,
                report.test_rows,
                report.retained_predictors.join(", ")
            );
            for m in &report.models {
                println!(
                    "  {:<7} AUC {:.4}  Kappa {:.4}  TSS {:.4}",
                    m.summary.model.slug(),
                    m.evaluation.auc,
                    m.evaluation.kappa,
                    m.evaluation.tss
                );
                for o in &m.outputs {
                    let Some(s) = &o.change_summary else { continue };
                    println!(
                        "          {:<12} gain {:>7}  loss {:>7}  stable {:>7}",
                        o.scenario,
                        s.gain,
                        s.loss,
                        s.stable_suitable + s.stable_unsuitable
                    );
                }
            }
            done("Report", &config.output_dir.join("report.json"), start.elapsed());
        }
    }

    Ok(())
}
