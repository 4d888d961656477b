use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use resgen_core::{
    BuildConfig, BuildPipeline, BuildSummary, CliOverrides, DiskFs, Level, TargetKind,
    render_size,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "resgen",
    version,
    about = "Bundle resource files into compressed build outputs",
    long_about = "Compress every matching file of a source directory in parallel and \
                  commit the results, or generated Rust modules, to a destination directory."
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode matching resources and commit them to the destination.
    Build {
        #[command(flatten)]
        selection: Selection,

        /// Destination directory (overrides `dest` in the config).
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Compression level: fastest, medium, high, max-compression, or 0-3.
        #[arg(short, long)]
        level: Option<Level>,

        /// Output format: raw (LZ4 frames), rust (generated modules), or copy.
        #[arg(short, long)]
        target: Option<TargetKind>,

        /// Skip the encoder's finalize step (no index module is written).
        #[arg(long)]
        skip_finalize: bool,

        /// Number of worker threads (defaults to CPU count).
        #[arg(long)]
        workers: Option<usize>,

        /// Print what would be built without encoding anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// List the source entries a build would pick up.
    List {
        #[command(flatten)]
        selection: Selection,
    },
}

#[derive(Args)]
struct Selection {
    /// Config file (defaults to ./resgen.toml when present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source directory (overrides `source` in the config).
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Glob over entry names; repeat to match several. Replaces config patterns.
    #[arg(short, long = "pattern")]
    patterns: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            selection,
            dest,
            level,
            target,
            skip_finalize,
            workers,
            dry_run,
        } => {
            let overrides = CliOverrides {
                source: selection.source.clone(),
                dest,
                patterns: selection.patterns.clone(),
                level,
                target,
                skip_finalize: skip_finalize.then_some(true),
                workers,
            };
            let config = load_config(&selection, &overrides)?;
            if dry_run {
                list_command(&config)
            } else {
                build_command(&config)
            }
        }
        Commands::List { selection } => {
            let overrides = CliOverrides {
                source: selection.source.clone(),
                patterns: selection.patterns.clone(),
                ..Default::default()
            };
            let config = load_config(&selection, &overrides)?;
            list_command(&config)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
}

fn load_config(selection: &Selection, overrides: &CliOverrides) -> Result<BuildConfig> {
    let cwd = env::current_dir().context("resolving working directory")?;
    let mut config = BuildConfig::discover(selection.config.as_deref(), &cwd)?;
    config.merge(overrides);
    config.validate()?;
    tracing::debug!(?config, "resolved build config");
    Ok(config)
}

fn pipeline_for(config: &BuildConfig, dest: PathBuf) -> Result<BuildPipeline> {
    let source = config.source()?.to_path_buf();
    Ok(BuildPipeline::new(
        Arc::new(DiskFs::new(source)),
        Arc::new(DiskFs::new(dest)),
        config.matcher()?,
        config.build_options(),
    ))
}

fn build_command(config: &BuildConfig) -> Result<()> {
    let source = config.source()?.to_path_buf();
    let dest = config.dest()?.to_path_buf();
    let pipeline = pipeline_for(config, dest.clone())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = pipeline
        .run_with_report(&mut out)
        .with_context(|| format!("building {} into {}", source.display(), dest.display()))?;

    print_summary(&mut out, config, &summary)?;
    Ok(())
}

fn list_command(config: &BuildConfig) -> Result<()> {
    // the destination is never touched while planning
    let dest = config.dest().map(|dest| dest.to_path_buf()).unwrap_or_default();
    let pipeline = pipeline_for(config, dest)?;
    let entries = pipeline.plan()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for entry in &entries {
        writeln!(out, "{}\t{}", entry.name, render_size(entry.size))?;
    }
    let total: u64 = entries.iter().map(|entry| entry.size).sum();
    writeln!(out, "{} resources, {}", entries.len(), render_size(total))?;
    Ok(())
}

fn print_summary(out: &mut impl Write, config: &BuildConfig, summary: &BuildSummary) -> Result<()> {
    let input = summary.input_bytes_total();
    let compressed = summary.compressed_bytes_total();

    writeln!(out, "build complete")?;
    writeln!(out, "  target: {} (level {})", config.target, config.level)?;
    writeln!(out, "  resources: {}", summary.results.len())?;
    writeln!(out, "  committed entries: {}", summary.committed.len())?;
    writeln!(out, "  finalized: {}", if summary.finalized { "yes" } else { "skipped" })?;
    writeln!(out, "  workers: {}", summary.workers)?;
    writeln!(out, "  input: {}", render_size(input))?;
    if compressed > 0 {
        writeln!(out, "  compressed: {}", render_size(compressed))?;
    }
    writeln!(out, "  elapsed: {}", format_duration(summary.elapsed))?;
    Ok(())
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}
