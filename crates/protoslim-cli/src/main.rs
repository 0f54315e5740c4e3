//! protoslim - Reduce generated .pb.go files to plain API structs
//!
//! This tool rewrites protoc-gen-go output in place, keeping the import
//! block and struct declarations, removing protobuf runtime bookkeeping
//! fields, and then runs `gofmt` and `goimports` over the result.

use anyhow::{bail, Context, Result};
use clap::Parser;
use protoslim_core::{
    select_files, CommitMode, Error, FileConfig, Formatter, ProjectionReport, Projector,
    ProjectorConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Reduce generated .pb.go files to their import block and struct declarations
#[derive(Parser, Debug)]
#[command(name = "protoslim")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory (or single file) containing generated sources
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Config file (default: protoslim.toml in the current directory, if present)
    #[arg(short, long, env = "PROTOSLIM_CONFIG")]
    config: Option<PathBuf>,

    /// Suffix identifying generated files
    #[arg(long)]
    suffix: Option<String>,

    /// Additional filename suffix to skip (repeatable)
    #[arg(long = "exclude", value_name = "SUFFIX")]
    exclude: Vec<String>,

    /// Additional literal to strip from projected files (repeatable)
    #[arg(long = "strip", value_name = "LITERAL")]
    strip: Vec<String>,

    /// Skip the gofmt/goimports post-pass
    #[arg(long)]
    no_format: bool,

    /// Project every file before writing any (parse errors leave the tree untouched)
    #[arg(long)]
    staged: bool,

    /// Dry run - don't write files, just show what would change
    #[arg(long)]
    dry_run: bool,

    /// Only list the files that would be projected
    #[arg(long)]
    list_only: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    if !cli.path.exists() {
        bail!("Path does not exist: {}", cli.path.display());
    }

    let file_config = load_config(cli.config.as_deref())?;
    let config = build_config(&cli, &file_config);

    if cli.list_only {
        return list_files(&cli.path, &config);
    }

    let formatters: Vec<Box<dyn Formatter>> = if cli.no_format {
        Vec::new()
    } else {
        file_config.formatters()
    };

    let projector = Projector::new(config.clone()).with_formatters(formatters);
    debug!("{:?}", projector);

    let report = match projector.run(&cli.path) {
        Ok(report) => report,
        Err(e) => {
            if let Some(note) = partial_batch_note(&e, &cli.path, &config) {
                warn!("{}", note);
            }
            return Err(anyhow::Error::new(e)
                .context(format!("Projection failed under {}", cli.path.display())));
        }
    };

    print_report(&report);
    Ok(())
}

/// Load the explicit config file, or discover one in the working directory
fn load_config(explicit: Option<&Path>) -> Result<FileConfig> {
    match explicit {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => {
            let cwd = std::env::current_dir().context("Failed to determine working directory")?;
            FileConfig::discover(&cwd).context("Failed to load project config")
        }
    }
}

/// Merge command-line overrides on top of the file config
fn build_config(cli: &Cli, file_config: &FileConfig) -> ProjectorConfig {
    let mut config = file_config.projector_config().dry_run(cli.dry_run);

    if let Some(suffix) = &cli.suffix {
        config.suffix = suffix.clone();
    }
    for suffix in &cli.exclude {
        config.exclusions.push(suffix.clone());
    }
    for literal in &cli.strip {
        config.strip.push(literal.clone());
    }
    if cli.staged {
        config.commit = CommitMode::Staged;
    }

    config
}

fn list_files(root: &Path, config: &ProjectorConfig) -> Result<()> {
    let selection = select_files(root, config)
        .with_context(|| format!("Failed to list files under {}", root.display()))?;
    for path in &selection.files {
        println!("{}", path.display());
    }
    info!(
        "{} file(s) eligible, {} excluded",
        selection.files.len(),
        selection.excluded.len()
    );
    Ok(())
}

/// Operator note for failures that may have left some files rewritten
fn partial_batch_note(err: &Error, root: &Path, config: &ProjectorConfig) -> Option<String> {
    if config.dry_run || !err.may_leave_partial_batch(config.commit) {
        return None;
    }
    Some(format!(
        "Files under {} may be partially rewritten; nothing was rolled back. \
         Restore them from version control or regenerate them before rerunning.",
        root.display()
    ))
}

fn print_report(report: &ProjectionReport) {
    let verb = if report.dry_run { "Would rewrite" } else { "Rewrote" };
    for path in &report.projected {
        println!("{} {}", verb, path.display());
    }
    info!(
        "Summary: {} projected, {} unchanged, {} excluded, formatters: [{}]",
        report.projected.len(),
        report.unchanged.len(),
        report.excluded.len(),
        report.formatters_run.join(", ")
    );
}
