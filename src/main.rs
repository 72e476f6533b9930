//! fscat - catalog a directory tree and report duplicate files.
//!
//! Usage:
//!   fscat serialize PATH      Hash every file and persist the index
//!   fscat describe PATH       Per-variant overview of a directory
//!   fscat duplicates PATH     List groups of files sharing a sampled hash
//!   fscat --help              Show help

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use fscatalog_analyze::{IndexBuilder, find_duplicates};
use fscatalog_core::CatalogConfig;
use fscatalog_scan::DirectoryNode;

#[derive(Parser)]
#[command(
    name = "fscat",
    version,
    about = "Catalog a directory tree and find duplicate files",
    long_about = "fscat resolves every file under a directory to a content variant and \
                  indexes it by a hash of its size and leading bytes.\n\n\
                  The index is stored as `.fscatalog-<name>.json` inside the directory \
                  and reused on later runs."
)]
struct Cli {
    /// TOML file with catalog settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Number of hashing threads (0 = all CPUs)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hash every file and persist the directory index
    Serialize {
        /// Directory to serialize
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        /// Bytes read from each file when hashing
        #[arg(short, long)]
        chunk: Option<usize>,

        /// Discard the persisted index and hash everything again
        #[arg(short, long)]
        replace: bool,
    },

    /// Quick overview of the directory contents
    Describe {
        /// Target directory
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        /// Include the total file size
        #[arg(short, long)]
        size: bool,
    },

    /// Find duplicate files
    Duplicates {
        /// Directory to search
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        /// Report groups holding more than this many files
        #[arg(short, long)]
        keep: Option<usize>,

        /// Rebuild the index before reporting
        #[arg(short, long)]
        refresh: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    debug!(?config, "configuration loaded");

    match cli.command {
        Command::Serialize {
            path,
            chunk,
            replace,
        } => {
            if let Some(chunk) = chunk {
                config.chunk_size = chunk;
            }
            run_serialize(&path, config, replace)?;
        }
        Command::Describe { path, size } => {
            run_describe(&path, &config, size)?;
        }
        Command::Duplicates {
            path,
            keep,
            refresh,
            format,
        } => {
            if let Some(keep) = keep {
                config.keep = keep;
            }
            run_duplicates(&path, &config, refresh, format)?;
        }
    }

    Ok(())
}

/// Install the stderr log subscriber, honouring `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Read settings from a TOML file, or defaults when none is given.
fn load_config(path: Option<&Path>) -> Result<CatalogConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("Cannot read config {}", path.display()))?;
            parse_config(&text).wrap_err_with(|| format!("Invalid config {}", path.display()))?
        }
        None => CatalogConfig::default(),
    };
    Ok(config)
}

fn parse_config(text: &str) -> Result<CatalogConfig> {
    let config: CatalogConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Build the index and print the number of distinct hashes.
fn run_serialize(path: &Path, config: CatalogConfig, replace: bool) -> Result<()> {
    let mut dir = DirectoryNode::with_config(path, &config).context("Invalid path")?;

    eprintln!("Indexing {}...", dir.path().display());

    let builder = IndexBuilder::with_config(config);
    let index = builder.build(&mut dir, replace).context("Indexing failed")?;

    println!("{}", index.len());
    Ok(())
}

/// Print per-variant counts for a directory.
fn run_describe(path: &Path, config: &CatalogConfig, with_size: bool) -> Result<()> {
    let dir = DirectoryNode::with_config(path, config).context("Invalid path")?;
    let summary = dir.describe();

    println!();
    println!("{}", "─".repeat(60));
    println!(" {}", summary.path.display());
    println!(
        " {} files, {} directories",
        summary.file_count, summary.dir_count
    );
    if with_size {
        println!(" Total size: {}", format_size(summary.total_size));
    }
    println!("{}", "─".repeat(60));
    println!();

    for (variant, count) in &summary.variants {
        println!("   {:<12} {:>8}", variant.to_string(), count);
    }

    if summary.warnings > 0 {
        println!();
        println!("{} warning(s) during scan", summary.warnings);
    }

    Ok(())
}

/// Run duplicate detection.
fn run_duplicates(
    path: &Path,
    config: &CatalogConfig,
    refresh: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut dir = DirectoryNode::with_config(path, config).context("Invalid path")?;

    eprintln!("Finding duplicates in {}...", dir.path().display());

    let report = find_duplicates(&mut dir, config, refresh).context("Duplicate search failed")?;

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(70));
            println!(" Duplicate File Report");
            println!("{}", "─".repeat(70));
            println!();

            if report.groups.is_empty() {
                println!(" No groups with more than {} files.", report.keep);
            } else {
                println!(
                    " Found {} groups ({} files) among {} indexed files",
                    report.group_count,
                    report.total_duplicate_files(),
                    report.files_indexed
                );
                println!();

                for (i, group) in report.groups.iter().enumerate() {
                    let size = group
                        .file_size()
                        .map(format_size)
                        .unwrap_or_else(|| "?".to_string());
                    println!(" Group {} ({} files, {} each)", i + 1, group.count(), size);
                    for path in &group.paths {
                        println!("   {}", path.display());
                    }
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
