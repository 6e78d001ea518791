//! # Index Harness CLI (`idx`)
//!
//! Thin driver over the library: convert documents to indexable text and
//! inspect replica directories.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `idx convert <file>` | Resolve the MIME type, run the handler, print the extracted fields |
//! | `idx stub <replica-dir>` | Show the stub pointer and stored parameters of a replica |
//!
//! All commands accept a `--config` flag pointing to a TOML configuration
//! file; without one, built-in defaults apply.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use index_harness::config::{load_config, Config};
use index_harness::extract::{Extractor, Fields, Status};
use index_harness::stub;

/// Index Harness — replication and text-extraction core for a full-text
/// search engine.
#[derive(Parser)]
#[command(name = "idx", version)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a file to indexable text and print the extracted fields.
    Convert {
        /// File to convert.
        file: PathBuf,
        /// Explicit MIME type (or `.ext`) instead of the filename's extension.
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Show the stub pointer and parameters of a replica directory.
    Stub {
        /// Replica directory.
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Convert { file, mime_type } => run_convert(&config, &file, mime_type.as_deref()),
        Command::Stub { dir } => run_stub(&dir),
    }
}

fn run_convert(config: &Config, file: &PathBuf, mime_type: Option<&str>) -> Result<()> {
    let filepath = file
        .to_str()
        .with_context(|| format!("path {} is not valid UTF-8", file.display()))?;

    let mut extractor = Extractor::new();
    extractor.set_ignore_exclusions(config.extract.ignore_exclusions);
    extractor.set_sample_size(config.extract.sample_size);
    extractor.set_pkglib_bin_dir(config.extract.pkglib_bin_dir.clone());

    let mut fields = Fields::default();
    let status = extractor.convert(filepath, mime_type, &mut fields);
    match status {
        Status::Ok => {}
        Status::Ignored => {
            println!("{}: ignored", filepath);
            return Ok(());
        }
        other => anyhow::bail!("conversion of {} failed: {:?}", filepath, other),
    }

    println!("mime-type: {}", fields.mime_type);
    if !fields.title.is_empty() {
        println!("title: {}", fields.title);
    }
    if !fields.author.is_empty() {
        println!("author: {}", fields.author);
    }
    if !fields.keywords.is_empty() {
        println!("keywords: {}", fields.keywords);
    }
    if !fields.sample.is_empty() {
        println!("sample: {}", fields.sample);
    }
    if !fields.command.is_empty() {
        println!("command: {}", fields.command);
    }
    println!("md5: {}", fields.md5);
    println!();
    println!("{}", fields.body);
    Ok(())
}

fn run_stub(dir: &PathBuf) -> Result<()> {
    let entries = stub::read_stub(dir)?;
    for (kind, name) in &entries {
        println!("{:<8} {}", kind.tag(), name);
    }
    let params = stub::Parameters::load(dir)?;
    let uuid = params.get("uuid");
    if !uuid.is_empty() {
        println!("uuid     {}", uuid);
    }
    Ok(())
}
