//! Main entry point for the coverzip CLI application.
//!
//! Reads a ZIP archive from the local filesystem, reports
//! how its WAV and JPG entries pair up, and writes the converted archive.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coverzip::{Analysis, Cli, LocalFileReader, Progress, ReadAt, Session};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let reader = Arc::new(
        LocalFileReader::new(Path::new(&cli.file))
            .with_context(|| format!("cannot open {}", cli.file))?,
    );
    process_zip(reader, &cli).await
}

/// Analyze the archive, print the report and, unless `-l` was given,
/// write the converted archive.
async fn process_zip<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    let output_path = Path::new(&cli.output);

    // Refuse before doing any work if the result could not be saved anyway
    if !cli.list && output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", cli.output);
            }
            return Ok(());
        }
        if !cli.overwrite {
            bail!("{} already exists (use -o to overwrite)", cli.output);
        }
    }

    let mut session = Session::new(cli.compression_method());
    let analysis = session
        .analyze(reader)
        .await
        .with_context(|| format!("error analyzing {}", cli.file))?;

    if !cli.is_very_quiet() {
        print_report(analysis, cli.verbose);
    }

    if cli.list {
        return Ok(());
    }

    let quiet = cli.is_quiet();
    let output = session
        .convert(|progress| {
            if quiet {
                return;
            }
            match &progress {
                Progress::Entry { name, .. } => {
                    println!("  converting: {} ({:>3}%)", name, progress.percent())
                }
                Progress::Packaged { entries, bytes } => {
                    println!("  packaged: {} entries, {}", entries, format_size(*bytes as u64))
                }
            }
        })
        .context("error building output archive")?;

    let mut file = tokio::fs::File::create(output_path)
        .await
        .with_context(|| format!("cannot create {}", cli.output))?;
    file.write_all(output)
        .await
        .with_context(|| format!("cannot write {}", cli.output))?;
    file.flush().await?;

    if !cli.is_quiet() {
        println!("Wrote {}", cli.output);
    }
    Ok(())
}

/// Print the pairing summary.
///
/// Verbose mode also lists every pair and the full audio/image lists.
fn print_report(analysis: &Analysis, verbose: bool) {
    println!("WAV files:     {:>5}", analysis.audio_count());
    println!("JPG files:     {:>5}", analysis.image_count());
    println!("Matched pairs: {:>5}", analysis.pairs.len());

    if verbose {
        println!("{}", "-".repeat(70));
        for pair in &analysis.pairs {
            println!("  {:<32}  {}", pair.audio.name, pair.image.name);
        }
        println!("{}", "-".repeat(70));
        println!("Audio:");
        for entry in &analysis.audio {
            println!("  {}", entry.name);
        }
        println!("Images:");
        for entry in &analysis.images {
            println!("  {}", entry.name);
        }
    }

    if !analysis.unmatched.is_empty() {
        println!("Unmatched ({}):", analysis.unmatched.len());
        for name in analysis.unmatched_names() {
            println!("  {}", name);
        }
    }
}

/// Format a byte size into a human-readable string.
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
