//! PDF to CBZ CLI
//!
//! Converts a PDF, or every PDF in a directory, into CBZ archives.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use pdf2cbz::{file_ops::convert_path, ConvertOptions, OutputFormat};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Png,
    Jpeg,
}

/// Extract the page images of PDFs into CBZ archives
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// PDF file, or directory of PDFs, to convert
    input: PathBuf,

    /// Output directory (defaults to the input's directory)
    output: Option<PathBuf>,

    /// Encoding of the archive images
    #[arg(short, long, value_enum, default_value = "png")]
    format: FormatArg,

    /// JPEG quality (1-100, only used with --format jpeg)
    #[arg(short, long, default_value = "90")]
    quality: u8,

    /// Deflate archive entries instead of storing them
    #[arg(long)]
    deflate: bool,

    /// Deepest Form XObject nesting to follow
    #[arg(long, default_value = "64")]
    max_depth: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let options = ConvertOptions {
        format: match args.format {
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Jpeg => OutputFormat::Jpeg {
                quality: args.quality,
            },
        },
        compress_entries: args.deflate,
        max_depth: args.max_depth,
    };

    let start = Instant::now();
    let summary = convert_path(&args.input, args.output.as_deref(), &options)
        .with_context(|| format!("converting {}", args.input.display()))?;

    for (path, err) in &summary.failed {
        println!("Failed: {}: {}", path.display(), err);
    }
    println!(
        "Converted {} PDF in {:.2?}",
        summary.attempted,
        start.elapsed()
    );

    Ok(())
}
