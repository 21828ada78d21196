//! PDF to CBZ Converter Library
//!
//! Core logic for pulling embedded page images out of PDFs and packing them
//! into CBZ comic archives. Shared between CLI and WASM targets.
//!
//! Images are found by walking each page's XObject resources (including
//! Form XObjects nested inside them), Flate streams are inflated, and every
//! image is normalized through the `image` crate before being written as a
//! sequentially numbered archive entry.

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub mod archive;
pub mod colorspace;
pub mod filters;
pub mod raster;
pub mod resources;

pub use archive::{entry_name, entry_name_width, write_cbz, ArchiveSummary, ImageEntry};
pub use colorspace::{resolve_pixel_format, ColorSpaceDescriptor, PixelFormat};
pub use filters::StreamFilter;
pub use raster::RasterError;
pub use resources::{extract_images, load_document, PdfImage, ResourceWalker};

use lopdf::Document;
use std::io::Cursor;
use std::path::PathBuf;
use thiserror::Error;

/// Encoding used for archive entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    /// JPEG quality (1-100)
    Jpeg { quality: u8 },
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg { .. } => "jpg",
        }
    }
}

/// Options for PDF to CBZ conversion
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Encoding of the archive entries
    pub format: OutputFormat,
    /// Deflate archive entries instead of storing them
    pub compress_entries: bool,
    /// Deepest Form XObject nesting followed before giving up on a document
    pub max_depth: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            compress_entries: false,
            max_depth: 64,
        }
    }
}

impl ConvertOptions {
    pub fn validate(&self) -> Result<(), CbzError> {
        match self.format {
            OutputFormat::Jpeg { quality } if quality == 0 || quality > 100 => {
                Err(CbzError::InvalidQuality)
            }
            _ => Ok(()),
        }
    }
}

/// Whether the source document could be read at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    Extracted,
    /// The PDF failed to parse; the archive was still written, empty
    Unreadable(String),
}

/// Result of converting one document
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// Where the archive was written, for file conversions
    pub archive: Option<PathBuf>,
    pub status: DocumentStatus,
    pub total_images: usize,
    pub written_images: usize,
    pub skipped_images: usize,
    /// Archive entry names, in order
    pub entries: Vec<String>,
    /// Every extracted image with the entry it was written to
    pub images: Vec<ImageEntry>,
}

/// Error type for conversion operations
#[derive(Debug, Error)]
pub enum CbzError {
    #[error("input path does not exist: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("JPEG quality must be between 1 and 100")]
    InvalidQuality,
    #[error("failed to load PDF: {0}")]
    Load(#[from] lopdf::Error),
    #[error("failed to decompress image /{name} on page {page}: {source}")]
    Decompress {
        page: u32,
        name: String,
        source: std::io::Error,
    },
    #[error("XObject nesting on page {page} exceeds {limit} levels")]
    NestingTooDeep { page: u32, limit: usize },
    #[error("failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convert PDF bytes into CBZ bytes
pub fn pdf_bytes_to_cbz(
    pdf_bytes: &[u8],
    options: &ConvertOptions,
) -> Result<(Vec<u8>, ConvertResult), CbzError> {
    options.validate()?;

    let loaded = Document::load_mem(pdf_bytes);
    let (cursor, result) = archive::assemble(loaded, Cursor::new(Vec::new()), options)?;

    Ok((cursor.into_inner(), result))
}

#[cfg(not(target_arch = "wasm32"))]
pub mod file_ops {
    use super::*;
    use log::{error, info};
    use std::ffi::OsString;
    use std::fs;
    use std::path::Path;

    /// Outcome of converting a file or a directory of files
    #[derive(Debug, Default)]
    pub struct BatchSummary {
        /// PDFs a conversion was started for
        pub attempted: usize,
        pub converted: Vec<ConvertResult>,
        pub failed: Vec<(PathBuf, CbzError)>,
    }

    /// `<out_dir>/<input file stem>.cbz`
    pub fn archive_path(input: &Path, out_dir: &Path) -> PathBuf {
        let mut name = input
            .file_stem()
            .map(|stem| stem.to_os_string())
            .unwrap_or_else(|| OsString::from("output"));
        name.push(".cbz");
        out_dir.join(name)
    }

    /// Convert one PDF file into `<out_dir>/<stem>.cbz`.
    ///
    /// The archive is staged in a temporary file next to its destination and
    /// only renamed into place once the zip is finalized; on any error the
    /// staging file is removed and no archive is left behind.
    pub fn convert_pdf_file(
        input: &Path,
        out_dir: &Path,
        options: &ConvertOptions,
    ) -> Result<ConvertResult, CbzError> {
        options.validate()?;
        fs::create_dir_all(out_dir)?;

        let destination = archive_path(input, out_dir);
        let staging = tempfile::Builder::new()
            .prefix(".pdf2cbz-")
            .suffix(".part")
            .tempfile_in(out_dir)?;

        let loaded = Document::load(input);
        let (staging, mut result) = archive::assemble(loaded, staging, options)?;
        staging
            .persist(&destination)
            .map_err(|e| CbzError::Io(e.error))?;

        info!(
            "{} -> {} ({} of {} images)",
            input.display(),
            destination.display(),
            result.written_images,
            result.total_images
        );
        result.archive = Some(destination);
        Ok(result)
    }

    fn is_pdf(path: &Path) -> bool {
        path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".pdf"))
    }

    /// Convert a single PDF, or every `*.pdf` directly inside a directory.
    ///
    /// Without `output`, archives land next to their source. In directory
    /// mode a failing file is logged and recorded, and the batch moves on.
    pub fn convert_path(
        input: &Path,
        output: Option<&Path>,
        options: &ConvertOptions,
    ) -> Result<BatchSummary, CbzError> {
        if !input.exists() {
            return Err(CbzError::InputNotFound(input.to_path_buf()));
        }
        options.validate()?;

        let mut summary = BatchSummary::default();

        if input.is_file() {
            let out_dir = match output {
                Some(dir) => dir,
                None => input
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new(".")),
            };
            summary.attempted = 1;
            summary.converted.push(convert_pdf_file(input, out_dir, options)?);
            return Ok(summary);
        }

        let out_dir = output.unwrap_or(input);
        let mut pdfs: Vec<PathBuf> = fs::read_dir(input)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_pdf(path))
            .collect();
        pdfs.sort();

        for pdf in pdfs {
            summary.attempted += 1;
            match convert_pdf_file(&pdf, out_dir, options) {
                Ok(result) => summary.converted.push(result),
                Err(e) => {
                    error!("{}: {}", pdf.display(), e);
                    summary.failed.push((pdf, e));
                }
            }
        }

        Ok(summary)
    }

}
