//! CBZ assembly: naming, normalizing and zipping extracted images.

use crate::colorspace::PixelFormat;
use crate::filters::StreamFilter;
use crate::raster::{decode_raster, encode_raster, normalize};
use crate::resources::{extract_images, PdfImage};
use crate::{CbzError, ConvertOptions, ConvertResult, DocumentStatus};
use log::{debug, warn};
use lopdf::{Document, ObjectId};
use std::io::{Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Digits needed to name `count` entries so they sort lexicographically in
/// order, i.e. `floor(log10(count)) + 1`. There is no width for an empty
/// archive.
pub fn entry_name_width(count: usize) -> Option<usize> {
    count.checked_ilog10().map(|digits| digits as usize + 1)
}

/// Zero-padded entry name, e.g. `entry_name(7, 3, "png") == "007.png"`
pub fn entry_name(index: usize, width: usize, extension: &str) -> String {
    format!("{:0width$}.{}", index, extension, width = width)
}

/// One extracted image and the entry it became, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub page: u32,
    pub name: String,
    pub object_id: Option<ObjectId>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub bits_per_component: u32,
    pub filters: Vec<StreamFilter>,
    /// Size of the stream data after Flate decoding
    pub size: usize,
    /// `None` when the image was skipped
    pub entry: Option<String>,
}

impl ImageEntry {
    fn describe(image: &PdfImage, entry: Option<String>) -> Self {
        ImageEntry {
            page: image.page,
            name: image.name.clone(),
            object_id: image.object_id,
            width: image.width,
            height: image.height,
            pixel_format: image.pixel_format,
            bits_per_component: image.bits_per_component,
            filters: image.filters.clone(),
            size: image.data.len(),
            entry,
        }
    }
}

/// What ended up in an archive
#[derive(Debug, Clone, Default)]
pub struct ArchiveSummary {
    /// Entry names, in write order
    pub entries: Vec<String>,
    /// Images that could not be decoded and were left out
    pub skipped: usize,
    /// Every extracted image, in extraction order
    pub images: Vec<ImageEntry>,
}

/// Write `images` as a CBZ into `writer` and finalize the zip.
///
/// Entry `i` is named after the image's position in `images`, so an image
/// that fails to decode leaves a gap rather than shifting later pages.
pub fn write_cbz<W: Write + Seek>(
    writer: W,
    images: Vec<PdfImage>,
    options: &ConvertOptions,
) -> Result<(W, ArchiveSummary), CbzError> {
    let mut zip = ZipWriter::new(writer);
    let file_options = SimpleFileOptions::default().compression_method(if options.compress_entries {
        CompressionMethod::Deflated
    } else {
        CompressionMethod::Stored
    });

    let mut summary = ArchiveSummary::default();
    if let Some(width) = entry_name_width(images.len()) {
        let extension = options.format.extension();

        for (index, image) in images.into_iter().enumerate() {
            let encoded = match decode_raster(&image)
                .and_then(|raster| encode_raster(&normalize(raster), options.format))
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        "page {}: skipping image /{} ({}x{}): {}",
                        image.page, image.name, image.width, image.height, e
                    );
                    summary.skipped += 1;
                    summary.images.push(ImageEntry::describe(&image, None));
                    continue;
                }
            };

            let name = entry_name(index, width, extension);
            debug!("writing {} ({} bytes) from page {}", name, encoded.len(), image.page);
            zip.start_file(name.as_str(), file_options)?;
            zip.write_all(&encoded)?;
            summary.images.push(ImageEntry::describe(&image, Some(name.clone())));
            summary.entries.push(name);
        }
    }

    let writer = zip.finish()?;
    Ok((writer, summary))
}

/// Convert a (possibly unreadable) document into a CBZ written to `writer`.
///
/// A document that failed to load still yields a valid, empty archive; the
/// returned status records why.
pub fn assemble<W: Write + Seek>(
    loaded: Result<Document, lopdf::Error>,
    writer: W,
    options: &ConvertOptions,
) -> Result<(W, ConvertResult), CbzError> {
    let (status, images) = match loaded {
        Ok(doc) => (DocumentStatus::Extracted, extract_images(&doc, options)?),
        Err(e) => {
            warn!("unreadable PDF, writing an empty archive: {}", e);
            (DocumentStatus::Unreadable(e.to_string()), Vec::new())
        }
    };

    let total_images = images.len();
    let (writer, summary) = write_cbz(writer, images, options)?;

    Ok((
        writer,
        ConvertResult {
            archive: None,
            status,
            total_images,
            written_images: summary.entries.len(),
            skipped_images: summary.skipped,
            entries: summary.entries,
            images: summary.images,
        },
    ))
}
