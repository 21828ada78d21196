//! Turning extracted image data into normalized rasters and encoding them
//! for the archive.

use crate::colorspace::PixelFormat;
use crate::filters::StreamFilter;
use crate::resources::PdfImage;
use crate::OutputFormat;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use std::io::Cursor;
use thiserror::Error;

/// Why a single image could not be turned into an archive entry
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("unrecognized image data ({0} bytes)")]
    Unrecognized(usize),
    #[error("invalid image dimensions {0}x{1}")]
    Dimensions(u32, u32),
    #[error("unsupported {color} samples: {bits} bits per component, {len} bytes (expected {expected})")]
    SampleLayout {
        color: &'static str,
        bits: u32,
        len: usize,
        expected: usize,
    },
    #[error("failed to encode JPEG: {0}")]
    Jpeg(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Decode an extracted image into a raster.
///
/// JPEG streams go straight to the codec. Raw samples are interpreted using
/// the declared pixel format; when that is unknown, or the data is still
/// behind a filter other than Flate, the codec sniffs the bytes instead.
pub fn decode_raster(img: &PdfImage) -> Result<DynamicImage, RasterError> {
    if img.filters.contains(&StreamFilter::Dct) {
        return Ok(image::load_from_memory_with_format(&img.data, ImageFormat::Jpeg)?);
    }

    if img.is_encoded() || img.pixel_format == PixelFormat::Unknown {
        return sniff(&img.data);
    }

    match from_samples(img) {
        Ok(raster) => Ok(raster),
        // Some producers mislabel already-encoded data; give the codec a try
        Err(e) => match image::guess_format(&img.data) {
            Ok(_) => sniff(&img.data),
            Err(_) => Err(e),
        },
    }
}

fn sniff(data: &[u8]) -> Result<DynamicImage, RasterError> {
    image::guess_format(data).map_err(|_| RasterError::Unrecognized(data.len()))?;
    Ok(image::load_from_memory(data)?)
}

/// Build a raster from uncompressed samples
fn from_samples(img: &PdfImage) -> Result<DynamicImage, RasterError> {
    let (width, height) = (img.width, img.height);
    if width == 0 || height == 0 {
        return Err(RasterError::Dimensions(width, height));
    }

    let components = match img.pixel_format.components() {
        Some(c) => c,
        None => return Err(RasterError::Unrecognized(img.data.len())),
    };
    let samples = unpack_samples(img, components)?;

    match img.pixel_format {
        PixelFormat::Grayscale => GrayImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageLuma8)
            .ok_or(RasterError::Dimensions(width, height)),
        PixelFormat::Rgb => RgbImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageRgb8)
            .ok_or(RasterError::Dimensions(width, height)),
        PixelFormat::Cmyk => RgbImage::from_raw(width, height, cmyk_to_rgb(&samples))
            .map(DynamicImage::ImageRgb8)
            .ok_or(RasterError::Dimensions(width, height)),
        PixelFormat::Unknown => Err(RasterError::Unrecognized(img.data.len())),
    }
}

/// Expand packed samples to one byte per component. Rows are padded to a
/// byte boundary; 16-bit samples keep their high byte.
fn unpack_samples(img: &PdfImage, components: u32) -> Result<Vec<u8>, RasterError> {
    let bits = img.bits_per_component;
    let samples_per_row = img.width as usize * components as usize;
    let stride = (samples_per_row * bits as usize).div_ceil(8);
    let expected = stride * img.height as usize;

    let layout_error = || RasterError::SampleLayout {
        color: img.pixel_format.as_str(),
        bits,
        len: img.data.len(),
        expected,
    };

    if !matches!(bits, 1 | 2 | 4 | 8 | 16) || img.data.len() < expected {
        return Err(layout_error());
    }

    let data = &img.data[..expected];
    match bits {
        8 => Ok(data.to_vec()),
        16 => Ok(data.chunks_exact(2).map(|pair| pair[0]).collect()),
        _ => {
            let max = (1u16 << bits) - 1;
            let mut out = Vec::with_capacity(samples_per_row * img.height as usize);
            for row in data.chunks_exact(stride) {
                for s in 0..samples_per_row {
                    let offset = s * bits as usize;
                    let shift = 8 - bits as usize - offset % 8;
                    let value = (row[offset / 8] >> shift) as u16 & max;
                    out.push((value * 255 / max) as u8);
                }
            }
            Ok(out)
        }
    }
}

fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(cmyk.len() / 4 * 3);
    for chunk in cmyk.chunks_exact(4) {
        let c = chunk[0] as f32 / 255.0;
        let m = chunk[1] as f32 / 255.0;
        let y = chunk[2] as f32 / 255.0;
        let k = chunk[3] as f32 / 255.0;

        rgb.push(((1.0 - c) * (1.0 - k) * 255.0) as u8);
        rgb.push(((1.0 - m) * (1.0 - k) * 255.0) as u8);
        rgb.push(((1.0 - y) * (1.0 - k) * 255.0) as u8);
    }
    rgb
}

/// Reduce a raster to 8-bit gray, gray+alpha, RGB or RGBA
pub fn normalize(raster: DynamicImage) -> DynamicImage {
    match raster {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => raster,
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(raster.to_luma8()),
        DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLumaA8(raster.to_luma_alpha8()),
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgb32F(_) => {
            DynamicImage::ImageRgb8(raster.to_rgb8())
        }
        other => DynamicImage::ImageRgba8(other.to_rgba8()),
    }
}

/// Encode a normalized raster in the archive's output format
pub fn encode_raster(raster: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, RasterError> {
    match format {
        OutputFormat::Png => {
            let mut png_bytes = Vec::new();
            raster.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
            Ok(png_bytes)
        }
        OutputFormat::Jpeg { quality } => encode_jpeg(raster, quality),
    }
}

fn encode_jpeg(raster: &DynamicImage, quality: u8) -> Result<Vec<u8>, RasterError> {
    let (width, height) = (raster.width(), raster.height());
    if width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(RasterError::Jpeg(format!(
            "{}x{} exceeds the JPEG size limit",
            width, height
        )));
    }

    let (samples, color_type, subsample) = match raster {
        DynamicImage::ImageLuma8(gray) => (gray.as_raw().clone(), jpeg_encoder::ColorType::Luma, false),
        _ => (raster.to_rgb8().into_raw(), jpeg_encoder::ColorType::Rgb, true),
    };

    let mut jpeg_bytes = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg_bytes, quality);
    if subsample {
        encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
    }
    encoder
        .encode(&samples, width as u16, height as u16, color_type)
        .map_err(|e| RasterError::Jpeg(e.to_string()))?;

    Ok(jpeg_bytes)
}
