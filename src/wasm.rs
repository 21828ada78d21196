//! WebAssembly bindings for the PDF to CBZ converter

use crate::{pdf_bytes_to_cbz, ConvertOptions, ImageEntry, OutputFormat};
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn options_from(format: Option<String>, quality: Option<u8>) -> Result<ConvertOptions, JsError> {
    let format = match format.as_deref() {
        None | Some("png") => OutputFormat::Png,
        Some("jpeg") | Some("jpg") => OutputFormat::Jpeg {
            quality: quality.unwrap_or(90),
        },
        Some(other) => return Err(JsError::new(&format!("Unsupported format: {}", other))),
    };

    Ok(ConvertOptions {
        format,
        ..ConvertOptions::default()
    })
}

/// Convert a PDF into a CBZ archive
///
/// # Arguments
/// * `pdf_bytes` - The input PDF file as a byte array
/// * `format` - "png" (default) or "jpeg"
/// * `quality` - JPEG quality 1-100 (default: 90), ignored for PNG
///
/// # Returns
/// The CBZ archive as a byte array, or throws an error
#[wasm_bindgen]
pub fn pdf_to_cbz(
    pdf_bytes: &[u8],
    format: Option<String>,
    quality: Option<u8>,
) -> Result<Vec<u8>, JsError> {
    let options = options_from(format, quality)?;
    let (cbz_bytes, _result) =
        pdf_bytes_to_cbz(pdf_bytes, &options).map_err(|e| JsError::new(&e.to_string()))?;

    Ok(cbz_bytes)
}

/// Convert a PDF into a CBZ archive with detailed result information
#[wasm_bindgen]
pub fn pdf_to_cbz_with_info(
    pdf_bytes: &[u8],
    format: Option<String>,
    quality: Option<u8>,
) -> Result<CbzResultJs, JsError> {
    let options = options_from(format, quality)?;
    let (cbz_bytes, result) =
        pdf_bytes_to_cbz(pdf_bytes, &options).map_err(|e| JsError::new(&e.to_string()))?;

    let image_info_json =
        serde_json::to_string(&images_to_json(&result.images)).unwrap_or_else(|_| "[]".to_string());

    Ok(CbzResultJs {
        cbz_bytes,
        total_images: result.total_images,
        written_images: result.written_images,
        skipped_images: result.skipped_images,
        image_info_json,
    })
}

/// Describe each source image alongside the entry it was written to
fn images_to_json(images: &[ImageEntry]) -> Vec<serde_json::Value> {
    images
        .iter()
        .map(|img| {
            serde_json::json!({
                "page": img.page,
                "name": img.name,
                "objectId": img.object_id.map(|id| format!("{} {}", id.0, id.1)),
                "width": img.width,
                "height": img.height,
                "colorSpace": img.pixel_format.as_str(),
                "bpc": img.bits_per_component,
                "filters": img.filters.iter().map(|f| f.name()).collect::<Vec<_>>(),
                "size": img.size,
                "entry": img.entry,
            })
        })
        .collect()
}

/// Result of a conversion with statistics
#[wasm_bindgen]
pub struct CbzResultJs {
    cbz_bytes: Vec<u8>,
    total_images: usize,
    written_images: usize,
    skipped_images: usize,
    image_info_json: String,
}

#[wasm_bindgen]
impl CbzResultJs {
    /// Get the CBZ archive bytes
    #[wasm_bindgen(getter)]
    pub fn cbz_bytes(&self) -> Vec<u8> {
        self.cbz_bytes.clone()
    }

    /// Get the total number of images found
    #[wasm_bindgen(getter)]
    pub fn total_images(&self) -> usize {
        self.total_images
    }

    /// Get the number of images written to the archive
    #[wasm_bindgen(getter)]
    pub fn written_images(&self) -> usize {
        self.written_images
    }

    /// Get the number of images that could not be decoded
    #[wasm_bindgen(getter)]
    pub fn skipped_images(&self) -> usize {
        self.skipped_images
    }

    /// Get detailed image information as JSON string
    #[wasm_bindgen(getter)]
    pub fn image_info_json(&self) -> String {
        self.image_info_json.clone()
    }
}
