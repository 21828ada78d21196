//! Stream filter handling for image XObjects.

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object};
use std::io::{self, Read};

/// A declared `/Filter` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFilter {
    Flate,
    Dct,
    Jpx,
    Other(String),
}

impl StreamFilter {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"FlateDecode" | b"Fl" => StreamFilter::Flate,
            b"DCTDecode" | b"DCT" => StreamFilter::Dct,
            b"JPXDecode" => StreamFilter::Jpx,
            other => StreamFilter::Other(String::from_utf8_lossy(other).to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            StreamFilter::Flate => "FlateDecode",
            StreamFilter::Dct => "DCTDecode",
            StreamFilter::Jpx => "JPXDecode",
            StreamFilter::Other(name) => name,
        }
    }
}

/// Read the `/Filter` entry of a stream dictionary. A single name and an
/// array of names are both accepted; anything else means no filter.
pub fn stream_filters(dict: &Dictionary) -> Vec<StreamFilter> {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![StreamFilter::from_name(n)],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|f| match f {
                Object::Name(n) => Some(StreamFilter::from_name(n)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// `/DecodeParms` of the Flate stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeParams {
    /// 1 = none, 2 = TIFF, 10-15 = PNG
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl DecodeParams {
    /// Read the parameters that apply to the Flate filter. `/DecodeParms`
    /// is either one dictionary or an array parallel to `/Filter`.
    pub fn from_stream(doc: &Document, dict: &Dictionary, filters: &[StreamFilter]) -> Self {
        let entry = match dict.get(b"DecodeParms") {
            Ok(entry) => resolve(doc, entry),
            Err(_) => return Self::default(),
        };

        let params = match entry {
            Some(Object::Dictionary(d)) => Some(d),
            Some(Object::Array(arr)) => filters
                .iter()
                .position(|f| *f == StreamFilter::Flate)
                .and_then(|i| arr.get(i))
                .and_then(|p| match resolve(doc, p) {
                    Some(Object::Dictionary(d)) => Some(d),
                    _ => None,
                }),
            _ => None,
        };

        let Some(params) = params else {
            return Self::default();
        };
        let int = |key: &[u8], default: i64| match params.get(key).ok().and_then(|o| resolve(doc, o)) {
            Some(Object::Integer(n)) => *n,
            _ => default,
        };

        DecodeParams {
            predictor: int(b"Predictor", 1),
            colors: int(b"Colors", 1).max(1) as usize,
            bits_per_component: int(b"BitsPerComponent", 8).max(1) as usize,
            columns: int(b"Columns", 1).max(1) as usize,
        }
    }

    /// Bytes of sample data per row
    fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Bytes per whole pixel, at least one
    fn pixel_bytes(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        _ => Some(obj),
    }
}

/// Undo the Flate stage of a filter chain, if there is one, including any
/// PNG or TIFF predictor declared for it.
///
/// Always returns a fresh buffer; the stream content is left untouched.
/// Other filters (DCT, JPX, ...) pass through as-is since their output is
/// consumed directly by the raster codec.
pub fn decode_stream(
    content: &[u8],
    filters: &[StreamFilter],
    params: &DecodeParams,
) -> io::Result<Vec<u8>> {
    if !filters.contains(&StreamFilter::Flate) {
        return Ok(content.to_vec());
    }

    let mut decoder = ZlibDecoder::new(content);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    undo_predictor(decoded, params)
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn undo_predictor(data: Vec<u8>, params: &DecodeParams) -> io::Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data),
        2 => undo_tiff_predictor(data, params),
        10..=15 => undo_png_predictor(&data, params),
        other => Err(invalid(format!("unsupported predictor {}", other))),
    }
}

/// TIFF predictor 2: each sample is stored as the difference from the
/// sample of the same color to its left. Only 8-bit samples are handled.
fn undo_tiff_predictor(mut data: Vec<u8>, params: &DecodeParams) -> io::Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(invalid(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }

    let row_bytes = params.row_bytes();
    let colors = params.colors;
    for row in data.chunks_mut(row_bytes) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(data)
}

/// PNG predictors: every row starts with a tag byte naming its filter.
/// A trailing partial row is dropped.
fn undo_png_predictor(data: &[u8], params: &DecodeParams) -> io::Result<Vec<u8>> {
    let row_bytes = params.row_bytes();
    let bpp = params.pixel_bytes();
    let mut output: Vec<u8> = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_bytes];

    for encoded in data.chunks_exact(row_bytes + 1) {
        let tag = encoded[0];
        let mut row = encoded[1..].to_vec();

        match tag {
            0 => {}
            1 => {
                for i in bpp..row_bytes {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_bytes {
                    row[i] = row[i].wrapping_add(previous[i]);
                }
            }
            3 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                    row[i] = row[i].wrapping_add(((left + previous[i] as u16) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
                    row[i] = row[i].wrapping_add(paeth(left, previous[i], up_left));
                }
            }
            other => return Err(invalid(format!("invalid PNG predictor tag {}", other))),
        }

        output.extend_from_slice(&row);
        previous = row;
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
