//! Color space resolution for image XObjects.

use lopdf::{Document, Object};

/// Pixel layout of an image's samples, as far as the PDF declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Cmyk,
    Grayscale,
    /// Nothing usable was declared; the raster codec has to sniff the data.
    Unknown,
}

impl PixelFormat {
    /// Number of color components per pixel, if known
    pub fn components(self) -> Option<u32> {
        match self {
            PixelFormat::Rgb => Some(3),
            PixelFormat::Cmyk => Some(4),
            PixelFormat::Grayscale => Some(1),
            PixelFormat::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Rgb => "RGB",
            PixelFormat::Cmyk => "CMYK",
            PixelFormat::Grayscale => "Gray",
            PixelFormat::Unknown => "Unknown",
        }
    }
}

/// A `/ColorSpace` entry reduced to the kinds we can act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpaceDescriptor {
    DeviceRgb,
    DeviceCmyk,
    DeviceGray,
    /// `[/ICCBased stream]`; `components` is the profile stream's `/N`
    IccBased { components: Option<i64> },
    /// Any other family (Indexed, Separation, Lab, ...)
    Other(String),
}

impl ColorSpaceDescriptor {
    /// Parse a `/ColorSpace` value, following indirect references.
    pub fn from_object(doc: &Document, obj: &Object) -> Self {
        match obj {
            Object::Name(name) => Self::from_family(name),
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(resolved) => Self::from_object(doc, resolved),
                Err(_) => ColorSpaceDescriptor::Other("missing".to_string()),
            },
            Object::Array(arr) => match arr.first() {
                Some(Object::Name(family)) if family.as_slice() == b"ICCBased" => {
                    ColorSpaceDescriptor::IccBased {
                        components: arr.get(1).and_then(|profile| icc_components(doc, profile)),
                    }
                }
                // Single-element arrays such as [/DeviceRGB] are legal
                Some(Object::Name(family)) if arr.len() == 1 => Self::from_family(family),
                Some(Object::Name(family)) => {
                    ColorSpaceDescriptor::Other(String::from_utf8_lossy(family).to_string())
                }
                _ => ColorSpaceDescriptor::Other("malformed".to_string()),
            },
            _ => ColorSpaceDescriptor::Other("malformed".to_string()),
        }
    }

    fn from_family(name: &[u8]) -> Self {
        match name {
            b"DeviceRGB" => ColorSpaceDescriptor::DeviceRgb,
            b"DeviceCMYK" => ColorSpaceDescriptor::DeviceCmyk,
            b"DeviceGray" => ColorSpaceDescriptor::DeviceGray,
            other => ColorSpaceDescriptor::Other(String::from_utf8_lossy(other).to_string()),
        }
    }
}

/// Read `/N` from an ICC profile stream
fn icc_components(doc: &Document, profile: &Object) -> Option<i64> {
    let stream = match profile {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Stream(s) => s,
            _ => return None,
        },
        Object::Stream(s) => s,
        _ => return None,
    };

    match stream.dict.get(b"N").ok()? {
        Object::Integer(n) => Some(*n),
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Integer(n) => Some(*n),
            _ => None,
        },
        _ => None,
    }
}

/// Map a declared color space to a pixel format. An absent descriptor
/// resolves to `Unknown`.
pub fn resolve_pixel_format(descriptor: Option<&ColorSpaceDescriptor>) -> PixelFormat {
    match descriptor {
        None => PixelFormat::Unknown,
        Some(ColorSpaceDescriptor::DeviceRgb) => PixelFormat::Rgb,
        Some(ColorSpaceDescriptor::DeviceCmyk) => PixelFormat::Cmyk,
        Some(ColorSpaceDescriptor::DeviceGray) => PixelFormat::Grayscale,
        Some(ColorSpaceDescriptor::IccBased { components }) => match components {
            Some(1) => PixelFormat::Grayscale,
            Some(3) => PixelFormat::Rgb,
            Some(4) => PixelFormat::Cmyk,
            _ => PixelFormat::Unknown,
        },
        Some(ColorSpaceDescriptor::Other(_)) => PixelFormat::Unknown,
    }
}
