#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, ImageFormat, RgbImage};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::{Cursor, Write};
use std::path::Path;

/// Small in-memory PDF assembler for fixtures
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        PdfBuilder {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn add(&mut self, object: impl Into<Object>) -> ObjectId {
        self.doc.add_object(object)
    }

    /// Add a page; `None` leaves out `/Resources` entirely
    pub fn page(&mut self, xobjects: Option<Dictionary>) -> &mut Self {
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
        };
        if let Some(xobjects) = xobjects {
            page.set("Resources", dictionary! { "XObject" => xobjects });
        }
        let id = self.doc.add_object(page);
        self.kids.push(Object::Reference(id));
        self
    }

    pub fn to_bytes(&mut self) -> Vec<u8> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids.clone(),
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        self.doc.save_to(&mut buf).expect("failed to save test PDF");
        buf
    }

    pub fn write_to(&mut self, path: &Path) {
        std::fs::write(path, self.to_bytes()).expect("failed to write test PDF");
    }
}

fn image_dict(width: u32, height: u32, color_space: &str) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8i64,
    }
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Flate-compressed DeviceRGB samples of a single color
pub fn flate_rgb_image(width: u32, height: u32, rgb: [u8; 3]) -> Stream {
    let samples: Vec<u8> = (0..width * height).flat_map(|_| rgb).collect();
    let mut dict = image_dict(width, height, "DeviceRGB");
    dict.set("Filter", "FlateDecode");
    Stream::new(dict, deflate(&samples))
}

/// Uncompressed DeviceGray samples
pub fn raw_gray_image(width: u32, height: u32, value: u8) -> Stream {
    Stream::new(
        image_dict(width, height, "DeviceGray"),
        vec![value; (width * height) as usize],
    )
}

/// A DCTDecode (JPEG) image
pub fn jpeg_image(width: u32, height: u32) -> Stream {
    let raster = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([30, 90, 200])));
    let mut jpeg = Vec::new();
    raster
        .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .unwrap();
    let mut dict = image_dict(width, height, "DeviceRGB");
    dict.set("Filter", "DCTDecode");
    Stream::new(dict, jpeg)
}

/// Flate-declared image whose content is not a zlib stream
pub fn corrupt_flate_image() -> Stream {
    let mut dict = image_dict(2, 2, "DeviceRGB");
    dict.set("Filter", "FlateDecode");
    Stream::new(dict, b"this is not zlib data".to_vec())
}

/// 2x2 gray checkerboard, Flate with PNG predictors (Sub row, Up row)
pub fn png_predicted_gray_image() -> Stream {
    let mut dict = image_dict(2, 2, "DeviceGray");
    dict.set("Filter", "FlateDecode");
    dict.set("DecodeParms", dictionary! { "Predictor" => 15i64, "Columns" => 2i64 });
    Stream::new(dict, deflate(&[1, 255, 1, 2, 1, 255]))
}

/// Gray image behind ASCIIHexDecode, which is never undone
pub fn ascii_hex_gray_image() -> Stream {
    let mut dict = image_dict(2, 1, "DeviceGray");
    dict.set("Filter", "ASCIIHexDecode");
    Stream::new(dict, b"FF00>".to_vec())
}

/// Form XObject carrying its own XObject resources
pub fn form(xobjects: Dictionary) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(1), Object::Integer(1)],
            "Resources" => dictionary! { "XObject" => xobjects },
        },
        Vec::new(),
    )
}
