//! Locating image XObjects through page resource dictionaries.
//!
//! Images can sit directly in a page's `/XObject` dictionary or inside
//! Form XObjects that carry their own `/Resources`, nested to any depth.
//! The walker visits entries in the order they appear in each dictionary,
//! depth first, so the result matches the reading order of the file.

use crate::colorspace::{resolve_pixel_format, ColorSpaceDescriptor, PixelFormat};
use crate::filters::{decode_stream, stream_filters, DecodeParams, StreamFilter};
use crate::{CbzError, ConvertOptions};
use log::{debug, warn};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Upper bound on `/Parent` hops when looking for inherited resources
const MAX_PARENT_HOPS: usize = 32;

/// An image XObject pulled out of a document, filters already undone.
#[derive(Debug, Clone)]
pub struct PdfImage {
    /// 1-based page number the image was found on
    pub page: u32,
    /// Resource name the image was registered under (without the slash)
    pub name: String,
    /// Indirect object id, if the entry was a reference
    pub object_id: Option<ObjectId>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub bits_per_component: u32,
    /// Filters as declared on the stream
    pub filters: Vec<StreamFilter>,
    /// Stream content after Flate decoding
    pub data: Vec<u8>,
}

impl PdfImage {
    /// True when `data` is not raw samples: it is still in an encoded image
    /// format (JPEG, JPEG 2000) or behind a filter that is never undone here.
    pub fn is_encoded(&self) -> bool {
        self.filters.iter().any(|f| *f != StreamFilter::Flate)
    }
}

/// Load a document from memory
pub fn load_document(pdf_bytes: &[u8]) -> Result<Document, CbzError> {
    Ok(Document::load_mem(pdf_bytes)?)
}

/// Resolve an object that may be an indirect reference
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        _ => Some(obj),
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

/// `/Resources /XObject` of a dictionary that carries resources
fn xobjects_of<'a>(doc: &'a Document, dict: &'a Dictionary) -> Option<&'a Dictionary> {
    let resources = resolve_dict(doc, dict.get(b"Resources").ok()?)?;
    resolve_dict(doc, resources.get(b"XObject").ok()?)
}

/// A page's XObject dictionary, honoring resources inherited from the
/// page tree.
pub fn page_xobjects<'a>(doc: &'a Document, page: &'a Dictionary) -> Option<&'a Dictionary> {
    let mut node = page;
    for _ in 0..MAX_PARENT_HOPS {
        if node.has(b"Resources") {
            return xobjects_of(doc, node);
        }
        node = match node.get(b"Parent") {
            Ok(parent) => resolve_dict(doc, parent)?,
            Err(_) => return None,
        };
    }
    None
}

fn integer(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match resolve(doc, dict.get(key).ok()?)? {
        Object::Integer(n) => Some(*n),
        Object::Real(r) => Some(*r as i64),
        _ => None,
    }
}

/// A non-negative integer entry that fits in `u32`; anything else reads as 0
fn dimension(doc: &Document, dict: &Dictionary, key: &[u8], default: u32) -> u32 {
    match integer(doc, dict, key) {
        Some(n) => u32::try_from(n).unwrap_or(0),
        None => default,
    }
}

fn is_image(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n.as_slice() == b"Image")
}

/// Depth-first collector of image XObjects below one resource dictionary.
pub struct ResourceWalker<'a> {
    doc: &'a Document,
    max_depth: usize,
    /// Form XObjects currently being descended into
    path: Vec<ObjectId>,
}

impl<'a> ResourceWalker<'a> {
    pub fn new(doc: &'a Document, max_depth: usize) -> Self {
        ResourceWalker {
            doc,
            max_depth,
            path: Vec::new(),
        }
    }

    /// Collect every image reachable from `xobjects`, in encounter order.
    pub fn collect(&mut self, page: u32, xobjects: &'a Dictionary) -> Result<Vec<PdfImage>, CbzError> {
        let mut images = Vec::new();
        self.path.clear();
        self.walk(page, xobjects, 0, &mut images)?;
        Ok(images)
    }

    fn walk(
        &mut self,
        page: u32,
        xobjects: &'a Dictionary,
        depth: usize,
        images: &mut Vec<PdfImage>,
    ) -> Result<(), CbzError> {
        if depth > self.max_depth {
            return Err(CbzError::NestingTooDeep {
                page,
                limit: self.max_depth,
            });
        }

        let doc = self.doc;
        for (name, value) in xobjects.iter() {
            let name = String::from_utf8_lossy(name).to_string();
            let (object_id, object) = match value {
                Object::Reference(id) => match doc.get_object(*id) {
                    Ok(obj) => (Some(*id), obj),
                    Err(_) => {
                        debug!("page {}: /{} points to missing object {:?}", page, name, id);
                        continue;
                    }
                },
                other => (None, other),
            };

            let dict = match object {
                Object::Stream(s) => &s.dict,
                Object::Dictionary(d) => d,
                _ => continue,
            };

            if let Some(nested) = xobjects_of(doc, dict) {
                if let Some(id) = object_id {
                    if self.path.contains(&id) {
                        warn!("page {}: /{} {:?} refers back to itself, skipping", page, name, id);
                        continue;
                    }
                    self.path.push(id);
                }

                let result = self.walk(page, nested, depth + 1, images);
                if object_id.is_some() {
                    self.path.pop();
                }
                result?;
            } else if is_image(dict) {
                if let Object::Stream(stream) = object {
                    images.push(self.read_image(page, name, object_id, stream)?);
                }
            }
        }

        Ok(())
    }

    fn read_image(
        &self,
        page: u32,
        name: String,
        object_id: Option<ObjectId>,
        stream: &Stream,
    ) -> Result<PdfImage, CbzError> {
        let filters = stream_filters(&stream.dict);
        let params = DecodeParams::from_stream(self.doc, &stream.dict, &filters);
        let data =
            decode_stream(&stream.content, &filters, &params).map_err(|source| CbzError::Decompress {
                page,
                name: name.clone(),
                source,
            })?;

        let descriptor = stream
            .dict
            .get(b"ColorSpace")
            .ok()
            .map(|cs| ColorSpaceDescriptor::from_object(self.doc, cs));
        let pixel_format = resolve_pixel_format(descriptor.as_ref());

        let width = dimension(self.doc, &stream.dict, b"Width", 0);
        let height = dimension(self.doc, &stream.dict, b"Height", 0);
        let bits_per_component = dimension(self.doc, &stream.dict, b"BitsPerComponent", 8);

        debug!(
            "page {}: image /{} {}x{} {} {}bpc, {} bytes",
            page,
            name,
            width,
            height,
            pixel_format.as_str(),
            bits_per_component,
            data.len()
        );

        Ok(PdfImage {
            page,
            name,
            object_id,
            width,
            height,
            pixel_format,
            bits_per_component,
            filters,
            data,
        })
    }
}

/// Gather the images of every page, in page order.
///
/// Pages without `/Resources` or without an `/XObject` entry contribute
/// nothing.
pub fn extract_images(doc: &Document, options: &ConvertOptions) -> Result<Vec<PdfImage>, CbzError> {
    let mut images = Vec::new();
    let mut walker = ResourceWalker::new(doc, options.max_depth);

    for (page_num, page_id) in doc.get_pages() {
        let page_dict = match doc.get_object(page_id) {
            Ok(Object::Dictionary(d)) => d,
            _ => continue,
        };

        let xobjects = match page_xobjects(doc, page_dict) {
            Some(x) => x,
            None => {
                debug!("page {}: no XObject resources", page_num);
                continue;
            }
        };

        let found = walker.collect(page_num, xobjects)?;
        debug!("page {}: {} images", page_num, found.len());
        images.extend(found);
    }

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn image_stream(tag: u8) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1i64,
                "Height" => 1i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
            },
            vec![tag],
        )
    }

    fn rect(size: i64) -> Vec<Object> {
        vec![0i64, 0, size, size].into_iter().map(Object::Integer).collect()
    }

    fn form_stream(xobjects: Dictionary) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => rect(1),
                "Resources" => dictionary! { "XObject" => xobjects },
            },
            Vec::new(),
        )
    }

    /// Build a document whose pages carry the given resource dictionaries
    fn document_with_pages(doc: &mut Document, pages: Vec<Option<Dictionary>>) {
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for resources in pages {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => rect(612),
            };
            if let Some(resources) = resources {
                page.set("Resources", resources);
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
    }

    fn tags(images: &[PdfImage]) -> Vec<u8> {
        images.iter().map(|img| img.data[0]).collect()
    }

    #[test]
    fn nested_forms_are_walked_depth_first() {
        let mut doc = Document::with_version("1.5");
        let deep = doc.add_object(image_stream(3));
        let inner_form = doc.add_object(form_stream(dictionary! { "Im3" => deep }));
        let mid = doc.add_object(image_stream(2));
        let outer_form = doc.add_object(form_stream(dictionary! {
            "Fm2" => inner_form,
            "Im2" => mid,
        }));
        let first = doc.add_object(image_stream(1));
        let last = doc.add_object(image_stream(4));

        document_with_pages(
            &mut doc,
            vec![Some(dictionary! {
                "XObject" => dictionary! {
                    "Im1" => first,
                    "Fm1" => outer_form,
                    "Im4" => last,
                },
            })],
        );

        let images = extract_images(&doc, &ConvertOptions::default()).unwrap();
        assert_eq!(tags(&images), vec![1, 3, 2, 4]);
        assert_eq!(images[1].name, "Im3");
        assert_eq!(images[1].object_id, Some(deep));
        assert_eq!(images[0].pixel_format, PixelFormat::Grayscale);
    }

    #[test]
    fn pages_are_concatenated_in_order() {
        let mut doc = Document::with_version("1.5");
        let a = doc.add_object(image_stream(10));
        let b = doc.add_object(image_stream(20));
        let c = doc.add_object(image_stream(30));
        document_with_pages(
            &mut doc,
            vec![
                Some(dictionary! { "XObject" => dictionary! { "Im0" => a } }),
                Some(dictionary! { "XObject" => dictionary! { "Im0" => b, "Im1" => c } }),
            ],
        );

        let images = extract_images(&doc, &ConvertOptions::default()).unwrap();
        assert_eq!(tags(&images), vec![10, 20, 30]);
        assert_eq!(images.iter().map(|i| i.page).collect::<Vec<_>>(), vec![1, 2, 2]);
    }

    #[test]
    fn pages_without_xobjects_contribute_nothing() {
        let mut doc = Document::with_version("1.5");
        let img = doc.add_object(image_stream(7));
        document_with_pages(
            &mut doc,
            vec![
                None,
                Some(dictionary! { "Font" => Dictionary::new() }),
                Some(dictionary! { "XObject" => dictionary! { "Im0" => img } }),
            ],
        );

        let images = extract_images(&doc, &ConvertOptions::default()).unwrap();
        assert_eq!(tags(&images), vec![7]);
        assert_eq!(images[0].page, 3);
    }

    #[test]
    fn non_image_entries_are_skipped() {
        let mut doc = Document::with_version("1.5");
        let empty_form = doc.add_object(Stream::new(
            dictionary! { "Type" => "XObject", "Subtype" => "Form" },
            b"0 0 m".to_vec(),
        ));
        let img = doc.add_object(image_stream(5));
        document_with_pages(
            &mut doc,
            vec![Some(dictionary! {
                "XObject" => dictionary! {
                    "Fm0" => empty_form,
                    "Bogus" => 42i64,
                    "Missing" => (999u32, 0u16),
                    "Im0" => img,
                },
            })],
        );

        let images = extract_images(&doc, &ConvertOptions::default()).unwrap();
        assert_eq!(tags(&images), vec![5]);
    }

    #[test]
    fn resources_are_inherited_from_page_tree() {
        let mut doc = Document::with_version("1.5");
        let img = doc.add_object(image_stream(9));
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1i64,
                "Resources" => dictionary! { "XObject" => dictionary! { "Im0" => img } },
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let images = extract_images(&doc, &ConvertOptions::default()).unwrap();
        assert_eq!(tags(&images), vec![9]);
    }

    #[test]
    fn self_referencing_form_terminates() {
        let mut doc = Document::with_version("1.5");
        let img = doc.add_object(image_stream(1));
        let form_id = doc.new_object_id();
        doc.objects.insert(
            form_id,
            Object::Stream(form_stream(dictionary! {
                "Self" => form_id,
                "Im0" => img,
            })),
        );
        document_with_pages(
            &mut doc,
            vec![Some(dictionary! { "XObject" => dictionary! { "Fm0" => form_id } })],
        );

        let images = extract_images(&doc, &ConvertOptions::default()).unwrap();
        assert_eq!(tags(&images), vec![1]);
    }

    #[test]
    fn nesting_beyond_limit_fails() {
        let mut doc = Document::with_version("1.5");
        let img = doc.add_object(image_stream(1));
        let inner = doc.add_object(form_stream(dictionary! { "Im0" => img }));
        let outer = doc.add_object(form_stream(dictionary! { "Fm1" => inner }));
        document_with_pages(
            &mut doc,
            vec![Some(dictionary! { "XObject" => dictionary! { "Fm0" => outer } })],
        );

        let options = ConvertOptions {
            max_depth: 1,
            ..ConvertOptions::default()
        };
        match extract_images(&doc, &options) {
            Err(CbzError::NestingTooDeep { page, limit }) => {
                assert_eq!(page, 1);
                assert_eq!(limit, 1);
            }
            other => panic!("expected nesting error, got {:?}", other.map(|v| v.len())),
        }

        let images = extract_images(&doc, &ConvertOptions::default()).unwrap();
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn same_image_on_two_pages_is_kept_twice() {
        let mut doc = Document::with_version("1.5");
        let img = doc.add_object(image_stream(8));
        let resources = dictionary! { "XObject" => dictionary! { "Im0" => img } };
        document_with_pages(&mut doc, vec![Some(resources.clone()), Some(resources)]);

        let images = extract_images(&doc, &ConvertOptions::default()).unwrap();
        assert_eq!(tags(&images), vec![8, 8]);
    }

    #[test]
    fn out_of_range_dimensions_read_as_zero() {
        let mut doc = Document::with_version("1.5");
        let mut stream = image_stream(1);
        stream.dict.set("Width", 1i64 << 33);
        stream.dict.set("Height", -4i64);
        let img = doc.add_object(stream);
        let resources = dictionary! { "XObject" => dictionary! { "Im0" => img } };
        document_with_pages(&mut doc, vec![Some(resources)]);

        let images = extract_images(&doc, &ConvertOptions::default()).unwrap();
        assert_eq!(images[0].width, 0);
        assert_eq!(images[0].height, 0);
        assert_eq!(images[0].bits_per_component, 8);
    }

    #[test]
    fn predicted_flate_samples_are_restored() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        // PNG Sub row then Up row of a 2x2 gray image
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[1, 255, 1, 2, 1, 255]).unwrap();
        let content = encoder.finish().unwrap();

        let mut doc = Document::with_version("1.5");
        let img = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2i64,
                "Height" => 2i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
                "Filter" => "FlateDecode",
                "DecodeParms" => dictionary! { "Predictor" => 15i64, "Columns" => 2i64 },
            },
            content,
        ));
        let resources = dictionary! { "XObject" => dictionary! { "Im0" => img } };
        document_with_pages(&mut doc, vec![Some(resources)]);

        let images = extract_images(&doc, &ConvertOptions::default()).unwrap();
        assert_eq!(images[0].data, vec![255, 0, 0, 255]);
    }

    #[test]
    fn filters_other_than_flate_keep_data_encoded() {
        let mut doc = Document::with_version("1.5");
        let mut stream = image_stream(0);
        stream.dict.set("Filter", "ASCIIHexDecode");
        let img = doc.add_object(stream);
        let resources = dictionary! { "XObject" => dictionary! { "Im0" => img } };
        document_with_pages(&mut doc, vec![Some(resources)]);

        let images = extract_images(&doc, &ConvertOptions::default()).unwrap();
        assert!(images[0].is_encoded());
    }
}
