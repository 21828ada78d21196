use anyhow::Context;
use pdf2cbz::{entry_name, entry_name_width, extract_images, load_document, ConvertOptions};
use std::fs;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: list_images <file.pdf>")?;
    let bytes = fs::read(&path).with_context(|| format!("reading {}", path))?;
    println!("Read {} bytes", bytes.len());

    let doc = load_document(&bytes)?;
    println!("Pages: {}", doc.get_pages().len());

    let options = ConvertOptions::default();
    let images = extract_images(&doc, &options)?;
    let width = entry_name_width(images.len()).unwrap_or(1);

    for (index, img) in images.iter().enumerate() {
        let filters: Vec<&str> = img.filters.iter().map(|f| f.name()).collect();
        println!(
            "{}  page {:>4}  /{:<8} {:>5}x{:<5} {:<7} {:>2}bpc {:?} {} bytes",
            entry_name(index, width, options.format.extension()),
            img.page,
            img.name,
            img.width,
            img.height,
            img.pixel_format.as_str(),
            img.bits_per_component,
            filters,
            img.data.len()
        );
    }
    println!("{} images", images.len());

    Ok(())
}
