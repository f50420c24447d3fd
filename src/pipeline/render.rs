//! Fixed-page rendering: markup flow layout and single-image pages.
//!
//! ## Why fixed geometry?
//!
//! Bundles are built for print-style review, so every page is A4 portrait
//! with the same margins regardless of source. Markup sources flow top-down
//! with Helvetica metrics and hard page breaks; raster sources become one
//! page each, scaled to fill the sheet. The layout engine understands the
//! markup subset the converter emits (plus simple authored HTML): block
//! tags, headings, breaks, list items, and `<img>` references. Unknown tags
//! are stripped and their text kept.

use crate::error::SourceError;
use crate::pipeline::text::{escape_pdf_text, text_width};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::GenericImageView;
use lopdf::{Dictionary, Document, Object, Stream};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use tracing::{debug, warn};

/// A4 portrait, in points.
pub const PAGE_WIDTH: f64 = 595.0;
pub const PAGE_HEIGHT: f64 = 842.0;

const MARGIN_LEFT: f64 = 10.0;
const MARGIN_RIGHT: f64 = 10.0;
const MARGIN_TOP: f64 = 10.0;
const MARGIN_BOTTOM: f64 = 0.0;

const BODY_SIZE: f64 = 12.0;
/// Line height as a multiple of font size.
const LEADING: f64 = 1.25;
/// Vertical gap between blocks.
const BLOCK_GAP: f64 = 6.0;

/// A rendered page document plus everything the report needs to know.
#[derive(Debug)]
pub struct Rendered {
    /// Self-contained page-document bytes, ready for the merger.
    pub pdf: Vec<u8>,
    pub page_count: usize,
    /// Images that could not be placed; the pages still rendered.
    pub warnings: Vec<String>,
}

// ── Markup tokenizing ────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Block {
    Text { text: String, size: f64, bold: bool },
    Image { src: String },
}

static RE_IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"src\s*=\s*["']([^"']+)["']"#).unwrap());

fn heading_size(name: &str) -> f64 {
    match name {
        "h1" => 24.0,
        "h2" => 18.0,
        "h3" => 14.0,
        _ => BODY_SIZE,
    }
}

/// Split markup into layout blocks: runs of text at one size, and images.
fn tokenize_blocks(markup: &str) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut current = String::new();
    let mut size = BODY_SIZE;
    let mut bold = false;
    // Non-rendered element we are currently inside, if any.
    let mut skipping: Option<String> = None;

    let flush = |current: &mut String, blocks: &mut Vec<Block>, size: f64, bold: bool| {
        let text = decode_entities(current)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        current.clear();
        if !text.is_empty() {
            blocks.push(Block::Text { text, size, bold });
        }
    };

    let mut pos = 0;
    while pos < markup.len() {
        let Some(rel) = markup[pos..].find('<') else {
            if skipping.is_none() {
                current.push_str(&markup[pos..]);
            }
            break;
        };
        if skipping.is_none() {
            current.push_str(&markup[pos..pos + rel]);
        }
        let tag_start = pos + rel;
        let Some(grel) = markup[tag_start..].find('>') else {
            // Dangling '<' with no close; treat the remainder as text.
            if skipping.is_none() {
                current.push_str(&markup[tag_start..]);
            }
            break;
        };
        let tag = &markup[tag_start + 1..tag_start + grel];
        pos = tag_start + grel + 1;

        let inner = tag.trim();
        let closing = inner.starts_with('/');
        let name: String = inner
            .trim_start_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_end_matches('/')
            .to_ascii_lowercase();

        if let Some(skip) = &skipping {
            if closing && name == *skip {
                skipping = None;
            }
            continue;
        }

        match name.as_str() {
            "style" | "script" | "head" | "title" if !closing => {
                flush(&mut current, &mut blocks, size, bold);
                skipping = Some(name);
            }
            "p" | "div" | "tr" => {
                flush(&mut current, &mut blocks, size, bold);
                if !closing {
                    size = BODY_SIZE;
                    bold = false;
                }
            }
            "li" => {
                flush(&mut current, &mut blocks, size, bold);
                if !closing {
                    size = BODY_SIZE;
                    bold = false;
                    current.push_str("- ");
                }
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                flush(&mut current, &mut blocks, size, bold);
                if closing {
                    size = BODY_SIZE;
                    bold = false;
                } else {
                    size = heading_size(&name);
                    bold = true;
                }
            }
            "br" => flush(&mut current, &mut blocks, size, bold),
            "td" | "th" if closing => current.push(' '),
            "img" => {
                flush(&mut current, &mut blocks, size, bold);
                if let Some(caps) = RE_IMG_SRC.captures(tag) {
                    blocks.push(Block::Image {
                        src: caps[1].to_string(),
                    });
                }
            }
            _ => {}
        }
    }
    flush(&mut current, &mut blocks, size, bold);
    blocks
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Wrap `text` into lines no wider than `max_width` points.
///
/// Words that alone exceed the line break at character boundaries so a long
/// URL or identifier cannot push past the right margin.
fn word_wrap(text: &str, max_width: f64, font_size: f64) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate, font_size) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if text_width(word, font_size) <= max_width {
            current = word.to_string();
            continue;
        }
        let mut piece = String::new();
        for ch in word.chars() {
            piece.push(ch);
            if text_width(&piece, font_size) > max_width && piece.chars().count() > 1 {
                let overflow = piece.pop();
                lines.push(std::mem::take(&mut piece));
                if let Some(c) = overflow {
                    piece.push(c);
                }
            }
        }
        current = piece;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

// ── Image embedding ──────────────────────────────────────────────────────

/// An image ready to become a PDF XObject stream.
struct ImageXObject {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
}

/// Decode image bytes into an embeddable XObject.
///
/// JPEG data whose decoded form is 8-bit RGB or grayscale embeds as-is
/// under DCTDecode; everything else re-encodes as deflated raw RGB.
fn embed_image(bytes: &[u8]) -> Result<ImageXObject, String> {
    let format = image::guess_format(bytes).map_err(|e| e.to_string())?;
    let decoded = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let (width, height) = decoded.dimensions();

    if format == image::ImageFormat::Jpeg {
        match &decoded {
            image::DynamicImage::ImageRgb8(_) => {
                return Ok(ImageXObject {
                    width,
                    height,
                    color_space: "DeviceRGB",
                    filter: "DCTDecode",
                    data: bytes.to_vec(),
                });
            }
            image::DynamicImage::ImageLuma8(_) => {
                return Ok(ImageXObject {
                    width,
                    height,
                    color_space: "DeviceGray",
                    filter: "DCTDecode",
                    data: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let raw = decoded.to_rgb8().into_raw();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).map_err(|e| e.to_string())?;
    let data = encoder.finish().map_err(|e| e.to_string())?;

    Ok(ImageXObject {
        width,
        height,
        color_space: "DeviceRGB",
        filter: "FlateDecode",
        data,
    })
}

// ── Page assembly ────────────────────────────────────────────────────────

/// Content and images for one page, before document assembly.
struct PageOps {
    ops: String,
    images: Vec<ImageXObject>,
}

impl PageOps {
    fn new() -> Self {
        Self {
            ops: String::new(),
            images: Vec::new(),
        }
    }
}

/// Assemble finished pages into a self-contained page document.
fn build_pdf(pages: Vec<PageOps>) -> Result<Vec<u8>, String> {
    let mut doc = Document::with_version("1.5");
    let page_tree_id = doc.new_object_id();

    let helvetica_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let helvetica_bold_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica-Bold".to_vec())),
    ]));

    let mut page_ids = Vec::with_capacity(pages.len());
    for page in pages {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), page.ops.into_bytes()));

        let has_images = !page.images.is_empty();
        let mut xobjects = Dictionary::new();
        for (i, img) in page.images.into_iter().enumerate() {
            let dict = Dictionary::from_iter([
                ("Type", Object::Name(b"XObject".to_vec())),
                ("Subtype", Object::Name(b"Image".to_vec())),
                ("Width", Object::Integer(img.width as i64)),
                ("Height", Object::Integer(img.height as i64)),
                ("ColorSpace", Object::Name(img.color_space.into())),
                ("BitsPerComponent", Object::Integer(8)),
                ("Filter", Object::Name(img.filter.into())),
            ]);
            let img_id = doc.add_object(Stream::new(dict, img.data));
            xobjects.set(format!("Im{}", i + 1), Object::Reference(img_id));
        }

        let mut resources = Dictionary::from_iter([(
            "Font",
            Object::Dictionary(Dictionary::from_iter([
                ("F1", Object::Reference(helvetica_id)),
                ("F2", Object::Reference(helvetica_bold_id)),
            ])),
        )]);
        if has_images {
            resources.set("XObject", Object::Dictionary(xobjects));
        }

        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(page_tree_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
            (
                "MediaBox",
                Object::Array(vec![
                    0.into(),
                    0.into(),
                    (PAGE_WIDTH as i64).into(),
                    (PAGE_HEIGHT as i64).into(),
                ]),
            ),
        ]));
        page_ids.push(page_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();
    let page_tree = Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(page_ids.len() as i64)),
    ]);
    doc.objects.insert(page_tree_id, Object::Dictionary(page_tree));

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(page_tree_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut output = Vec::new();
    doc.save_to(&mut output).map_err(|e| e.to_string())?;
    Ok(output)
}

// ── Renderers ────────────────────────────────────────────────────────────

/// Lay markup out on A4 pages.
///
/// `<img src>` values are read as local file paths (the converter writes
/// extracted images with absolute paths). An image that cannot be read or
/// decoded is skipped with a warning; markup with no renderable content at
/// all is an error so an effectively-empty source contributes no pages.
pub fn render_markup(markup: &str) -> Result<Rendered, SourceError> {
    let blocks = tokenize_blocks(markup);
    if blocks.is_empty() {
        return Err(SourceError::Render {
            detail: "markup contains no renderable content".into(),
        });
    }

    let content_width = PAGE_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let mut warnings = Vec::new();
    let mut pages: Vec<PageOps> = Vec::new();
    let mut page = PageOps::new();
    let mut y = PAGE_HEIGHT - MARGIN_TOP;

    for block in blocks {
        match block {
            Block::Text { text, size, bold } => {
                let font = if bold { "F2" } else { "F1" };
                let line_height = size * LEADING;
                for line in word_wrap(&text, content_width, size) {
                    if y - line_height < MARGIN_BOTTOM {
                        pages.push(std::mem::replace(&mut page, PageOps::new()));
                        y = PAGE_HEIGHT - MARGIN_TOP;
                    }
                    y -= line_height;
                    page.ops.push_str(&format!(
                        "BT\n/{font} {size} Tf\n{x:.2} {y:.2} Td\n({text}) Tj\nET\n",
                        x = MARGIN_LEFT,
                        text = escape_pdf_text(&line),
                    ));
                }
                y -= BLOCK_GAP;
            }
            Block::Image { src } => {
                let img = match std::fs::read(&src)
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| embed_image(&bytes))
                {
                    Ok(img) => img,
                    Err(e) => {
                        warn!("Skipping image '{}': {}", src, e);
                        warnings.push(format!("image '{src}' skipped: {e}"));
                        continue;
                    }
                };

                // Fit the content width, never upscale in flow, and never
                // exceed a full page of height.
                let usable_height = PAGE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
                let scale = (content_width / img.width as f64)
                    .min(usable_height / img.height as f64)
                    .min(1.0);
                let w = img.width as f64 * scale;
                let h = img.height as f64 * scale;

                if y - h < MARGIN_BOTTOM {
                    pages.push(std::mem::replace(&mut page, PageOps::new()));
                    y = PAGE_HEIGHT - MARGIN_TOP;
                }
                y -= h;
                page.images.push(img);
                page.ops.push_str(&format!(
                    "q\n{w:.2} 0 0 {h:.2} {x:.2} {y:.2} cm\n/Im{n} Do\nQ\n",
                    x = MARGIN_LEFT,
                    n = page.images.len(),
                ));
                y -= BLOCK_GAP;
            }
        }
    }
    pages.push(page);

    let page_count = pages.len();
    debug!("Markup rendered to {} page(s)", page_count);
    let pdf = build_pdf(pages).map_err(|detail| SourceError::Render { detail })?;
    Ok(Rendered {
        pdf,
        page_count,
        warnings,
    })
}

/// Wrap one raster image in a single A4 page, scaled to fit the full sheet
/// (aspect preserved, upscaling allowed) and anchored at the page origin.
pub fn render_image(bytes: &[u8]) -> Result<Rendered, SourceError> {
    let img = embed_image(bytes).map_err(|detail| SourceError::Render { detail })?;

    let scale = (PAGE_WIDTH / img.width as f64).min(PAGE_HEIGHT / img.height as f64);
    let w = img.width as f64 * scale;
    let h = img.height as f64 * scale;

    let mut page = PageOps::new();
    page.ops = format!("q\n{w:.2} 0 0 {h:.2} 0 0 cm\n/Im1 Do\nQ\n");
    page.images.push(img);

    let pdf = build_pdf(vec![page]).map_err(|detail| SourceError::Render { detail })?;
    Ok(Rendered {
        pdf,
        page_count: 1,
        warnings: Vec::new(),
    })
}
