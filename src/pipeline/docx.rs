//! Word-container conversion: unpack `.docx` bytes into layout markup.
//!
//! A word container is a zip archive. The body lives in
//! `word/document.xml`, media parts under `word/media/`, and the id-to-part
//! mapping in `word/_rels/document.xml.rels`. The walk below keeps only
//! what the layout engine consumes: paragraph text with breaks, heading
//! styles, flattened tables, and image references. Media parts land in the
//! request's scratch directory under generated names, so several word
//! sources in one bundle never collide.
//!
//! Media parts are normalised to the interchange set the rest of the
//! pipeline expects: PNG and TIFF transcode to GIF, BMP and JPEG keep
//! their encoding, WMF vectors are copied out untouched, and unmapped
//! content types are omitted without failing the conversion.

use crate::error::SourceError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Markup produced from one word container, plus the media bookkeeping
/// that ends up in the source report.
#[derive(Debug, Default)]
pub struct DocxMarkup {
    pub markup: String,
    pub images_extracted: u32,
    pub images_skipped: u32,
    pub warnings: Vec<String>,
}

/// Convert word-container bytes into markup, extracting media parts into
/// `image_dir`.
///
/// Fails only when the container itself is unreadable or the document part
/// is missing or malformed. Individual media parts that cannot be decoded
/// or written are recorded as warnings and omitted from the markup.
pub fn convert_docx(bytes: &[u8], image_dir: &Path) -> Result<DocxMarkup, SourceError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|err| SourceError::Conversion {
        detail: format!("not a word container: {err}"),
    })?;

    let document_xml =
        read_entry(&mut archive, "word/document.xml")?.ok_or_else(|| SourceError::Conversion {
            detail: "word/document.xml missing from container".into(),
        })?;
    let document_xml = String::from_utf8_lossy(&document_xml).into_owned();
    let relationships = read_relationships(&mut archive);
    debug!(
        relationships = relationships.len(),
        "parsed word container"
    );

    walk_document(&document_xml, &relationships, &mut archive, image_dir)
}

/// Walk the document part and emit markup blocks.
fn walk_document<R: Read + Seek>(
    xml: &str,
    relationships: &HashMap<String, String>,
    archive: &mut ZipArchive<R>,
    image_dir: &Path,
) -> Result<DocxMarkup, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut out = DocxMarkup::default();
    let mut markup = String::new();

    let mut in_paragraph = false;
    let mut in_text = false;
    let mut in_table = false;
    let mut in_cell = false;

    let mut para = String::new();
    let mut para_style: Option<String> = None;
    let mut cell = String::new();

    // Image references anchor after the paragraph (or table) that carried
    // them, so a reference never lands inside an open text block.
    let mut pending_images: Vec<String> = Vec::new();
    let mut image_counter = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"p" => {
                    in_paragraph = true;
                    para_style = None;
                    if in_cell {
                        if !cell.is_empty() && !cell.ends_with('\n') {
                            cell.push('\n');
                        }
                    } else {
                        para.clear();
                    }
                }
                b"tbl" => {
                    in_table = true;
                    markup.push_str("<table>");
                }
                b"tr" => {
                    if in_table {
                        markup.push_str("<tr>");
                    }
                }
                b"tc" => {
                    if in_table {
                        in_cell = true;
                        cell.clear();
                    }
                }
                b"pStyle" => {
                    if in_paragraph && !in_cell {
                        if let Some(value) = attr_value(&reader, e, b"val") {
                            para_style = Some(value);
                        }
                    }
                }
                b"t" => in_text = true,
                b"tab" => append_text(&mut para, &mut cell, in_cell, "\t"),
                b"br" => append_text(&mut para, &mut cell, in_cell, "\n"),
                b"blip" | b"imagedata" => {
                    let rid = attr_value(&reader, e, b"embed")
                        .or_else(|| attr_value(&reader, e, b"id"));
                    if let Some(rid) = rid {
                        image_counter += 1;
                        handle_media(
                            archive,
                            relationships,
                            &rid,
                            image_counter,
                            image_dir,
                            &mut out,
                            &mut pending_images,
                        );
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"pStyle" => {
                    if in_paragraph && !in_cell {
                        if let Some(value) = attr_value(&reader, e, b"val") {
                            para_style = Some(value);
                        }
                    }
                }
                b"tab" => append_text(&mut para, &mut cell, in_cell, "\t"),
                b"br" => append_text(&mut para, &mut cell, in_cell, "\n"),
                b"blip" | b"imagedata" => {
                    let rid = attr_value(&reader, e, b"embed")
                        .or_else(|| attr_value(&reader, e, b"id"));
                    if let Some(rid) = rid {
                        image_counter += 1;
                        handle_media(
                            archive,
                            relationships,
                            &rid,
                            image_counter,
                            image_dir,
                            &mut out,
                            &mut pending_images,
                        );
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    if let Ok(text) = e.unescape() {
                        append_text(&mut para, &mut cell, in_cell, text.as_ref());
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if in_paragraph {
                        in_paragraph = false;
                        if !in_cell {
                            let text = para.trim();
                            if !text.is_empty() {
                                let escaped = escape_markup(text).replace('\n', "<br>");
                                match heading_level(para_style.as_deref()) {
                                    Some(level) => {
                                        markup.push_str(&format!(
                                            "<h{level}>{escaped}</h{level}>\n"
                                        ));
                                    }
                                    None => {
                                        markup.push_str(&format!("<p>{escaped}</p>\n"));
                                    }
                                }
                            }
                            for img in pending_images.drain(..) {
                                markup.push_str(&img);
                                markup.push('\n');
                            }
                        }
                    }
                }
                b"tc" => {
                    if in_cell {
                        in_cell = false;
                        let escaped = escape_markup(cell.trim()).replace('\n', "<br>");
                        markup.push_str(&format!("<td>{escaped}</td>"));
                    }
                }
                b"tr" => {
                    if in_table {
                        markup.push_str("</tr>\n");
                    }
                }
                b"tbl" => {
                    in_table = false;
                    markup.push_str("</table>\n");
                    for img in pending_images.drain(..) {
                        markup.push_str(&img);
                        markup.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(SourceError::Conversion {
                    detail: format!("malformed document part: {err}"),
                });
            }
            _ => {}
        }
        buf.clear();
    }
    for img in pending_images.drain(..) {
        markup.push_str(&img);
        markup.push('\n');
    }

    out.markup = markup;
    Ok(out)
}

/// Extract one referenced media part, recording the outcome on `out`.
fn handle_media<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    relationships: &HashMap<String, String>,
    rid: &str,
    number: usize,
    image_dir: &Path,
    out: &mut DocxMarkup,
    pending_images: &mut Vec<String>,
) {
    match extract_image(archive, relationships, rid, number, image_dir) {
        Ok(Some(path)) => {
            out.images_extracted += 1;
            pending_images.push(format!("<img src=\"{}\">", path.display()));
        }
        Ok(None) => out.images_skipped += 1,
        Err(detail) => {
            out.images_skipped += 1;
            warn!(%detail, "media part extraction failed");
            out.warnings.push(detail);
        }
    }
}

/// Pull one media part out of the container and write it to `image_dir`
/// as `img_{number}.{ext}`.
///
/// Returns the written path, or `None` for a content type the pipeline
/// has no mapping for. Per-part read, decode, and write failures come
/// back as `Err` so the caller can record a warning; none of them abort
/// the conversion.
fn extract_image<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    relationships: &HashMap<String, String>,
    rid: &str,
    number: usize,
    image_dir: &Path,
) -> Result<Option<PathBuf>, String> {
    let target = relationships
        .get(rid)
        .ok_or_else(|| format!("no relationship for {rid}"))?;
    // Targets are relative to word/ unless rooted.
    let entry_name = match target.strip_prefix('/') {
        Some(rooted) => rooted.to_string(),
        None => format!("word/{target}"),
    };

    let mut data = Vec::new();
    match archive.by_name(&entry_name) {
        Ok(mut entry) => {
            entry
                .read_to_end(&mut data)
                .map_err(|err| format!("failed reading {entry_name}: {err}"))?;
        }
        Err(err) => return Err(format!("failed opening {entry_name}: {err}")),
    }

    let source_ext = Path::new(target)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();
    let (out_ext, out_format) = match source_ext.as_str() {
        "png" | "gif" | "tiff" | "tif" => ("gif", Some(image::ImageFormat::Gif)),
        "bmp" => ("bmp", Some(image::ImageFormat::Bmp)),
        "jpeg" | "jpg" => ("jpeg", Some(image::ImageFormat::Jpeg)),
        "wmf" => ("wmf", None),
        other => {
            debug!(extension = other, "unmapped media content type; omitting");
            return Ok(None);
        }
    };

    let path = image_dir.join(format!("img_{number}.{out_ext}"));
    match out_format {
        Some(format) => {
            let decoded = image::load_from_memory(&data)
                .map_err(|err| format!("undecodable media part {entry_name}: {err}"))?;
            // The JPEG encoder takes no alpha channel.
            let written = match format {
                image::ImageFormat::Jpeg => {
                    image::DynamicImage::ImageRgb8(decoded.to_rgb8()).save_with_format(&path, format)
                }
                _ => image::DynamicImage::ImageRgba8(decoded.to_rgba8())
                    .save_with_format(&path, format),
            };
            written.map_err(|err| format!("failed writing {}: {err}", path.display()))?;
        }
        None => {
            std::fs::write(&path, &data)
                .map_err(|err| format!("failed writing {}: {err}", path.display()))?;
        }
    }
    debug!(path = %path.display(), "extracted media part");
    Ok(Some(path))
}

/// Map of relationship id to part target, from
/// `word/_rels/document.xml.rels`. A container without the rels part just
/// yields an empty map; image references will then record warnings.
fn read_relationships<R: Read + Seek>(archive: &mut ZipArchive<R>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let xml = match read_entry(archive, "word/_rels/document.xml.rels") {
        Ok(Some(data)) => String::from_utf8_lossy(&data).into_owned(),
        _ => return map,
    };

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let id = attr_value(&reader, e, b"Id");
                    let target = attr_value(&reader, e, b"Target");
                    if let (Some(id), Some(target)) = (id, target) {
                        map.insert(id, target);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    map
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, SourceError> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|err| SourceError::Conversion {
                    detail: format!("failed reading {name}: {err}"),
                })?;
            Ok(Some(data))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(err) => Err(SourceError::Conversion {
            detail: format!("failed opening {name}: {err}"),
        }),
    }
}

fn attr_value<B: std::io::BufRead>(
    reader: &Reader<B>,
    element: &BytesStart,
    key: &[u8],
) -> Option<String> {
    for attr in element.attributes().with_checks(false) {
        let attr = attr.ok()?;
        if attr.key.local_name().as_ref() == key {
            if let Ok(value) = attr.decode_and_unescape_value(reader) {
                return Some(value.into_owned());
            }
        }
    }
    None
}

fn append_text(para: &mut String, cell: &mut String, in_cell: bool, text: &str) {
    if in_cell {
        cell.push_str(text);
    } else {
        para.push_str(text);
    }
}

/// Map a paragraph style id like `Heading2` onto a heading level.
fn heading_level(style: Option<&str>) -> Option<usize> {
    let style = style?.trim();
    if style.is_empty() {
        return None;
    }
    let lowered = style.to_lowercase();
    if lowered.starts_with("heading") || lowered.starts_with("title") {
        let digits: String = lowered.chars().filter(|ch| ch.is_ascii_digit()).collect();
        if let Ok(value) = digits.parse::<usize>() {
            if (1..=6).contains(&value) {
                return Some(value);
            }
        }
        return Some(1);
    }
    None
}

fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const DOC_NS: &str = concat!(
        "xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\" ",
        "xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" ",
        "xmlns:v=\"urn:schemas-microsoft-com:vml\" ",
        "xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\""
    );

    fn container(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in parts {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn document(body: &str) -> Vec<u8> {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:document {DOC_NS}><w:body>{body}</w:body></w:document>"
        )
        .into_bytes()
    }

    fn convert(body: &str, image_dir: &Path) -> DocxMarkup {
        let bytes = container(&[("word/document.xml", document(body).as_slice())]);
        convert_docx(&bytes, image_dir).unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn rels(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
        );
        for (id, target) in entries {
            xml.push_str(&format!(
                "<Relationship Id=\"{id}\" \
                 Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/image\" \
                 Target=\"{target}\"/>"
            ));
        }
        xml.push_str("</Relationships>");
        xml.into_bytes()
    }

    #[test]
    fn paragraphs_become_blocks() {
        let dir = tempdir().unwrap();
        let out = convert(
            "<w:p><w:r><w:t>Hello</w:t></w:r></w:p>\
             <w:p><w:r><w:t>World</w:t></w:r></w:p>",
            dir.path(),
        );
        assert!(out.markup.contains("<p>Hello</p>"));
        assert!(out.markup.contains("<p>World</p>"));
    }

    #[test]
    fn breaks_inside_a_run_become_line_breaks() {
        let dir = tempdir().unwrap();
        let out = convert(
            "<w:p><w:r><w:t>first</w:t><w:br/><w:t>second</w:t></w:r></w:p>",
            dir.path(),
        );
        assert!(out.markup.contains("<p>first<br>second</p>"));
    }

    #[test]
    fn heading_styles_become_heading_tags() {
        let dir = tempdir().unwrap();
        let out = convert(
            "<w:p><w:pPr><w:pStyle w:val=\"Heading1\"/></w:pPr>\
             <w:r><w:t>Overview</w:t></w:r></w:p>\
             <w:p><w:pPr><w:pStyle w:val=\"Heading3\"/></w:pPr>\
             <w:r><w:t>Detail</w:t></w:r></w:p>",
            dir.path(),
        );
        assert!(out.markup.contains("<h1>Overview</h1>"));
        assert!(out.markup.contains("<h3>Detail</h3>"));
    }

    #[test]
    fn table_rows_flatten_into_cells() {
        let dir = tempdir().unwrap();
        let out = convert(
            "<w:tbl><w:tr>\
             <w:tc><w:p><w:r><w:t>Name</w:t></w:r></w:p></w:tc>\
             <w:tc><w:p><w:r><w:t>Qty</w:t></w:r></w:p></w:tc>\
             </w:tr></w:tbl>",
            dir.path(),
        );
        assert!(out.markup.contains("<table>"));
        assert!(out.markup.contains("<td>Name</td><td>Qty</td>"));
        assert!(out.markup.contains("</table>"));
    }

    #[test]
    fn markup_significant_characters_are_escaped() {
        let dir = tempdir().unwrap();
        let out = convert(
            "<w:p><w:r><w:t>1 &lt; 2 &amp; 3</w:t></w:r></w:p>",
            dir.path(),
        );
        assert!(out.markup.contains("<p>1 &lt; 2 &amp; 3</p>"));
    }

    #[test]
    fn png_part_transcodes_to_gif() {
        let dir = tempdir().unwrap();
        let png = png_bytes();
        let bytes = container(&[
            (
                "word/document.xml",
                document(
                    "<w:p><w:r><w:t>figure</w:t></w:r></w:p>\
                     <w:p><w:r><w:drawing><a:blip r:embed=\"rId4\"/></w:drawing></w:r></w:p>",
                )
                .as_slice(),
            ),
            (
                "word/_rels/document.xml.rels",
                rels(&[("rId4", "media/image1.png")]).as_slice(),
            ),
            ("word/media/image1.png", png.as_slice()),
        ]);

        let out = convert_docx(&bytes, dir.path()).unwrap();
        assert_eq!(out.images_extracted, 1);
        assert_eq!(out.images_skipped, 0);
        assert!(out.warnings.is_empty());
        assert!(out.markup.contains("img_1.gif"));

        let written = dir.path().join("img_1.gif");
        let round_trip = image::open(&written).unwrap();
        assert_eq!(
            (round_trip.width(), round_trip.height()),
            (2, 2),
            "transcoded part should keep its dimensions"
        );
    }

    #[test]
    fn legacy_imagedata_references_extract() {
        let dir = tempdir().unwrap();
        let png = png_bytes();
        let bytes = container(&[
            (
                "word/document.xml",
                document(
                    "<w:p><w:r><w:pict><v:imagedata r:id=\"rId7\"/></w:pict></w:r></w:p>",
                )
                .as_slice(),
            ),
            (
                "word/_rels/document.xml.rels",
                rels(&[("rId7", "media/image1.png")]).as_slice(),
            ),
            ("word/media/image1.png", png.as_slice()),
        ]);

        let out = convert_docx(&bytes, dir.path()).unwrap();
        assert_eq!(out.images_extracted, 1);
        assert!(out.markup.contains("img_1.gif"));
    }

    #[test]
    fn unmapped_media_is_omitted_without_warning() {
        let dir = tempdir().unwrap();
        let bytes = container(&[
            (
                "word/document.xml",
                document("<w:p><w:r><w:drawing><a:blip r:embed=\"rId4\"/></w:drawing></w:r></w:p>")
                    .as_slice(),
            ),
            (
                "word/_rels/document.xml.rels",
                rels(&[("rId4", "media/image1.emf")]).as_slice(),
            ),
            ("word/media/image1.emf", b"\x01\x00\x00\x00EMF".as_slice()),
        ]);

        let out = convert_docx(&bytes, dir.path()).unwrap();
        assert_eq!(out.images_extracted, 0);
        assert_eq!(out.images_skipped, 1);
        assert!(out.warnings.is_empty());
        assert!(!out.markup.contains("<img"));
    }

    #[test]
    fn broken_media_part_warns_and_continues() {
        let dir = tempdir().unwrap();
        let bytes = container(&[
            (
                "word/document.xml",
                document(
                    "<w:p><w:r><w:t>before</w:t></w:r></w:p>\
                     <w:p><w:r><w:drawing><a:blip r:embed=\"rId4\"/></w:drawing></w:r></w:p>",
                )
                .as_slice(),
            ),
            (
                "word/_rels/document.xml.rels",
                rels(&[("rId4", "media/image1.png")]).as_slice(),
            ),
            ("word/media/image1.png", b"not a png".as_slice()),
        ]);

        let out = convert_docx(&bytes, dir.path()).unwrap();
        assert_eq!(out.images_extracted, 0);
        assert_eq!(out.images_skipped, 1);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.markup.contains("<p>before</p>"));
    }

    #[test]
    fn missing_document_part_is_a_conversion_error() {
        let dir = tempdir().unwrap();
        let bytes = container(&[("word/other.xml", b"<x/>".as_slice())]);
        let err = convert_docx(&bytes, dir.path()).unwrap_err();
        assert!(matches!(err, SourceError::Conversion { .. }));
    }

    #[test]
    fn garbage_container_is_a_conversion_error() {
        let dir = tempdir().unwrap();
        let err = convert_docx(b"definitely not a zip", dir.path()).unwrap_err();
        assert!(matches!(err, SourceError::Conversion { .. }));
    }
}
