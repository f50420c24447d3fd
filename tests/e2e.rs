//! End-to-end integration tests for docbinder.
//!
//! Every fixture is generated inside the test process: OOXML containers
//! through the zip writer, images through the image crate, markup as string
//! literals, page documents through the markup renderer. No network access,
//! no checked-in binary test data.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   cargo test --test e2e binds_word -- --nocapture

use docbinder::pipeline::render;
use docbinder::{bind, BindConfig, BindError, BindRequest, FsStore, SourceError};
use lopdf::Document;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

// ── Fixture builders ─────────────────────────────────────────────────────────

const DOC_NS: &str = concat!(
    "xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\" ",
    "xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" ",
    "xmlns:v=\"urn:schemas-microsoft-com:vml\" ",
    "xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\""
);

fn docx_container(parts: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in parts {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn docx_document(body: &str) -> Vec<u8> {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document {DOC_NS}><w:body>{body}</w:body></w:document>"
    )
    .into_bytes()
}

fn docx_rels(entries: &[(&str, &str)]) -> Vec<u8> {
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

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([60, 120, 200, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

/// A Word fixture: heading, paragraph, and one embedded PNG.
fn sample_docx() -> Vec<u8> {
    let png = png_bytes(4, 4);
    docx_container(&[
        (
            "word/document.xml",
            docx_document(
                "<w:p><w:pPr><w:pStyle w:val=\"Heading1\"/></w:pPr>\
                 <w:r><w:t>Cover Letter</w:t></w:r></w:p>\
                 <w:p><w:r><w:t>Please find the attachments enclosed.</w:t></w:r></w:p>\
                 <w:p><w:r><w:drawing><a:blip r:embed=\"rId4\"/></w:drawing></w:r></w:p>",
            )
            .as_slice(),
        ),
        (
            "word/_rels/document.xml.rels",
            docx_rels(&[("rId4", "media/image1.png")]).as_slice(),
        ),
        ("word/media/image1.png", png.as_slice()),
    ])
}

fn store_config(root: &Path) -> BindConfig {
    BindConfig::builder()
        .store(Arc::new(FsStore::new(root)))
        .build()
        .expect("valid config")
}

// ── Bundle inspection helpers ────────────────────────────────────────────────

/// Decode every page's content stream, in page order.
fn page_contents(pdf: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(pdf).expect("bundle must parse");
    doc.get_pages()
        .into_values()
        .map(|page_id| {
            String::from_utf8_lossy(&doc.get_page_content(page_id).expect("page content"))
                .into_owned()
        })
        .collect()
}

/// Assert each page carries exactly one "i of N" label and exactly one
/// watermark, numbered in page order.
fn assert_pages_annotated(contents: &[String], watermark: &str, context: &str) {
    let total = contents.len();
    for (i, content) in contents.iter().enumerate() {
        let label = format!("({} of {}) Tj", i + 1, total);
        assert_eq!(
            content.matches(&label).count(),
            1,
            "[{context}] page {} must carry exactly one '{label}'",
            i + 1
        );
        let mark = format!("({watermark}) Tj");
        assert_eq!(
            content.matches(&mark).count(),
            1,
            "[{context}] page {} must carry exactly one watermark",
            i + 1
        );
    }
}

// ── Full-pipeline tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn binds_word_markup_image_and_pdf_sources_into_one_bundle() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("cover.docx"), sample_docx()).unwrap();
    std::fs::write(
        dir.path().join("form.html"),
        "<html><body><h2>Claim Form</h2><p>Claimant: J. Doe</p>\
         <p style=\"display:none\">internal only</p></body></html>",
    )
    .unwrap();
    std::fs::write(dir.path().join("photo.png"), png_bytes(6, 4)).unwrap();
    let scan = render::render_markup("<p>Scanned receipt</p>")
        .expect("render fixture")
        .pdf;
    std::fs::write(dir.path().join("scan.pdf"), &scan).unwrap();

    let request = BindRequest::new(
        vec![
            "cover.docx".into(),
            "form.html".into(),
            "photo.png".into(),
            "scan.pdf".into(),
        ],
        "CONFIDENTIAL",
    );
    let output = bind(&request, &store_config(dir.path()))
        .await
        .expect("bind must succeed");

    assert_eq!(output.stats.total_sources, 4);
    assert_eq!(output.stats.converted_sources, 4);
    assert_eq!(output.stats.failed_sources, 0);
    assert_eq!(output.stats.images_extracted, 1, "the docx embeds one png");
    assert!(output.sources.iter().all(|s| s.succeeded()));

    let pages: Vec<usize> = output.sources.iter().map(|s| s.pages).collect();
    assert_eq!(pages.iter().sum::<usize>(), output.stats.total_pages);
    assert_eq!(pages[2], 1, "an image source is always one page");

    let contents = page_contents(&output.pdf);
    assert_eq!(contents.len(), output.stats.total_pages);
    assert_pages_annotated(&contents, "CONFIDENTIAL", "full-bundle");

    // Request order is page order: docx pages, then form, photo, scan.
    let form_start = pages[0];
    let photo_start = form_start + pages[1];
    let scan_start = photo_start + pages[2];
    assert!(contents[0].contains("(Cover Letter)"));
    assert!(contents[form_start].contains("(Claim Form)"));
    assert!(contents[photo_start].contains("/Im1 Do"));
    assert!(contents[scan_start].contains("(Scanned receipt)"));

    assert!(
        !contents.iter().any(|c| c.contains("internal only")),
        "hidden markup blocks must not be rendered"
    );
}

#[tokio::test]
async fn labels_stay_sequential_across_a_multi_page_source() {
    let dir = tempdir().unwrap();
    let mut long = String::from("<h1>Terms</h1>");
    for clause in 1..=120 {
        long.push_str(&format!(
            "<p>Clause {clause}: the parties agree to the schedule.</p>"
        ));
    }
    std::fs::write(dir.path().join("terms.html"), &long).unwrap();
    std::fs::write(dir.path().join("annex.html"), "<p>Annex A</p>").unwrap();

    let request = BindRequest::new(vec!["terms.html".into(), "annex.html".into()], "DRAFT");
    let output = bind(&request, &store_config(dir.path()))
        .await
        .expect("bind must succeed");

    assert!(
        output.sources[0].pages > 1,
        "fixture must span multiple pages, got {}",
        output.sources[0].pages
    );
    let contents = page_contents(&output.pdf);
    assert_pages_annotated(&contents, "DRAFT", "multi-page");
    assert!(contents[contents.len() - 1].contains("(Annex A)"));
}

#[tokio::test]
async fn annotations_paint_under_source_content() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.html"), "<p>topmost paragraph</p>").unwrap();

    let request = BindRequest::new(vec!["a.html".into()], "UNDERLAY");
    let output = bind(&request, &store_config(dir.path()))
        .await
        .expect("bind must succeed");

    let contents = page_contents(&output.pdf);
    let mark_at = contents[0].find("(UNDERLAY) Tj").expect("watermark present");
    let body_at = contents[0]
        .find("(topmost paragraph)")
        .expect("body present");
    assert!(
        mark_at < body_at,
        "watermark must be drawn before the page's own content"
    );
}

// ── Failure-policy tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn one_bad_source_does_not_sink_the_bundle() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("good.html"), "<p>still here</p>").unwrap();
    // Truncated container: classified as Word but unreadable.
    std::fs::write(
        dir.path().join("broken.docx"),
        b"PK\x03\x04 not a real container",
    )
    .unwrap();

    let request = BindRequest::new(vec!["broken.docx".into(), "good.html".into()], "W");
    let output = bind(&request, &store_config(dir.path()))
        .await
        .expect("partial bind must succeed");

    assert_eq!(output.stats.converted_sources, 1);
    assert_eq!(output.stats.failed_sources, 1);
    assert!(matches!(
        output.sources[0].error,
        Some(SourceError::Conversion { .. })
    ));
    assert!(output.sources[1].succeeded());

    // The surviving page is numbered against the surviving total.
    let contents = page_contents(&output.pdf);
    assert_pages_annotated(&contents, "W", "partial");
    assert!(contents[0].contains("(still here)"));

    assert!(matches!(
        output.into_result(),
        Err(BindError::PartialFailure { .. })
    ));
}

#[tokio::test]
async fn require_all_rejects_a_partial_bundle() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("good.html"), "<p>ok</p>").unwrap();

    let config = BindConfig::builder()
        .store(Arc::new(FsStore::new(dir.path())))
        .require_all(true)
        .build()
        .expect("valid config");
    let request = BindRequest::new(vec!["good.html".into(), "gone.pdf".into()], "W");

    let err = bind(&request, &config).await.expect_err("must fail");
    assert!(matches!(
        err,
        BindError::PartialFailure {
            succeeded: 1,
            failed: 1,
            total: 2
        }
    ));
}

#[tokio::test]
async fn undecodable_embedded_media_warns_but_binds() {
    let dir = tempdir().unwrap();
    // A wmf part copies through raw; the renderer then cannot decode it.
    let bytes = docx_container(&[
        (
            "word/document.xml",
            docx_document(
                "<w:p><w:r><w:t>before media</w:t></w:r></w:p>\
                 <w:p><w:r><w:drawing><a:blip r:embed=\"rId9\"/></w:drawing></w:r></w:p>",
            )
            .as_slice(),
        ),
        (
            "word/_rels/document.xml.rels",
            docx_rels(&[("rId9", "media/image1.wmf")]).as_slice(),
        ),
        (
            "word/media/image1.wmf",
            b"\xd7\xcd\xc6\x9a placeholder metafile".as_slice(),
        ),
    ]);
    std::fs::write(dir.path().join("legacy.docx"), bytes).unwrap();

    let request = BindRequest::new(vec!["legacy.docx".into()], "W");
    let output = bind(&request, &store_config(dir.path()))
        .await
        .expect("bind must succeed");

    assert!(output.sources[0].succeeded());
    assert_eq!(
        output.stats.images_extracted, 1,
        "wmf parts copy through raw"
    );
    assert!(
        output.sources[0]
            .warnings
            .iter()
            .any(|w| w.contains("img_1.wmf")),
        "renderer must record the skipped media, got: {:?}",
        output.sources[0].warnings
    );
    let contents = page_contents(&output.pdf);
    assert!(contents[0].contains("(before media)"));
}

// ── Store and report tests ───────────────────────────────────────────────────

#[tokio::test]
async fn named_destination_receives_the_stored_copy() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.html"), "<p>archive me</p>").unwrap();

    let mut request = BindRequest::new(vec!["a.html".into()], "W");
    request.destination = Some("archive/2026".into());
    request.id = "case42".into();
    let output = bind(&request, &store_config(dir.path()))
        .await
        .expect("bind must succeed");

    assert!(output.file_name.starts_with("bundle_case42_"));
    let location = output.location.clone().expect("stored bundle location");
    assert!(location.contains("archive"));
    let stored = std::fs::read(&location).expect("stored bundle readable");
    assert_eq!(stored, output.pdf);
}

#[tokio::test]
async fn bind_report_serialises_to_json_and_back() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.html"), "<p>alpha</p>").unwrap();

    let request = BindRequest::new(vec!["a.html".into(), "missing.png".into()], "W");
    let output = bind(&request, &store_config(dir.path()))
        .await
        .expect("bind must succeed");

    let json = serde_json::to_string_pretty(&output).expect("report must serialise");
    assert!(
        !json.contains("\"pdf\""),
        "bundle bytes stay out of the report"
    );

    let back: docbinder::BindOutput =
        serde_json::from_str(&json).expect("report must deserialise");
    assert_eq!(back.sources.len(), output.sources.len());
    assert_eq!(back.stats.failed_sources, 1);
    assert_eq!(back.file_name, output.file_name);
}
