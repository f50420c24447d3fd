//! Page annotation: running page labels and the diagonal watermark.
//!
//! Every page of the merged bundle gets a `"i of N"` label near the
//! bottom-right corner and the watermark string across its middle. The
//! watermark angle follows the page's own diagonal, `atan2(height,
//! width)`, so portrait and landscape sheets both run corner to corner
//! instead of sharing a fixed 45°.
//!
//! Both marks paint UNDER the existing page content: the stamp stream is
//! prepended to the page's content list, so anything the page already
//! draws, filled table cells included, stays legible on top.

use crate::error::BindError;
use crate::pipeline::text::{escape_pdf_text, text_width};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

const LABEL_SIZE: f64 = 12.0;
/// Right edge the label text ends at, in points from the page origin.
const LABEL_RIGHT_EDGE: f64 = 568.0;
const LABEL_BASELINE: f64 = 15.0;

const MARK_SIZE: f64 = 40.0;
/// Light gray, 230/228/228 in sRGB bytes.
const MARK_FILL: &str = "0.902 0.894 0.894 rg";

/// Rotation for a `width` x `height` page, in degrees.
pub fn watermark_angle_degrees(width: f64, height: f64) -> f64 {
    height.atan2(width).to_degrees()
}

/// Stamp every page of `merged` with its page label and `watermark`.
///
/// Works on a parsed copy; the input buffer is never mutated. The page
/// count and page order of the output match the input exactly.
pub fn annotate(merged: &[u8], watermark: &str) -> Result<Vec<u8>, BindError> {
    let mut doc = Document::load_mem(merged).map_err(|err| BindError::AnnotateFailed {
        detail: format!("merged document unreadable: {err}"),
    })?;

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let total = pages.len();

    // One font object per face, shared by every page's stamp.
    let label_font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let mark_font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica-Bold".to_vec())),
    ]));

    for (index, &page_id) in pages.iter().enumerate() {
        let label = format!("{} of {}", index + 1, total);
        let (width, height) = page_box(&doc, page_id);
        let ops = stamp_ops(&label, watermark, width, height);
        let stamp_id = doc.add_object(Stream::new(Dictionary::new(), ops.into_bytes()));

        let (current_contents, current_resources) = {
            let dict = doc
                .get_object(page_id)
                .and_then(Object::as_dict)
                .map_err(|err| BindError::AnnotateFailed {
                    detail: format!("page {}: {err}", index + 1),
                })?;
            (
                dict.get(b"Contents").ok().cloned(),
                dict.get(b"Resources").ok().cloned(),
            )
        };

        // Prepend, never append: content order is paint order.
        let contents = match current_contents {
            Some(Object::Reference(existing)) => Object::Array(vec![
                Object::Reference(stamp_id),
                Object::Reference(existing),
            ]),
            Some(Object::Array(mut items)) => {
                items.insert(0, Object::Reference(stamp_id));
                Object::Array(items)
            }
            Some(Object::Stream(inline)) => {
                // An inline stream has no id for the array to point at, so
                // it moves into its own object first.
                let moved_id = doc.add_object(Object::Stream(inline));
                Object::Array(vec![
                    Object::Reference(stamp_id),
                    Object::Reference(moved_id),
                ])
            }
            _ => Object::Reference(stamp_id),
        };

        let mut resources = resolved_dict(&doc, current_resources.as_ref());
        let mut fonts = resolved_dict(&doc, resources.get(b"Font").ok());
        fonts.set("Fnum", Object::Reference(label_font_id));
        fonts.set("Fmark", Object::Reference(mark_font_id));
        resources.set("Font", Object::Dictionary(fonts));

        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| BindError::AnnotateFailed {
                detail: format!("page {}: {err}", index + 1),
            })?;
        page.set("Contents", contents);
        page.set("Resources", Object::Dictionary(resources));
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|err| BindError::AnnotateFailed {
            detail: err.to_string(),
        })?;

    debug!(pages = total, bytes = output.len(), "annotated bundle");
    Ok(output)
}

/// One self-balanced stamp stream: label first, watermark second.
fn stamp_ops(label: &str, watermark: &str, width: f64, height: f64) -> String {
    let label_x = LABEL_RIGHT_EDGE - text_width(label, LABEL_SIZE);

    let radians = height.atan2(width);
    let (c, s) = (radians.cos(), radians.sin());
    let half_mark = text_width(watermark, MARK_SIZE) / 2.0;

    format!(
        concat!(
            "q\n",
            "BT\n",
            "/Fnum 12 Tf\n",
            "0 0 0 rg\n",
            "{label_x:.2} {label_y:.2} Td\n",
            "({label}) Tj\n",
            "ET\n",
            "BT\n",
            "/Fmark 40 Tf\n",
            "{fill}\n",
            "{c:.6} {s:.6} {ms:.6} {c:.6} {cx:.2} {cy:.2} Tm\n",
            "{dx:.2} 0 Td\n",
            "({watermark}) Tj\n",
            "ET\n",
            "Q\n"
        ),
        label_x = label_x,
        label_y = LABEL_BASELINE,
        label = escape_pdf_text(label),
        fill = MARK_FILL,
        c = c,
        s = s,
        ms = -s,
        cx = width / 2.0,
        cy = height / 2.0,
        dx = -half_mark,
        watermark = escape_pdf_text(watermark),
    )
}

/// Effective page box, following the Parent chain when the page inherits
/// its MediaBox. Falls back to US Letter when nothing declares one.
fn page_box(doc: &Document, page_id: ObjectId) -> (f64, f64) {
    let mut current = match doc.get_object(page_id).and_then(Object::as_dict) {
        Ok(dict) => dict,
        Err(_) => return (612.0, 792.0),
    };
    loop {
        if let Ok(Object::Array(bounds)) = current.get(b"MediaBox") {
            let nums: Vec<f64> = bounds.iter().filter_map(as_f64).collect();
            if nums.len() == 4 {
                return ((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs());
            }
        }
        match current.get(b"Parent") {
            Ok(Object::Reference(parent)) => {
                match doc.get_object(*parent).and_then(Object::as_dict) {
                    Ok(dict) => current = dict,
                    Err(_) => break,
                }
            }
            _ => break,
        }
    }
    (612.0, 792.0)
}

fn as_f64(value: &Object) -> Option<f64> {
    match value {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Owned copy of a dictionary value that may sit behind one reference.
fn resolved_dict(doc: &Document, value: Option<&Object>) -> Dictionary {
    match value {
        Some(Object::Dictionary(dict)) => dict.clone(),
        Some(Object::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_else(Dictionary::new),
        _ => Dictionary::new(),
    }
}
