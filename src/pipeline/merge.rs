//! Concatenation of finished page documents into one bundle.
//!
//! Every input is reparsed and rebuilt rather than byte-spliced: object
//! ids are renumbered into disjoint ranges, page objects are collected in
//! bundle order, and a fresh page tree and catalog replace the per-input
//! scaffolding. Annotation runs after this pass and relies on the merged
//! document being normalised, so even a single input takes the same path.

use crate::error::{BindError, SourceError};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use tracing::debug;

/// Merge page documents into one, preserving input order.
///
/// Order of `documents` is the page order of the output: all pages of
/// input 0, then all pages of input 1, and so on. An input that fails to
/// parse aborts the merge with its position in the bundle.
pub fn merge(documents: &[Vec<u8>]) -> Result<Vec<u8>, BindError> {
    if documents.is_empty() {
        return Err(BindError::EmptyMerge);
    }

    let mut max_id: u32 = 1;
    // Renumbering makes object ids rise monotonically across inputs, but
    // page order is the contract here, so it is carried explicitly.
    let mut ordered_pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut carried_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut document = Document::with_version("1.5");

    for (index, bytes) in documents.iter().enumerate() {
        let mut doc =
            Document::load_mem(bytes).map_err(|err| BindError::InvalidPageDocument {
                index,
                detail: err.to_string(),
            })?;

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for &page_id in doc.get_pages().values() {
            if let Ok(page) = doc.get_object(page_id) {
                ordered_pages.push((page_id, page.clone()));
            }
        }

        // Page-tree scaffolding is rebuilt below; everything else the
        // pages reference carries over untouched.
        for (object_id, object) in doc.objects {
            match object.type_name().unwrap_or("") {
                "Catalog" | "Pages" | "Page" | "Outlines" | "Outline" => {}
                _ => {
                    carried_objects.insert(object_id, object);
                }
            }
        }
    }

    if ordered_pages.is_empty() {
        return Err(BindError::EmptyMerge);
    }

    for (object_id, object) in carried_objects {
        document.objects.insert(object_id, object);
    }

    // Fresh ids must land above every renumbered input id.
    document.max_id = max_id;
    let pages_id = document.new_object_id();
    for (page_id, page) in &ordered_pages {
        if let Object::Dictionary(dict) = page {
            let mut page_dict = dict.clone();
            page_dict.set("Parent", Object::Reference(pages_id));
            document
                .objects
                .insert(*page_id, Object::Dictionary(page_dict));
        }
    }

    let kids: Vec<Object> = ordered_pages
        .iter()
        .map(|(id, _)| Object::Reference(*id))
        .collect();
    let pages_dict = Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(ordered_pages.len() as i64)),
    ]);
    document
        .objects
        .insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = document.new_object_id();
    let catalog_dict = Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    document
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));
    document.trailer.set("Root", Object::Reference(catalog_id));

    document.max_id = document.objects.len() as u32;
    document.renumber_objects();
    document.compress();

    let mut output = Vec::new();
    document.save_to(&mut output).map_err(|err| BindError::MergeFailed {
        detail: err.to_string(),
    })?;

    debug!(
        inputs = documents.len(),
        pages = ordered_pages.len(),
        bytes = output.len(),
        "merged page documents"
    );
    Ok(output)
}

/// Parse a finished page document and count its pages.
///
/// Used to vet passthrough sources before they reach the merge, so a
/// corrupt upload surfaces on its own source report instead of failing
/// the whole bundle later.
pub fn page_count(bytes: &[u8]) -> Result<usize, SourceError> {
    let doc = Document::load_mem(bytes).map_err(|err| SourceError::Conversion {
        detail: format!("unreadable page document: {err}"),
    })?;
    Ok(doc.get_pages().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::render_markup;

    fn one_page(text: &str) -> Vec<u8> {
        render_markup(&format!("<p>{text}</p>")).unwrap().pdf
    }

    fn page_text(bytes: &[u8], page_number: u32) -> String {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = doc.get_pages()[&page_number];
        String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned()
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(merge(&[]), Err(BindError::EmptyMerge)));
    }

    #[test]
    fn merged_page_count_is_the_sum_of_inputs() {
        let long: String = (0..80).map(|i| format!("<p>line {i}</p>")).collect();
        let multi = render_markup(&long).unwrap();
        assert!(multi.page_count > 1, "fixture should overflow one page");

        let merged = merge(&[one_page("alpha"), multi.pdf.clone()]).unwrap();
        assert_eq!(page_count(&merged).unwrap(), 1 + multi.page_count);
    }

    #[test]
    fn merge_preserves_input_order() {
        let merged = merge(&[one_page("alpha"), one_page("beta"), one_page("gamma")]).unwrap();
        assert_eq!(page_count(&merged).unwrap(), 3);
        assert!(page_text(&merged, 1).contains("(alpha)"));
        assert!(page_text(&merged, 2).contains("(beta)"));
        assert!(page_text(&merged, 3).contains("(gamma)"));
    }

    #[test]
    fn single_input_still_goes_through_the_rebuild() {
        let merged = merge(&[one_page("solo")]).unwrap();
        assert_eq!(page_count(&merged).unwrap(), 1);
        assert!(page_text(&merged, 1).contains("(solo)"));
    }

    #[test]
    fn broken_document_reports_its_position() {
        let result = merge(&[one_page("fine"), b"not a page document".to_vec()]);
        match result {
            Err(BindError::InvalidPageDocument { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidPageDocument, got {other:?}"),
        }
    }

    #[test]
    fn page_count_rejects_garbage() {
        assert!(matches!(
            page_count(b"garbage"),
            Err(SourceError::Conversion { .. })
        ));
    }
}
