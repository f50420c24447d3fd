//! Sanitisation: strip hidden blocks from markup before layout.
//!
//! ## Why does markup need sanitising?
//!
//! Word-processor exports and authored HTML both park machinery in elements
//! styled `display:none` — revision leftovers, template scaffolding,
//! mail-merge fields. A browser never paints them, but a fixed-page layout
//! engine has no stylesheet pass: whatever survives to the renderer ends up
//! as visible text on the page. So hidden paragraphs and hidden containers
//! are removed here, wholesale, before any layout happens.
//!
//! Removal is structural: a hidden opening tag takes its entire balanced
//! element with it, nested children included. A hidden block nested inside
//! a *visible* block of the same tag is found and removed on its own; a
//! visible block nested inside a *hidden* one disappears with its parent.
//!
//! The scan is a plain string walk rather than a regex because balanced
//! nesting is not a regular language. Input with no hidden markers passes
//! through byte-identical, which also makes the pass idempotent.

use std::ops::Range;

/// The CSS declaration that marks an element as hidden, as emitted by
/// word-processor exports. Only matched inside an opening tag's attribute
/// region; the same text in element content is left alone.
const HIDDEN_MARKER: &str = "display:none";

/// Remove hidden `<p>` blocks, then hidden `<div>` blocks.
///
/// Paragraphs go first: a hidden paragraph inside a visible container must
/// vanish before the container pass inspects its children. Both passes are
/// no-ops on marker-free input, so the whole function is idempotent.
pub fn sanitize(markup: &str) -> String {
    let s = remove_hidden_blocks(markup, "p");
    remove_hidden_blocks(&s, "div")
}

/// Remove every `tag` element whose opening tag carries the hidden marker,
/// together with its balanced content.
///
/// Malformed input (a marked opening tag with no balancing close) is left
/// untouched from that point on; the walk never panics and never loops.
pub fn remove_hidden_blocks(markup: &str, tag: &str) -> String {
    let mut out = markup.to_string();
    while let Some(span) = find_hidden_span(&out, tag) {
        out.replace_range(span, "");
    }
    out
}

/// An opening tag occurrence: `<tag ...>` or `<tag ... />`.
struct OpenTag {
    start: usize,
    /// Byte offset just past the closing `>`.
    end: usize,
    self_closing: bool,
    hidden: bool,
}

/// Locate the span of the first hidden `tag` element, including nested
/// content up to its balancing close tag.
fn find_hidden_span(s: &str, tag: &str) -> Option<Range<usize>> {
    let close = format!("</{tag}>");
    let mut from = 0;

    while let Some(open) = find_open_tag(s, tag, from) {
        if !open.hidden {
            from = open.end;
            continue;
        }
        if open.self_closing {
            return Some(open.start..open.end);
        }

        // Depth-count forward to the balancing close tag.
        let mut depth = 1usize;
        let mut pos = open.end;
        loop {
            let next_open = find_open_tag(s, tag, pos);
            let next_close = s[pos..].find(&close).map(|i| pos + i);

            match (next_open, next_close) {
                (Some(o), Some(c)) if o.start < c => {
                    if !o.self_closing {
                        depth += 1;
                    }
                    pos = o.end;
                }
                (_, Some(c)) => {
                    depth -= 1;
                    pos = c + close.len();
                    if depth == 0 {
                        return Some(open.start..pos);
                    }
                }
                // Unbalanced from here on; leave the remainder untouched.
                (_, None) => return None,
            }
        }
    }
    None
}

/// Find the next complete opening tag of `tag` at or after `from`.
///
/// `<pre>` must not match a search for `p`, so the byte after the tag name
/// has to terminate the name (whitespace, `>`, or `/`).
fn find_open_tag(s: &str, tag: &str, from: usize) -> Option<OpenTag> {
    let needle = format!("<{tag}");
    let mut search = from;

    while let Some(rel) = s[search..].find(&needle) {
        let start = search + rel;
        let name_end = start + needle.len();

        let boundary = match s.as_bytes().get(name_end) {
            Some(b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'/') => true,
            Some(_) => false,
            None => false,
        };
        if !boundary {
            search = start + 1;
            continue;
        }

        // A tag with no closing '>' is incomplete; nothing after it can
        // contain one either, so the scan is over.
        let gt = s[name_end..].find('>').map(|i| name_end + i)?;
        let attrs = &s[name_end..gt];

        return Some(OpenTag {
            start,
            end: gt + 1,
            self_closing: attrs.trim_end().ends_with('/'),
            hidden: attrs.contains(HIDDEN_MARKER),
        });
    }
    None
}
