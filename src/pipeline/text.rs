//! Helvetica metrics and string escaping for page-content streams.
//!
//! The renderer and the annotator both draw with the base-14 Helvetica
//! faces, which every viewer ships, so no font program is embedded and
//! width math comes from a static advance table instead of a font file.

/// Advance widths (1/1000 em) for Helvetica, chars 32..=126.
///
/// Helvetica-Bold tracks close enough to these for centering a short
/// watermark; exact bold metrics are not worth a second table.
const HELV_W_32_126: [i16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Width of `s` at `font_size` points in Helvetica.
///
/// Bytes outside the printable ASCII range fall back to a 600/1000 em
/// advance, the same guess a viewer's substitution glyph occupies.
pub fn text_width(s: &str, font_size: f64) -> f64 {
    let w1000: f64 = s
        .bytes()
        .map(|b| {
            if (32..=126).contains(&b) {
                HELV_W_32_126[(b - 32) as usize] as f64
            } else {
                600.0
            }
        })
        .sum();
    w1000 * font_size / 1000.0
}

/// Escape a string for a PDF literal string `( ... )`.
///
/// Backslash and parentheses are the only bytes with meaning inside a
/// literal string. Non-Latin-1 characters have no encoding in the base-14
/// WinAnsi setup and are replaced with `?` rather than emitting bytes the
/// viewer would misread.
pub fn escape_pdf_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            c if (c as u32) < 256 => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_and_digit_widths_match_the_table() {
        // ' ' is 278/1000 em, '0' is 556/1000 em.
        assert!((text_width(" ", 1000.0) - 278.0).abs() < f64::EPSILON);
        assert!((text_width("0", 1000.0) - 556.0).abs() < f64::EPSILON);
    }

    #[test]
    fn width_scales_linearly_with_font_size() {
        let at_12 = text_width("3 of 14", 12.0);
        let at_24 = text_width("3 of 14", 24.0);
        assert!((at_24 - 2.0 * at_12).abs() < 1e-9);
    }

    #[test]
    fn non_ascii_uses_the_fallback_advance() {
        assert!((text_width("é", 1000.0) - 600.0 * "é".len() as f64).abs() < f64::EPSILON);
    }

    #[test]
    fn escapes_parens_and_backslash() {
        assert_eq!(escape_pdf_text(r"a(b)c\d"), r"a\(b\)c\\d");
    }

    #[test]
    fn replaces_unencodable_chars() {
        assert_eq!(escape_pdf_text("ДРАФТ"), "?????");
        assert_eq!(escape_pdf_text("café"), "café");
    }
}
