//! Minimal text-only PDF writer for local drafts.
//!
//! Produces a PDF 1.4 document of US-Letter pages set in Helvetica, one line of text per row.
//! Characters outside printable ASCII are replaced with `?` since only the standard encoding of
//! the base-14 font is used.

use std::fmt::Write as _;

const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 56;
const FONT_SIZE: u32 = 11;
const LEADING: u32 = 14;
/// Characters per line before wrapping at Helvetica 11pt within the margins.
pub const WRAP_COLUMNS: usize = 92;
pub const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;

/// Render `lines` into a complete PDF file.
pub fn render_text(lines: &[String]) -> Vec<u8> {
    let wrapped: Vec<String> = lines.iter().flat_map(|l| wrap(l, WRAP_COLUMNS)).collect();
    let mut pages: Vec<&[String]> = wrapped.chunks(LINES_PER_PAGE).collect();
    if pages.is_empty() {
        pages.push(&[]);
    }

    // Object layout: 1 catalog, 2 page tree, 3 font, then (page, contents) pairs
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + 2 * i).collect();
    let mut objects: Vec<Vec<u8>> = Vec::with_capacity(3 + 2 * pages.len());

    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()).into_bytes());
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );

    for (page, page_id) in pages.iter().zip(&page_ids) {
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                page_id + 1
            )
            .into_bytes(),
        );

        let mut content = format!(
            "BT\n/F1 {FONT_SIZE} Tf\n{LEADING} TL\n{MARGIN} {} Td\n",
            PAGE_HEIGHT - MARGIN
        );
        for line in page.iter() {
            let _ = writeln!(content, "({}) Tj T*", escape(line));
        }
        content.push_str("ET\n");
        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend_from_slice(content.as_bytes());
        stream.extend_from_slice(b"endstream");
        objects.push(stream);
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(xref, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    );
    out.extend_from_slice(xref.as_bytes());
    out
}

fn escape(line: &str) -> String {
    let mut escaped = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '\\' | '(' | ')' => {
                escaped.push('\\');
                escaped.push(c);
            }
            ' '..='~' => escaped.push(c),
            '\t' => escaped.push(' '),
            _ => escaped.push('?'),
        }
    }
    escaped
}

/// Greedy word wrap; words longer than `width` are split.
fn wrap(line: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in line.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(width).collect();
            word = word.chars().skip(width).collect();
            lines.push(head);
        }
        let separator = usize::from(!current.is_empty());
        let needed = current.chars().count() + word.chars().count() + separator;
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_document_structure() {
        let pdf = render_text(&["Hello (world)".to_string()]);
        let text = as_text(&pdf);

        assert!(text.starts_with("%PDF-1.4\n"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("(Hello \\(world\\)) Tj"));
        assert!(text.contains("/Count 1"));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let pdf = render_text(&["one".to_string(), "two".to_string()]);
        let text = as_text(&pdf);

        let startxref = text.rsplit("startxref\n").next().unwrap();
        let xref_offset: usize = startxref.lines().next().unwrap().parse().unwrap();
        assert!(text[xref_offset..].starts_with("xref\n"));

        let entries: Vec<&str> = text[xref_offset..].lines().skip(3).take(5).collect();
        for (i, entry) in entries.iter().enumerate() {
            let offset: usize = entry[..10].parse().unwrap();
            assert!(text[offset..].starts_with(&format!("{} 0 obj", i + 1)));
        }
    }

    #[test]
    fn test_long_documents_paginate() {
        let lines: Vec<String> = (0..LINES_PER_PAGE + 1).map(|i| format!("line {i}")).collect();
        let text = as_text(&render_text(&lines));
        assert!(text.contains("/Count 2"));
    }

    #[test]
    fn test_non_ascii_is_replaced() {
        assert_eq!(escape("café"), "caf?");
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("", 10), vec![""]);
        assert_eq!(wrap("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }
}
