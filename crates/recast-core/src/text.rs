//! Text position utilities for byte offset and line:column conversions.
//!
//! Lines and columns are 1-indexed; byte offsets are 0-indexed. Columns
//! count bytes, matching the spans recorded by renderers.

use crate::patch::Span;

/// Convert a byte offset to 1-indexed line and column.
///
/// Offsets past the end clamp to the end of content.
pub fn byte_offset_to_position(content: &[u8], offset: usize) -> (u32, u32) {
    let offset = offset.min(content.len());
    let mut line = 1u32;
    let mut col = 1u32;
    for &byte in &content[..offset] {
        if byte == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Convert 1-indexed line and column to a byte offset.
///
/// Columns past the end of a line clamp to the line end; lines past the
/// end of content return the content length.
pub fn position_to_byte_offset(content: &[u8], line: u32, col: u32) -> usize {
    let line = line.max(1);
    let col = col.max(1) as usize;
    let mut current = 1u32;
    let mut line_start = 0usize;
    for (i, &byte) in content.iter().enumerate() {
        if current == line {
            break;
        }
        if byte == b'\n' {
            current += 1;
            line_start = i + 1;
        }
    }
    if current != line {
        return content.len();
    }
    let line_end = content[line_start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| line_start + p)
        .unwrap_or(content.len());
    (line_start + col - 1).min(line_end)
}

/// Extract the text covered by `span`, or `None` if out of bounds.
pub fn extract_span(content: &str, span: Span) -> Option<&str> {
    content.get(span.start as usize..span.end as usize)
}

/// Find every occurrence of `word` in `text` that is not part of a longer
/// identifier. Returns byte offsets in ascending order.
pub fn find_identifier(text: &str, word: &str) -> Vec<usize> {
    if word.is_empty() {
        return Vec::new();
    }
    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    text.match_indices(word)
        .filter(|(at, _)| {
            let before = text[..*at].chars().next_back();
            let after = text[at + word.len()..].chars().next();
            !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
        })
        .map(|(at, _)| at)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod position_tests {
        use super::*;

        #[test]
        fn offsets_map_to_one_indexed_positions() {
            let content = b"abc\ndef\n";
            assert_eq!(byte_offset_to_position(content, 0), (1, 1));
            assert_eq!(byte_offset_to_position(content, 2), (1, 3));
            assert_eq!(byte_offset_to_position(content, 4), (2, 1));
            assert_eq!(byte_offset_to_position(content, 100), (3, 1));
        }

        #[test]
        fn positions_map_back_to_offsets() {
            let content = b"abc\ndef\n";
            assert_eq!(position_to_byte_offset(content, 1, 1), 0);
            assert_eq!(position_to_byte_offset(content, 2, 2), 5);
            assert_eq!(position_to_byte_offset(content, 2, 99), 7);
            assert_eq!(position_to_byte_offset(content, 9, 1), content.len());
        }
    }

    mod identifier_tests {
        use super::*;

        #[test]
        fn whole_words_only() {
            let text = "count counter recount count_x count";
            assert_eq!(find_identifier(text, "count"), vec![0, 30]);
        }

        #[test]
        fn dotted_names_match_at_segment_boundaries() {
            let text = "see {@link a.t.Foo} and a.tx.Foo";
            assert_eq!(find_identifier(text, "a.t"), vec![11]);
        }

        #[test]
        fn extract_span_bounds() {
            assert_eq!(extract_span("hello", Span::new(1, 3)), Some("el"));
            assert_eq!(extract_span("hello", Span::new(3, 9)), None);
        }
    }
}
