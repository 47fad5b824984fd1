// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Doc-comment retrieval.
//!
//! Rustc stores `///` and `/** */` comments as `#[doc = "..."]`
//! attributes. When an annotation carries no explicit `comment`
//! element, the first sentence of the item's doc comment becomes the
//! `COMMENT ON` text, so the database catalog and the source read the
//! same.

use syn::Attribute;

/// The full doc comment of an item, newline-joined with each line
/// trimmed, or `None` when there is none (or it is all whitespace).
pub fn extract_doc_comments(attrs: &[Attribute]) -> Option<String> {
    let mut text = String::new();
    for attr in attrs {
        if !attr.path().is_ident("doc") {
            continue;
        }
        let syn::Meta::NameValue(nv) = &attr.meta else {
            continue;
        };
        let syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(s),
            ..
        }) = &nv.value
        else {
            continue;
        };
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(s.value().trim());
    }
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

/// The first sentence of an item's doc comment.
///
/// Scans the first paragraph for a sentence break: `.`, `!`, or `?`
/// followed by whitespace or end of text. Without one, the whole first
/// paragraph is the summary.
pub fn extract_doc_summary(attrs: &[Attribute]) -> Option<String> {
    let docs = extract_doc_comments(attrs)?;
    let paragraph: &str = docs.split("\n\n").next().unwrap_or(&docs);
    let flat = paragraph.replace('\n', " ");
    let mut chars = flat.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            match chars.peek() {
                None => break,
                Some((_, n)) if n.is_whitespace() => {
                    return Some(flat[..=idx].trim().to_string());
                }
                _ => {}
            }
        }
    }
    let trimmed = flat.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs_of(source: &str) -> Vec<Attribute> {
        syn::parse_str::<syn::ItemStruct>(source).unwrap().attrs
    }

    #[test]
    fn single_line_doc_collected() {
        let attrs = attrs_of(
            r#"
            /// Adds numbers.
            struct Foo;
        "#
        );
        let docs = extract_doc_comments(&attrs);
        assert_eq!(docs, Some("Adds numbers.".to_string()));
    }

    #[test]
    fn blank_lines_between_paragraphs_survive() {
        let attrs = attrs_of(
            r#"
            /// Summary.
            ///
            /// Details here.
            struct Foo;
        "#
        );
        let docs = extract_doc_comments(&attrs);
        assert_eq!(docs, Some("Summary.\n\nDetails here.".to_string()));
    }

    #[test]
    fn undocumented_item_yields_none() {
        let attrs = attrs_of(
            r#"
            #[derive(Debug)]
            struct Foo;
        "#
        );
        assert_eq!(extract_doc_comments(&attrs), None);
    }

    #[test]
    fn summary_stops_at_sentence_break() {
        let attrs = attrs_of(
            r#"
            /// Adds one to a value. Works on any integer
            /// the backend can pass through.
            struct Foo;
        "#
        );
        let summary = extract_doc_summary(&attrs);
        assert_eq!(summary, Some("Adds one to a value.".to_string()));
    }

    #[test]
    fn summary_spans_wrapped_lines() {
        let attrs = attrs_of(
            r#"
            /// A summary that wraps onto
            /// a second line before ending. Details follow.
            struct Foo;
        "#
        );
        let summary = extract_doc_summary(&attrs);
        assert_eq!(
            summary,
            Some("A summary that wraps onto a second line before ending.".to_string())
        );
    }

    #[test]
    fn summary_without_break_is_first_paragraph() {
        let attrs = attrs_of(
            r#"
            /// No sentence break here
            ///
            /// Second paragraph.
            struct Foo;
        "#
        );
        let summary = extract_doc_summary(&attrs);
        assert_eq!(summary, Some("No sentence break here".to_string()));
    }

    #[test]
    fn summary_ignores_decimal_points() {
        let attrs = attrs_of(
            r#"
            /// Scales by 1.5 and rounds. Nothing else.
            struct Foo;
        "#
        );
        let summary = extract_doc_summary(&attrs);
        assert_eq!(summary, Some("Scales by 1.5 and rounds.".to_string()));
    }

    #[test]
    fn summary_of_final_sentence_keeps_it_whole() {
        let attrs = attrs_of(
            r#"
            /// Just one sentence.
            struct Foo;
        "#
        );
        let summary = extract_doc_summary(&attrs);
        assert_eq!(summary, Some("Just one sentence.".to_string()));
    }
}
