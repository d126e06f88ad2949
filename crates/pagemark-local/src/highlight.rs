//! Search-result highlighting on a document tree.
//!
//! One call runs four phases:
//! 1. unwrap every existing marker back into plain text (merged with its text neighbours),
//! 2. snapshot the text nodes under `<body>`,
//! 3. replace each text node that matches with `text, marker, text, ...`,
//! 4. scroll the first new marker into view.
//!
//! Matches never span text nodes: `hel<b>lo</b>` does not match `hello`.

use crate::pattern::{split_by_spans, Matcher, PatternMode};
use pagemark_core::{DocumentTree, MarkerStyle, ScrollOptions, DEFAULT_HIGHLIGHT_COLOR, MARKER_CLASS};
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct HighlightOptions {
    /// Marker background; `None` means [`DEFAULT_HIGHLIGHT_COLOR`].
    pub color: Option<String>,
    pub mode: PatternMode,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HighlightReport {
    /// Markers from a previous call that were unwrapped.
    pub cleared: usize,
    pub markers: usize,
    pub nodes_rewritten: usize,
    pub scrolled: bool,
    pub warnings: Vec<&'static str>,
}

/// Validate a CSS color before it is interpolated into a `style` attribute.
///
/// Returns the color to use and a warning code when the input was replaced.
pub fn sanitize_color(color: Option<&str>) -> (String, Option<&'static str>) {
    let c = color.map(str::trim).unwrap_or("");
    if c.is_empty() {
        return (DEFAULT_HIGHLIGHT_COLOR.to_string(), None);
    }
    let ok = c.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '#' | '(' | ')' | ',' | '.' | '%' | ' ' | '-')
    });
    if ok {
        (c.to_string(), None)
    } else {
        (DEFAULT_HIGHLIGHT_COLOR.to_string(), Some("invalid_color"))
    }
}

/// Merge the text siblings on both sides of `node` into it.
fn merge_adjacent_text<D: DocumentTree>(doc: &mut D, node: D::Node) {
    let mut text = doc.text_content(node);
    let mut changed = false;
    while let Some(prev) = doc.previous_sibling(node).filter(|p| doc.is_text(*p)) {
        text.insert_str(0, &doc.text_content(prev));
        doc.remove(prev);
        changed = true;
    }
    while let Some(next) = doc.next_sibling(node).filter(|n| doc.is_text(*n)) {
        text.push_str(&doc.text_content(next));
        doc.remove(next);
        changed = true;
    }
    if changed {
        doc.set_text(node, &text);
    }
}

/// Unwrap every marker element back into plain text. Returns how many were removed.
pub fn clear_highlights<D: DocumentTree>(doc: &mut D) -> usize {
    let markers = doc.elements_with_class(MARKER_CLASS);
    // Innermost/last first, so a nested marker is folded into its parent's text before
    // the parent itself is unwrapped.
    for marker in markers.iter().rev() {
        let text = doc.text_content(*marker);
        let plain = doc.create_text(&text);
        doc.replace_with(*marker, &[plain]);
        merge_adjacent_text(doc, plain);
    }
    markers.len()
}

/// Highlight `pattern` literally with an optional color.
pub fn highlight<D: DocumentTree>(
    doc: &mut D,
    pattern: &str,
    color: Option<&str>,
) -> HighlightReport {
    let opts = HighlightOptions {
        color: color.map(str::to_string),
        mode: PatternMode::Literal,
    };
    highlight_with(doc, pattern, &opts)
}

pub fn highlight_with<D: DocumentTree>(
    doc: &mut D,
    pattern: &str,
    opts: &HighlightOptions,
) -> HighlightReport {
    let mut report = HighlightReport {
        cleared: clear_highlights(doc),
        ..HighlightReport::default()
    };

    let (color, color_warning) = sanitize_color(opts.color.as_deref());
    if let Some(w) = color_warning {
        tracing::warn!(color = ?opts.color, "rejected highlight color; using default");
        report.warnings.push(w);
    }

    let matcher = match Matcher::new(pattern, opts.mode) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "skipping highlight; prior markers were cleared");
            report.warnings.push("invalid_pattern");
            return report;
        }
    };
    if matcher.is_empty() {
        report.warnings.push("empty_pattern");
        return report;
    }

    let style = MarkerStyle::new(color);
    let scope = doc.body().unwrap_or_else(|| doc.root());
    let mut first_marker = None;

    // Snapshot first: the nodes spliced in below are never visited.
    for node in doc.text_nodes(scope) {
        let text = doc.text_content(node);
        let spans = matcher.find_spans(&text);
        if spans.is_empty() {
            continue;
        }
        let mut pieces = Vec::with_capacity(spans.len() * 2 + 1);
        for (piece, is_match) in split_by_spans(&text, &spans) {
            if is_match {
                let marker = doc.create_marker(piece, &style);
                first_marker.get_or_insert(marker);
                pieces.push(marker);
            } else {
                pieces.push(doc.create_text(piece));
            }
        }
        doc.replace_with(node, &pieces);
        report.markers += spans.len();
        report.nodes_rewritten += 1;
    }

    if let Some(marker) = first_marker {
        doc.scroll_into_view(marker, ScrollOptions::centered());
        report.scrolled = true;
    }
    tracing::debug!(
        markers = report.markers,
        cleared = report.cleared,
        "highlight applied"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use proptest::prelude::*;

    fn marker_texts(doc: &Document) -> Vec<String> {
        doc.elements_with_class(MARKER_CLASS)
            .into_iter()
            .map(|m| doc.text_content(m))
            .collect()
    }

    fn body_text(doc: &Document) -> String {
        doc.text_content(doc.body().unwrap())
    }

    #[test]
    fn matches_case_insensitively() {
        let mut doc = Document::parse("<body><p>say hello world</p></body>");
        let report = highlight(&mut doc, "Hello", None);
        assert_eq!(report.markers, 1);
        assert_eq!(marker_texts(&doc), vec!["hello"]);
        assert!(doc.to_html().contains(
            r#"<p>say <span class="search-highlight" style="background-color: yellow; padding: 2px; border-radius: 3px;">hello</span> world</p>"#
        ));
        assert_eq!(body_text(&doc), "say hello world");
    }

    #[test]
    fn wraps_every_match_in_a_node_left_to_right() {
        let mut doc = Document::parse("<body><p>a-b-A-b-a</p></body>");
        let report = highlight(&mut doc, "a", Some("orange"));
        assert_eq!(report.markers, 3);
        assert_eq!(report.nodes_rewritten, 1);
        assert_eq!(marker_texts(&doc), vec!["a", "A", "a"]);
        assert!(doc.to_html().contains("background-color: orange;"));
        assert_eq!(body_text(&doc), "a-b-A-b-a");
    }

    #[test]
    fn second_call_is_idempotent() {
        let mut doc = Document::parse("<body><p>one two one</p><div>One more</div></body>");
        highlight(&mut doc, "one", None);
        let once = doc.to_html();
        let report = highlight(&mut doc, "one", None);
        assert_eq!(report.cleared, 3);
        assert_eq!(report.markers, 3);
        assert_eq!(doc.to_html(), once);
    }

    #[test]
    fn clearing_restores_original_markup() {
        let html = "<html><head></head><body><p>alpha beta gamma</p><ul><li>beta</li></ul></body></html>";
        let mut doc = Document::parse(html);
        let before = doc.to_html();
        highlight(&mut doc, "beta", None);
        assert_ne!(doc.to_html(), before);
        assert_eq!(clear_highlights(&mut doc), 2);
        assert_eq!(doc.to_html(), before);
    }

    #[test]
    fn no_match_clears_and_does_not_scroll() {
        let mut doc = Document::parse("<body><p>hello world</p></body>");
        highlight(&mut doc, "world", None);
        assert!(doc.scroll_target().is_some());

        let mut fresh = Document::parse("<body><p>hello world</p></body>");
        let report = highlight(&mut fresh, "zzz_not_present", None);
        assert_eq!(report.markers, 0);
        assert!(!report.scrolled);
        assert!(fresh.scroll_target().is_none());

        let report = highlight(&mut doc, "zzz_not_present", None);
        assert_eq!(report.cleared, 1);
        assert_eq!(report.markers, 0);
        assert!(marker_texts(&doc).is_empty());
    }

    #[test]
    fn empty_pattern_produces_no_markers() {
        let mut doc = Document::parse("<body><p>text</p></body>");
        let report = highlight(&mut doc, "", None);
        assert_eq!(report.markers, 0);
        assert_eq!(report.warnings, vec!["empty_pattern"]);
        assert!(marker_texts(&doc).is_empty());
    }

    #[test]
    fn whitespace_pattern_is_matched_literally() {
        let mut doc = Document::parse("<body><p>a  b</p></body>");
        let report = highlight(&mut doc, "  ", None);
        assert_eq!(report.markers, 1);
        assert!(report.warnings.is_empty());
        assert_eq!(marker_texts(&doc), vec!["  "]);
        assert_eq!(body_text(&doc), "a  b");
    }

    #[test]
    fn pasted_paragraph_is_found() {
        let phrase = "The quick brown fox jumps over the lazy dog. ".repeat(800);
        let phrase = phrase.trim_end();
        let html = format!("<body><p>Intro. {phrase} Outro.</p></body>");
        let mut doc = Document::parse(&html);
        let report = highlight(&mut doc, &phrase.to_uppercase(), None);
        assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
        assert_eq!(report.markers, 1);
        assert_eq!(marker_texts(&doc), vec![phrase.to_string()]);
        assert!(report.scrolled);
    }

    #[test]
    fn invalid_regex_still_clears_previous_markers() {
        let mut doc = Document::parse("<body><p>find me</p></body>");
        highlight(&mut doc, "find", None);
        let opts = HighlightOptions {
            color: None,
            mode: PatternMode::Regex,
        };
        let report = highlight_with(&mut doc, "(unclosed", &opts);
        assert_eq!(report.cleared, 1);
        assert_eq!(report.markers, 0);
        assert_eq!(report.warnings, vec!["invalid_pattern"]);
        assert!(marker_texts(&doc).is_empty());
        assert_eq!(body_text(&doc), "find me");
    }

    #[test]
    fn regex_mode_uses_expression_semantics() {
        let mut doc = Document::parse("<body><p>cat cot cut</p></body>");
        let opts = HighlightOptions {
            color: None,
            mode: PatternMode::Regex,
        };
        let report = highlight_with(&mut doc, "c[ao]t", &opts);
        assert_eq!(report.markers, 2);
        assert_eq!(marker_texts(&doc), vec!["cat", "cot"]);
    }

    #[test]
    fn matches_do_not_cross_text_nodes() {
        let mut doc = Document::parse("<body><p>hel<b>lo</b> there</p></body>");
        let report = highlight(&mut doc, "hello", None);
        assert_eq!(report.markers, 0);
    }

    #[test]
    fn scrolls_to_first_marker_in_document_order() {
        let mut doc = Document::parse("<body><h1>Intro</h1><p>needle one</p><p>needle two</p></body>");
        highlight(&mut doc, "needle", None);
        let (target, opts) = doc.scroll_target().expect("scrolled");
        assert_eq!(opts, ScrollOptions::centered());
        let first = doc.elements_with_class(MARKER_CLASS)[0];
        assert_eq!(target, first);
        let parent = doc.parent(target).unwrap();
        assert_eq!(doc.text_content(parent), "needle one");
    }

    #[test]
    fn scripts_and_head_are_left_alone() {
        let mut doc = Document::parse(
            "<html><head><title>needle</title></head><body><script>var needle;</script><p>needle</p></body></html>",
        );
        let report = highlight(&mut doc, "needle", None);
        assert_eq!(report.markers, 1);
        assert!(doc.to_html().contains("<script>var needle;</script>"));
        assert_eq!(doc.title(), "needle");
    }

    #[test]
    fn hostile_color_falls_back_to_default() {
        let mut doc = Document::parse("<body><p>x marks</p></body>");
        let report = highlight(&mut doc, "x", Some("red; background-image: url(evil)"));
        assert_eq!(report.warnings, vec!["invalid_color"]);
        assert!(doc.to_html().contains("background-color: yellow;"));
        assert_eq!(sanitize_color(Some(" #ffcc00 ")), ("#ffcc00".to_string(), None));
        assert_eq!(
            sanitize_color(Some("rgb(255, 200, 0)")),
            ("rgb(255, 200, 0)".to_string(), None)
        );
    }

    fn single_paragraph(text: &str) -> Document {
        let mut doc = Document::new();
        let root = doc.root_id();
        let body = doc.create_element("body", &[]);
        doc.append_child(root, body);
        let p = doc.create_element("p", &[]);
        doc.append_child(body, p);
        let t = doc.create_text(text);
        doc.append_child(p, t);
        doc
    }

    proptest! {
        #[test]
        fn highlight_then_clear_round_trips(
            text in "[abAB .]{0,40}",
            pattern in "[abAB.]{1,3}",
        ) {
            let mut doc = single_paragraph(&text);
            let before = doc.to_html();
            let report = highlight(&mut doc, &pattern, None);
            prop_assert_eq!(body_text(&doc), text.clone());
            prop_assert_eq!(report.markers, marker_texts(&doc).len());
            for m in marker_texts(&doc) {
                prop_assert_eq!(m.to_lowercase(), pattern.to_lowercase());
            }
            clear_highlights(&mut doc);
            prop_assert_eq!(doc.to_html(), before);
        }

        #[test]
        fn repeated_highlight_is_stable(
            text in "[abAB ]{0,40}",
            pattern in "[ab]{1,2}",
        ) {
            let mut doc = single_paragraph(&text);
            let first = highlight(&mut doc, &pattern, None);
            let once = doc.to_html();
            let second = highlight(&mut doc, &pattern, None);
            prop_assert_eq!(doc.to_html(), once);
            prop_assert_eq!(first.markers, second.markers);
            prop_assert_eq!(second.cleared, first.markers);
            let expected = text.to_lowercase().matches(&pattern.to_lowercase()).count();
            prop_assert_eq!(first.markers, expected);
        }
    }
}
