use crate::dom::Document;
use crate::textprep;
use pagemark_core::{CapturePayload, ContentRegion, DocumentTree};
use serde::Serialize;

/// Result of [`extract_detailed`].
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedText {
    /// Which region the content came from: a [`ContentRegion::label`], `"body"` or `"document"`.
    pub region: &'static str,
    pub title: String,
    /// Normalized `title + "\n" + content`.
    pub text: String,
    pub warnings: Vec<&'static str>,
}

/// Pick the primary content region: the first region kind (in priority order) that
/// matches anything, else `<body>`, else the whole document.
pub fn select_region<D: DocumentTree>(doc: &D) -> (D::Node, &'static str) {
    for region in ContentRegion::PRIORITY {
        if let Some(node) = doc.find_region(region) {
            return (node, region.label());
        }
    }
    match doc.body() {
        Some(body) => (body, "body"),
        None => (doc.root(), "document"),
    }
}

/// Join title and content, collapse whitespace runs and trim.
pub fn page_text(title: &str, content: &str) -> String {
    textprep::collapse_whitespace(&format!("{title}\n{content}"))
}

pub fn extract_detailed<D: DocumentTree>(doc: &D) -> ExtractedText {
    let (node, region) = select_region(doc);
    let title = doc.title();
    let content = doc.rendered_text(node);

    let mut warnings = Vec::new();
    if !textprep::has_any_text(&title) {
        warnings.push("empty_title");
    }
    if !textprep::has_any_text(&content) {
        warnings.push("empty_content");
    }

    ExtractedText {
        region,
        text: page_text(&title, &content),
        title,
        warnings,
    }
}

/// Normalized `title + content` of the page's primary region. Never fails; an empty
/// document yields an empty string.
pub fn extract<D: DocumentTree>(doc: &D) -> String {
    extract_detailed(doc).text
}

/// Parse HTML and extract from it.
pub fn extract_html(html: &str) -> ExtractedText {
    extract_detailed(&Document::parse(html))
}

/// Payload for the capture endpoint.
pub fn capture_payload<D: DocumentTree>(url: &str, doc: &D) -> CapturePayload {
    CapturePayload {
        url: url.to_string(),
        content: extract(doc),
    }
}
