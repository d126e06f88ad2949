use serde::{Deserialize, Serialize};
use std::fmt::Debug;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("invalid message: {0}")]
    Message(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("target not ready: {0}")]
    NotReady(String),
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Class carried by every highlight marker element.
pub const MARKER_CLASS: &str = "search-highlight";

/// Background color used when the caller does not supply one.
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "yellow";

/// Candidate primary-content regions, tried in [`ContentRegion::PRIORITY`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentRegion {
    /// `<main>`
    Main,
    /// `<article>`
    Article,
    /// any element with class `main-content`
    MainContentClass,
    /// the element with `id="content"`
    ContentId,
}

impl ContentRegion {
    pub const PRIORITY: [ContentRegion; 4] = [
        ContentRegion::Main,
        ContentRegion::Article,
        ContentRegion::MainContentClass,
        ContentRegion::ContentId,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ContentRegion::Main => "main",
            ContentRegion::Article => "article",
            ContentRegion::MainContentClass => "main-content",
            ContentRegion::ContentId => "content",
        }
    }

    /// Whether an element with this tag name / class list / id belongs to the region.
    ///
    /// Tag names compare ASCII-case-insensitively; class and id compare exactly,
    /// as CSS selectors do in standards mode.
    pub fn matches_element(self, tag: &str, class: Option<&str>, id: Option<&str>) -> bool {
        match self {
            ContentRegion::Main => tag.eq_ignore_ascii_case("main"),
            ContentRegion::Article => tag.eq_ignore_ascii_case("article"),
            ContentRegion::MainContentClass => class
                .map(|c| c.split_ascii_whitespace().any(|t| t == "main-content"))
                .unwrap_or(false),
            ContentRegion::ContentId => id == Some("content"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollBehavior {
    Auto,
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollBlock {
    Start,
    Center,
    End,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollOptions {
    pub behavior: ScrollBehavior,
    pub block: ScrollBlock,
}

impl ScrollOptions {
    /// Smooth scroll that puts the target in the middle of the viewport.
    pub fn centered() -> Self {
        Self {
            behavior: ScrollBehavior::Smooth,
            block: ScrollBlock::Center,
        }
    }
}

/// Inline style for a highlight marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerStyle {
    pub background: String,
}

impl MarkerStyle {
    pub fn new(background: impl Into<String>) -> Self {
        Self {
            background: background.into(),
        }
    }

    pub fn css(&self) -> String {
        format!(
            "background-color: {}; padding: 2px; border-radius: 3px;",
            self.background
        )
    }
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_COLOR)
    }
}

/// Mutable, caller-owned document tree.
///
/// Extraction only reads through this trait; highlighting mutates the tree in place.
/// Implementations decide what a node handle is; handles of detached nodes may stay
/// valid but must no longer be reachable from [`DocumentTree::root`].
pub trait DocumentTree {
    type Node: Copy + Eq + Debug;

    /// Document title, whitespace-collapsed; empty when the document has none.
    fn title(&self) -> String;

    fn root(&self) -> Self::Node;

    fn body(&self) -> Option<Self::Node>;

    /// First element in document order belonging to `region`.
    fn find_region(&self, region: ContentRegion) -> Option<Self::Node>;

    /// Visible text of a subtree, with line breaks at block boundaries.
    fn rendered_text(&self, node: Self::Node) -> String;

    /// Concatenation of all descendant text (the node's own text for text nodes).
    fn text_content(&self, node: Self::Node) -> String;

    /// Snapshot of the text nodes under `under`, in document order.
    ///
    /// Text inside raw-text containers (scripts, styles, form fields) is excluded.
    fn text_nodes(&self, under: Self::Node) -> Vec<Self::Node>;

    /// Attached elements whose class list contains `class`, in document order.
    fn elements_with_class(&self, class: &str) -> Vec<Self::Node>;

    fn is_text(&self, node: Self::Node) -> bool;

    fn previous_sibling(&self, node: Self::Node) -> Option<Self::Node>;

    fn next_sibling(&self, node: Self::Node) -> Option<Self::Node>;

    /// Replace the content of a text node. No-op for other node kinds.
    fn set_text(&mut self, node: Self::Node, text: &str);

    /// Create a detached text node.
    fn create_text(&mut self, text: &str) -> Self::Node;

    /// Create a detached marker element (class [`MARKER_CLASS`]) wrapping `text`.
    fn create_marker(&mut self, text: &str, style: &MarkerStyle) -> Self::Node;

    /// Splice `replacement` (detached nodes) into the position of `node`, then detach `node`.
    fn replace_with(&mut self, node: Self::Node, replacement: &[Self::Node]);

    fn remove(&mut self, node: Self::Node);

    fn scroll_into_view(&mut self, node: Self::Node, options: ScrollOptions);
}

/// Body of a capture call: the page URL and its extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturePayload {
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub k: usize,
}

/// Similarity as reported by the backend: either a number or a label like `"42.50%"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Similarity {
    Score(f64),
    Label(String),
}

impl Similarity {
    pub fn value(&self) -> Option<f64> {
        match self {
            Similarity::Score(v) => Some(*v),
            Similarity::Label(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<Similarity>,
}

impl SearchHit {
    /// Matched text: `chunk` if present, else `content`.
    pub fn text(&self) -> Option<&str> {
        self.chunk.as_deref().or(self.content.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub total_results: usize,
    pub results: Vec<SearchHit>,
}

impl SearchResponse {
    pub fn top(&self) -> Option<&SearchHit> {
        self.results.first()
    }
}

/// Message accepted by a page context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentMessage {
    Highlight {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true }
    }

    pub fn failed() -> Self {
        Self { success: false }
    }
}

#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn capture(&self, payload: &CapturePayload) -> Result<()>;
}

#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, req: &SearchRequest) -> Result<SearchResponse>;
}

/// Delivery channel into a page context (e.g. a tab).
#[async_trait::async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, msg: &ContentMessage) -> Result<Ack>;
}

/// Opens a URL as a page that accepts messages (e.g. a new tab).
#[async_trait::async_trait]
pub trait PageOpener: Send + Sync {
    type Page: MessageSink;

    /// Resolves once the page has finished loading. Its message handler may still
    /// be missing at that point.
    async fn open(&self, url: &str) -> Result<Self::Page>;
}
