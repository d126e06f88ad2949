//! Arena-backed HTML document.
//!
//! `Document` is the in-memory tree the extractor and highlighter run against when
//! there is no live page: it is built from HTML with `scraper`, mutated through
//! [`DocumentTree`], and written back out with [`Document::to_html`].
//!
//! Detaching a node only unlinks it from its parent; the slot stays in the arena so
//! ids held during an operation stay valid. [`Document::compact`] drops unreachable
//! slots and invalidates all ids handed out before it.

use crate::textprep;
use pagemark_core::{ContentRegion, DocumentTree, MarkerStyle, ScrollOptions, MARKER_CLASS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Doctype(String),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    scroll: Option<(NodeId, ScrollOptions)>,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

/// Elements whose text is serialized verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

/// Elements whose text is never a highlight target.
const UNHIGHLIGHTABLE_ELEMENTS: &[&str] = &["script", "style", "textarea", "noscript", "template"];

const NON_RENDERING_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "title", "meta", "link", "base",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "caption", "center", "dd", "details",
    "dialog", "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1",
    "h2", "h3", "h4", "h5", "h6", "header", "hgroup", "hr", "html", "legend", "li", "main",
    "menu", "nav", "ol", "p", "pre", "section", "summary", "table", "tbody", "tfoot", "thead",
    "tr", "ul",
];

fn name_in(name: &str, set: &[&str]) -> bool {
    set.iter().any(|n| name.eq_ignore_ascii_case(n))
}

fn escape_text(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

enum Frame {
    Enter(NodeId),
    Emit(String),
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty document: a lone root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            scroll: None,
        }
    }

    /// Parse a full HTML document (html5 rules: missing `<html>`/`<head>`/`<body>` are implied).
    pub fn parse(html: &str) -> Self {
        let parsed = html_scraper::Html::parse_document(html);
        let mut doc = Document::new();
        let root = doc.root_id();
        let mut stack = vec![(parsed.tree.root(), root)];
        while let Some((src, parent)) = stack.pop() {
            let id = match src.value() {
                html_scraper::Node::Document | html_scraper::Node::Fragment => parent,
                html_scraper::Node::Doctype(d) => {
                    doc.append_new(parent, NodeKind::Doctype(d.name().to_string()))
                }
                html_scraper::Node::Comment(c) => {
                    doc.append_new(parent, NodeKind::Comment(c.to_string()))
                }
                html_scraper::Node::Text(t) => doc.append_new(parent, NodeKind::Text(t.to_string())),
                html_scraper::Node::Element(el) => {
                    let attrs = el
                        .attrs
                        .iter()
                        .map(|(k, v)| {
                            let name = match &k.prefix {
                                Some(prefix) => format!("{}:{}", prefix, k.local),
                                None => k.local.to_string(),
                            };
                            (name, v.to_string())
                        })
                        .collect();
                    doc.append_new(
                        parent,
                        NodeKind::Element {
                            name: el.name().to_string(),
                            attrs,
                        },
                    )
                }
                _ => continue,
            };
            let children: Vec<_> = src.children().collect();
            for child in children.into_iter().rev() {
                stack.push((child, id));
            }
        }
        doc
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    fn append_new(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.push(kind);
        self.append_child(parent, id);
        id
    }

    /// Create a detached element.
    pub fn create_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.push(NodeKind::Element {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    /// Append `child` as the last child of `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.data(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.data(id).children
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.data(id).kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.data(id).kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|c| c.split_ascii_whitespace().any(|t| t == class))
            .unwrap_or(false)
    }

    fn is_hidden(&self, id: NodeId) -> bool {
        if self.attr(id, "hidden").is_some() {
            return true;
        }
        self.attr(id, "style")
            .map(|s| {
                let compact: String = s
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>()
                    .to_ascii_lowercase();
                compact.contains("display:none")
            })
            .unwrap_or(false)
    }

    /// Whether `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if cur == self.root_id() {
                return true;
            }
            match self.data(cur).parent {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// Pre-order walk of `start` and its descendants. `skip` prunes a subtree.
    fn preorder(&self, start: NodeId, skip: impl Fn(&NodeKind) -> bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let data = self.data(id);
            if skip(&data.kind) {
                continue;
            }
            out.push(id);
            stack.extend(data.children.iter().rev().copied());
        }
        out
    }

    fn first_element_named(&self, name: &str) -> Option<NodeId> {
        self.preorder(self.root_id(), |_| false)
            .into_iter()
            .find(|id| {
                self.tag_name(*id)
                    .map(|n| n.eq_ignore_ascii_case(name))
                    .unwrap_or(false)
            })
    }

    /// Number of slots in the arena, attached or not.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Rebuild the arena from the nodes reachable from the root, in document order.
    ///
    /// Every `NodeId` obtained before the call is invalidated. The recorded scroll
    /// target is kept when its node is still attached.
    pub fn compact(&mut self) {
        let order = self.preorder(self.root_id(), |_| false);
        if order.len() == self.nodes.len() {
            return;
        }
        let mut remap: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        for (new, old) in order.iter().enumerate() {
            remap[old.0] = Some(NodeId(new));
        }
        let mut old_nodes: Vec<Option<NodeData>> =
            std::mem::take(&mut self.nodes).into_iter().map(Some).collect();
        self.nodes = order
            .iter()
            .filter_map(|old| old_nodes[old.0].take())
            .map(|data| NodeData {
                kind: data.kind,
                parent: data.parent.and_then(|p| remap[p.0]),
                children: data.children.iter().filter_map(|c| remap[c.0]).collect(),
            })
            .collect();
        self.scroll = self
            .scroll
            .and_then(|(id, opts)| remap[id.0].map(|n| (n, opts)));
    }

    /// Last scroll request recorded by [`DocumentTree::scroll_into_view`].
    pub fn scroll_target(&self) -> Option<(NodeId, ScrollOptions)> {
        self.scroll
    }

    /// Serialize the attached tree back to HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![Frame::Enter(self.root_id())];
        while let Some(frame) = stack.pop() {
            let id = match frame {
                Frame::Emit(s) => {
                    out.push_str(&s);
                    continue;
                }
                Frame::Enter(id) => id,
            };
            let data = self.data(id);
            match &data.kind {
                NodeKind::Document => {
                    stack.extend(data.children.iter().rev().map(|c| Frame::Enter(*c)));
                }
                NodeKind::Doctype(name) => {
                    out.push_str("<!DOCTYPE ");
                    out.push_str(name);
                    out.push('>');
                }
                NodeKind::Comment(text) => {
                    out.push_str("<!--");
                    out.push_str(text);
                    out.push_str("-->");
                }
                NodeKind::Text(text) => {
                    let raw = data
                        .parent
                        .and_then(|p| self.tag_name(p))
                        .map(|n| name_in(n, RAW_TEXT_ELEMENTS))
                        .unwrap_or(false);
                    if raw {
                        out.push_str(text);
                    } else {
                        escape_text(text, &mut out);
                    }
                }
                NodeKind::Element { name, attrs } => {
                    out.push('<');
                    out.push_str(name);
                    for (k, v) in attrs {
                        out.push(' ');
                        out.push_str(k);
                        out.push_str("=\"");
                        escape_attr(v, &mut out);
                        out.push('"');
                    }
                    out.push('>');
                    if name_in(name, VOID_ELEMENTS) {
                        continue;
                    }
                    stack.push(Frame::Emit(format!("</{name}>")));
                    stack.extend(data.children.iter().rev().map(|c| Frame::Enter(*c)));
                }
            }
        }
        out
    }
}

impl DocumentTree for Document {
    type Node = NodeId;

    fn title(&self) -> String {
        self.first_element_named("title")
            .map(|t| textprep::collapse_whitespace(&self.text_content(t)))
            .unwrap_or_default()
    }

    fn root(&self) -> NodeId {
        self.root_id()
    }

    fn body(&self) -> Option<NodeId> {
        self.first_element_named("body")
    }

    fn find_region(&self, region: ContentRegion) -> Option<NodeId> {
        self.preorder(self.root_id(), |_| false)
            .into_iter()
            .find(|id| match self.tag_name(*id) {
                Some(name) => {
                    region.matches_element(name, self.attr(*id, "class"), self.attr(*id, "id"))
                }
                None => false,
            })
    }

    fn rendered_text(&self, node: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![Frame::Enter(node)];
        while let Some(frame) = stack.pop() {
            let id = match frame {
                Frame::Emit(s) => {
                    out.push_str(&s);
                    continue;
                }
                Frame::Enter(id) => id,
            };
            let data = self.data(id);
            match &data.kind {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Document => {
                    stack.extend(data.children.iter().rev().map(|c| Frame::Enter(*c)));
                }
                NodeKind::Element { name, .. } => {
                    if name_in(name, NON_RENDERING_ELEMENTS) || self.is_hidden(id) {
                        continue;
                    }
                    if name.eq_ignore_ascii_case("br") {
                        out.push('\n');
                        continue;
                    }
                    if name.eq_ignore_ascii_case("td") || name.eq_ignore_ascii_case("th") {
                        stack.push(Frame::Emit("\t".to_string()));
                    } else if name_in(name, BLOCK_ELEMENTS) {
                        out.push('\n');
                        stack.push(Frame::Emit("\n".to_string()));
                    }
                    stack.extend(data.children.iter().rev().map(|c| Frame::Enter(*c)));
                }
                NodeKind::Doctype(_) | NodeKind::Comment(_) => {}
            }
        }
        out
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        for id in self.preorder(node, |k| matches!(k, NodeKind::Comment(_))) {
            if let NodeKind::Text(t) = &self.data(id).kind {
                out.push_str(t);
            }
        }
        out
    }

    fn text_nodes(&self, under: NodeId) -> Vec<NodeId> {
        self.preorder(under, |k| match k {
            NodeKind::Element { name, .. } => name_in(name, UNHIGHLIGHTABLE_ELEMENTS),
            _ => false,
        })
        .into_iter()
        .filter(|id| matches!(self.data(*id).kind, NodeKind::Text(_)))
        .collect()
    }

    fn elements_with_class(&self, class: &str) -> Vec<NodeId> {
        self.preorder(self.root_id(), |_| false)
            .into_iter()
            .filter(|id| self.has_class(*id, class))
            .collect()
    }

    fn is_text(&self, node: NodeId) -> bool {
        matches!(self.data(node).kind, NodeKind::Text(_))
    }

    fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.data(node).parent?;
        let siblings = &self.data(parent).children;
        let idx = siblings.iter().position(|c| *c == node)?;
        idx.checked_sub(1).map(|i| siblings[i])
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.data(node).parent?;
        let siblings = &self.data(parent).children;
        let idx = siblings.iter().position(|c| *c == node)?;
        siblings.get(idx + 1).copied()
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        if let NodeKind::Text(t) = &mut self.nodes[node.0].kind {
            *t = text.to_string();
        }
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    fn create_marker(&mut self, text: &str, style: &MarkerStyle) -> NodeId {
        let css = style.css();
        let span = self.create_element("span", &[("class", MARKER_CLASS), ("style", &css)]);
        let inner = self.create_text(text);
        self.append_child(span, inner);
        span
    }

    fn replace_with(&mut self, node: NodeId, replacement: &[NodeId]) {
        let Some(parent) = self.data(node).parent else {
            return;
        };
        for r in replacement {
            self.detach(*r);
        }
        let Some(idx) = self.data(parent).children.iter().position(|c| *c == node) else {
            return;
        };
        for r in replacement {
            self.nodes[r.0].parent = Some(parent);
        }
        self.nodes[parent.0]
            .children
            .splice(idx..idx + 1, replacement.iter().copied());
        self.nodes[node.0].parent = None;
    }

    fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    fn scroll_into_view(&mut self, node: NodeId, options: ScrollOptions) {
        self.scroll = Some((node, options));
    }
}
