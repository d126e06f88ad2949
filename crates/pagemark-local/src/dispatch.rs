//! Message handling inside a page, and delivery of messages into one.
//!
//! The page side answers `{"type": "highlight", ...}` with an [`Ack`]. The sender side
//! tracks whether the target page finished loading ([`Delivery`]) and resends once after
//! a fixed delay when the first send fails.

use crate::dom::Document;
use crate::highlight::{highlight_with, HighlightOptions, HighlightReport};
use crate::pattern::PatternMode;
use pagemark_core::{Ack, ContentMessage, DocumentTree, Error, MessageSink, PageOpener, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);

pub fn highlight_message(text: impl Into<String>, color: Option<String>) -> ContentMessage {
    ContentMessage::Highlight {
        text: text.into(),
        color,
    }
}

/// Outcome of applying one message: the reply plus what the highlighter did.
#[derive(Debug, Clone, Serialize)]
pub struct Handled {
    pub ack: Ack,
    pub report: Option<HighlightReport>,
}

/// Apply a message to `doc` and acknowledge it.
///
/// A message without a color uses `default_color`, then yellow.
pub fn handle_message<D: DocumentTree>(
    doc: &mut D,
    msg: &ContentMessage,
    default_color: Option<&str>,
) -> Handled {
    match msg {
        ContentMessage::Highlight { text, color } => {
            let opts = HighlightOptions {
                color: color
                    .clone()
                    .or_else(|| default_color.map(str::to_string)),
                mode: PatternMode::Literal,
            };
            let report = highlight_with(doc, text, &opts);
            tracing::debug!(
                markers = report.markers,
                warnings = ?report.warnings,
                "handled highlight message"
            );
            Handled {
                ack: Ack::ok(),
                report: Some(report),
            }
        }
    }
}

/// Parse a raw JSON message and apply it. Unparseable messages are logged and nacked.
pub fn handle_json<D: DocumentTree>(
    doc: &mut D,
    raw: &str,
    default_color: Option<&str>,
) -> Handled {
    match serde_json::from_str::<ContentMessage>(raw) {
        Ok(msg) => handle_message(doc, &msg, default_color),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unrecognized message");
            Handled {
                ack: Ack::failed(),
                report: None,
            }
        }
    }
}

/// A page context hosting a [`Document`]. Messages are refused until [`LocalPage::activate`].
///
/// The document is compacted after every message, so repeated highlight/clear
/// cycles do not grow it.
#[derive(Debug)]
pub struct LocalPage {
    doc: Mutex<Document>,
    last_report: Mutex<Option<HighlightReport>>,
    active: AtomicBool,
}

impl LocalPage {
    pub fn new(doc: Document) -> Self {
        Self {
            doc: Mutex::new(doc),
            last_report: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn with_document<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        let doc = self.doc.lock().unwrap_or_else(|e| e.into_inner());
        f(&doc)
    }

    /// Report of the most recent highlight applied to this page.
    pub fn last_report(&self) -> Option<HighlightReport> {
        self.last_report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl MessageSink for LocalPage {
    async fn send(&self, msg: &ContentMessage) -> Result<Ack> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(Error::NotReady("no message handler in page yet".to_string()));
        }
        let handled = {
            let mut doc = self.doc.lock().unwrap_or_else(|e| e.into_inner());
            let handled = handle_message(&mut *doc, msg, None);
            doc.compact();
            handled
        };
        if handled.report.is_some() {
            *self.last_report.lock().unwrap_or_else(|e| e.into_inner()) = handled.report;
        }
        Ok(handled.ack)
    }
}

/// Opens every URL as the same saved HTML, with its message handler installed.
#[derive(Debug, Clone)]
pub struct SavedPageOpener {
    html: String,
}

impl SavedPageOpener {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

#[async_trait::async_trait]
impl PageOpener for SavedPageOpener {
    type Page = LocalPage;

    async fn open(&self, url: &str) -> Result<LocalPage> {
        tracing::debug!(url, bytes = self.html.len(), "opening saved page");
        let page = LocalPage::new(Document::parse(&self.html));
        page.activate();
        Ok(page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Pending,
    Loaded,
}

/// Sender-side delivery into one page.
#[derive(Debug, Clone)]
pub struct Delivery {
    state: PageState,
    retry_delay: Duration,
}

impl Default for Delivery {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl Delivery {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            state: PageState::Pending,
            retry_delay,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn on_load_complete(&mut self) {
        self.state = PageState::Loaded;
    }

    /// Send `msg`; on failure wait `retry_delay` and send exactly once more.
    pub async fn deliver<S>(&self, sink: &S, msg: &ContentMessage) -> Result<Ack>
    where
        S: MessageSink + ?Sized,
    {
        if self.state == PageState::Pending {
            return Err(Error::NotReady("page has not finished loading".to_string()));
        }
        match sink.send(msg).await {
            Ok(ack) => Ok(ack),
            Err(first) => {
                tracing::warn!(error = %first, delay_ms = self.retry_delay.as_millis() as u64, "message delivery failed; retrying once");
                tokio::time::sleep(self.retry_delay).await;
                sink.send(msg)
                    .await
                    .map_err(|e| Error::Delivery(format!("{e} (first attempt: {first})")))
            }
        }
    }
}
