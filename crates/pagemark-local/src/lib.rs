use pagemark_core::{
    CaptureBackend, CapturePayload, DocumentTree, Error, PageOpener, Result, SearchBackend,
    SearchHit, SearchRequest, SearchResponse,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod config;
pub mod dispatch;
pub mod dom;
pub mod exclusion;
pub mod extract;
pub mod highlight;
pub mod pattern;
pub mod textprep;

use dispatch::Delivery;
use exclusion::ExclusionList;

/// HTTP client for the capture/search backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base: url::Url,
}

impl BackendClient {
    pub fn new(mut base: url::Url, timeout: Duration) -> Result<Self> {
        // `Url::join` replaces the last path segment unless the base ends with '/'.
        if !base.path().ends_with('/') {
            let p = format!("{}/", base.path());
            base.set_path(&p);
        }
        let client = reqwest::Client::builder()
            .user_agent("pagemark-local/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn from_config(cfg: &config::Config) -> Result<Self> {
        Self::new(cfg.backend_url.clone(), cfg.timeout)
    }

    pub fn base_url(&self) -> &url::Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<url::Url> {
        self.base
            .join(path)
            .map_err(|e| Error::InvalidUrl(e.to_string()))
    }
}

#[async_trait::async_trait]
impl CaptureBackend for BackendClient {
    async fn capture(&self, payload: &CapturePayload) -> Result<()> {
        let url = self.endpoint("process_page")?;
        let resp = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Capture(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Capture(format!(
                "{}: {}",
                status.as_u16(),
                body.trim()
            )));
        }
        Ok(())
    }
}

/// Search body as sent by the backend: either `{error}` or a result listing.
#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    total_results: Option<usize>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[async_trait::async_trait]
impl SearchBackend for BackendClient {
    async fn search(&self, req: &SearchRequest) -> Result<SearchResponse> {
        if req.query.trim().is_empty() {
            return Err(Error::Search("empty query".to_string()));
        }
        let url = self.endpoint("search")?;
        let resp = self
            .client
            .post(url)
            .json(req)
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let raw: RawSearchResponse = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) if status.is_success() => {
                return Err(Error::Search(format!("malformed response: {e}")))
            }
            Err(_) => {
                return Err(Error::Search(format!(
                    "{}: {}",
                    status.as_u16(),
                    body.trim()
                )))
            }
        };
        if let Some(err) = raw.error {
            return Err(Error::Search(err));
        }
        if !status.is_success() {
            return Err(Error::Search(format!("http status {}", status.as_u16())));
        }
        Ok(SearchResponse {
            query: raw.query.unwrap_or_else(|| req.query.clone()),
            total_results: raw.total_results.unwrap_or(raw.results.len()),
            results: raw.results,
        })
    }
}

/// What happened to one page-capture attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaptureOutcome {
    /// URL matched an exclusion pattern; nothing was extracted or sent.
    Skipped { pattern: String },
    Sent,
    /// Failure was logged and swallowed.
    Failed { error: String },
}

/// Page-load capture: exclusion check, extraction, then one send. Never errors.
pub async fn capture_page<B, D>(
    backend: &B,
    exclusions: &ExclusionList,
    url: &str,
    doc: &D,
) -> CaptureOutcome
where
    B: CaptureBackend + ?Sized,
    D: DocumentTree,
{
    if let Some(pattern) = exclusions.matching(url) {
        tracing::debug!(url, pattern, "capture skipped for excluded page");
        return CaptureOutcome::Skipped {
            pattern: pattern.to_string(),
        };
    }
    let payload = extract::capture_payload(url, doc);
    match backend.capture(&payload).await {
        Ok(()) => CaptureOutcome::Sent,
        Err(e) => {
            tracing::warn!(url, error = %e, "error processing page");
            CaptureOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

/// The top search hit and the page it was highlighted in.
#[derive(Debug)]
pub struct Found<P> {
    pub hit: SearchHit,
    pub page: P,
}

/// Search for `query` (top hit only), open the hit's URL, and ask the page to
/// highlight the query.
///
/// Delivery retries once after `retry_delay` when the page's handler is not up yet.
/// `Ok(None)` means the backend returned no usable hit.
pub async fn search_and_highlight<B, O>(
    backend: &B,
    opener: &O,
    query: &str,
    color: Option<String>,
    retry_delay: Duration,
) -> Result<Option<Found<O::Page>>>
where
    B: SearchBackend + ?Sized,
    O: PageOpener + ?Sized,
{
    let req = SearchRequest {
        query: query.to_string(),
        k: 1,
    };
    let resp = backend.search(&req).await?;
    let Some(hit) = resp.top().filter(|h| !h.url.trim().is_empty()).cloned() else {
        tracing::debug!(query, "no results found");
        return Ok(None);
    };

    let page = opener.open(&hit.url).await?;
    let mut delivery = Delivery::new(retry_delay);
    delivery.on_load_complete();
    let ack = delivery
        .deliver(&page, &dispatch::highlight_message(query, color))
        .await?;
    if !ack.success {
        return Err(Error::Message(format!(
            "page {} rejected the highlight request",
            hit.url
        )));
    }
    Ok(Some(Found { hit, page }))
}
