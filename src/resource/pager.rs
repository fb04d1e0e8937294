//! Pager
//!
//! Walks `nextPageToken` across list calls as a lazy stream of items. The
//! stream is finite and not restartable; build a new one to list again.

use crate::error::Result;
use crate::gcp::client::GcpClient;
use crate::invocation::Interrupt;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

/// Server-side page size ceiling, also the default
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Pages buffered ahead of the consumer
const PREFETCH_PAGES: usize = 1;

/// A list call to walk
#[derive(Debug, Clone)]
pub struct ListRequest {
    /// Collection URL without query string
    pub url: String,
    /// Extra query parameters (`filter`, `orderBy`, ...)
    pub query: Vec<(String, String)>,
    /// Response field holding the items
    pub items_field: String,
    /// Query parameter carrying the page size (`maxResults` for compute)
    pub page_size_param: String,
    pub page_size: Option<u32>,
    /// Stop after this many items
    pub limit: Option<usize>,
    /// `items` is a map of scope -> `{<items_field>: [...]}`
    pub aggregated: bool,
}

impl ListRequest {
    pub fn new(url: &str, items_field: &str) -> Self {
        Self {
            url: url.to_string(),
            query: Vec::new(),
            items_field: items_field.to_string(),
            page_size_param: "pageSize".to_string(),
            page_size: None,
            limit: None,
            aggregated: false,
        }
    }

    /// Page size actually requested: the smaller of the ask, the limit and the ceiling
    pub fn effective_page_size(&self) -> u32 {
        let mut size = self.page_size.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE);
        if let Some(limit) = self.limit {
            size = size.min(u32::try_from(limit.max(1)).unwrap_or(MAX_PAGE_SIZE));
        }
        size.max(1)
    }

    fn page_url(&self, token: Option<&str>) -> String {
        let mut params: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        params.push(format!(
            "{}={}",
            self.page_size_param,
            self.effective_page_size()
        ));
        if let Some(token) = token {
            params.push(format!("pageToken={}", urlencoding::encode(token)));
        }
        format!("{}?{}", self.url, params.join("&"))
    }
}

struct PageState {
    client: GcpClient,
    request: ListRequest,
    token: Option<String>,
    yielded: usize,
    done: bool,
    interrupt: Interrupt,
}

/// Stream of pages; each page is already trimmed to the limit
pub fn pages(
    client: &GcpClient,
    request: ListRequest,
    interrupt: &Interrupt,
) -> BoxStream<'static, Result<Vec<Value>>> {
    let state = PageState {
        client: client.clone(),
        request,
        token: None,
        yielded: 0,
        done: false,
        interrupt: interrupt.clone(),
    };

    stream::try_unfold(state, |mut state| async move {
        if state.done || state.interrupt.is_triggered() {
            if state.interrupt.is_triggered() {
                tracing::info!("Listing interrupted after {} items", state.yielded);
            }
            return Ok(None);
        }

        let url = state.request.page_url(state.token.as_deref());
        let response = state.client.get(&url).await?;

        let mut items = if state.request.aggregated {
            flatten_aggregated(&response, &state.request.items_field)
                .into_iter()
                .map(|(_, item)| item)
                .collect()
        } else {
            extract_items(&response, &state.request.items_field)
        };

        if let Some(limit) = state.request.limit {
            items.truncate(limit.saturating_sub(state.yielded));
        }
        state.yielded += items.len();

        let next = response
            .get("nextPageToken")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let limit_reached = state.request.limit.is_some_and(|l| state.yielded >= l);
        state.done = next.is_none() || limit_reached;
        state.token = next;

        tracing::debug!("Fetched page of {} items ({} total)", items.len(), state.yielded);
        Ok(Some((items, state)))
    })
    .boxed()
}

/// Lazy stream of items across pages
pub fn items(
    client: &GcpClient,
    request: ListRequest,
    interrupt: &Interrupt,
) -> BoxStream<'static, Result<Value>> {
    pages(client, request, interrupt)
        .flat_map(|page| match page {
            Ok(items) => stream::iter(items.into_iter().map(Ok).collect::<Vec<_>>()),
            Err(e) => stream::iter(vec![Err(e)]),
        })
        .boxed()
}

/// Items stream that fetches the next page while the consumer handles the current one
pub fn prefetched_items(
    client: &GcpClient,
    request: ListRequest,
    interrupt: &Interrupt,
) -> BoxStream<'static, Result<Value>> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Vec<Value>>>(PREFETCH_PAGES);
    let mut source = pages(client, request, interrupt);
    tokio::spawn(async move {
        while let Some(page) = source.next().await {
            let failed = page.is_err();
            if tx.send(page).await.is_err() || failed {
                break;
            }
        }
    });

    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|page| (page, rx)) })
        .flat_map(|page| match page {
            Ok(items) => stream::iter(items.into_iter().map(Ok).collect::<Vec<_>>()),
            Err(e) => stream::iter(vec![Err(e)]),
        })
        .boxed()
}

/// Drain a list into memory
pub async fn collect(
    client: &GcpClient,
    request: ListRequest,
    interrupt: &Interrupt,
) -> Result<Vec<Value>> {
    let mut stream = items(client, request, interrupt);
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        out.push(item?);
    }
    Ok(out)
}

/// Items from a plain list response
pub fn extract_items(response: &Value, field: &str) -> Vec<Value> {
    response
        .get(field)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Flatten an aggregated list response into (scope key, item) pairs
///
/// Scope entries carrying only a `warning` (no resources in that scope) are skipped.
pub fn flatten_aggregated(response: &Value, field: &str) -> Vec<(String, Value)> {
    let Some(scopes) = response.get("items").and_then(|v| v.as_object()) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (scope_key, scope_data) in scopes {
        let Some(items) = scope_data.get(field).and_then(|v| v.as_array()) else {
            continue;
        };
        out.extend(items.iter().map(|item| (scope_key.clone(), item.clone())));
    }
    out
}
