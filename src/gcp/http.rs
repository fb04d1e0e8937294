//! HTTP transport for GCP REST API calls
//!
//! [`Transport`] is the seam between the request pipeline and the wire:
//! [`ReqwestTransport`] talks to real endpoints, the scenario runner swaps in
//! a replaying implementation.

use crate::error::{CliError, Result};
use futures::future::BoxFuture;
use reqwest::Client;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PATCH" => Some(Method::Patch),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A fully composed request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends composed requests; returns transport-level failures as errors and
/// every HTTP status as a response
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a new HTTP client with a per-call deadline
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CliError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        tracing::debug!("{} {}", request.method.as_str(), request.url);

        let mut builder = self
            .client
            .request(request.method.to_reqwest(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.classify(&request.url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| self.classify(&request.url, e))?;

        if !(200..300).contains(&status) {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn classify(&self, url: &str, error: reqwest::Error) -> CliError {
        if error.is_timeout() {
            CliError::RequestTimeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }
        } else {
            CliError::Network(format!("{url}: {error}"))
        }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(self.execute(request))
    }
}

/// Render a request the way `--log-http` prints it
pub fn format_request_log(request: &HttpRequest) -> String {
    let mut out = String::new();
    out.push_str("=======================\n");
    out.push_str("==== request start ====\n");
    out.push_str(&format!("uri: {}\n", request.url));
    out.push_str(&format!("method: {}\n", request.method.as_str()));
    out.push_str("== headers start ==\n");
    let mut headers = request.headers.clone();
    headers.sort();
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("authorization") {
            out.push_str(&format!("{name}: --- Token Redacted ---\n"));
        } else {
            out.push_str(&format!("{name}: {value}\n"));
        }
    }
    out.push_str("== headers end ==\n");
    out.push_str("== body start ==\n");
    out.push_str(request.body.as_deref().unwrap_or(""));
    out.push_str("\n== body end ==\n");
    out.push_str("==== request end ====\n");
    out
}

/// Render a response the way `--log-http` prints it
pub fn format_response_log(response: &HttpResponse, elapsed: Duration) -> String {
    let mut out = String::new();
    out.push_str("---- response start ----\n");
    out.push_str(&format!("status: {}\n", response.status));
    out.push_str("-- headers start --\n");
    for (name, value) in &response.headers {
        out.push_str(&format!("{name}: {value}\n"));
    }
    out.push_str("-- headers end --\n");
    out.push_str("-- body start --\n");
    out.push_str(&response.body);
    out.push_str("\n-- body end --\n");
    out.push_str(&format!(
        "total round trip time (request+response): {:.3} secs\n",
        elapsed.as_secs_f64()
    ));
    out.push_str("---- response end ----\n");
    out.push_str("----------------------\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates() {
        let long = "a".repeat(300);
        let s = sanitize_for_log(&long);
        assert!(s.starts_with(&"a".repeat(200)));
        assert!(s.ends_with("[truncated, 300 bytes total]"));
    }

    #[test]
    fn test_request_log_redacts_token() {
        let request = HttpRequest::new(Method::Get, "https://example.com/x")
            .header("Authorization", "Bearer secret")
            .header("User-Agent", "cloudctl/dev");
        let log = format_request_log(&request);
        assert!(log.contains("Authorization: --- Token Redacted ---"));
        assert!(!log.contains("secret"));
        assert!(log.contains("method: GET"));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("patch"), Some(Method::Patch));
        assert_eq!(Method::parse("TRACE"), None);
    }
}
