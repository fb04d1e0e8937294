//! Batch requests
//!
//! Packs several calls into one `multipart/mixed` HTTP request and splits the
//! multipart response back into per-request results, in request order.

use super::client::GcpClient;
use super::http::{HttpRequest, Method};
use crate::error::{CliError, HttpError, Result};
use serde_json::Value;

/// Largest number of calls sent in one batch request
pub const MAX_BATCH_SIZE: usize = 1000;

/// One call inside a batch
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

impl BatchRequest {
    pub fn new(method: Method, url: &str, body: Option<Value>) -> Self {
        Self {
            method,
            url: url.to_string(),
            body,
        }
    }
}

pub type BatchResult = std::result::Result<Value, HttpError>;

/// Send `requests` to `batch_url`, chunked; one result per request in order
pub async fn execute_batch(
    client: &GcpClient,
    batch_url: &str,
    requests: &[BatchRequest],
) -> Result<Vec<BatchResult>> {
    let mut results = Vec::with_capacity(requests.len());
    for chunk in requests.chunks(MAX_BATCH_SIZE) {
        let boundary = format!("batch_{}", uuid::Uuid::new_v4().simple());
        let body = compose(&boundary, chunk)?;
        let request = HttpRequest::new(Method::Post, batch_url)
            .header(
                "Content-Type",
                &format!("multipart/mixed; boundary={boundary}"),
            )
            .body(body);

        tracing::debug!("Sending batch of {} requests to {}", chunk.len(), batch_url);
        let response = client.execute(request).await?;
        if !response.is_success() {
            return Err(CliError::from_http(HttpError::from_response(
                response.status,
                batch_url,
                &response.body,
            )));
        }

        let content_type = response.header_value("Content-Type").unwrap_or_default();
        let response_boundary = boundary_of(content_type).ok_or_else(|| {
            CliError::Serialization(format!(
                "Batch response has no multipart boundary: [{content_type}]"
            ))
        })?;
        results.extend(parse(&response_boundary, &response.body, chunk));
    }
    Ok(results)
}

/// Serialize `requests` as a multipart/mixed body
pub fn compose(boundary: &str, requests: &[BatchRequest]) -> Result<String> {
    let mut out = String::new();
    for (i, request) in requests.iter().enumerate() {
        out.push_str(&format!("--{boundary}\r\n"));
        out.push_str("Content-Type: application/http\r\n");
        out.push_str("Content-Transfer-Encoding: binary\r\n");
        out.push_str(&format!("Content-ID: <{boundary}+{i}>\r\n\r\n"));
        out.push_str(&format!(
            "{} {} HTTP/1.1\r\n",
            request.method.as_str(),
            path_and_query(&request.url)
        ));
        match &request.body {
            Some(body) => {
                let json = serde_json::to_string(body)?;
                out.push_str("Content-Type: application/json\r\n");
                out.push_str(&format!("Content-Length: {}\r\n\r\n", json.len()));
                out.push_str(&json);
                out.push_str("\r\n");
            }
            None => out.push_str("\r\n"),
        }
    }
    out.push_str(&format!("--{boundary}--\r\n"));
    Ok(out)
}

fn path_and_query(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        },
        Err(_) => url.to_string(),
    }
}

/// Extract `boundary=` from a multipart Content-Type
pub fn boundary_of(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.eq_ignore_ascii_case("boundary")
            .then(|| value.trim_matches('"').to_string())
    })
}

/// Split a multipart response into results ordered like `requests`
pub fn parse(boundary: &str, body: &str, requests: &[BatchRequest]) -> Vec<BatchResult> {
    let normalized = body.replace("\r\n", "\n");
    let delimiter = format!("--{boundary}");
    let mut slots: Vec<Option<BatchResult>> = vec![None; requests.len()];
    let mut next_unlabelled = 0;

    for part in normalized.split(&delimiter).skip(1) {
        if part.starts_with("--") {
            break;
        }
        let Some((part_headers, http)) = part.trim_start_matches('\n').split_once("\n\n") else {
            continue;
        };
        let index = content_id_index(part_headers).unwrap_or(next_unlabelled);
        next_unlabelled = index + 1;
        if index >= slots.len() {
            tracing::warn!("Batch response part {} has no matching request", index);
            continue;
        }
        slots[index] = Some(parse_part(http, &requests[index].url));
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.unwrap_or_else(|| {
                Err(HttpError::from_response(
                    500,
                    &requests[i].url,
                    "No response for this request in the batch reply",
                ))
            })
        })
        .collect()
}

fn content_id_index(headers: &str) -> Option<usize> {
    headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("content-id") {
            return None;
        }
        let value = value.trim().trim_start_matches('<').trim_end_matches('>');
        value.rsplit_once('+')?.1.parse().ok()
    })
}

fn parse_part(http: &str, url: &str) -> BatchResult {
    let (head, body) = http.split_once("\n\n").unwrap_or((http, ""));
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .unwrap_or(500);
    let body = body.trim_end_matches('\n');

    if !(200..300).contains(&status) {
        return Err(HttpError::from_response(status, url, body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| HttpError {
        status,
        url: url.to_string(),
        message: format!("Malformed batch part: {e}"),
        status_name: None,
        reason: None,
        body: crate::error::truncate(body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requests(n: usize) -> Vec<BatchRequest> {
        (0..n)
            .map(|i| {
                BatchRequest::new(
                    Method::Get,
                    &format!("https://compute.googleapis.com/compute/v1/projects/p/zones/z/instances/vm-{i}"),
                    None,
                )
            })
            .collect()
    }

    #[test]
    fn test_compose_uses_paths_and_content_ids() {
        let reqs = vec![BatchRequest::new(
            Method::Post,
            "https://compute.googleapis.com/compute/v1/projects/p/zones/z/instances/a/setLabels?alt=json",
            Some(json!({"labels": {"k": "v"}})),
        )];
        let body = compose("b1", &reqs).unwrap();
        assert!(body.contains("Content-ID: <b1+0>"));
        assert!(body.contains("POST /compute/v1/projects/p/zones/z/instances/a/setLabels?alt=json HTTP/1.1"));
        assert!(body.contains(r#"{"labels":{"k":"v"}}"#));
        assert!(body.ends_with("--b1--\r\n"));
    }

    #[test]
    fn test_parse_orders_by_content_id() {
        let body = "--resp\r\n\
            Content-Type: application/http\r\n\
            Content-ID: <response-b1+1>\r\n\r\n\
            HTTP/1.1 404 Not Found\r\n\
            Content-Type: application/json\r\n\r\n\
            {\"error\":{\"code\":404,\"message\":\"gone\"}}\r\n\
            --resp\r\n\
            Content-Type: application/http\r\n\
            Content-ID: <response-b1+0>\r\n\r\n\
            HTTP/1.1 200 OK\r\n\
            Content-Type: application/json\r\n\r\n\
            {\"name\":\"vm-0\"}\r\n\
            --resp--\r\n";
        let results = parse("resp", body, &requests(3));
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap()["name"], "vm-0");
        assert_eq!(results[1].as_ref().unwrap_err().message, "gone");
        assert_eq!(results[2].as_ref().unwrap_err().status, 500);
    }

    #[test]
    fn test_boundary_of() {
        assert_eq!(
            boundary_of("multipart/mixed; boundary=\"batch_abc\"").as_deref(),
            Some("batch_abc")
        );
        assert_eq!(boundary_of("application/json"), None);
    }
}
