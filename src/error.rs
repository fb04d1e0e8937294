//! Error taxonomy
//!
//! Every failure a command can surface is one of the [`CliError`] variants.
//! The variant decides the process exit code and how the top-level entry
//! point renders the single-line message on stderr.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Maximum length of an HTTP error body kept for display and logging
const MAX_BODY_LENGTH: usize = 200;

/// Exit code for a successful run
pub const EXIT_OK: i32 = 0;
/// Exit code for generic failures
pub const EXIT_ERROR: i32 = 1;
/// Exit code for invalid usage reported by the argument parser
pub const EXIT_USAGE: i32 = 2;
/// Exit code when the user cancelled (prompt declined or interrupt)
pub const EXIT_CANCELLED: i32 = 3;
/// Exit code when waiting on an operation exceeded its budget
pub const EXIT_OPERATION_TIMEOUT: i32 = 4;
/// Exit code for transport-level failures and per-call deadlines
pub const EXIT_NETWORK: i32 = 5;

pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// A non-2xx response from a REST endpoint, with the parsed error payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: u16,
    pub url: String,
    /// `error.message` from the body, or the status text
    pub message: String,
    /// `error.status`, e.g. `PERMISSION_DENIED`
    pub status_name: Option<String>,
    /// First `error.errors[].reason` or `error.details[].reason`
    pub reason: Option<String>,
    pub body: String,
}

impl HttpError {
    /// Build from a raw response, parsing the standard `{"error": {...}}` envelope
    pub fn from_response(status: u16, url: &str, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let error = parsed.as_ref().and_then(|v| v.get("error"));

        let message = error
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| default_status_text(status).to_string());

        let status_name = error
            .and_then(|e| e.get("status"))
            .and_then(|s| s.as_str())
            .map(str::to_string);

        let reason = error
            .and_then(|e| e.get("errors"))
            .and_then(|errs| errs.as_array())
            .and_then(|errs| errs.iter().find_map(|e| e.get("reason")))
            .or_else(|| {
                error
                    .and_then(|e| e.get("details"))
                    .and_then(|d| d.as_array())
                    .and_then(|d| d.iter().find_map(|e| e.get("reason")))
            })
            .and_then(|r| r.as_str())
            .map(str::to_string);

        Self {
            status,
            url: url.to_string(),
            message,
            status_name,
            reason,
            body: truncate(body),
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status == 409 || self.status == 412
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status_name {
            Some(name) => write!(f, "HTTPError {}: {} ({})", self.status, self.message, name),
            None => write!(f, "HTTPError {}: {}", self.status, self.message),
        }
    }
}

fn default_status_text(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        412 => "Precondition Failed",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Request failed",
    }
}

/// Truncate long bodies and drop control characters
pub fn truncate(body: &str) -> String {
    let cleaned: String = body
        .chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect();
    if cleaned.chars().count() > MAX_BODY_LENGTH {
        let head: String = cleaned.chars().take(MAX_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        cleaned
    }
}

/// All errors a command invocation can produce
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("{message}")]
    RequiredArgument { arg: String, message: String },

    #[error("{message}")]
    ResourceNotFound { resource: String, message: String },

    #[error("{0}")]
    PermissionDenied(HttpError),

    #[error("Service [{service}] is not enabled for project [{project}]: {message}")]
    ServiceDisabled {
        service: String,
        project: String,
        message: String,
    },

    #[error("Operation [{operation}] did not complete within {waited_secs}s. Use `describe` on the operation to check its progress.")]
    OperationTimeout { operation: String, waited_secs: u64 },

    #[error("Operation [{operation}] failed: [{code}] {message}")]
    OperationError {
        operation: String,
        code: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request to [{url}] timed out after {secs}s")]
    RequestTimeout { url: String, secs: u64 },

    #[error("There was a problem obtaining credentials: {0}")]
    Auth(String),

    #[error("Invalid value at [{path}]: {message}")]
    Validation { path: String, message: String },

    #[error("{0}")]
    Http(HttpError),

    #[error("Could not parse resource [{0}]")]
    InvalidResource(String),

    #[error("API [{0}] is not registered")]
    UnknownApi(String),

    #[error("Collection [{0}] is not registered")]
    UnknownCollection(String),

    #[error("Resource [{name}] is ambiguous; it exists in: {}", .candidates.join(", "))]
    AmbiguousResource {
        name: String,
        candidates: Vec<String>,
    },

    #[error("Invalid value for [{arg}]: {reason}")]
    Bind { arg: String, reason: String },

    #[error("Invalid projection: {0}")]
    Projection(String),

    #[error("Invalid filter expression: {0}")]
    Filter(String),

    #[error("{0}")]
    Cancelled(String),

    #[error("{failed} of {total} requests failed:\n{}", .errors.join("\n"))]
    Bulk {
        failed: usize,
        total: usize,
        errors: Vec<String>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to parse response: {0}")]
    Serialization(String),

    #[error("{0}")]
    Internal(String),
}

impl CliError {
    /// Map a transport error into the kind section of the taxonomy it belongs to
    pub fn from_http(error: HttpError) -> Self {
        match error.status {
            404 => CliError::ResourceNotFound {
                resource: error.url.clone(),
                message: format!("The resource [{}] was not found: {}", error.url, error.message),
            },
            403 => CliError::PermissionDenied(error),
            401 => CliError::Auth(error.message),
            _ => CliError::Http(error),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        CliError::Usage(message.into())
    }

    pub fn required(arg: &str, message: impl Into<String>) -> Self {
        CliError::RequiredArgument {
            arg: arg.to_string(),
            message: message.into(),
        }
    }

    pub fn bind(arg: &str, reason: impl Into<String>) -> Self {
        CliError::Bind {
            arg: arg.to_string(),
            reason: reason.into(),
        }
    }

    /// The HTTP error underneath, if any
    pub fn http(&self) -> Option<&HttpError> {
        match self {
            CliError::PermissionDenied(e) | CliError::Http(e) => Some(e),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) | CliError::RequiredArgument { .. } => EXIT_USAGE,
            CliError::Cancelled(_) => EXIT_CANCELLED,
            CliError::OperationTimeout { .. } => EXIT_OPERATION_TIMEOUT,
            CliError::Network(_) | CliError::RequestTimeout { .. } => EXIT_NETWORK,
            _ => EXIT_ERROR,
        }
    }

    /// Extra guidance printed under the error line
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            CliError::Auth(_) => Some("Run 'gcloud auth login' to obtain new credentials."),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(e: serde_yaml::Error) -> Self {
        CliError::Serialization(e.to_string())
    }
}
