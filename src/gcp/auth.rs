//! GCP Authentication
//!
//! Token sources consumed by the transport. Credential acquisition itself
//! is delegated: [`GcpCredentials`] wraps Application Default Credentials
//! through `gcp_auth`, [`StaticToken`] serves fixed tokens for replay and tests.

use crate::error::{CliError, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use gcp_auth::TokenProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Whether the active credential belongs to a person or a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    User,
    ServiceAccount,
}

/// An access token and its expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

/// Source of bearer tokens for API calls
pub trait TokenSource: Send + Sync {
    /// Return a valid token, from cache when possible
    fn access_token(&self) -> BoxFuture<'_, Result<AccessToken>>;

    /// Drop any cached token and fetch a fresh one
    fn refresh(&self) -> BoxFuture<'_, Result<AccessToken>>;

    fn kind(&self) -> CredentialKind;
}

/// GCP credentials holder with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
    kind: CredentialKind,
}

#[derive(Clone)]
struct CachedToken {
    token: AccessToken,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    /// Create new GCP credentials using Application Default Credentials
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.map_err(|e| {
            CliError::Auth(format!(
                "{e}. Run 'gcloud auth application-default login'"
            ))
        })?;

        Ok(Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
            kind: detect_credential_kind(),
        })
    }

    async fn fetch(&self) -> Result<AccessToken> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self
            .provider
            .token(DEFAULT_SCOPES)
            .await
            .map_err(|e| CliError::Auth(e.to_string()))?;

        let ttl = DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;
        let access = AccessToken {
            token: token.as_str().to_string(),
            expiry: Utc::now()
                + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(29)),
        };

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: access.clone(),
                expires_at: Instant::now() + ttl,
            });
        }

        tracing::debug!("New token cached, expires in ~{} minutes", ttl.as_secs() / 60);

        Ok(access)
    }
}

impl TokenSource for GcpCredentials {
    fn access_token(&self) -> BoxFuture<'_, Result<AccessToken>> {
        Box::pin(self.fetch())
    }

    fn refresh(&self) -> BoxFuture<'_, Result<AccessToken>> {
        Box::pin(async move {
            {
                let mut cache = self.token_cache.write().await;
                *cache = None;
            }
            self.fetch().await
        })
    }

    fn kind(&self) -> CredentialKind {
        self.kind
    }
}

/// A fixed token, used by the scenario runner and tests
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: String,
    kind: CredentialKind,
}

impl StaticToken {
    pub fn new(token: &str, kind: CredentialKind) -> Self {
        Self {
            token: token.to_string(),
            kind,
        }
    }

    fn current(&self) -> AccessToken {
        AccessToken {
            token: self.token.clone(),
            expiry: Utc::now() + chrono::Duration::hours(1),
        }
    }
}

impl TokenSource for StaticToken {
    fn access_token(&self) -> BoxFuture<'_, Result<AccessToken>> {
        Box::pin(async move { Ok(self.current()) })
    }

    fn refresh(&self) -> BoxFuture<'_, Result<AccessToken>> {
        Box::pin(async move { Ok(self.current()) })
    }

    fn kind(&self) -> CredentialKind {
        self.kind
    }
}

/// Service-account key files and workload identities never get a quota header
fn detect_credential_kind() -> CredentialKind {
    let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") else {
        return CredentialKind::User;
    };
    let Ok(content) = std::fs::read_to_string(&path) else {
        return CredentialKind::User;
    };
    let kind = serde_json::from_str::<serde_json::Value>(&content)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string));
    match kind.as_deref() {
        Some("service_account") | Some("external_account") => CredentialKind::ServiceAccount,
        _ => CredentialKind::User,
    }
}

/// Get the gcloud configuration directory
pub fn get_gcloud_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Validate a GCP project ID format
///
/// Alphanumeric IDs are 6-30 characters of lowercase letters, digits and
/// hyphens, starting with a letter and not ending with a hyphen. Numeric
/// project numbers are accepted as well.
pub fn validate_project_id(project: &str) -> bool {
    if !project.is_empty() && project.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    if project.len() < 6 || project.len() > 30 {
        return false;
    }

    let mut chars = project.chars();

    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }

    if project.ends_with('-') {
        return false;
    }

    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Read `key` from `[section]` of an INI-style gcloud file
fn read_ini_value(content: &str, section: &str, key: &str) -> Option<String> {
    let header = format!("[{section}]");
    let mut in_section = false;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_section = line == header;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim() == key {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

/// Read a property from the active gcloud configuration, then the legacy properties file
pub fn read_gcloud_property(section: &str, key: &str) -> Option<String> {
    let config_dir = get_gcloud_config_dir()?;

    let active_config_path = config_dir.join("active_config");
    if let Ok(active_config) = std::fs::read_to_string(&active_config_path) {
        let config_name = active_config.trim();

        // Path traversal guard
        if !config_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            tracing::warn!("Invalid characters in active_config name");
            return None;
        }

        let config_path = config_dir
            .join("configurations")
            .join(format!("config_{}", config_name));

        if let Ok(content) = std::fs::read_to_string(&config_path) {
            if let Some(value) = read_ini_value(&content, section, key) {
                return Some(value);
            }
        }
    }

    let properties_path = config_dir.join("properties");
    let content = std::fs::read_to_string(properties_path).ok()?;
    read_ini_value(&content, section, key)
}

/// Read the default project from gcloud configuration
pub fn get_default_project() -> Option<String> {
    let project = read_gcloud_property("core", "project")?;
    if validate_project_id(&project) {
        Some(project)
    } else {
        tracing::warn!("Invalid project ID format in gcloud configuration");
        None
    }
}

/// Get the default zone from gcloud configuration
pub fn get_default_zone() -> Option<String> {
    read_gcloud_property("compute", "zone")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_project_id() {
        assert!(validate_project_id("my-project"));
        assert!(validate_project_id("12345"));
        assert!(!validate_project_id("My-Project"));
        assert!(!validate_project_id("proj-"));
        assert!(!validate_project_id("abc"));
    }

    #[test]
    fn test_read_ini_value_scopes_to_section() {
        let content = "[core]\nproject = p1\n# comment\n[compute]\nzone = us-central1-a\nregion=us-central1\n";
        assert_eq!(read_ini_value(content, "core", "project").as_deref(), Some("p1"));
        assert_eq!(
            read_ini_value(content, "compute", "region").as_deref(),
            Some("us-central1")
        );
        assert_eq!(read_ini_value(content, "core", "zone"), None);
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticToken::new("abc", CredentialKind::ServiceAccount);
        let token = source.access_token().await.unwrap();
        assert_eq!(token.token, "abc");
        assert_eq!(source.kind(), CredentialKind::ServiceAccount);
        assert!(token.expiry > Utc::now());
    }
}
