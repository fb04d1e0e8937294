//! Configuration Management
//!
//! Properties are layered: built-in defaults, gcloud configuration files,
//! `properties.json` in the cloudctl config directory, environment
//! variables, and finally framework flags applied by the command runner.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::gcp::auth;

/// Default per-call HTTP deadline
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Default overall budget when waiting on a long-running operation
pub const DEFAULT_POLL_MAX_WAIT_SECS: u64 = 30 * 60;

/// How the quota-project header is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuotaMode {
    /// Never send the header
    Legacy,
    /// Bill quota to the billing project, or the current project
    #[default]
    CurrentProject,
}

/// Backing store for the resource cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheImplementation {
    /// One JSON file per table
    #[default]
    File,
    /// All tables in one JSON document, `cache.db.json`
    ///
    /// Selected by the `sql` setting value, kept for compatibility with
    /// existing configurations; no SQL engine is involved.
    #[serde(alias = "sql")]
    SingleFile,
}

impl FromStr for CacheImplementation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "sql" | "single_file" => Ok(Self::SingleFile),
            other => Err(format!("unknown cache implementation [{other}]")),
        }
    }
}

/// Console and log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Debug,
    Info,
    #[default]
    Warning,
    Error,
    Critical,
    None,
}

impl Verbosity {
    pub const CHOICES: [&'static str; 6] =
        ["debug", "info", "warning", "error", "critical", "none"];

    pub fn to_tracing_level(self) -> Option<tracing::Level> {
        match self {
            Verbosity::Debug => Some(tracing::Level::DEBUG),
            Verbosity::Info => Some(tracing::Level::INFO),
            Verbosity::Warning => Some(tracing::Level::WARN),
            Verbosity::Error | Verbosity::Critical => Some(tracing::Level::ERROR),
            Verbosity::None => None,
        }
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "none" => Ok(Self::None),
            other => Err(format!("unknown verbosity [{other}]")),
        }
    }
}

/// Resolved properties for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Properties {
    pub project: Option<String>,
    pub account: Option<String>,
    pub zone: Option<String>,
    pub region: Option<String>,
    pub billing_project: Option<String>,
    pub quota_mode: QuotaMode,
    pub enable_resource_quota: bool,
    pub should_prompt_to_enable_api: bool,
    pub http_timeout_secs: u64,
    pub poll_max_wait_secs: u64,
    pub authority_selector: Option<String>,
    pub authorization_token_file: Option<PathBuf>,
    /// API name -> base URL (e.g. `compute` -> `http://localhost:8080/compute/v1/`)
    pub api_endpoint_overrides: BTreeMap<String, String>,
    pub cache_implementation: CacheImplementation,
    pub capture_session_file: Option<PathBuf>,
    pub disable_prompts: bool,
    pub quiet: bool,
    pub log_http: bool,
    pub verbosity: Verbosity,
    /// Ask the GCE metadata server for a default zone before prompting
    pub check_gce_metadata: bool,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            project: None,
            account: None,
            zone: None,
            region: None,
            billing_project: None,
            quota_mode: QuotaMode::default(),
            enable_resource_quota: true,
            should_prompt_to_enable_api: true,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            poll_max_wait_secs: DEFAULT_POLL_MAX_WAIT_SECS,
            authority_selector: None,
            authorization_token_file: None,
            api_endpoint_overrides: BTreeMap::new(),
            cache_implementation: CacheImplementation::default(),
            capture_session_file: None,
            disable_prompts: false,
            quiet: false,
            log_http: false,
            verbosity: Verbosity::default(),
            check_gce_metadata: true,
        }
    }
}

impl Properties {
    /// Get the properties file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudctl").join("properties.json"))
    }

    /// Load all layers except command-line flags
    pub fn load() -> Self {
        let mut props = Self::default();
        props.apply_gcloud_config();

        if let Some(path) = Self::config_path() {
            if path.exists() {
                match Self::read_file(&path) {
                    Ok(file_props) => props = file_props.merged_over(props),
                    Err(e) => tracing::warn!("Ignoring unreadable properties file: {:#}", e),
                }
            }
        }

        props.apply_env(|key| std::env::var(key).ok());
        props
    }

    fn read_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse properties JSON")
    }

    /// Save the persistent subset to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Layer `self` (a file layer) over `base`, keeping base values the file leaves unset
    fn merged_over(self, base: Self) -> Self {
        let mut overrides = base.api_endpoint_overrides.clone();
        overrides.extend(self.api_endpoint_overrides);
        Self {
            project: self.project.or(base.project),
            account: self.account.or(base.account),
            zone: self.zone.or(base.zone),
            region: self.region.or(base.region),
            billing_project: self.billing_project.or(base.billing_project),
            authority_selector: self.authority_selector.or(base.authority_selector),
            authorization_token_file: self
                .authorization_token_file
                .or(base.authorization_token_file),
            capture_session_file: self.capture_session_file.or(base.capture_session_file),
            api_endpoint_overrides: overrides,
            ..self
        }
    }

    fn apply_gcloud_config(&mut self) {
        self.project = auth::get_default_project();
        self.zone = auth::get_default_zone();
        self.region = auth::read_gcloud_property("compute", "region");
        self.account = auth::read_gcloud_property("core", "account");
        match auth::read_gcloud_property("billing", "quota_project").as_deref() {
            Some("LEGACY") => self.quota_mode = QuotaMode::Legacy,
            Some("CURRENT_PROJECT") | None => {}
            Some(project) => self.billing_project = Some(project.to_string()),
        }
    }

    /// Apply environment variables through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(project) = lookup("CLI_PROJECT").or_else(|| lookup("CLOUDSDK_CORE_PROJECT")) {
            if auth::validate_project_id(&project) {
                self.project = Some(project);
            } else {
                tracing::warn!("Invalid project ID format in environment");
            }
        }
        if let Some(zone) = lookup("CLI_COMPUTE_ZONE") {
            self.zone = Some(zone);
        }
        if let Some(region) = lookup("CLI_COMPUTE_REGION") {
            self.region = Some(region);
        }
        if let Some(cache) = lookup("CLI_CACHE_IMPLEMENTATION") {
            match cache.parse() {
                Ok(implementation) => self.cache_implementation = implementation,
                Err(e) => tracing::warn!("Ignoring CLI_CACHE_IMPLEMENTATION: {}", e),
            }
        }
        if let Some(path) = lookup("CLI_CAPTURE_SESSION_FILE") {
            self.capture_session_file = Some(PathBuf::from(path));
        }
        for api in ["compute", "cloudresourcemanager", "serviceusage", "storage"] {
            let key = format!("CLI_API_ENDPOINT_OVERRIDES_{}", api.to_uppercase());
            if let Some(url) = lookup(&key) {
                self.api_endpoint_overrides.insert(api.to_string(), url);
            }
        }
    }

    /// Current project, or a usage error naming the property
    pub fn require_project(&self) -> crate::error::Result<&str> {
        self.project.as_deref().ok_or_else(|| {
            crate::error::CliError::required(
                "--project",
                "The required property [project] is not currently set. \
                 Set it with --project or the CLI_PROJECT environment variable.",
            )
        })
    }

    /// Prompts are allowed unless disabled or `--quiet` was given
    pub fn can_prompt(&self) -> bool {
        !self.disable_prompts && !self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_layer_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            ("CLI_PROJECT", "my-project"),
            ("CLI_COMPUTE_ZONE", "us-west1-a"),
            ("CLI_CACHE_IMPLEMENTATION", "sql"),
            ("CLI_API_ENDPOINT_OVERRIDES_COMPUTE", "http://localhost:1/compute/v1/"),
        ]
        .into_iter()
        .collect();

        let mut props = Properties::default();
        props.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(props.project.as_deref(), Some("my-project"));
        assert_eq!(props.zone.as_deref(), Some("us-west1-a"));
        assert_eq!(props.cache_implementation, CacheImplementation::SingleFile);
        assert_eq!(
            props.api_endpoint_overrides.get("compute").map(String::as_str),
            Some("http://localhost:1/compute/v1/")
        );
    }

    #[test]
    fn test_numeric_project_from_env_is_accepted() {
        let mut props = Properties::default();
        props.apply_env(|k| (k == "CLI_PROJECT").then(|| "123456789012".to_string()));
        assert_eq!(props.project.as_deref(), Some("123456789012"));
    }

    #[test]
    fn test_file_layer_keeps_unset_base_values() {
        let base = Properties {
            project: Some("base-project".into()),
            zone: Some("us-east1-b".into()),
            ..Properties::default()
        };
        let file: Properties = serde_json::from_str(r#"{"zone": "europe-west1-b"}"#).unwrap();
        let merged = file.merged_over(base);
        assert_eq!(merged.project.as_deref(), Some("base-project"));
        assert_eq!(merged.zone.as_deref(), Some("europe-west1-b"));
        assert!(merged.enable_resource_quota);
    }

    #[test]
    fn test_cache_implementation_names() {
        assert_eq!("file".parse(), Ok(CacheImplementation::File));
        assert_eq!("SQL".parse(), Ok(CacheImplementation::SingleFile));
        assert_eq!("single_file".parse(), Ok(CacheImplementation::SingleFile));
        assert!("redis".parse::<CacheImplementation>().is_err());
    }

    #[test]
    fn test_verbosity_parse() {
        assert_eq!("DEBUG".parse::<Verbosity>().unwrap(), Verbosity::Debug);
        assert!("loud".parse::<Verbosity>().is_err());
    }

    #[test]
    fn test_require_project() {
        let props = Properties::default();
        assert!(props.require_project().is_err());
    }
}
