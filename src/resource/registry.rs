//! Resource Registry - collection descriptors loaded from JSON
//!
//! The process-wide registry is parsed once from the embedded
//! `collections.json` and cloned per invocation, so endpoint overrides and
//! test registrations never leak between invocations.

use super::reference::{MethodStyle, ResourceRef};
use crate::error::{CliError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Embedded collection table (compiled into the binary)
const COLLECTIONS_JSON: &str = include_str!("../resources/collections.json");

/// One segment of a URI template
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A relative path template such as `projects/{project}/zones/{zone}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
    /// Collection polled for operations returned by methods on this variant
    pub operations: Option<String>,
}

impl UriTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim_matches('/');
        let mut segments = Vec::new();
        for part in raw.split('/') {
            if part.is_empty() {
                return Err(CliError::Internal(format!("Empty segment in template [{raw}]")));
            }
            match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) if !name.is_empty() => segments.push(Segment::Param(name.to_string())),
                Some(_) => {
                    return Err(CliError::Internal(format!("Empty placeholder in template [{raw}]")))
                }
                None if part.contains('{') || part.contains('}') => {
                    return Err(CliError::Internal(format!(
                        "Malformed placeholder [{part}] in template [{raw}]"
                    )))
                }
                None => segments.push(Segment::Literal(part.to_string())),
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
            operations: None,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in template order
    pub fn params(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(p) => Some(p.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Match a relative path, returning ordered parameter values
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut values = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => {
                    let value = urlencoding::decode(part).ok()?.into_owned();
                    values.push((name.clone(), value));
                }
            }
        }
        Some(values)
    }

    /// Expand with `values`; every placeholder must have a non-empty value
    pub fn expand(&self, values: &[(String, String)]) -> Option<String> {
        let mut parts = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => parts.push(lit.clone()),
                Segment::Param(name) => {
                    let value = values
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v.as_str())
                        .filter(|v| !v.is_empty())?;
                    parts.push(urlencoding::encode(value).into_owned());
                }
            }
        }
        Some(parts.join("/"))
    }
}

/// An API version with its endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ApiInfo {
    pub name: String,
    pub version: String,
    pub base_url: String,
    #[serde(default)]
    pub batch_path: Option<String>,
    #[serde(default)]
    pub method_style: MethodStyle,
    #[serde(default = "default_page_size_param")]
    pub page_size_param: String,
    #[serde(default)]
    pub default: bool,
}

fn default_page_size_param() -> String {
    "pageSize".to_string()
}

impl ApiInfo {
    /// Batch endpoint on the API host, if the API supports batching
    pub fn batch_url(&self) -> Option<String> {
        let path = self.batch_path.as_ref()?;
        let parsed = url::Url::parse(&self.base_url).ok()?;
        let root = parsed.join("/").ok()?;
        Some(format!("{}{}", root, path.trim_start_matches('/')))
    }
}

/// Registered collection descriptor
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    /// Dotted name, e.g. `compute.instances`
    pub name: String,
    pub api_version: String,
    /// Scope variants in preference order
    pub templates: Vec<UriTemplate>,
    /// Field holding list results
    pub list_field: String,
    /// Aggregated list path, for collections that span scopes
    pub aggregated: Option<UriTemplate>,
}

impl CollectionInfo {
    pub fn api(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    /// Last dotted component, also the key inside aggregated scope entries
    pub fn resource_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Union of parameters across variants, in first-seen order
    pub fn all_params(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for template in &self.templates {
            for p in template.params() {
                if seen.insert(p) {
                    out.push(p);
                }
            }
        }
        out
    }

    /// Name of the parameter the short name fills
    pub fn name_param(&self) -> Option<&str> {
        self.templates.first()?.params().last().copied()
    }

    /// Pick the variant whose parameters are all present, preferring the most specific
    pub fn template_for(&self, present: &BTreeSet<&str>) -> Option<&UriTemplate> {
        let mut best: Option<&UriTemplate> = None;
        for template in &self.templates {
            let params = template.params();
            if !params.iter().all(|p| present.contains(p)) {
                continue;
            }
            if best.map_or(true, |b| params.len() > b.params().len()) {
                best = Some(template);
            }
        }
        best
    }
}

#[derive(Debug, Deserialize)]
struct TemplateDef {
    path: String,
    #[serde(default)]
    operations: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionDef {
    name: String,
    versions: Vec<String>,
    templates: Vec<TemplateDef>,
    #[serde(default = "default_list_field")]
    list_field: String,
    #[serde(default)]
    aggregated: Option<String>,
}

fn default_list_field() -> String {
    "items".to_string()
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    apis: Vec<ApiInfo>,
    collections: Vec<CollectionDef>,
}

/// Collections and APIs known to this invocation
#[derive(Debug, Clone, Default)]
pub struct Registry {
    apis: BTreeMap<(String, String), ApiInfo>,
    collections: BTreeMap<(String, String), CollectionInfo>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

impl Registry {
    /// The process-wide registry, loaded from the embedded table on first access
    pub fn global() -> &'static Registry {
        REGISTRY.get_or_init(|| match Self::from_json(COLLECTIONS_JSON) {
            Ok(registry) => registry,
            Err(e) => {
                tracing::error!("Failed to load embedded collections: {}", e);
                Registry::default()
            }
        })
    }

    /// Per-invocation copy with endpoint overrides applied
    pub fn for_invocation(overrides: &BTreeMap<String, String>) -> Registry {
        let mut registry = Self::global().clone();
        for (api, url) in overrides {
            registry.override_endpoint(api, url);
        }
        registry
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: RegistryFile = serde_json::from_str(content)?;
        let mut registry = Registry::default();
        for api in file.apis {
            registry.add_api(api);
        }
        for def in file.collections {
            for version in &def.versions {
                let mut templates = Vec::new();
                for t in &def.templates {
                    let mut template = UriTemplate::parse(&t.path)?;
                    template.operations = t.operations.clone();
                    templates.push(template);
                }
                let aggregated = def.aggregated.as_deref().map(UriTemplate::parse).transpose()?;
                registry.insert(CollectionInfo {
                    name: def.name.clone(),
                    api_version: version.clone(),
                    templates,
                    list_field: def.list_field.clone(),
                    aggregated,
                })?;
            }
        }
        Ok(registry)
    }

    pub fn add_api(&mut self, api: ApiInfo) {
        self.apis.insert((api.name.clone(), api.version.clone()), api);
    }

    /// Point `api` at another endpoint, keeping each version distinct
    ///
    /// An override ending in a version of the API (`.../compute/v1/`) has that
    /// segment swapped per version. A bare host keeps each version's own path.
    /// Any other path is a prefix the version is appended to.
    pub fn override_endpoint(&mut self, api: &str, base_url: &str) {
        let root = base_url.trim_end_matches('/');
        let versions: BTreeSet<String> = self
            .apis
            .keys()
            .filter(|(name, _)| name == api)
            .map(|(_, version)| version.clone())
            .collect();
        let path_is_empty = url::Url::parse(base_url)
            .map(|u| u.path().trim_matches('/').is_empty())
            .unwrap_or(false);
        let versioned_prefix = root
            .rsplit_once('/')
            .filter(|(_, last)| versions.contains(*last))
            .map(|(prefix, _)| prefix.to_string());

        for ((name, version), info) in self.apis.iter_mut() {
            if name != api {
                continue;
            }
            let base = match &versioned_prefix {
                Some(prefix) => format!("{prefix}/{version}/"),
                None if path_is_empty => match url::Url::parse(&info.base_url) {
                    Ok(original) => format!("{root}{}", original.path()),
                    Err(_) => format!("{root}/"),
                },
                None => format!("{root}/{version}/"),
            };
            tracing::debug!("Endpoint override for {} {}: {}", api, version, base);
            info.base_url = base;
        }
    }

    /// Register one collection variant; placeholders must match `params` exactly
    pub fn register(
        &mut self,
        collection: &str,
        api_version: &str,
        uri_template: &str,
        params: &[&str],
    ) -> Result<()> {
        let template = UriTemplate::parse(uri_template)?;
        let declared: Vec<&str> = template.params();
        if declared != params {
            return Err(CliError::Internal(format!(
                "Template [{}] placeholders {:?} do not match parameters {:?}",
                uri_template, declared, params
            )));
        }
        self.insert(CollectionInfo {
            name: collection.to_string(),
            api_version: api_version.to_string(),
            templates: vec![template],
            list_field: default_list_field(),
            aggregated: None,
        })
    }

    fn insert(&mut self, info: CollectionInfo) -> Result<()> {
        let key = (info.name.clone(), info.api_version.clone());
        if self.collections.contains_key(&key) {
            return Err(CliError::Internal(format!(
                "Collection [{}] is already registered for version [{}]",
                info.name, info.api_version
            )));
        }
        if !self
            .apis
            .contains_key(&(info.api().to_string(), info.api_version.clone()))
        {
            return Err(CliError::UnknownApi(format!(
                "{}/{}",
                info.api(),
                info.api_version
            )));
        }
        self.collections.insert(key, info);
        Ok(())
    }

    pub fn api(&self, name: &str, version: &str) -> Result<&ApiInfo> {
        self.apis
            .get(&(name.to_string(), version.to_string()))
            .ok_or_else(|| CliError::UnknownApi(format!("{name}/{version}")))
    }

    pub fn default_version(&self, api: &str) -> Result<&str> {
        let candidates: Vec<&ApiInfo> = self.apis.values().filter(|a| a.name == api).collect();
        candidates
            .iter()
            .find(|a| a.default)
            .or_else(|| candidates.first())
            .map(|a| a.version.as_str())
            .ok_or_else(|| CliError::UnknownApi(api.to_string()))
    }

    /// Look up a collection at `version`, or at its API's default version
    pub fn collection(&self, name: &str, version: Option<&str>) -> Result<&CollectionInfo> {
        let api = name.split('.').next().unwrap_or(name);
        let version = match version {
            Some(v) => v,
            None => self.default_version(api)?,
        };
        self.collections
            .get(&(name.to_string(), version.to_string()))
            .ok_or_else(|| CliError::UnknownCollection(format!("{name} ({version})")))
    }

    pub fn collections(&self) -> impl Iterator<Item = &CollectionInfo> {
        self.collections.values()
    }

    /// Build a reference from parameter values
    pub fn create(
        &self,
        collection: &str,
        api_version: Option<&str>,
        values: &BTreeMap<String, String>,
    ) -> Result<ResourceRef> {
        let info = self.collection(collection, api_version)?;
        let present: BTreeSet<&str> = values
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.as_str())
            .collect();

        let Some(template) = info.template_for(&present) else {
            let missing = info
                .templates
                .first()
                .and_then(|t| t.params().into_iter().find(|p| !present.contains(p)))
                .unwrap_or("name")
                .to_string();
            return Err(CliError::required(
                &format!("--{missing}"),
                format!(
                    "Missing required parameter [{missing}] for a [{}] resource.",
                    info.name
                ),
            ));
        };

        let params = template
            .params()
            .into_iter()
            .map(|p| (p.to_string(), values[p].clone()))
            .collect();
        self.build_ref(info, template, params)
    }

    fn build_ref(
        &self,
        info: &CollectionInfo,
        template: &UriTemplate,
        params: Vec<(String, String)>,
    ) -> Result<ResourceRef> {
        let api = self.api(info.api(), &info.api_version)?;
        Ok(ResourceRef {
            collection: info.name.clone(),
            api_version: info.api_version.clone(),
            params,
            base_url: api.base_url.clone(),
            template: template.as_str().to_string(),
            method_style: api.method_style,
        })
    }

    /// URL listing a collection under `values` (the scope variant they select)
    pub fn list_url(
        &self,
        collection: &str,
        api_version: Option<&str>,
        values: &BTreeMap<String, String>,
    ) -> Result<String> {
        let info = self.collection(collection, api_version)?;
        let mut present: BTreeSet<&str> = values
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.as_str())
            .collect();
        if let Some(name) = info.name_param() {
            present.insert(name);
        }
        let template = info.template_for(&present).ok_or_else(|| {
            CliError::required(
                "--project",
                format!("Missing parameters to list [{}].", info.name),
            )
        })?;
        let parent = template
            .as_str()
            .rsplit_once('/')
            .map(|(parent, _)| parent)
            .unwrap_or_default();
        let parent = UriTemplate::parse(parent)?;
        let pairs: Vec<(String, String)> = values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let path = parent.expand(&pairs).ok_or_else(|| {
            CliError::Internal(format!("Cannot expand list path for [{}]", info.name))
        })?;
        let api = self.api(info.api(), &info.api_version)?;
        Ok(format!("{}{}", api.base_url, path))
    }

    /// URL of the aggregated list across scopes, when the collection has one
    pub fn aggregated_url(
        &self,
        collection: &str,
        api_version: Option<&str>,
        values: &BTreeMap<String, String>,
    ) -> Result<Option<String>> {
        let info = self.collection(collection, api_version)?;
        let Some(template) = &info.aggregated else {
            return Ok(None);
        };
        let pairs: Vec<(String, String)> = values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let api = self.api(info.api(), &info.api_version)?;
        Ok(template
            .expand(&pairs)
            .map(|path| format!("{}{}", api.base_url, path)))
    }

    /// Parse a URL, a relative name, or a short name completed with `defaults`
    pub fn parse(
        &self,
        value: &str,
        collection: Option<&str>,
        defaults: &BTreeMap<String, String>,
    ) -> Result<ResourceRef> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CliError::InvalidResource(value.to_string()));
        }
        if value.starts_with("https://") || value.starts_with("http://") {
            return self.parse_url(value, collection);
        }
        if value.contains('/') {
            return self.parse_relative(value, collection);
        }

        let Some(collection) = collection else {
            return Err(CliError::InvalidResource(value.to_string()));
        };
        let info = self.collection(collection, None)?;
        let name_param = info
            .name_param()
            .ok_or_else(|| CliError::UnknownCollection(collection.to_string()))?;
        let mut values = defaults.clone();
        values.insert(name_param.to_string(), value.to_string());
        self.create(collection, Some(&info.api_version), &values)
    }

    fn parse_url(&self, url: &str, collection: Option<&str>) -> Result<ResourceRef> {
        let url = url.split(['?', '#']).next().unwrap_or(url);
        let matching_api = self
            .apis
            .values()
            .filter(|a| url.starts_with(&a.base_url))
            .max_by_key(|a| a.base_url.len());

        let Some(api) = matching_api else {
            return Err(self.unknown_api_error(url));
        };
        let path = &url[api.base_url.len()..];
        self.match_path(path, Some((&api.name, &api.version)), collection)
            .ok_or_else(|| CliError::InvalidResource(url.to_string()))
    }

    fn unknown_api_error(&self, url: &str) -> CliError {
        let host_api = url::Url::parse(url).ok().and_then(|u| {
            let host = u.host_str()?;
            host.strip_suffix(".googleapis.com")
                .map(|h| h.split('.').next().unwrap_or(h).to_string())
        });
        match host_api {
            Some(api) if !self.apis.keys().any(|(name, _)| *name == api) => {
                CliError::UnknownApi(api)
            }
            _ => CliError::InvalidResource(url.to_string()),
        }
    }

    fn parse_relative(&self, path: &str, collection: Option<&str>) -> Result<ResourceRef> {
        let api = collection
            .and_then(|c| c.split('.').next())
            .map(|api| self.default_version(api).map(|v| (api.to_string(), v.to_string())))
            .transpose()?;
        let api_ref = api.as_ref().map(|(a, v)| (a.as_str(), v.as_str()));
        self.match_path(path, api_ref, collection)
            .ok_or_else(|| CliError::InvalidResource(path.to_string()))
    }

    /// Try every collection of the API; the hinted collection wins ties
    fn match_path(
        &self,
        path: &str,
        api: Option<(&str, &str)>,
        collection: Option<&str>,
    ) -> Option<ResourceRef> {
        let candidates = self.collections.values().filter(|c| match api {
            Some((name, version)) => c.api() == name && c.api_version == version,
            None => true,
        });

        let mut fallback = None;
        for info in candidates {
            for template in &info.templates {
                let Some(params) = template.matches(path) else {
                    continue;
                };
                let Ok(reference) = self.build_ref(info, template, params) else {
                    continue;
                };
                if collection.map_or(true, |c| c == info.name) {
                    return Some(reference);
                }
                fallback.get_or_insert(reference);
            }
        }
        // A hint that names a different collection than the path is still a mismatch
        if collection.is_some() {
            return None;
        }
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_registry_loads_successfully() {
        let registry = Registry::global();
        assert!(registry.collections().count() > 0, "Registry should have collections");
        assert!(registry.collection("compute.instances", None).is_ok());
    }

    #[test]
    fn test_parse_url_round_trip() {
        let registry = Registry::global();
        let url = "https://compute.googleapis.com/compute/v1/projects/my-project/zones/us-west1-a/instances/my-vm";
        let r = registry.parse(url, None, &BTreeMap::new()).unwrap();
        assert_eq!(r.collection, "compute.instances");
        assert_eq!(r.param("zone"), Some("us-west1-a"));
        assert_eq!(r.self_link(), url);
        assert_eq!(registry.parse(&r.self_link(), None, &BTreeMap::new()).unwrap(), r);
    }

    #[test]
    fn test_parse_relative_name() {
        let registry = Registry::global();
        let r = registry
            .parse("projects/123456/zones/z1/instances/i1", Some("compute.instances"), &BTreeMap::new())
            .unwrap();
        assert_eq!(r.param("project"), Some("123456"));
        assert_eq!(r.name(), "i1");
    }

    #[test]
    fn test_short_name_picks_scope_variant() {
        let registry = Registry::global();
        let zonal = registry
            .parse("disk-1", Some("compute.disks"), &defaults(&[("project", "p"), ("zone", "us-central1-a")]))
            .unwrap();
        assert_eq!(zonal.relative_name(), "projects/p/zones/us-central1-a/disks/disk-1");

        let regional = registry
            .parse("disk-1", Some("compute.disks"), &defaults(&[("project", "p"), ("region", "us-central1")]))
            .unwrap();
        assert_eq!(regional.relative_name(), "projects/p/regions/us-central1/disks/disk-1");

        let global = registry
            .parse("addr", Some("compute.addresses"), &defaults(&[("project", "p")]))
            .unwrap();
        assert_eq!(global.relative_name(), "projects/p/global/addresses/addr");
    }

    #[test]
    fn test_list_and_aggregated_urls() {
        let registry = Registry::global();
        let zonal = registry
            .list_url("compute.instances", None, &defaults(&[("project", "p"), ("zone", "z1")]))
            .unwrap();
        assert_eq!(zonal, "https://compute.googleapis.com/compute/v1/projects/p/zones/z1/instances");
        let zones = registry
            .list_url("compute.zones", Some("beta"), &defaults(&[("project", "p")]))
            .unwrap();
        assert_eq!(zones, "https://compute.googleapis.com/compute/beta/projects/p/zones");
        let aggregated = registry
            .aggregated_url("compute.disks", None, &defaults(&[("project", "p")]))
            .unwrap();
        assert_eq!(
            aggregated.as_deref(),
            Some("https://compute.googleapis.com/compute/v1/projects/p/aggregated/disks")
        );
        assert!(registry
            .aggregated_url("compute.networks", None, &defaults(&[("project", "p")]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_short_name_without_scope_is_required_argument() {
        let err = Registry::global()
            .parse("vm", Some("compute.instances"), &defaults(&[("project", "p")]))
            .unwrap_err();
        assert!(matches!(err, CliError::RequiredArgument { ref arg, .. } if arg == "--zone"));
    }

    #[test]
    fn test_unknown_api_and_invalid_resource() {
        let registry = Registry::global();
        let err = registry
            .parse("https://bogus.googleapis.com/bogus/v1/projects/p", None, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, CliError::UnknownApi(ref api) if api == "bogus"));

        let err = registry
            .parse("https://compute.googleapis.com/compute/v1/projects/p/nothing/x", None, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, CliError::InvalidResource(_)));
    }

    #[test]
    fn test_register_validates_placeholders_and_duplicates() {
        let mut registry = Registry::global().clone();
        assert!(registry
            .register("compute.widgets", "v1", "projects/{project}/widgets/{widget}", &["project"])
            .is_err());
        registry
            .register("compute.widgets", "v1", "projects/{project}/widgets/{widget}", &["project", "widget"])
            .unwrap();
        assert!(registry
            .register("compute.widgets", "v1", "projects/{project}/widgets/{widget}", &["project", "widget"])
            .is_err());
        // The global registry is untouched by per-invocation registrations
        assert!(Registry::global().collection("compute.widgets", Some("v1")).is_err());
    }

    #[test]
    fn test_endpoint_override_keeps_versions_apart() {
        let versioned = Registry::for_invocation(&defaults(&[("compute", "http://127.0.0.1:9/compute/v1/")]));
        assert_eq!(versioned.api("compute", "beta").unwrap().base_url, "http://127.0.0.1:9/compute/beta/");
        assert_eq!(versioned.api("compute", "v1").unwrap().base_url, "http://127.0.0.1:9/compute/v1/");

        let host = Registry::for_invocation(&defaults(&[("compute", "http://localhost:8080")]));
        assert_eq!(host.api("compute", "alpha").unwrap().base_url, "http://localhost:8080/compute/alpha/");

        let prefix = Registry::for_invocation(&defaults(&[("compute", "https://proxy.example.com/gce")]));
        assert_eq!(prefix.api("compute", "v1").unwrap().base_url, "https://proxy.example.com/gce/v1/");

        let beta = versioned
            .parse("http://127.0.0.1:9/compute/beta/projects/p/zones/z/instances/i", None, &BTreeMap::new())
            .unwrap();
        assert_eq!(beta.api_version, "beta");
    }

    #[test]
    fn test_endpoint_override_applies_to_parse_and_format() {
        let overrides = defaults(&[("compute", "http://127.0.0.1:9/compute/v1")]);
        let registry = Registry::for_invocation(&overrides);
        let r = registry
            .parse("http://127.0.0.1:9/compute/v1/projects/p/zones/z/instances/i", None, &BTreeMap::new())
            .unwrap();
        assert_eq!(r.self_link(), "http://127.0.0.1:9/compute/v1/projects/p/zones/z/instances/i");
        assert_eq!(
            registry.api("compute", "v1").unwrap().batch_url().as_deref(),
            Some("http://127.0.0.1:9/batch/compute/v1")
        );
    }
}
