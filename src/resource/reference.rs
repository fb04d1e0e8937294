//! Resource references
//!
//! A fully-qualified pointer to one resource: collection, API version and
//! the ordered parameters of the URI template variant it was built from.

use serde::Deserialize;
use std::fmt;

/// How custom methods are appended to a resource URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MethodStyle {
    /// `.../instances/i/setLabels` (compute)
    Slash,
    /// `.../projects/p:getIamPolicy`
    #[default]
    Colon,
}

/// The containing realm of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Zone(String),
    Region(String),
    Global,
}

impl Scope {
    /// Parameter name the scope fills, if any
    pub fn param(&self) -> Option<&'static str> {
        match self {
            Scope::Zone(_) => Some("zone"),
            Scope::Region(_) => Some("region"),
            Scope::Global => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Scope::Zone(v) | Scope::Region(v) => Some(v),
            Scope::Global => None,
        }
    }

    /// Flag that selects this scope
    pub fn flag(&self) -> &'static str {
        match self {
            Scope::Zone(_) => "--zone",
            Scope::Region(_) => "--region",
            Scope::Global => "--global",
        }
    }

    /// Parse an aggregated-list key such as `zones/us-central1-a`
    pub fn from_aggregated_key(key: &str) -> Option<Self> {
        match key.split_once('/') {
            Some(("zones", zone)) => Some(Scope::Zone(zone.to_string())),
            Some(("regions", region)) => Some(Scope::Region(region.to_string())),
            None if key == "global" => Some(Scope::Global),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Zone(z) => write!(f, "zone: {z}"),
            Scope::Region(r) => write!(f, "region: {r}"),
            Scope::Global => write!(f, "global"),
        }
    }
}

/// A resolved resource reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    /// Dotted collection name, e.g. `compute.instances`
    pub collection: String,
    pub api_version: String,
    /// Parameter values in template order
    pub params: Vec<(String, String)>,
    pub base_url: String,
    /// Template variant this reference was built from
    pub template: String,
    pub method_style: MethodStyle,
}

impl ResourceRef {
    pub fn api(&self) -> &str {
        self.collection.split('.').next().unwrap_or(&self.collection)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of the last parameter, the resource's own name
    pub fn name(&self) -> &str {
        self.params.last().map(|(_, v)| v.as_str()).unwrap_or_default()
    }

    /// `projects/p/zones/z/instances/i`
    pub fn relative_name(&self) -> String {
        let mut out = Vec::new();
        for part in self.template.split('/') {
            match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) => {
                    out.push(urlencoding::encode(self.param(name).unwrap_or_default()).into_owned())
                }
                None => out.push(part.to_string()),
            }
        }
        out.join("/")
    }

    pub fn self_link(&self) -> String {
        format!("{}{}", self.base_url, self.relative_name())
    }

    /// URL of the parent list call (self link without the final segment)
    pub fn collection_url(&self) -> String {
        let link = self.self_link();
        match link.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => link,
        }
    }

    /// URL of a custom method on this resource
    pub fn method_url(&self, method: &str) -> String {
        match self.method_style {
            MethodStyle::Slash => format!("{}/{}", self.self_link(), method),
            MethodStyle::Colon => format!("{}:{}", self.self_link(), method),
        }
    }

    pub fn scope(&self) -> Scope {
        if let Some(zone) = self.param("zone") {
            Scope::Zone(zone.to_string())
        } else if let Some(region) = self.param("region") {
            Scope::Region(region.to_string())
        } else {
            Scope::Global
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.self_link())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> ResourceRef {
        ResourceRef {
            collection: "compute.instances".into(),
            api_version: "v1".into(),
            params: vec![
                ("project".into(), "p".into()),
                ("zone".into(), "us-west1-a".into()),
                ("instance".into(), "vm".into()),
            ],
            base_url: "https://compute.googleapis.com/compute/v1/".into(),
            template: "projects/{project}/zones/{zone}/instances/{instance}".into(),
            method_style: MethodStyle::Slash,
        }
    }

    #[test]
    fn test_links() {
        let r = instance();
        assert_eq!(r.relative_name(), "projects/p/zones/us-west1-a/instances/vm");
        assert_eq!(
            r.collection_url(),
            "https://compute.googleapis.com/compute/v1/projects/p/zones/us-west1-a/instances"
        );
        assert!(r.method_url("setLabels").ends_with("/instances/vm/setLabels"));
        assert_eq!(r.scope(), Scope::Zone("us-west1-a".into()));
        assert_eq!(r.api(), "compute");
    }

    #[test]
    fn test_scope_from_aggregated_key() {
        assert_eq!(
            Scope::from_aggregated_key("regions/us-central1"),
            Some(Scope::Region("us-central1".into()))
        );
        assert_eq!(Scope::from_aggregated_key("global"), Some(Scope::Global));
        assert_eq!(Scope::from_aggregated_key("bogus/x"), None);
        assert_eq!(Scope::Zone("a".into()).to_string(), "zone: a");
    }
}
