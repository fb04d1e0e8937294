//! Declarative command records
//!
//! Commands, groups and their arguments are plain data deserialized from
//! the embedded `commands.json`. The parser is built by interpreting these
//! records; nothing is registered by executing code.

use crate::resource::binder::ArgValue;
use crate::resource::registry::CollectionInfo;
use crate::resource::Registry;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseTrack {
    Alpha,
    Beta,
    Ga,
}

impl ReleaseTrack {
    pub const ALL: [ReleaseTrack; 3] = [ReleaseTrack::Ga, ReleaseTrack::Beta, ReleaseTrack::Alpha];

    /// Command-line prefix; GA commands sit at the root
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            ReleaseTrack::Alpha => Some("alpha"),
            ReleaseTrack::Beta => Some("beta"),
            ReleaseTrack::Ga => None,
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "alpha" => Some(ReleaseTrack::Alpha),
            "beta" => Some(ReleaseTrack::Beta),
            _ => None,
        }
    }

    /// API version used under this track: the track-named version when the API has one
    pub fn api_version<'a>(&self, registry: &'a Registry, api: &str) -> Option<&'a str> {
        if let Some(prefix) = self.prefix() {
            if let Ok(info) = registry.api(api, prefix) {
                return Some(info.version.as_str());
            }
        }
        registry.default_version(api).ok()
    }
}

impl fmt::Display for ReleaseTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReleaseTrack::Alpha => "alpha",
            ReleaseTrack::Beta => "beta",
            ReleaseTrack::Ga => "ga",
        })
    }
}

fn all_tracks() -> Vec<ReleaseTrack> {
    ReleaseTrack::ALL.to_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    #[default]
    String,
    Int,
    Float,
    Bool,
    /// Comma-separated or repeated values
    List,
    /// `KEY=VALUE` pairs
    Map,
    Duration,
}

/// How many values a positional takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum Nargs {
    #[default]
    #[serde(rename = "1")]
    One,
    #[serde(rename = "?")]
    Optional,
    #[serde(rename = "*")]
    ZeroOrMore,
    #[serde(rename = "+")]
    OneOrMore,
    /// Everything after `--`
    #[serde(rename = "remainder")]
    Remainder,
}

/// One flag or positional
#[derive(Debug, Clone, Deserialize)]
pub struct ArgSpec {
    /// `--machine-type` for flags, `NAME` for positionals
    pub name: String,
    #[serde(default)]
    pub short: Option<char>,
    #[serde(default)]
    pub help: String,
    #[serde(default, rename = "type")]
    pub arg_type: ArgType,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub nargs: Nargs,
    #[serde(default)]
    pub metavar: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    /// Request field the value binds to
    #[serde(default)]
    pub field: Option<String>,
    /// Expansion applied before binding, e.g. `zones/{zone}/machineTypes/{value}`
    #[serde(default)]
    pub value_template: Option<String>,
    #[serde(default = "all_tracks")]
    pub release_tracks: Vec<ReleaseTrack>,
}

impl ArgSpec {
    pub fn flag(name: &str, help: &str, arg_type: ArgType) -> Self {
        Self {
            name: name.to_string(),
            short: None,
            help: help.to_string(),
            arg_type,
            choices: Vec::new(),
            default: None,
            required: false,
            nargs: Nargs::One,
            metavar: None,
            hidden: false,
            field: None,
            value_template: None,
            release_tracks: all_tracks(),
        }
    }

    pub fn positional(name: &str, help: &str, nargs: Nargs) -> Self {
        Self {
            nargs,
            required: matches!(nargs, Nargs::One | Nargs::OneOrMore),
            ..Self::flag(name, help, ArgType::String)
        }
    }

    pub fn with_metavar(mut self, metavar: &str) -> Self {
        self.metavar = Some(metavar.to_string());
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    pub fn is_positional(&self) -> bool {
        !self.name.starts_with('-')
    }

    /// Namespace key: `--machine-type` -> `machine_type`, `NAME` -> `name`
    pub fn dest(&self) -> String {
        dest_of(&self.name)
    }

    /// Convert raw command-line values into a binder value
    pub fn arg_value(&self, raw: &[String]) -> Option<ArgValue> {
        let first = raw.first()?;
        Some(match self.arg_type {
            ArgType::List => ArgValue::List(raw.to_vec()),
            ArgType::Map => ArgValue::Map(
                raw.iter()
                    .map(|item| match item.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (item.clone(), String::new()),
                    })
                    .collect(),
            ),
            ArgType::Int => match first.parse::<i64>() {
                Ok(i) => ArgValue::Int(i),
                Err(_) => ArgValue::Str(first.clone()),
            },
            ArgType::Float => match first.parse::<f64>() {
                Ok(f) => ArgValue::Float(f),
                Err(_) => ArgValue::Str(first.clone()),
            },
            ArgType::Bool => ArgValue::Bool(first == "true"),
            ArgType::String | ArgType::Duration => ArgValue::Str(first.clone()),
        })
    }
}

pub fn dest_of(name: &str) -> String {
    name.trim_start_matches('-').replace('-', "_").to_lowercase()
}

/// Arguments of which at most one may be given
#[derive(Debug, Clone, Deserialize)]
pub struct MutexGroup {
    pub name: String,
    /// Argument names as written in `args`
    pub args: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

/// A resource argument: the positional name plus the scope flags that complete it
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceArgSpec {
    /// Concept name, also the positional's namespace key
    pub name: String,
    pub collection: String,
    #[serde(default)]
    pub help: String,
    /// Accept several names
    #[serde(default)]
    pub plural: bool,
    /// Look the name up in the aggregated list when no scope was given
    #[serde(default = "default_true")]
    pub aggregated_lookup: bool,
    /// Command-level scope defaults, e.g. `{"region": "us-central1"}`
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// The scope kinds a collection can live in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScopeKind {
    Zone,
    Region,
    Global,
}

impl ScopeKind {
    pub fn param(&self) -> Option<&'static str> {
        match self {
            ScopeKind::Zone => Some("zone"),
            ScopeKind::Region => Some("region"),
            ScopeKind::Global => None,
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            ScopeKind::Zone => "--zone",
            ScopeKind::Region => "--region",
            ScopeKind::Global => "--global",
        }
    }

    pub fn plural_flag(&self) -> Option<&'static str> {
        match self {
            ScopeKind::Zone => Some("--zones"),
            ScopeKind::Region => Some("--regions"),
            ScopeKind::Global => None,
        }
    }
}

/// Scope kinds of `info` in template order; empty for unscoped collections
pub fn scope_kinds(info: &CollectionInfo) -> Vec<ScopeKind> {
    let kinds: Vec<ScopeKind> = info
        .templates
        .iter()
        .map(|t| {
            let params = t.params();
            if params.contains(&"zone") {
                ScopeKind::Zone
            } else if params.contains(&"region") {
                ScopeKind::Region
            } else {
                ScopeKind::Global
            }
        })
        .collect();
    if kinds == [ScopeKind::Global] {
        return Vec::new();
    }
    kinds
}

/// What a command does once arguments are parsed
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Describe,
    List {
        collection: String,
    },
    Create {
        request_type: String,
    },
    Delete,
    /// A custom method such as `start` posted to each resource
    Method {
        method: String,
        verb: String,
    },
    AddLabels,
    RemoveLabels,
    GetIamPolicy,
    SetIamPolicy,
    AddIamPolicyBinding,
    RemoveIamPolicyBinding,
}

impl Action {
    pub fn is_list(&self) -> bool {
        matches!(self, Action::List { .. })
    }

    /// Actions that start operations accept `--async`
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Action::Create { .. }
                | Action::Delete
                | Action::Method { .. }
                | Action::AddLabels
                | Action::RemoveLabels
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupDef {
    /// Space-separated path below the track, e.g. `compute instances`
    pub path: String,
    #[serde(default)]
    pub help: String,
    #[serde(default = "all_tracks")]
    pub release_tracks: Vec<ReleaseTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandDef {
    pub path: String,
    pub help: String,
    #[serde(default)]
    pub detailed_help: Option<String>,
    #[serde(default)]
    pub examples: Option<String>,
    #[serde(default = "all_tracks")]
    pub release_tracks: Vec<ReleaseTrack>,
    pub action: Action,
    #[serde(default)]
    pub resource: Option<ResourceArgSpec>,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub mutex_groups: Vec<MutexGroup>,
    /// Default output projection
    #[serde(default)]
    pub format: Option<String>,
}

impl CommandDef {
    pub fn segments(&self) -> Vec<&str> {
        self.path.split_whitespace().collect()
    }

    pub fn name(&self) -> &str {
        self.segments().last().copied().unwrap_or_default()
    }

    pub fn in_track(&self, track: ReleaseTrack) -> bool {
        self.release_tracks.contains(&track)
    }

    /// The command's own arguments visible under `track`
    pub fn args_for(&self, track: ReleaseTrack) -> impl Iterator<Item = &ArgSpec> {
        self.args
            .iter()
            .filter(move |a| a.release_tracks.contains(&track))
    }

    pub fn arg(&self, dest: &str) -> Option<&ArgSpec> {
        self.args.iter().find(|a| a.dest() == dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dest_names() {
        assert_eq!(dest_of("--machine-type"), "machine_type");
        assert_eq!(dest_of("INSTANCE_NAMES"), "instance_names");
        assert!(ArgSpec::positional("NAME", "", Nargs::One).required);
        assert!(!ArgSpec::positional("NAME", "", Nargs::ZeroOrMore).required);
    }

    #[test]
    fn test_arg_value_conversion() {
        let labels = ArgSpec::flag("--labels", "", ArgType::Map);
        let value = labels
            .arg_value(&["env=prod".to_string(), "team".to_string()])
            .unwrap();
        let ArgValue::Map(map) = value else {
            panic!("expected a map");
        };
        assert_eq!(map.get("env").map(String::as_str), Some("prod"));
        assert_eq!(map.get("team").map(String::as_str), Some(""));

        let size = ArgSpec::flag("--size", "", ArgType::Int);
        assert_eq!(size.arg_value(&["10".to_string()]), Some(ArgValue::Int(10)));
        assert_eq!(size.arg_value(&[]), None);
    }

    #[test]
    fn test_scope_kinds() {
        let registry = Registry::global();
        let disks = registry.collection("compute.disks", None).unwrap();
        assert_eq!(scope_kinds(disks), vec![ScopeKind::Zone, ScopeKind::Region]);
        let addresses = registry.collection("compute.addresses", None).unwrap();
        assert_eq!(scope_kinds(addresses), vec![ScopeKind::Region, ScopeKind::Global]);
        let networks = registry.collection("compute.networks", None).unwrap();
        assert!(scope_kinds(networks).is_empty());
    }

    #[test]
    fn test_track_api_version() {
        let registry = Registry::global();
        assert_eq!(ReleaseTrack::Beta.api_version(registry, "compute"), Some("beta"));
        assert_eq!(ReleaseTrack::Ga.api_version(registry, "compute"), Some("v1"));
        assert_eq!(
            ReleaseTrack::Alpha.api_version(registry, "cloudresourcemanager"),
            Some("v1")
        );
    }

    #[test]
    fn test_action_deserialize() {
        let action: Action =
            serde_json::from_str(r#"{"kind": "method", "method": "start", "verb": "Starting"}"#).unwrap();
        assert!(action.is_mutating());
        let list: Action =
            serde_json::from_str(r#"{"kind": "list", "collection": "compute.disks"}"#).unwrap();
        assert!(list.is_list());
    }
}
