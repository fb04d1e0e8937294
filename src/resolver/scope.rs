//! Scope discovery: aggregated lookups, scope listings and the scope menu

use super::metadata::region_of;
use crate::calliope::command::ScopeKind;
use crate::error::{CliError, Result};
use crate::invocation::Invocation;
use crate::resource::cache::{CacheTable, TableKey};
use crate::resource::pager::{self, flatten_aggregated, ListRequest};
use crate::resource::registry::CollectionInfo;
use crate::resource::Scope;
use std::collections::BTreeMap;

/// Upper bound on aggregated pages walked while looking for one name
const MAX_LOOKUP_PAGES: usize = 20;

pub fn scope_of(kind: ScopeKind, value: &str) -> Scope {
    match kind {
        ScopeKind::Zone => Scope::Zone(value.to_string()),
        ScopeKind::Region => Scope::Region(value.to_string()),
        ScopeKind::Global => Scope::Global,
    }
}

pub fn kind_of(scope: &Scope) -> ScopeKind {
    match scope {
        Scope::Zone(_) => ScopeKind::Zone,
        Scope::Region(_) => ScopeKind::Region,
        Scope::Global => ScopeKind::Global,
    }
}

/// Key under which a scope choice is remembered, e.g. `zone,region`
pub fn kinds_key(kinds: &[ScopeKind]) -> String {
    kinds
        .iter()
        .map(|k| k.param().unwrap_or("global"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Scopes in which a resource called `name` exists, found through the aggregated list
pub async fn lookup_aggregated(
    inv: &Invocation,
    info: &CollectionInfo,
    name: &str,
    project: &str,
) -> Result<Vec<Scope>> {
    let params = BTreeMap::from([("project".to_string(), project.to_string())]);
    let Some(url) = inv
        .registry
        .aggregated_url(&info.name, Some(&info.api_version), &params)?
    else {
        return Ok(Vec::new());
    };
    let field = info.resource_name();
    let filter = urlencoding::encode(&format!("name eq {name}")).into_owned();

    let mut scopes = Vec::new();
    let mut token: Option<String> = None;
    for _ in 0..MAX_LOOKUP_PAGES {
        let mut page_url = format!("{url}?filter={filter}");
        if let Some(token) = &token {
            page_url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        let response = inv.client.get(&page_url).await?;
        for (key, item) in flatten_aggregated(&response, field) {
            if item.get("name").and_then(|n| n.as_str()) != Some(name) {
                continue;
            }
            if let Some(scope) = Scope::from_aggregated_key(&key) {
                scopes.push(scope);
            }
        }
        token = response
            .get("nextPageToken")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        if token.is_none() {
            break;
        }
    }
    tracing::debug!("Aggregated lookup of [{}] found {} scopes", name, scopes.len());
    Ok(scopes)
}

/// Zone or region names of a project, served from the cache when fresh
pub async fn list_scopes(
    inv: &Invocation,
    kind: ScopeKind,
    project: &str,
    api_version: &str,
) -> Result<Vec<String>> {
    let collection = match kind {
        ScopeKind::Zone => "compute.zones",
        ScopeKind::Region => "compute.regions",
        ScopeKind::Global => return Ok(Vec::new()),
    };
    let key = TableKey::new(collection, &[("project", project)]);
    if let Some(cache) = &inv.cache {
        match cache.load(&key) {
            Ok(Some(table)) => {
                tracing::debug!("Using cached {} for {}", collection, project);
                return Ok(table.rows.into_iter().filter_map(|r| r.into_iter().nth(1)).collect());
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read cache table {}: {:#}", key.name(), e),
        }
    }

    let params = BTreeMap::from([("project".to_string(), project.to_string())]);
    let url = inv.registry.list_url(collection, Some(api_version), &params)?;
    let api = inv.registry.api("compute", api_version)?;
    let mut request = ListRequest::new(&url, "items");
    request.page_size_param = api.page_size_param.clone();
    let items = pager::collect(&inv.client, request, &inv.interrupt).await?;
    let mut names: Vec<String> = items
        .iter()
        .filter_map(|i| i.get("name").and_then(|n| n.as_str()))
        .map(str::to_string)
        .collect();
    names.sort();

    if let Some(cache) = &inv.cache {
        let rows = names
            .iter()
            .map(|n| vec![project.to_string(), n.clone()])
            .collect();
        if let Err(e) = cache.store(&CacheTable::new(&key, rows)) {
            tracing::warn!("Failed to store cache table {}: {:#}", key.name(), e);
        }
    }
    Ok(names)
}

/// Ask which scope `names` live in; the metadata zone, when known, is the default
pub async fn prompt_for_scope(
    inv: &Invocation,
    kinds: &[ScopeKind],
    noun: &str,
    names: &[&str],
    project: &str,
    api_version: &str,
) -> Result<Scope> {
    let mut options: Vec<Scope> = Vec::new();
    for kind in kinds {
        match kind {
            ScopeKind::Global => options.push(Scope::Global),
            _ => {
                for value in list_scopes(inv, *kind, project, api_version).await? {
                    options.push(scope_of(*kind, &value));
                }
            }
        }
    }
    if options.is_empty() {
        return Err(underspecified(noun, names, kinds));
    }

    let default = match inv.metadata_zone().await {
        Some(zone) => options
            .iter()
            .position(|s| matches!(s, Scope::Zone(z) if *z == zone))
            .or_else(|| {
                options
                    .iter()
                    .position(|s| matches!(s, Scope::Region(r) if Some(r.as_str()) == region_of(&zone)))
            }),
        None => None,
    };

    let labelled = kinds.len() > 1;
    let labels: Vec<String> = options
        .iter()
        .map(|s| match (labelled, s.value()) {
            (false, Some(value)) => value.to_string(),
            _ => s.to_string(),
        })
        .collect();
    let index = inv
        .console
        .prompt_choice(&menu_message(noun, names, kinds), &labels, default)?;
    Ok(options.swap_remove(index))
}

/// Ask which of several scopes holding the same name was meant
pub fn choose_among(inv: &Invocation, name: &str, candidates: Vec<Scope>) -> Result<Scope> {
    if !inv.can_prompt() {
        return Err(CliError::AmbiguousResource {
            name: name.to_string(),
            candidates: candidates.iter().map(ToString::to_string).collect(),
        });
    }
    let labels: Vec<String> = candidates.iter().map(ToString::to_string).collect();
    let index = inv.console.prompt_choice(
        &format!("Found resources named [{name}] in several scopes. Choose the one to use:"),
        &labels,
        None,
    )?;
    let mut candidates = candidates;
    Ok(candidates.swap_remove(index))
}

fn menu_message(noun: &str, names: &[&str], kinds: &[ScopeKind]) -> String {
    let plural = if names.len() > 1 { "s" } else { "" };
    let mut message = format!("For the following {noun}{plural}:\n");
    for name in names {
        message.push_str(&format!(" - [{name}]\n"));
    }
    let choices: Vec<&str> = kinds.iter().map(|k| k.param().unwrap_or("global")).collect();
    message.push_str(&format!("choose a {}:", choices.join(" or ")));
    message
}

pub fn underspecified(noun: &str, names: &[&str], kinds: &[ScopeKind]) -> CliError {
    let flags: Vec<&str> = kinds.iter().map(|k| k.flag()).collect();
    let first = flags.first().copied().unwrap_or("--zone");
    let hint = if flags.len() > 1 {
        format!("Specify one of the [{}] flags.", flags.join(", "))
    } else {
        format!("Specify the [{first}] flag.")
    };
    CliError::required(
        first,
        format!(
            "Underspecified {noun} [{}]. {hint}",
            names.join(", ")
        ),
    )
}
