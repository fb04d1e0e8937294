//! Resource-argument resolution
//!
//! Turns the values of a command's resource argument into references. URLs
//! and relative names are parsed as given. Short names are completed with a
//! scope taken, in order, from the scope flags, the command's defaults, the
//! `compute/zone` and `compute/region` properties, an earlier choice in this
//! invocation, the aggregated list, and finally a prompt.

pub mod metadata;
pub mod scope;

use crate::calliope::command::{scope_kinds, ScopeKind};
use crate::calliope::Concept;
use crate::error::{CliError, Result};
use crate::invocation::Invocation;
use crate::resource::registry::CollectionInfo;
use crate::resource::{ResourceRef, Scope};
use scope::{choose_among, kinds_key, lookup_aggregated, prompt_for_scope, scope_of, underspecified};
use std::collections::BTreeMap;

fn is_path(value: &str) -> bool {
    value.contains('/')
}

/// API version the concept's collection is used at under the command's track
pub fn api_version(inv: &Invocation, concept: &Concept<'_>) -> Result<String> {
    let api = concept
        .spec
        .collection
        .split('.')
        .next()
        .unwrap_or_default();
    concept
        .ns
        .track()
        .api_version(&inv.registry, api)
        .map(str::to_string)
        .ok_or_else(|| CliError::UnknownApi(api.to_string()))
}

/// Scope named by `--zone`/`--region`/`--global`, if any
fn explicit_scope(concept: &Concept<'_>, kinds: &[ScopeKind]) -> Option<Scope> {
    kinds.iter().find_map(|kind| {
        concept
            .scope_flag(kind.flag())
            .map(|value| scope_of(*kind, value))
    })
}

/// Resolve a single-valued resource argument
pub async fn resolve_one(inv: &Invocation, concept: Concept<'_>) -> Result<ResourceRef> {
    let mut refs = resolve(inv, concept).await?;
    match refs.len() {
        1 => Ok(refs.remove(0)),
        n => Err(CliError::Internal(format!("Expected one resource, resolved {n}"))),
    }
}

/// Resolve every value of the resource argument, in command-line order
pub async fn resolve(inv: &Invocation, concept: Concept<'_>) -> Result<Vec<ResourceRef>> {
    let spec = concept.spec;
    let names = concept.names();
    if names.is_empty() {
        let arg = spec.name.to_uppercase();
        return Err(CliError::required(&arg, format!("argument {arg}: Must be specified.")));
    }

    let version = api_version(inv, &concept)?;
    let info = inv.registry.collection(&spec.collection, Some(&version))?;
    let kinds = scope_kinds(info);
    let explicit = explicit_scope(&concept, &kinds);

    let mut resolved: Vec<(usize, ResourceRef)> = Vec::with_capacity(names.len());
    let mut short: Vec<(usize, &str)> = Vec::new();
    for (i, name) in names.iter().enumerate() {
        if !is_path(name) {
            short.push((i, name.as_str()));
            continue;
        }
        let reference = inv
            .registry
            .parse(name, Some(&spec.collection), &BTreeMap::new())?;
        if let Some(scope) = &explicit {
            if reference.scope() != *scope {
                return Err(CliError::usage(format!(
                    "Resource [{name}] is in {}, which conflicts with [{}={}].",
                    reference.scope(),
                    scope.flag(),
                    scope.value().unwrap_or("true")
                )));
            }
        }
        resolved.push((i, reference));
    }

    if !short.is_empty() {
        let mut params: BTreeMap<String, String> = BTreeMap::new();
        let needs_project = info.all_params().contains(&"project");
        let project = if needs_project {
            let project = inv.properties.require_project()?.to_string();
            params.insert("project".to_string(), project.clone());
            project
        } else {
            String::new()
        };

        if !kinds.is_empty() {
            let short_names: Vec<&str> = short.iter().map(|(_, n)| *n).collect();
            let scope = resolve_scope(
                inv, &concept, info, &kinds, explicit, &short_names, &project, &version,
            )
            .await?;
            if let (Some(param), Some(value)) = (scope.param(), scope.value()) {
                params.insert(param.to_string(), value.to_string());
            }
        }

        let name_param = info
            .name_param()
            .ok_or_else(|| CliError::UnknownCollection(spec.collection.clone()))?
            .to_string();
        for (i, name) in short {
            params.insert(name_param.clone(), name.to_string());
            resolved.push((i, inv.registry.create(&spec.collection, Some(&version), &params)?));
        }
    }

    resolved.sort_by_key(|(i, _)| *i);
    let refs: Vec<ResourceRef> = resolved.into_iter().map(|(_, r)| r).collect();
    check_shared_scope(&refs)?;
    Ok(refs)
}

/// Bulk commands act on one scope at a time
fn check_shared_scope(refs: &[ResourceRef]) -> Result<()> {
    let Some(first) = refs.first() else {
        return Ok(());
    };
    let scope = first.scope();
    if let Some(offender) = refs.iter().find(|r| r.scope() != scope) {
        return Err(CliError::usage(format!(
            "Resource [{}] is in {}, but [{}] is in {}. All resources must be in the same scope.",
            offender.self_link(),
            offender.scope(),
            first.name(),
            scope
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn resolve_scope(
    inv: &Invocation,
    concept: &Concept<'_>,
    info: &CollectionInfo,
    kinds: &[ScopeKind],
    explicit: Option<Scope>,
    names: &[&str],
    project: &str,
    api_version: &str,
) -> Result<Scope> {
    if let Some(scope) = explicit {
        return Ok(scope);
    }

    for kind in kinds {
        if let Some(value) = kind.param().and_then(|p| concept.spec.defaults.get(p)) {
            return Ok(scope_of(*kind, value));
        }
    }

    for kind in kinds {
        let property = match kind {
            ScopeKind::Zone => inv.properties.zone.as_deref(),
            ScopeKind::Region => inv.properties.region.as_deref(),
            ScopeKind::Global => None,
        };
        if let Some(value) = property.filter(|v| !v.is_empty()) {
            tracing::debug!("Using {} [{}] from properties", kind.param().unwrap_or_default(), value);
            return Ok(scope_of(*kind, value));
        }
    }

    let key = kinds_key(kinds);
    if let Some(scope) = inv.remembered_scope(&key) {
        return Ok(scope);
    }

    let noun = concept.spec.name.replace('_', " ");
    if concept.spec.aggregated_lookup && info.aggregated.is_some() && names.len() == 1 {
        let mut found = lookup_aggregated(inv, info, names[0], project).await?;
        found.retain(|s| kinds.contains(&scope::kind_of(s)));
        match found.len() {
            0 => {}
            1 => return Ok(found.remove(0)),
            _ => {
                let scope = choose_among(inv, names[0], found)?;
                inv.remember_scope(&key, scope.clone());
                return Ok(scope);
            }
        }
    }

    if !inv.can_prompt() {
        return Err(underspecified(&noun, names, kinds));
    }
    let scope = prompt_for_scope(inv, kinds, &noun, names, project, api_version).await?;
    inv.remember_scope(&key, scope.clone());
    Ok(scope)
}
