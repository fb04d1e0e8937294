//! Command actions
//!
//! Every command in the tree runs one of these generic actions against the
//! collection its resource argument names.

use crate::calliope::command::ArgType;
use crate::calliope::{Action, Concept, Namespace};
use crate::display::{self, ListOptions};
use crate::error::{CliError, Result};
use crate::format;
use crate::gcp::batch::{execute_batch, BatchRequest};
use crate::gcp::http::Method;
use crate::iam::{self, IamHelper, Policy};
use crate::invocation::Invocation;
use crate::progress::{ProgressBar, ProgressStatus, ProgressTracker};
use crate::projection::Projection;
use crate::resolver;
use crate::resource::binder::{bind, ArgValue, Binding};
use crate::resource::message::ApiMessage;
use crate::resource::pager::{self, ListRequest};
use crate::resource::poller::{operation_url, OperationPoller};
use crate::resource::{ResourceRef, Scope};
use futures::future::join_all;
use futures::stream::{self, FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Run the action of the parsed command
pub async fn run(inv: &Invocation, ns: &Namespace) -> Result<()> {
    tracing::info!("Running {}", ns.command_path());
    match &ns.command().action {
        Action::Describe => describe(inv, ns).await,
        Action::List { collection } => list(inv, ns, collection).await,
        Action::Create { request_type } => create(inv, ns, request_type).await,
        Action::Delete => delete(inv, ns).await,
        Action::Method { method, verb } => call_method(inv, ns, method, verb).await,
        Action::AddLabels => update_labels(inv, ns, true).await,
        Action::RemoveLabels => update_labels(inv, ns, false).await,
        Action::GetIamPolicy => get_iam_policy(inv, ns).await,
        Action::SetIamPolicy => set_iam_policy(inv, ns).await,
        Action::AddIamPolicyBinding => change_iam_binding(inv, ns, true).await,
        Action::RemoveIamPolicyBinding => change_iam_binding(inv, ns, false).await,
    }
}

fn concept(ns: &Namespace) -> Result<Concept<'_>> {
    ns.concept().ok_or_else(|| {
        CliError::Internal(format!("Command [{}] has no resource argument", ns.command().path))
    })
}

fn noun(ns: &Namespace) -> String {
    ns.command()
        .resource
        .as_ref()
        .map(|r| r.name.replace('_', " "))
        .unwrap_or_else(|| "resource".to_string())
}

/// Name the resource in not-found errors instead of the raw URL
fn with_resource_context(error: CliError, reference: &ResourceRef) -> CliError {
    match error {
        CliError::ResourceNotFound { .. } => CliError::ResourceNotFound {
            resource: reference.self_link(),
            message: format!(
                "Could not fetch resource:\n - The resource '{}' was not found",
                reference.relative_name()
            ),
        },
        other => other,
    }
}

async fn describe(inv: &Invocation, ns: &Namespace) -> Result<()> {
    let reference = resolver::resolve_one(inv, concept(ns)?).await?;
    let resource = inv
        .client
        .get(&reference.self_link())
        .await
        .map_err(|e| with_resource_context(e, &reference))?;
    display::display_one(inv, ns, &resource)
}

async fn list(inv: &Invocation, ns: &Namespace, collection: &str) -> Result<()> {
    let options = ListOptions::from_namespace(ns)?;
    let api = collection.split('.').next().unwrap_or_default();
    let version = ns
        .track()
        .api_version(&inv.registry, api)
        .ok_or_else(|| CliError::UnknownApi(api.to_string()))?
        .to_string();
    let info = inv.registry.collection(collection, Some(&version))?;
    let api_info = inv.registry.api(api, &version)?;

    let mut params = BTreeMap::new();
    if info.all_params().contains(&"project") {
        params.insert("project".to_string(), inv.properties.require_project()?.to_string());
    }

    let mut requests: Vec<ListRequest> = Vec::new();
    let scoped: Vec<(&str, &[String])> = [("zone", ns.values("zones")), ("region", ns.values("regions"))]
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .collect();
    if let Some((param, values)) = scoped.first() {
        for value in *values {
            let mut scope_params = params.clone();
            scope_params.insert(param.to_string(), value.clone());
            let url = inv.registry.list_url(collection, Some(&version), &scope_params)?;
            requests.push(ListRequest::new(&url, &info.list_field));
        }
    } else if let Some(url) = inv.registry.aggregated_url(collection, Some(&version), &params)? {
        let mut request = ListRequest::new(&url, info.resource_name());
        request.aggregated = true;
        requests.push(request);
    } else {
        let url = inv.registry.list_url(collection, Some(&version), &params)?;
        requests.push(ListRequest::new(&url, &info.list_field));
    }

    let server_filter = options.server_filter();
    for request in &mut requests {
        request.page_size_param = api_info.page_size_param.clone();
        request.page_size = options.page_size;
        request.limit = options.server_limit();
        if let Some(filter) = &server_filter {
            request.query.push(("filter".to_string(), filter.clone()));
        }
    }

    let client = inv.client.clone();
    let interrupt = inv.interrupt.clone();
    let items = stream::iter(requests)
        .map(move |request| pager::prefetched_items(&client, request, &interrupt))
        .flatten()
        .boxed();
    display::display_list(inv, ns, &options, items).await?;
    Ok(())
}

/// Expand `{value}` and the reference's parameters in a value template
fn expand_value(template: &str, raw: &str, reference: &ResourceRef) -> String {
    // Full URLs and paths are passed through
    if raw.contains('/') {
        return raw.to_string();
    }
    let mut out = template.replace("{value}", raw);
    for (name, value) in &reference.params {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// Bindings for every argument with a request field that has a value
fn bindings_for(ns: &Namespace, reference: &ResourceRef) -> Vec<Binding> {
    let mut bindings = Vec::new();
    for spec in ns.command().args_for(ns.track()) {
        let Some(field) = &spec.field else {
            continue;
        };
        let dest = spec.dest();
        if spec.arg_type == ArgType::Bool && !ns.is_specified(&dest) {
            continue;
        }
        let raw = ns.values(&dest);
        if raw.is_empty() {
            continue;
        }
        let raw: Vec<String> = match &spec.value_template {
            Some(template) => raw.iter().map(|r| expand_value(template, r, reference)).collect(),
            None => raw.to_vec(),
        };
        if let Some(value) = spec.arg_value(&raw) {
            bindings.push(Binding::new(&spec.name, field, value));
        }
    }
    bindings
}

async fn create(inv: &Invocation, ns: &Namespace, request_type: &str) -> Result<()> {
    let reference = resolver::resolve_one(inv, concept(ns)?).await?;
    let mut message = inv.schemas.new_message(request_type)?;
    if message.schema()?.field("name").is_some() {
        message.set("name", Value::String(reference.name().to_string()))?;
    }
    bind(&mut message, &bindings_for(ns, &reference))?;

    let operation = inv
        .client
        .post(&reference.collection_url(), Some(&message.to_value()))
        .await?;
    let message = format!("Creating {} [{}]", noun(ns), reference.name());
    if let Some(resource) = wait_for(inv, ns, operation, &reference, &message, true).await? {
        inv.console.status(&format!("Created [{}].", reference.self_link()));
        display::display_one(inv, ns, &resource)?;
    }
    Ok(())
}

/// Poll `operation` unless `--async`; `None` when the command returned early
async fn wait_for(
    inv: &Invocation,
    ns: &Namespace,
    operation: Value,
    target: &ResourceRef,
    message: &str,
    fetch_target: bool,
) -> Result<Option<Value>> {
    let poll_url = operation_url(&operation, &inv.registry, Some(target))?;
    if ns.flag("async") {
        inv.console
            .status(&format!("Operation [{poll_url}] is running in the background."));
        format::print_all(&Projection::parse("yaml")?, &inv.console, &[operation], true)?;
        return Ok(None);
    }

    let mut tracker = ProgressTracker::start(&inv.console, message, Vec::new());
    let poller = OperationPoller::new(&inv.client, inv.poller.clone()).with_interrupt(&inv.interrupt);
    match poller
        .wait_for_resource(operation, &poll_url, fetch_target, Some(&mut tracker))
        .await
    {
        Ok(resource) => {
            tracker.succeed();
            Ok(Some(resource))
        }
        Err(e @ CliError::Cancelled(_)) => {
            tracker.interrupt();
            Err(e)
        }
        Err(e) => {
            tracker.fail();
            Err(e)
        }
    }
}

fn describe_targets(refs: &[ResourceRef]) -> String {
    refs.iter()
        .map(|r| match r.scope() {
            Scope::Global => format!(" - [{}]", r.name()),
            scope => format!(" - [{}] in [{}]", r.name(), scope.value().unwrap_or_default()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn delete(inv: &Invocation, ns: &Namespace) -> Result<()> {
    let refs = resolver::resolve(inv, concept(ns)?).await?;
    if inv.can_prompt() {
        let message = format!(
            "The following {}s will be deleted:\n{}",
            noun(ns),
            describe_targets(&refs)
        );
        if !inv
            .console
            .prompt_continue(Some(&message), "Do you want to continue", true)?
        {
            return Err(CliError::Cancelled("Aborted by user.".to_string()));
        }
    }
    let verb = format!("Deleting {}", noun(ns));
    bulk(inv, ns, &refs, Method::Delete, None, &verb, "Deleted").await
}

async fn call_method(inv: &Invocation, ns: &Namespace, method: &str, verb: &str) -> Result<()> {
    let refs = resolver::resolve(inv, concept(ns)?).await?;
    let verb = format!("{verb} {}", noun(ns));
    bulk(inv, ns, &refs, Method::Post, Some(method), &verb, "Updated").await
}

/// Issue one call per reference, batched when possible, then wait on every operation
///
/// Failures do not stop the other calls; they are reported together at the end.
async fn bulk(
    inv: &Invocation,
    ns: &Namespace,
    refs: &[ResourceRef],
    method: Method,
    custom_method: Option<&str>,
    verb: &str,
    done: &str,
) -> Result<()> {
    let url_of = |r: &ResourceRef| match custom_method {
        Some(m) => r.method_url(m),
        None => r.self_link(),
    };

    let batch_url = refs
        .first()
        .filter(|_| refs.len() > 1)
        .and_then(|r| inv.registry.api(r.api(), &r.api_version).ok())
        .and_then(|api| api.batch_url());

    let responses: Vec<Result<Value>> = match batch_url {
        Some(batch_url) => {
            let requests: Vec<BatchRequest> = refs
                .iter()
                .map(|r| BatchRequest::new(method, &url_of(r), None))
                .collect();
            let results = execute_batch(&inv.client, &batch_url, &requests).await?;
            // Disabled-service slots go through the enable flow and are retried singly
            let recovered = requests.iter().zip(results).map(|(request, result)| async move {
                match result {
                    Ok(value) => Ok(value),
                    Err(error) => {
                        inv.client
                            .recover_disabled(request.method, &request.url, request.body.as_ref(), error)
                            .await
                    }
                }
            });
            join_all(recovered).await
        }
        None => {
            let calls = refs.iter().map(|r| {
                let url = url_of(r);
                async move { inv.client.request(method, &url, None).await }
            });
            join_all(calls).await
        }
    };

    let mut failures: Vec<(&ResourceRef, CliError)> = Vec::new();
    let mut started: Vec<(&ResourceRef, Value)> = Vec::new();
    for (reference, response) in refs.iter().zip(responses) {
        match response {
            Ok(operation) => started.push((reference, operation)),
            Err(e) => failures.push((reference, with_resource_context(e, reference))),
        }
    }

    if ns.flag("async") {
        for (reference, operation) in &started {
            let poll_url = operation_url(operation, &inv.registry, Some(reference))?;
            inv.console
                .status(&format!("{verb} [{}] in progress: [{poll_url}].", reference.name()));
        }
    } else if !started.is_empty() {
        // Several operations get one bar; a single one gets a tracker
        let total = started.len();
        let mut bar = (total > 1).then(|| {
            ProgressBar::start(&inv.console, &format!("{verb}: waiting for {total} operations"))
        });
        let tracker = bar.is_none().then(|| {
            let names: Vec<&str> = started.iter().map(|(r, _)| r.name()).collect();
            ProgressTracker::start(&inv.console, &format!("{verb} [{}]", names.join(", ")), Vec::new())
        });

        let poller = OperationPoller::new(&inv.client, inv.poller.clone()).with_interrupt(&inv.interrupt);
        let mut pending: FuturesUnordered<_> = started
            .iter()
            .enumerate()
            .map(|(index, (reference, operation))| {
                let poller = &poller;
                async move {
                    let outcome = match operation_url(operation, &inv.registry, Some(reference)) {
                        Ok(poll_url) => poller.wait(operation.clone(), &poll_url, None).await,
                        Err(e) => Err(e),
                    };
                    (index, outcome)
                }
            })
            .collect();
        let mut outcomes: Vec<Option<Result<Value>>> = (0..total).map(|_| None).collect();
        let mut completed = 0;
        while let Some((index, outcome)) = pending.next().await {
            completed += 1;
            if let Some(bar) = bar.as_mut() {
                bar.set_progress(completed as f64 / total as f64);
            }
            outcomes[index] = Some(outcome);
        }

        let mut interrupted = false;
        let mut finished = Vec::new();
        for ((reference, _), outcome) in started.iter().zip(outcomes) {
            match outcome {
                Some(Ok(_)) => finished.push(reference.self_link()),
                Some(Err(e)) => {
                    interrupted |= matches!(e, CliError::Cancelled(_));
                    failures.push((reference, e));
                }
                None => failures.push((
                    reference,
                    CliError::Internal(format!("No outcome for [{}]", reference.name())),
                )),
            }
        }
        let status = match (interrupted, failures.is_empty()) {
            (true, _) => ProgressStatus::Interrupted,
            (false, true) => ProgressStatus::Success,
            (false, false) => ProgressStatus::Failure,
        };
        if let Some(bar) = bar {
            match status {
                ProgressStatus::Success => bar.finish(),
                other => bar.abandon(other),
            }
        }
        if let Some(tracker) = tracker {
            match status {
                ProgressStatus::Success => tracker.succeed(),
                ProgressStatus::Failure => tracker.fail(),
                ProgressStatus::Interrupted => tracker.interrupt(),
            }
        }
        for link in finished {
            inv.console.status(&format!("{done} [{link}]."));
        }
    }

    if refs.len() == 1 {
        // A lone failure keeps its own error kind and exit code
        if let Some((_, error)) = failures.pop() {
            return Err(error);
        }
    }
    if failures.is_empty() {
        return Ok(());
    }
    Err(CliError::Bulk {
        failed: failures.len(),
        total: refs.len(),
        errors: failures
            .into_iter()
            .map(|(reference, e)| format!(" - {}: {}", reference.self_link(), e))
            .collect(),
    })
}

fn labels_of(resource: &Value) -> BTreeMap<String, String> {
    resource
        .get("labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

async fn update_labels(inv: &Invocation, ns: &Namespace, add: bool) -> Result<()> {
    let reference = resolver::resolve_one(inv, concept(ns)?).await?;
    let resource = inv
        .client
        .get(&reference.self_link())
        .await
        .map_err(|e| with_resource_context(e, &reference))?;

    let current = labels_of(&resource);
    let mut labels = current.clone();
    if add {
        if let Some(ArgValue::Map(new)) = ns.arg_value("labels") {
            labels.extend(new);
        }
    } else if ns.flag("all") {
        labels.clear();
    } else {
        for key in ns.values("labels") {
            labels.remove(key);
        }
    }

    if labels == current {
        inv.console.status(&format!(
            "No change requested; skipping update for [{}].",
            reference.name()
        ));
        return Ok(());
    }

    let mut request = inv.schemas.new_message("compute.SetLabelsRequest")?;
    let label_map: Map<String, Value> = labels
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    request.set("labels", Value::Object(label_map))?;
    if let Some(fingerprint) = resource.get("labelFingerprint") {
        request.set("labelFingerprint", fingerprint.clone())?;
    }

    let operation = inv
        .client
        .post(&reference.method_url("setLabels"), Some(&request.to_value()))
        .await?;
    let message = format!("Updating labels of {} [{}]", noun(ns), reference.name());
    if wait_for(inv, ns, operation, &reference, &message, false).await?.is_some() {
        inv.console
            .status(&format!("Updated [{}].", reference.self_link()));
    }
    Ok(())
}

fn display_policy(inv: &Invocation, ns: &Namespace, policy: &Policy) -> Result<()> {
    display::display_one(inv, ns, &serde_json::to_value(policy)?)
}

async fn get_iam_policy(inv: &Invocation, ns: &Namespace) -> Result<()> {
    let reference = resolver::resolve_one(inv, concept(ns)?).await?;
    let policy = IamHelper::new(&inv.client, &reference)
        .get_policy()
        .await
        .map_err(|e| with_resource_context(e, &reference))?;
    display_policy(inv, ns, &policy)
}

async fn set_iam_policy(inv: &Invocation, ns: &Namespace) -> Result<()> {
    let reference = resolver::resolve_one(inv, concept(ns)?).await?;
    let path = ns.get_or_raise("policy_file")?;
    let policy = iam::read_policy_file(Path::new(path))?;

    if policy.etag.is_none() && inv.can_prompt() {
        let message = "The policy file has no etag. Setting it will overwrite any changes made to the policy since it was read.";
        if !inv
            .console
            .prompt_continue(Some(message), "Do you want to continue", true)?
        {
            return Err(CliError::Cancelled("Aborted by user.".to_string()));
        }
    }

    let stored = IamHelper::new(&inv.client, &reference)
        .set_policy(&policy)
        .await?;
    inv.console.status(&format!(
        "Updated IAM policy for {} [{}].",
        noun(ns),
        reference.name()
    ));
    display_policy(inv, ns, &stored)
}

async fn change_iam_binding(inv: &Invocation, ns: &Namespace, add: bool) -> Result<()> {
    let reference = resolver::resolve_one(inv, concept(ns)?).await?;
    let member = ns.get_or_raise("member")?;
    let role = ns.get_or_raise("role")?;
    let pairs: Vec<(String, String)> = match ns.arg_value("condition") {
        Some(ArgValue::Map(map)) => map.into_iter().collect(),
        _ => Vec::new(),
    };
    let condition = iam::parse_condition(&pairs)?;

    let helper = IamHelper::new(&inv.client, &reference);
    let policy = if add {
        helper.add_binding(role, member, condition.as_ref()).await?
    } else {
        helper.remove_binding(role, member, condition.as_ref()).await?
    };
    inv.console.status(&format!(
        "Updated IAM policy for {} [{}].",
        noun(ns),
        reference.name()
    ));
    display_policy(inv, ns, &policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Registry;

    fn instance() -> ResourceRef {
        Registry::global()
            .parse(
                "projects/p/zones/us-central1-a/instances/vm",
                Some("compute.instances"),
                &BTreeMap::new(),
            )
            .unwrap()
    }

    #[test]
    fn test_expand_value_template() {
        let r = instance();
        assert_eq!(
            expand_value("zones/{zone}/machineTypes/{value}", "e2-small", &r),
            "zones/us-central1-a/machineTypes/e2-small"
        );
        assert_eq!(
            expand_value("zones/{zone}/machineTypes/{value}", "zones/z/machineTypes/m", &r),
            "zones/z/machineTypes/m"
        );
    }

    #[test]
    fn test_describe_targets() {
        let text = describe_targets(&[instance()]);
        assert_eq!(text, " - [vm] in [us-central1-a]");
    }

    #[test]
    fn test_labels_of() {
        let labels = labels_of(&serde_json::json!({"labels": {"env": "prod"}}));
        assert_eq!(labels.get("env").map(String::as_str), Some("prod"));
        assert!(labels_of(&serde_json::json!({})).is_empty());
    }
}
