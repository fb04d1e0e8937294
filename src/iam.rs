//! IAM policy read-modify-write
//!
//! Policies are fetched, edited in memory and written back with the etag
//! they were read with. A conflicting write (the etag moved underneath us)
//! restarts the whole cycle once before the conflict is surfaced.

use crate::error::{CliError, Result};
use crate::gcp::client::GcpClient;
use crate::resource::reference::MethodStyle;
use crate::resource::ResourceRef;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;

/// Policy version needed for conditional bindings
pub const CONDITIONAL_POLICY_VERSION: i64 = 3;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Fields this helper does not edit, such as `auditConfigs`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
}

impl Policy {
    /// Add `member` to `role`; false when it was already there
    pub fn add_binding(&mut self, role: &str, member: &str, condition: Option<&Value>) -> bool {
        if condition.is_some() {
            self.version = Some(CONDITIONAL_POLICY_VERSION);
        }
        if let Some(binding) = self
            .bindings
            .iter_mut()
            .find(|b| b.role == role && b.condition.as_ref() == condition)
        {
            if binding.members.iter().any(|m| m == member) {
                return false;
            }
            binding.members.push(member.to_string());
            return true;
        }
        self.bindings.push(Binding {
            role: role.to_string(),
            members: vec![member.to_string()],
            condition: condition.cloned(),
        });
        true
    }

    /// Remove `member` from `role`, dropping bindings left empty; false when nothing matched
    pub fn remove_binding(&mut self, role: &str, member: &str, condition: Option<&Value>) -> bool {
        let mut changed = false;
        for binding in self
            .bindings
            .iter_mut()
            .filter(|b| b.role == role && b.condition.as_ref() == condition)
        {
            let before = binding.members.len();
            binding.members.retain(|m| m != member);
            changed |= binding.members.len() != before;
        }
        self.bindings.retain(|b| !b.members.is_empty());
        changed
    }
}

/// Parse the `--condition` flag: `expression=...,title=...[,description=...]` or `None`
pub fn parse_condition(pairs: &[(String, String)]) -> Result<Option<Value>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    if pairs.len() == 1 && pairs[0].0.eq_ignore_ascii_case("none") && pairs[0].1.is_empty() {
        return Ok(None);
    }
    let mut condition = Map::new();
    for (key, value) in pairs {
        match key.as_str() {
            "expression" | "title" | "description" => {
                condition.insert(key.clone(), Value::String(value.clone()));
            }
            other => {
                return Err(CliError::bind(
                    "--condition",
                    format!("unknown key [{other}]; expected expression, title or description"),
                ))
            }
        }
    }
    for required in ["expression", "title"] {
        if !condition.contains_key(required) {
            return Err(CliError::bind(
                "--condition",
                format!("[{required}] is required when a condition is given"),
            ));
        }
    }
    Ok(Some(Value::Object(condition)))
}

/// Load and validate a policy file (JSON, else YAML)
pub fn read_policy_file(path: &Path) -> Result<Policy> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(_) => serde_yaml::from_str(&content)?,
    };
    validate_policy(&value)?;
    Ok(serde_json::from_value(value)?)
}

/// Check the minimal `{version, bindings[], etag?}` shape, naming the first bad path
pub fn validate_policy(value: &Value) -> Result<()> {
    let invalid = |path: &str, message: &str| CliError::Validation {
        path: path.to_string(),
        message: message.to_string(),
    };
    let Some(policy) = value.as_object() else {
        return Err(invalid("", "policy must be a mapping"));
    };
    if let Some(version) = policy.get("version") {
        if !version.is_i64() {
            return Err(invalid("version", "must be an integer"));
        }
    }
    if let Some(etag) = policy.get("etag") {
        if !etag.is_string() {
            return Err(invalid("etag", "must be a string"));
        }
    }
    let Some(bindings) = policy.get("bindings") else {
        return Ok(());
    };
    let Some(bindings) = bindings.as_array() else {
        return Err(invalid("bindings", "must be a list"));
    };
    for (i, binding) in bindings.iter().enumerate() {
        match binding.get("role") {
            Some(Value::String(role)) if !role.is_empty() => {}
            _ => return Err(invalid(&format!("bindings[{i}].role"), "a role is required")),
        }
        match binding.get("members") {
            Some(Value::Array(members)) if members.iter().all(Value::is_string) => {}
            _ => {
                return Err(invalid(
                    &format!("bindings[{i}].members"),
                    "must be a list of strings",
                ))
            }
        }
    }
    Ok(())
}

/// Reads and writes the policy of one resource
pub struct IamHelper<'a> {
    client: &'a GcpClient,
    resource: &'a ResourceRef,
}

impl<'a> IamHelper<'a> {
    pub fn new(client: &'a GcpClient, resource: &'a ResourceRef) -> Self {
        Self { client, resource }
    }

    pub async fn get_policy(&self) -> Result<Policy> {
        let response = match self.resource.method_style {
            MethodStyle::Colon => {
                let body = json!({"options": {"requestedPolicyVersion": CONDITIONAL_POLICY_VERSION}});
                self.client
                    .post(&self.resource.method_url("getIamPolicy"), Some(&body))
                    .await?
            }
            MethodStyle::Slash => {
                let url = format!(
                    "{}?optionsRequestedPolicyVersion={}",
                    self.resource.method_url("getIamPolicy"),
                    CONDITIONAL_POLICY_VERSION
                );
                self.client.get(&url).await?
            }
        };
        Ok(serde_json::from_value(response)?)
    }

    /// Write `policy`; the server answers with the policy it accepted
    pub async fn set_policy(&self, policy: &Policy) -> Result<Policy> {
        let body = json!({"policy": policy});
        let response = self
            .client
            .post(&self.resource.method_url("setIamPolicy"), Some(&body))
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Fetch, apply `edit`, and write back when it changed something
    ///
    /// Returns the stored policy. A 409 or 412 on write restarts the cycle once.
    pub async fn update<F>(&self, mut edit: F) -> Result<Policy>
    where
        F: FnMut(&mut Policy) -> bool,
    {
        let mut retried = false;
        loop {
            let mut policy = self.get_policy().await?;
            if !edit(&mut policy) {
                tracing::info!("Policy of {} unchanged; skipping write", self.resource);
                return Ok(policy);
            }
            match self.set_policy(&policy).await {
                Ok(stored) => return Ok(stored),
                Err(e) if !retried && e.http().is_some_and(|h| h.is_conflict()) => {
                    tracing::warn!("Policy of {} changed concurrently; retrying", self.resource);
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn add_binding(&self, role: &str, member: &str, condition: Option<&Value>) -> Result<Policy> {
        self.update(|policy| policy.add_binding(role, member, condition))
            .await
    }

    pub async fn remove_binding(
        &self,
        role: &str,
        member: &str,
        condition: Option<&Value>,
    ) -> Result<Policy> {
        self.update(|policy| policy.remove_binding(role, member, condition))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Policy {
        serde_json::from_value(json!({
            "version": 1,
            "bindings": [{"role": "roles/viewer", "members": ["user:a@x", "user:b@x"]}],
            "etag": "EtAg"
        }))
        .unwrap()
    }

    #[test]
    fn test_add_binding_is_idempotent() {
        let mut p = policy();
        assert!(p.add_binding("roles/editor", "user:c@x", None));
        assert!(!p.add_binding("roles/editor", "user:c@x", None));
        assert!(!p.add_binding("roles/viewer", "user:a@x", None));
        assert_eq!(p.bindings.len(), 2);
        assert_eq!(p.bindings[1].members, vec!["user:c@x"]);
    }

    #[test]
    fn test_members_compared_exactly() {
        let mut p = policy();
        assert!(p.add_binding("roles/viewer", "User:a@x", None));
        assert_eq!(p.bindings[0].members.len(), 3);
    }

    #[test]
    fn test_remove_binding_drops_empty_bindings() {
        let mut p = policy();
        assert!(p.remove_binding("roles/viewer", "user:a@x", None));
        assert!(!p.remove_binding("roles/viewer", "user:a@x", None));
        assert!(p.remove_binding("roles/viewer", "user:b@x", None));
        assert!(p.bindings.is_empty());
    }

    #[test]
    fn test_serialization_keeps_etag_and_order() {
        let mut p = policy();
        p.remove_binding("roles/viewer", "user:a@x", None);
        let body = serde_json::to_string(&p).unwrap();
        assert_eq!(
            body,
            r#"{"version":1,"bindings":[{"role":"roles/viewer","members":["user:b@x"]}],"etag":"EtAg"}"#
        );
    }

    #[test]
    fn test_conditional_binding_bumps_version() {
        let mut p = policy();
        let condition = parse_condition(&[
            ("expression".into(), "request.time < timestamp('2030-01-01T00:00:00Z')".into()),
            ("title".into(), "expires".into()),
        ])
        .unwrap();
        assert!(p.add_binding("roles/viewer", "user:a@x", condition.as_ref()));
        assert_eq!(p.version, Some(3));
        assert_eq!(p.bindings.len(), 2);
    }

    #[test]
    fn test_parse_condition_variants() {
        assert_eq!(parse_condition(&[("None".into(), String::new())]).unwrap(), None);
        assert!(parse_condition(&[("title".into(), "t".into())]).is_err());
        assert!(parse_condition(&[("colour".into(), "red".into())]).is_err());
    }

    #[test]
    fn test_validate_policy_names_path() {
        let err = validate_policy(&json!({"bindings": [{"members": ["user:a@x"]}]})).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref path, .. } if path == "bindings[0].role"));
        assert!(validate_policy(&json!({"version": "one"})).is_err());
        assert!(validate_policy(&json!({"bindings": []})).is_ok());
    }

    #[test]
    fn test_read_policy_file_accepts_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(
            &path,
            "bindings:\n- role: roles/owner\n  members:\n  - user:o@x\netag: BwX\nversion: 1\n",
        )
        .unwrap();
        let policy = read_policy_file(&path).unwrap();
        assert_eq!(policy.etag.as_deref(), Some("BwX"));
        assert_eq!(policy.bindings[0].role, "roles/owner");
    }
}
