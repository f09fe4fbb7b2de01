//! `PlatformRunner` implementation over the `oc` CLI.

use async_trait::async_trait;
use provision::{
    Applied, CredentialSpec, NamespaceSpec, PlatformRunner, ProvisionError, QuotaSpec,
    ResourceManifest, RolloutStatus, TemplateSpec,
};
use serde_json::json;
use tracing::debug;

use crate::cli::{is_already_exists, is_not_found, OcCli};
use crate::rollout::parse_rollout_status;

/// Platform runner shelling out to `oc`.
pub struct OcRunner {
    cli: OcCli,
}

impl OcRunner {
    /// Create a runner over a CLI handle.
    #[must_use]
    pub fn new(cli: OcCli) -> Self {
        Self { cli }
    }

    /// Apply a manifest via `oc apply -f -`, classifying the result.
    async fn apply_json(
        &self,
        operation: &str,
        namespace: &str,
        manifest: &serde_json::Value,
    ) -> Result<Applied, ProvisionError> {
        let body = serde_json::to_string(manifest)
            .map_err(|e| ProvisionError::configuration(operation, e))?;

        let output = self
            .cli
            .run_with_stdin(operation, &["apply", "-n", namespace, "-f", "-"], &body)
            .await?;

        if !output.success {
            return Err(ProvisionError::configuration(operation, output.stderr));
        }

        // `oc apply` reports "created", "configured" or "unchanged" per object.
        if output.stdout.contains("unchanged") {
            Ok(Applied::Unchanged)
        } else {
            Ok(Applied::Created)
        }
    }
}

/// Build the `ResourceQuota` manifest for a quota spec.
#[must_use]
pub fn quota_manifest(namespace: &str, quota: &QuotaSpec) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "ResourceQuota",
        "metadata": { "name": quota.name, "namespace": namespace },
        "spec": { "hard": quota.limits },
    })
}

/// Build the opaque `Secret` manifest for a credential spec.
#[must_use]
pub fn credential_manifest(spec: &CredentialSpec) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "Opaque",
        "metadata": { "name": spec.name, "namespace": spec.namespace },
        "stringData": spec.entries,
    })
}

/// Parse the object list produced by `oc process -o json`.
///
/// # Errors
///
/// Returns [`ProvisionError::Configuration`] if the output is not the
/// expected `List` of objects with kind and name.
pub fn parse_template_objects(
    namespace: &str,
    output: &str,
) -> Result<Vec<ResourceManifest>, ProvisionError> {
    let value: serde_json::Value = serde_json::from_str(output)
        .map_err(|e| ProvisionError::configuration("process-template", e))?;

    let items = value
        .get("items")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| {
            ProvisionError::configuration("process-template", "template output has no items list")
        })?;

    items
        .iter()
        .map(|item| {
            let kind = item
                .get("kind")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| {
                    ProvisionError::configuration("process-template", "object without kind")
                })?;
            let name = item
                .pointer("/metadata/name")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| {
                    ProvisionError::configuration("process-template", "object without name")
                })?;

            Ok(ResourceManifest {
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
                body: item.clone(),
            })
        })
        .collect()
}

#[async_trait]
impl PlatformRunner for OcRunner {
    async fn create_namespace(&self, spec: &NamespaceSpec) -> Result<Applied, ProvisionError> {
        let display = format!("--display-name={}", spec.display_name);
        let description = format!("--description={}", spec.description);

        let output = self
            .cli
            .run(
                "create-namespace",
                &["new-project", &spec.name, &display, &description],
            )
            .await?;

        if output.success {
            Ok(Applied::Created)
        } else if is_already_exists(&output.stderr) {
            Ok(Applied::Unchanged)
        } else {
            Err(ProvisionError::configuration(
                "create-namespace",
                output.stderr,
            ))
        }
    }

    async fn apply_quota(
        &self,
        namespace: &str,
        quota: &QuotaSpec,
    ) -> Result<Applied, ProvisionError> {
        self.apply_json("apply-quota", namespace, &quota_manifest(namespace, quota))
            .await
    }

    async fn process_template(
        &self,
        template: &TemplateSpec,
    ) -> Result<Vec<ResourceManifest>, ProvisionError> {
        let mut args = vec![
            "process".to_string(),
            template.name.clone(),
            "-n".to_string(),
            template.namespace.clone(),
            "-o".to_string(),
            "json".to_string(),
        ];
        for (key, value) in &template.parameters {
            args.push(format!("--param={key}={value}"));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        let stdout = self.cli.run_checked("process-template", &arg_refs).await?;
        let manifests = parse_template_objects(&template.namespace, &stdout)?;
        debug!(
            template = template.name,
            objects = manifests.len(),
            "Template processed"
        );
        Ok(manifests)
    }

    async fn apply_resource(&self, manifest: &ResourceManifest) -> Result<Applied, ProvisionError> {
        self.apply_json("apply-resource", &manifest.namespace, &manifest.body)
            .await
    }

    async fn rollout_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<RolloutStatus, ProvisionError> {
        let target = format!("deployment/{name}");
        let output = self
            .cli
            .run(
                "rollout-status",
                &[
                    "rollout",
                    "status",
                    &target,
                    "-n",
                    namespace,
                    "--watch=false",
                ],
            )
            .await?;

        Ok(parse_rollout_status(&output.combined()))
    }

    async fn create_credential(&self, spec: &CredentialSpec) -> Result<Applied, ProvisionError> {
        self.apply_json(
            "create-credential",
            &spec.namespace,
            &credential_manifest(spec),
        )
        .await
    }

    async fn service_token(
        &self,
        namespace: &str,
        account: &str,
    ) -> Result<String, ProvisionError> {
        let token = self
            .cli
            .run_checked("service-token", &["create", "token", account, "-n", namespace])
            .await?;
        Ok(token.trim().to_string())
    }

    async fn route_host(
        &self,
        namespace: &str,
        route: &str,
    ) -> Result<Option<String>, ProvisionError> {
        let output = self
            .cli
            .run(
                "route-host",
                &[
                    "get",
                    "route",
                    route,
                    "-n",
                    namespace,
                    "-o",
                    "jsonpath={.spec.host}",
                ],
            )
            .await?;

        if output.success {
            let host = output.stdout.trim();
            if host.is_empty() {
                Ok(None)
            } else {
                Ok(Some(host.to_string()))
            }
        } else if is_not_found(&output.stderr) {
            Ok(None)
        } else {
            Err(ProvisionError::configuration("route-host", output.stderr))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_quota_manifest_shape() {
        let mut limits = BTreeMap::new();
        limits.insert("limits.cpu".to_string(), "4".to_string());
        limits.insert("limits.memory".to_string(), "8Gi".to_string());

        let manifest = quota_manifest(
            "team-a-dev",
            &QuotaSpec {
                name: "default-quota".to_string(),
                limits,
            },
        );

        assert_eq!(manifest["kind"], "ResourceQuota");
        assert_eq!(manifest["metadata"]["namespace"], "team-a-dev");
        assert_eq!(manifest["spec"]["hard"]["limits.cpu"], "4");
    }

    #[test]
    fn test_credential_manifest_is_an_opaque_secret() {
        let mut entries = BTreeMap::new();
        entries.insert("username".to_string(), "builder".to_string());

        let manifest = credential_manifest(&CredentialSpec {
            name: "bitbucket-creds".to_string(),
            namespace: "team-a-dev".to_string(),
            entries,
        });

        assert_eq!(manifest["kind"], "Secret");
        assert_eq!(manifest["type"], "Opaque");
        assert_eq!(manifest["stringData"]["username"], "builder");
    }

    #[test]
    fn test_parse_template_objects() {
        let output = r#"{
            "kind": "List",
            "items": [
                { "kind": "DeploymentConfig", "metadata": { "name": "app" } },
                { "kind": "Service", "metadata": { "name": "app" } }
            ]
        }"#;

        let manifests = parse_template_objects("team-a-dev", output).unwrap();
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].kind, "DeploymentConfig");
        assert_eq!(manifests[1].kind, "Service");
        assert!(manifests.iter().all(|m| m.namespace == "team-a-dev"));
    }

    #[test]
    fn test_parse_template_objects_rejects_garbage() {
        let err = parse_template_objects("team-a-dev", "not json").unwrap_err();
        assert!(matches!(err, ProvisionError::Configuration { .. }));

        let err = parse_template_objects("team-a-dev", r#"{"kind":"List"}"#).unwrap_err();
        assert!(matches!(err, ProvisionError::Configuration { .. }));
    }
}
