//! Standard environment provisioning steps.
//!
//! Each step is one named external effect against the platform. Create-style
//! steps treat a pre-existing object as success (warn and continue), which
//! is what makes re-running an aborted pipeline safe.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::ProvisionError;
use crate::pipeline::{ProvisionStep, StepContext};
use crate::retry::{retry_until, RetryError};
use crate::runner::{
    Applied, CredentialSpec, NamespaceSpec, QuotaSpec, RolloutStatus, TemplateSpec,
};

/// Output key under which [`ResolveRoute`] records the public endpoint.
pub const OUTPUT_ENDPOINT: &str = "endpoint";

/// Create the environment's namespace.
pub struct CreateNamespace {
    key: String,
    spec: NamespaceSpec,
}

impl CreateNamespace {
    /// Build the step for a namespace spec.
    #[must_use]
    pub fn new(spec: NamespaceSpec) -> Self {
        Self {
            key: format!("namespace:{}", spec.name),
            spec,
        }
    }
}

#[async_trait]
impl ProvisionStep for CreateNamespace {
    fn key(&self) -> &str {
        &self.key
    }

    fn description(&self) -> String {
        format!("Create namespace {}", self.spec.name)
    }

    async fn run(&self, cx: &StepContext<'_>) -> Result<(), ProvisionError> {
        match cx.runner.create_namespace(&self.spec).await? {
            Applied::Created => info!(namespace = self.spec.name, "Namespace created"),
            Applied::Unchanged => warn!(
                namespace = self.spec.name,
                "Namespace already exists, leaving in place"
            ),
        }
        Ok(())
    }
}

/// Apply a resource quota to the namespace.
pub struct ApplyQuota {
    key: String,
    namespace: String,
    quota: QuotaSpec,
}

impl ApplyQuota {
    /// Build the step for a quota in a namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, quota: QuotaSpec) -> Self {
        let namespace = namespace.into();
        Self {
            key: format!("quota:{namespace}/{}", quota.name),
            namespace,
            quota,
        }
    }
}

#[async_trait]
impl ProvisionStep for ApplyQuota {
    fn key(&self) -> &str {
        &self.key
    }

    fn description(&self) -> String {
        format!("Apply resource quota {}", self.quota.name)
    }

    async fn run(&self, cx: &StepContext<'_>) -> Result<(), ProvisionError> {
        match cx.runner.apply_quota(&self.namespace, &self.quota).await? {
            Applied::Created => info!(quota = self.quota.name, "Quota applied"),
            Applied::Unchanged => warn!(
                quota = self.quota.name,
                "Quota already present, leaving in place"
            ),
        }
        Ok(())
    }
}

/// Process a template and apply every resource it produces.
pub struct InstantiateTemplate {
    key: String,
    template: TemplateSpec,
}

impl InstantiateTemplate {
    /// Build the step for a template spec.
    #[must_use]
    pub fn new(template: TemplateSpec) -> Self {
        Self {
            key: format!("template:{}", template.name),
            template,
        }
    }
}

#[async_trait]
impl ProvisionStep for InstantiateTemplate {
    fn key(&self) -> &str {
        &self.key
    }

    fn description(&self) -> String {
        format!("Instantiate template {}", self.template.name)
    }

    async fn run(&self, cx: &StepContext<'_>) -> Result<(), ProvisionError> {
        let manifests = cx.runner.process_template(&self.template).await?;

        if manifests.is_empty() {
            return Err(ProvisionError::configuration(
                "process-template",
                format!("template {} produced no resources", self.template.name),
            ));
        }

        for manifest in &manifests {
            match cx.runner.apply_resource(manifest).await? {
                Applied::Created => {
                    info!(kind = manifest.kind, name = manifest.name, "Resource applied");
                }
                Applied::Unchanged => {
                    warn!(
                        kind = manifest.kind,
                        name = manifest.name,
                        "Resource already exists, leaving in place"
                    );
                }
            }
        }

        info!(
            template = self.template.name,
            resources = manifests.len(),
            "Template instantiated"
        );
        Ok(())
    }
}

/// Poll a deployment rollout until the platform reports it complete.
pub struct RolloutDeployment {
    key: String,
    namespace: String,
    name: String,
}

impl RolloutDeployment {
    /// Build the step for a deployment in a namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let name = name.into();
        Self {
            key: format!("rollout:{namespace}/{name}"),
            namespace,
            name,
        }
    }
}

#[async_trait]
impl ProvisionStep for RolloutDeployment {
    fn key(&self) -> &str {
        &self.key
    }

    fn description(&self) -> String {
        format!("Roll out deployment {}", self.name)
    }

    async fn run(&self, cx: &StepContext<'_>) -> Result<(), ProvisionError> {
        retry_until(
            cx.retry,
            || async {
                let status = cx
                    .runner
                    .rollout_status(&self.namespace, &self.name)
                    .await?;

                // A rollout the platform has given up on is a hard failure,
                // not something to poll again.
                if let RolloutStatus::Failed { reason } = &status {
                    return Err(ProvisionError::configuration(
                        "rollout-status",
                        format!("rollout of {} failed: {reason}", self.name),
                    ));
                }
                Ok(status)
            },
            RolloutStatus::is_complete,
        )
        .await
        .map_err(RetryError::into_provision_error)?;

        info!(deployment = self.name, "Rollout complete");
        Ok(())
    }
}

/// Register a credential secret in the namespace.
pub struct CreateCredential {
    key: String,
    spec: CredentialSpec,
}

impl CreateCredential {
    /// Build the step for a credential spec.
    #[must_use]
    pub fn new(spec: CredentialSpec) -> Self {
        Self {
            key: format!("credential:{}/{}", spec.namespace, spec.name),
            spec,
        }
    }
}

#[async_trait]
impl ProvisionStep for CreateCredential {
    fn key(&self) -> &str {
        &self.key
    }

    fn description(&self) -> String {
        format!("Register credential {}", self.spec.name)
    }

    async fn run(&self, cx: &StepContext<'_>) -> Result<(), ProvisionError> {
        match cx.runner.create_credential(&self.spec).await? {
            Applied::Created => info!(credential = self.spec.name, "Credential registered"),
            Applied::Unchanged => warn!(
                credential = self.spec.name,
                "Credential already exists, leaving in place"
            ),
        }
        Ok(())
    }
}

/// Fetch a service-account token and record it as a run output.
pub struct FetchServiceToken {
    key: String,
    namespace: String,
    account: String,
}

impl FetchServiceToken {
    /// Build the step for a service account in a namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, account: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let account = account.into();
        Self {
            key: format!("token:{namespace}/{account}"),
            namespace,
            account,
        }
    }
}

#[async_trait]
impl ProvisionStep for FetchServiceToken {
    fn key(&self) -> &str {
        &self.key
    }

    fn description(&self) -> String {
        format!("Fetch service token for {}", self.account)
    }

    async fn run(&self, cx: &StepContext<'_>) -> Result<(), ProvisionError> {
        let token = cx
            .runner
            .service_token(&self.namespace, &self.account)
            .await?;

        if token.is_empty() {
            return Err(ProvisionError::configuration(
                "service-token",
                format!("empty token for service account {}", self.account),
            ));
        }

        // Never log the token itself.
        info!(
            account = self.account,
            token_len = token.len(),
            "Service token fetched"
        );
        cx.record_output(format!("service-token:{}", self.account), token);
        Ok(())
    }
}

/// Resolve the environment's public route host, if one exists yet.
pub struct ResolveRoute {
    key: String,
    namespace: String,
    route: String,
}

impl ResolveRoute {
    /// Build the step for a route in a namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, route: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let route = route.into();
        Self {
            key: format!("route:{namespace}/{route}"),
            namespace,
            route,
        }
    }
}

#[async_trait]
impl ProvisionStep for ResolveRoute {
    fn key(&self) -> &str {
        &self.key
    }

    fn description(&self) -> String {
        format!("Resolve route {}", self.route)
    }

    async fn run(&self, cx: &StepContext<'_>) -> Result<(), ProvisionError> {
        match cx.runner.route_host(&self.namespace, &self.route).await? {
            Some(host) => {
                info!(route = self.route, host, "Route resolved");
                cx.record_output(OUTPUT_ENDPOINT, format!("https://{host}"));
            }
            None => {
                // The template may not define a route; that is not a failure.
                info!(route = self.route, "No route found, skipping endpoint");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::runner::{PlatformRunner, ResourceManifest};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted platform used by the step tests.
    #[derive(Default)]
    struct ScriptedRunner {
        namespace_exists: bool,
        manifests: Vec<ResourceManifest>,
        rollout_script: Mutex<Vec<RolloutStatus>>,
        rollout_calls: AtomicU32,
        token: Option<String>,
        route: Option<String>,
    }

    #[async_trait]
    impl PlatformRunner for ScriptedRunner {
        async fn create_namespace(
            &self,
            _spec: &NamespaceSpec,
        ) -> Result<Applied, ProvisionError> {
            Ok(if self.namespace_exists {
                Applied::Unchanged
            } else {
                Applied::Created
            })
        }

        async fn apply_quota(
            &self,
            _namespace: &str,
            _quota: &QuotaSpec,
        ) -> Result<Applied, ProvisionError> {
            Ok(Applied::Created)
        }

        async fn process_template(
            &self,
            _template: &TemplateSpec,
        ) -> Result<Vec<ResourceManifest>, ProvisionError> {
            Ok(self.manifests.clone())
        }

        async fn apply_resource(
            &self,
            _manifest: &ResourceManifest,
        ) -> Result<Applied, ProvisionError> {
            Ok(Applied::Created)
        }

        async fn rollout_status(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> Result<RolloutStatus, ProvisionError> {
            self.rollout_calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.rollout_script.lock().unwrap();
            Ok(if script.is_empty() {
                RolloutStatus::Complete
            } else {
                script.remove(0)
            })
        }

        async fn create_credential(
            &self,
            _spec: &CredentialSpec,
        ) -> Result<Applied, ProvisionError> {
            Ok(Applied::Created)
        }

        async fn service_token(
            &self,
            _namespace: &str,
            _account: &str,
        ) -> Result<String, ProvisionError> {
            Ok(self.token.clone().unwrap_or_default())
        }

        async fn route_host(
            &self,
            _namespace: &str,
            _route: &str,
        ) -> Result<Option<String>, ProvisionError> {
            Ok(self.route.clone())
        }
    }

    fn manifest(kind: &str, name: &str) -> ResourceManifest {
        ResourceManifest {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: "team-a-dev".to_string(),
            body: serde_json::json!({ "kind": kind }),
        }
    }

    async fn run_step(
        step: &dyn ProvisionStep,
        runner: &ScriptedRunner,
        retry: &RetryPolicy,
    ) -> Result<BTreeMap<String, String>, ProvisionError> {
        let outputs = Mutex::new(BTreeMap::new());
        let cx = StepContext::new(runner, retry, &outputs);
        step.run(&cx).await?;
        Ok(outputs.into_inner().unwrap())
    }

    #[tokio::test]
    async fn test_existing_namespace_is_not_an_error() {
        let runner = ScriptedRunner {
            namespace_exists: true,
            ..Default::default()
        };
        let step = CreateNamespace::new(NamespaceSpec {
            name: "team-a-dev".to_string(),
            display_name: "Team A (dev)".to_string(),
            description: String::new(),
        });

        run_step(&step, &runner, &RetryPolicy::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_template_with_no_resources_is_a_configuration_error() {
        let runner = ScriptedRunner::default();
        let step = InstantiateTemplate::new(TemplateSpec {
            name: "java-app".to_string(),
            namespace: "team-a-dev".to_string(),
            parameters: BTreeMap::new(),
        });

        let err = run_step(&step, &runner, &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_template_applies_every_manifest() {
        let runner = ScriptedRunner {
            manifests: vec![
                manifest("DeploymentConfig", "app"),
                manifest("Service", "app"),
            ],
            ..Default::default()
        };
        let step = InstantiateTemplate::new(TemplateSpec {
            name: "java-app".to_string(),
            namespace: "team-a-dev".to_string(),
            parameters: BTreeMap::new(),
        });

        run_step(&step, &runner, &RetryPolicy::default())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollout_polls_until_complete() {
        let runner = ScriptedRunner {
            rollout_script: Mutex::new(vec![
                RolloutStatus::Progressing,
                RolloutStatus::Progressing,
                RolloutStatus::Complete,
            ]),
            ..Default::default()
        };
        let step = RolloutDeployment::new("team-a-dev", "app");
        let retry = RetryPolicy::fixed(60, Duration::from_secs(20));

        run_step(&step, &runner, &retry).await.unwrap();
        assert_eq!(runner.rollout_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_rollout_is_not_retried() {
        let runner = ScriptedRunner {
            rollout_script: Mutex::new(vec![RolloutStatus::Failed {
                reason: "progress deadline exceeded".to_string(),
            }]),
            ..Default::default()
        };
        let step = RolloutDeployment::new("team-a-dev", "app");
        let retry = RetryPolicy::fixed(60, Duration::from_secs(20));

        let err = run_step(&step, &runner, &retry).await.unwrap_err();
        assert_eq!(runner.rollout_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ProvisionError::Configuration { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollout_exhaustion_carries_last_status() {
        let runner = ScriptedRunner {
            rollout_script: Mutex::new(vec![RolloutStatus::Progressing; 10]),
            ..Default::default()
        };
        let step = RolloutDeployment::new("team-a-dev", "app");
        let retry = RetryPolicy::fixed(3, Duration::from_secs(20));

        let err = run_step(&step, &runner, &retry).await.unwrap_err();
        match err {
            ProvisionError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "progressing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_service_token_is_recorded_as_output() {
        let runner = ScriptedRunner {
            token: Some("sha256~abcdef".to_string()),
            ..Default::default()
        };
        let step = FetchServiceToken::new("team-a-dev", "jenkins");

        let outputs = run_step(&step, &runner, &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(
            outputs.get("service-token:jenkins").map(String::as_str),
            Some("sha256~abcdef")
        );
    }

    #[tokio::test]
    async fn test_empty_service_token_is_rejected() {
        let runner = ScriptedRunner::default();
        let step = FetchServiceToken::new("team-a-dev", "jenkins");

        let err = run_step(&step, &runner, &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_route_endpoint_is_recorded_when_present() {
        let runner = ScriptedRunner {
            route: Some("app-team-a-dev.apps.example.com".to_string()),
            ..Default::default()
        };
        let step = ResolveRoute::new("team-a-dev", "app");

        let outputs = run_step(&step, &runner, &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(
            outputs.get(OUTPUT_ENDPOINT).map(String::as_str),
            Some("https://app-team-a-dev.apps.example.com")
        );
    }

    #[tokio::test]
    async fn test_missing_route_is_not_an_error() {
        let runner = ScriptedRunner::default();
        let step = ResolveRoute::new("team-a-dev", "app");

        let outputs = run_step(&step, &runner, &RetryPolicy::default())
            .await
            .unwrap();
        assert!(outputs.is_empty());
    }
}
