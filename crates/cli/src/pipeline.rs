//! Translates a provisioning request into a step pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use provision::steps::{
    ApplyQuota, CreateCredential, CreateNamespace, FetchServiceToken, InstantiateTemplate,
    ResolveRoute, RolloutDeployment,
};
use provision::{
    CredentialSpec, NamespaceSpec, Pipeline, ProvisionStep, QuotaSpec, RegistryError, TemplateSpec,
};

/// One environment to provision for a project.
#[derive(Debug, Clone)]
pub struct EnvironmentRequest {
    /// Project the environment belongs to.
    pub project: String,
    /// Environment name (`dev`, `sit`, `uat`, ...).
    pub environment: String,
    /// Application template to instantiate, if any.
    pub template: Option<String>,
    /// Application name; names the deployment and route.
    pub application: String,
    /// Service account whose token is fetched for CI.
    pub service_account: String,
    /// Credential entries for the environment's secret.
    pub secrets: BTreeMap<String, String>,
}

impl EnvironmentRequest {
    /// Namespace the environment lives in.
    #[must_use]
    pub fn namespace(&self) -> String {
        format!("{}-{}", self.project, self.environment)
    }

    /// Board title for this environment's run.
    #[must_use]
    pub fn title(&self) -> String {
        format!("Provisioning {} ({})", self.project, self.environment)
    }
}

/// Default quota applied to every provisioned namespace.
fn default_quota() -> QuotaSpec {
    let mut limits = BTreeMap::new();
    limits.insert("limits.cpu".to_string(), "4".to_string());
    limits.insert("limits.memory".to_string(), "8Gi".to_string());
    limits.insert("pods".to_string(), "20".to_string());
    QuotaSpec {
        name: "default-quota".to_string(),
        limits,
    }
}

/// Build the step pipeline for one environment.
///
/// Namespace and quota always run first, in order. Template instantiation
/// and the rollout wait only run when a template was requested. Credentials
/// and the service token have no mutual dependency and run concurrently.
///
/// # Errors
///
/// Returns [`RegistryError::DuplicateKey`] if two steps collide on a key,
/// which indicates a request construction bug.
pub fn build_pipeline(request: &EnvironmentRequest) -> Result<Pipeline, RegistryError> {
    let namespace = request.namespace();

    let mut builder = Pipeline::builder()
        .step(Arc::new(CreateNamespace::new(NamespaceSpec {
            name: namespace.clone(),
            display_name: format!("{} ({})", request.project, request.environment),
            description: format!("Delivery environment for {}", request.project),
        })))
        .step(Arc::new(ApplyQuota::new(namespace.clone(), default_quota())));

    if let Some(template) = &request.template {
        let mut parameters = BTreeMap::new();
        parameters.insert("APP_NAME".to_string(), request.application.clone());
        parameters.insert("ENV".to_string(), request.environment.clone());

        builder = builder
            .step(Arc::new(InstantiateTemplate::new(TemplateSpec {
                name: template.clone(),
                namespace: namespace.clone(),
                parameters,
            })))
            .step(Arc::new(RolloutDeployment::new(
                namespace.clone(),
                request.application.clone(),
            )));
    }

    let mut parallel: Vec<Arc<dyn ProvisionStep>> = Vec::new();
    if !request.secrets.is_empty() {
        parallel.push(Arc::new(CreateCredential::new(CredentialSpec {
            name: format!("{}-credentials", request.application),
            namespace: namespace.clone(),
            entries: request.secrets.clone(),
        })));
    }
    parallel.push(Arc::new(FetchServiceToken::new(
        namespace.clone(),
        request.service_account.clone(),
    )));
    builder = builder.parallel(parallel);

    builder
        .step(Arc::new(ResolveRoute::new(
            namespace,
            request.application.clone(),
        )))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> EnvironmentRequest {
        EnvironmentRequest {
            project: "team-a".to_string(),
            environment: "dev".to_string(),
            template: None,
            application: "app".to_string(),
            service_account: "jenkins".to_string(),
            secrets: BTreeMap::new(),
        }
    }

    #[test]
    fn test_namespace_is_project_dash_environment() {
        assert_eq!(request().namespace(), "team-a-dev");
    }

    #[test]
    fn test_minimal_request_skips_template_and_credentials() {
        let pipeline = build_pipeline(&request()).unwrap();
        // namespace, quota, token, route
        assert_eq!(pipeline.step_count(), 4);
    }

    #[test]
    fn test_full_request_builds_every_stage() {
        let mut req = request();
        req.template = Some("java-app".to_string());
        req.secrets
            .insert("username".to_string(), "builder".to_string());

        let pipeline = build_pipeline(&req).unwrap();
        // namespace, quota, template, rollout, credential + token, route
        assert_eq!(pipeline.step_count(), 7);

        let parallel = &pipeline.stages()[4];
        assert_eq!(parallel.steps().len(), 2);
    }

    #[test]
    fn test_environments_get_distinct_step_keys() {
        let dev = build_pipeline(&request()).unwrap();
        let mut req = request();
        req.environment = "sit".to_string();
        let sit = build_pipeline(&req).unwrap();

        let dev_keys: Vec<_> = dev
            .stages()
            .iter()
            .flat_map(|s| s.steps().iter().map(|step| step.key().to_string()))
            .collect();
        assert!(sit
            .stages()
            .iter()
            .flat_map(|s| s.steps().iter())
            .all(|step| !dev_keys.contains(&step.key().to_string())));
    }
}
