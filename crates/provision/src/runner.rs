//! The platform capability the provisioning steps call into.
//!
//! The orchestrator is written against [`PlatformRunner`], never against a
//! concrete CLI or REST client. Implementations live at the edge (the
//! `openshift` crate shells out to `oc`); every operation is a suspension
//! point and may fail with [`ProvisionError::Transport`] on the way to the
//! platform or [`ProvisionError::Configuration`] when the platform answers
//! with something unusable.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;

/// Outcome of a create-style operation.
///
/// `Unchanged` means the object already existed; steps treat that as
/// success so operator-triggered re-runs stay safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The object was created.
    Created,
    /// The object already existed and was left in place.
    Unchanged,
}

/// Structured rollout state, parsed at the platform boundary.
///
/// The core never inspects command output strings; implementations convert
/// whatever the platform reports into this enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutStatus {
    /// The rollout finished and the platform confirmed it.
    Complete,
    /// The rollout is still making progress.
    Progressing,
    /// The platform gave up on the rollout.
    Failed {
        /// Reason reported by the platform.
        reason: String,
    },
}

impl RolloutStatus {
    /// Success predicate used with the retry primitive.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for RolloutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Progressing => write!(f, "progressing"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Request to create a namespace (an OpenShift project).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceSpec {
    /// Namespace name, e.g. `team-a-dev`.
    pub name: String,
    /// Display name shown in the platform console.
    pub display_name: String,
    /// Free-form description.
    pub description: String,
}

/// Resource quota applied to a namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSpec {
    /// Quota object name.
    pub name: String,
    /// Hard limits, e.g. `limits.cpu` -> `4`.
    pub limits: BTreeMap<String, String>,
}

/// Template to instantiate into a set of resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// Template name.
    pub name: String,
    /// Namespace the template lives in and is processed for.
    pub namespace: String,
    /// Template parameters.
    pub parameters: BTreeMap<String, String>,
}

/// One resource produced by template processing, ready to apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceManifest {
    /// Resource kind, e.g. `DeploymentConfig`.
    pub kind: String,
    /// Resource name.
    pub name: String,
    /// Target namespace.
    pub namespace: String,
    /// Full manifest body.
    pub body: serde_json::Value,
}

/// Credential (opaque secret) to register in a namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSpec {
    /// Secret name.
    pub name: String,
    /// Target namespace.
    pub namespace: String,
    /// Secret entries.
    pub entries: BTreeMap<String, String>,
}

/// Named operations against the external platform.
#[async_trait]
pub trait PlatformRunner: Send + Sync {
    /// Create a namespace, or report it unchanged if it already exists.
    async fn create_namespace(&self, spec: &NamespaceSpec) -> Result<Applied, ProvisionError>;

    /// Apply a resource quota to a namespace.
    async fn apply_quota(
        &self,
        namespace: &str,
        quota: &QuotaSpec,
    ) -> Result<Applied, ProvisionError>;

    /// Process a template into the resources it defines.
    async fn process_template(
        &self,
        template: &TemplateSpec,
    ) -> Result<Vec<ResourceManifest>, ProvisionError>;

    /// Apply one resource manifest.
    async fn apply_resource(&self, manifest: &ResourceManifest) -> Result<Applied, ProvisionError>;

    /// Report the current rollout state of a deployment.
    async fn rollout_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<RolloutStatus, ProvisionError>;

    /// Register a credential secret.
    async fn create_credential(&self, spec: &CredentialSpec) -> Result<Applied, ProvisionError>;

    /// Fetch a token for a service account.
    async fn service_token(&self, namespace: &str, account: &str)
        -> Result<String, ProvisionError>;

    /// Resolve the public host of a route, if the route exists.
    async fn route_host(
        &self,
        namespace: &str,
        route: &str,
    ) -> Result<Option<String>, ProvisionError>;
}
