//! The `provision` subcommand.
//!
//! Provisions one or more environments for a project. Environments are
//! independent of each other and run concurrently, each with its own
//! status board; a Ctrl-C cancels all of them through a shared token.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chat::{ConsoleSink, CorrelationId, Destination, MessageSink, OutboundMessage, WebhookSink};
use clap::Args;
use openshift::{OcCli, OcRunner};
use provision::steps::OUTPUT_ENDPOINT;
use provision::{
    Orchestrator, PlatformRunner, ProgressBoard, ProvisionError, RunContext, RunObserver,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::SubatomicConfig;
use crate::pipeline::{build_pipeline, EnvironmentRequest};
use crate::ui;

/// Provision one or more environments for a project.
#[derive(Args)]
pub struct ProvisionCommand {
    /// Project to provision environments for.
    project: String,

    /// Environments to provision.
    #[arg(
        long = "env",
        value_name = "NAME",
        default_values_t = ["dev".to_string(), "sit".to_string(), "uat".to_string()]
    )]
    environments: Vec<String>,

    /// Application template to instantiate in each environment.
    #[arg(long)]
    template: Option<String>,

    /// Application name; names the deployment and route.
    #[arg(long, default_value = "app")]
    application: String,

    /// Service account whose token is fetched for CI.
    #[arg(long, default_value = "jenkins")]
    service_account: String,

    /// Credential entry for each environment's secret (repeatable).
    #[arg(long = "secret", value_name = "KEY=VALUE")]
    secrets: Vec<String>,

    /// Configuration file.
    #[arg(long, env = "SUBATOMIC_CONFIG", default_value = "subatomic.yaml")]
    config: PathBuf,
}

impl ProvisionCommand {
    /// Execute the command.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments or configuration are invalid, or
    /// if any environment fails to provision.
    pub async fn run(self) -> Result<()> {
        let config = SubatomicConfig::load(&self.config)?;
        let secrets = parse_secrets(&self.secrets)?;

        // Config file first, then the environment, then the terminal.
        let sink: Arc<dyn MessageSink> = match &config.chat.webhook_url {
            Some(url) => Arc::new(WebhookSink::new(url.clone())),
            None => {
                let sink = WebhookSink::from_env();
                if sink.enabled() {
                    Arc::new(sink)
                } else {
                    Arc::new(ConsoleSink::new())
                }
            }
        };
        let destination = Destination::Channel(config.chat.channel.clone());

        let mut oc = OcCli::new(config.platform.oc_binary.clone());
        if let Some(kubeconfig) = config.platform.kubeconfig.clone() {
            oc = oc.with_kubeconfig(kubeconfig);
        }
        let runner: Arc<dyn PlatformRunner> = Arc::new(OcRunner::new(oc));

        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling runs");
                    cancel.cancel();
                }
            });
        }

        ui::print_section(&format!(
            "Provisioning {} [{}]",
            self.project,
            self.environments.join(", ")
        ));

        let observer = ChatObserver {
            sink: sink.clone(),
            destination: destination.clone(),
        };
        let config_ref = &config;
        let observer_ref = &observer;

        let runs = self.environments.iter().map(|environment| {
            let request = EnvironmentRequest {
                project: self.project.clone(),
                environment: environment.clone(),
                template: self.template.clone(),
                application: self.application.clone(),
                service_account: self.service_account.clone(),
                secrets: secrets.clone(),
            };
            let runner = runner.clone();
            let sink = sink.clone();
            let destination = destination.clone();
            let cancel = cancel.clone();

            async move {
                let outcome = async {
                    let pipeline = build_pipeline(&request)?;
                    let board = ProgressBoard::new(request.title(), sink, destination);

                    let mut orchestrator = Orchestrator::new(runner, board, pipeline)
                        .with_retry_policy(config_ref.rollout.to_policy())
                        .with_cancellation(cancel);
                    if let Some(deadline) = config_ref.run_deadline() {
                        orchestrator = orchestrator.with_deadline(deadline);
                    }

                    orchestrator.run(observer_ref).await
                }
                .await;

                (request.environment, outcome)
            }
        });
        let results = futures::future::join_all(runs).await;

        let mut failures = 0;
        for (environment, outcome) in results {
            match outcome {
                Ok(cx) => match cx.output(OUTPUT_ENDPOINT) {
                    Some(endpoint) => {
                        ui::print_success(&format!("{environment}: provisioned, {endpoint}"));
                    }
                    None => ui::print_success(&format!("{environment}: provisioned")),
                },
                Err(e) => {
                    failures += 1;
                    ui::print_error(&format!("{environment}: {e}"));
                }
            }
        }

        if failures > 0 {
            ui::print_warning("Partial infrastructure is left in place; re-run to resume");
            bail!(
                "{failures} of {} environments failed",
                self.environments.len()
            );
        }

        ui::print_info("All environments provisioned");
        Ok(())
    }
}

/// Observer posting a one-off run summary to the chat destination.
///
/// Summaries are separate messages, not board updates, so each send uses a
/// fresh correlation id. Delivery failures are logged, never fatal.
struct ChatObserver {
    sink: Arc<dyn MessageSink>,
    destination: Destination,
}

impl ChatObserver {
    async fn send(&self, body: String) {
        let message = OutboundMessage {
            destination: self.destination.clone(),
            correlation_id: CorrelationId::new(),
            body,
        };
        if let Err(e) = self.sink.post(&message).await {
            warn!(sink = self.sink.name(), error = %e, "Failed to send run summary");
        }
    }
}

#[async_trait]
impl RunObserver for ChatObserver {
    async fn on_completed(&self, cx: &RunContext) {
        let mut body = format!("✅ {} finished successfully.", cx.title());
        if let Some(endpoint) = cx.output(OUTPUT_ENDPOINT) {
            body.push_str(&format!("\nEndpoint: {endpoint}"));
        }
        self.send(body).await;
    }

    async fn on_aborted(&self, cx: &RunContext, error: &ProvisionError) {
        self.send(format!("❌ {} aborted: {error}", cx.title()))
            .await;
    }
}

/// Parse repeated `KEY=VALUE` pairs into credential entries.
fn parse_secrets(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut entries = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid --secret '{pair}', expected KEY=VALUE"))?;
        if key.is_empty() {
            bail!("Invalid --secret '{pair}', key must not be empty");
        }
        entries.insert(key.to_string(), value.to_string());
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_secrets_splits_on_first_equals() {
        let entries = parse_secrets(&[
            "username=builder".to_string(),
            "password=a=b=c".to_string(),
        ])
        .unwrap();

        assert_eq!(entries.get("username").map(String::as_str), Some("builder"));
        assert_eq!(entries.get("password").map(String::as_str), Some("a=b=c"));
    }

    #[test]
    fn test_parse_secrets_rejects_malformed_pairs() {
        assert!(parse_secrets(&["no-equals".to_string()]).is_err());
        assert!(parse_secrets(&["=value".to_string()]).is_err());
    }

    #[test]
    fn test_parse_secrets_empty_input_is_fine() {
        assert!(parse_secrets(&[]).unwrap().is_empty());
    }
}
