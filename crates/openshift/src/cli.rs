//! Thin wrapper around the `oc` binary.

use std::path::PathBuf;
use std::process::Stdio;

use provision::ProvisionError;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one `oc` invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Whether the process exited zero.
    pub success: bool,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// stdout and stderr, concatenated for parsers that need both.
    #[must_use]
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Handle on the `oc` binary.
#[derive(Debug, Clone)]
pub struct OcCli {
    binary: String,
    kubeconfig: Option<PathBuf>,
}

impl OcCli {
    /// Create a CLI handle for a binary name or path.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig: None,
        }
    }

    /// Use an explicit kubeconfig instead of the ambient one.
    #[must_use]
    pub fn with_kubeconfig(mut self, kubeconfig: PathBuf) -> Self {
        self.kubeconfig = Some(kubeconfig);
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(ref kubeconfig) = self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd.args(args);
        cmd
    }

    /// Run `oc` and capture its output.
    ///
    /// A non-zero exit is not an error here; callers classify it. Failing
    /// to start the process at all is a transport failure.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Transport`] if the process cannot be run.
    pub async fn run(&self, operation: &str, args: &[&str]) -> Result<CommandOutput, ProvisionError> {
        debug!(operation, ?args, "Running oc");

        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| ProvisionError::transport(operation, e))?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run `oc` with data piped to stdin (`oc apply -f -` and friends).
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Transport`] if the process cannot be run
    /// or stdin cannot be written.
    pub async fn run_with_stdin(
        &self,
        operation: &str,
        args: &[&str],
        stdin_data: &str,
    ) -> Result<CommandOutput, ProvisionError> {
        debug!(operation, ?args, "Running oc with stdin");

        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProvisionError::transport(operation, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(stdin_data.as_bytes())
                .await
                .map_err(|e| ProvisionError::transport(operation, e))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProvisionError::transport(operation, e))?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run `oc` and require a zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Transport`] if the process cannot be run,
    /// or [`ProvisionError::Configuration`] carrying stderr on a non-zero
    /// exit.
    pub async fn run_checked(&self, operation: &str, args: &[&str]) -> Result<String, ProvisionError> {
        let output = self.run(operation, args).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(ProvisionError::configuration(operation, output.stderr))
        }
    }
}

/// Whether stderr reports the object as pre-existing.
#[must_use]
pub fn is_already_exists(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("already exists") || lower.contains("alreadyexists")
}

/// Whether stderr reports the object as missing.
#[must_use]
pub fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("notfound") || lower.contains("not found")
}
