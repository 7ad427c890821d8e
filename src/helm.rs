use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::types::ReleaseRecord;

/// Hard bound on a single `helm list` invocation.
pub const HELM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum HelmError {
    #[error("helm exited with {status}: {stderr}")]
    Command {
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("helm did not finish within {0:?}")]
    Timeout(Duration),
    #[error("failed to run helm: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("failed to parse helm output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of release records. The production implementation shells out to
/// helm; tests substitute a scripted fake.
#[async_trait]
pub trait ReleaseLister: Send + Sync {
    /// List all releases across all namespaces. No retry at this layer;
    /// retry policy belongs to the scheduler.
    async fn list_releases(&self) -> Result<Vec<ReleaseRecord>, HelmError>;
}

/// Lists releases by invoking `helm list -A -o json` as a subprocess.
pub struct HelmCli {
    bin: String,
    timeout: Duration,
}

impl HelmCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            timeout: HELM_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ReleaseLister for HelmCli {
    async fn list_releases(&self) -> Result<Vec<ReleaseRecord>, HelmError> {
        debug!(bin = %self.bin, "Executing helm list command");

        // kill_on_drop reaps the child if the timeout fires while we are
        // still waiting on it.
        let child = Command::new(&self.bin)
            .args(["list", "-A", "-o", "json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(HelmError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(HelmError::Command {
                status: output.status,
                stderr,
            });
        }

        let releases: Vec<ReleaseRecord> = serde_json::from_slice(&output.stdout)?;
        info!(count = releases.len(), "Listed helm releases");
        Ok(releases)
    }
}
