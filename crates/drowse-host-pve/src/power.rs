//! Power-off of the local machine

use async_trait::async_trait;
use drowse_host_api::{ApiError, ApiErrorKind, ApiResult, LocalPower};
use tokio::process::Command;
use tracing::{info, warn};

/// Powers the local host off through the OS `shutdown` command
#[derive(Debug, Clone)]
pub struct SystemPower {
    program: String,
    args: Vec<String>,
}

impl SystemPower {
    pub fn new() -> Self {
        Self::with_command("shutdown", &["-h", "now"])
    }

    pub fn with_command(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Default for SystemPower {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalPower for SystemPower {
    async fn power_off(&self) -> ApiResult<()> {
        info!(program = %self.program, args = ?self.args, "Running local power-off");

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                ApiError::new(
                    ApiErrorKind::LocalCommand,
                    format!("failed to run {}: {}", self.program, e),
                )
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(status = %output.status, stderr = %stderr, "Local power-off command failed");
        Err(ApiError::new(
            ApiErrorKind::LocalCommand,
            format!("{} exited with {}: {}", self.program, output.status, stderr),
        ))
    }
}
