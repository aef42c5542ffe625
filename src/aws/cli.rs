//! Control-plane command execution
//!
//! Every mutation and query in this crate goes through one narrow contract:
//! issue a single administrative command under a fixed account identity and
//! hand back its parsed JSON output. The engine is generic over
//! [`ControlPlane`] so tests can substitute a scripted fake; production code
//! uses [`AwsCli`], which shells out to the `aws` binary.

use crate::aws::error::CliError;
use serde_json::Value;
use std::future::Future;
use tokio::process::Command;
use tracing::{debug, warn};

/// A control plane that can execute one administrative command per call.
///
/// Implementations issue exactly one external call per `run` invocation and
/// never retry; retry policy, if any, belongs to callers.
pub trait ControlPlane {
    /// Run `service subcommands… options…` under the fixed account identity.
    ///
    /// Returns the parsed JSON output on success, `Value::Null` when the
    /// command succeeded with empty output, and a typed error otherwise —
    /// callers can always tell "failed" from "legitimately empty".
    fn run(
        &self,
        service: &str,
        subcommands: &[&str],
        options: &[(&str, String)],
    ) -> impl Future<Output = Result<Value, CliError>>;
}

/// Control-plane client backed by the `aws` CLI.
///
/// The account identity (profile + region) is fixed at construction and
/// applied to every command; the engine never reads it from ambient
/// environment state.
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    profile: String,
    region: String,
}

impl AwsCli {
    /// Create a client issuing commands as `profile` in `region`.
    pub fn new(profile: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            program: "aws".to_string(),
            profile: profile.into(),
            region: region.into(),
        }
    }

    /// Override the executable to invoke (used by tests).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl ControlPlane for AwsCli {
    async fn run(
        &self,
        service: &str,
        subcommands: &[&str],
        options: &[(&str, String)],
    ) -> Result<Value, CliError> {
        let rendered = format!("{} {} {}", self.program, service, subcommands.join(" "));

        let mut command = Command::new(&self.program);
        command
            .arg(format!("--profile={}", self.profile))
            .arg(format!("--region={}", self.region))
            .arg(service);
        for subcommand in subcommands {
            command.arg(subcommand);
        }
        // Option values travel as discrete argv entries, so nothing is ever
        // re-interpreted by a shell.
        for (flag, value) in options {
            command.arg(flag).arg(value);
        }

        debug!(command = %rendered, "Issuing control-plane command");

        let output = command.output().await.map_err(|source| {
            warn!(command = %rendered, error = %source, "Control-plane command could not be spawned");
            CliError::Spawn {
                command: rendered.clone(),
                source,
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let status = output.status.code().unwrap_or(-1);
            warn!(command = %rendered, status, stderr = %stderr, "Control-plane command failed");
            return Err(CliError::Command {
                command: rendered,
                status,
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(stdout).map_err(|source| CliError::Parse {
            command: rendered,
            source,
        })
    }
}
