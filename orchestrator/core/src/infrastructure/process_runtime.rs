// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Process-backed Execution Environment
//!
//! Every agent is a logical worker bound to the command configured for its
//! role. Each phase run starts that command as a child process:
//!
//! - the phase description is written to stdin;
//! - `CONDUCTOR_TASK_ID`, `CONDUCTOR_PHASE_ID`, `CONDUCTOR_ROLE`,
//!   `CONDUCTOR_ATTEMPT` and `CONDUCTOR_CONTEXT` (JSON) are set;
//! - stdout becomes the phase result (parsed as JSON when possible);
//! - stderr lines become the phase logs;
//! - a non-zero exit status is a phase failure carrying stderr as details.
//!
//! Terminating an agent kills its running child process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::config::{CommandSpec, EnvironmentConfig};
use crate::domain::role::Role;
use crate::domain::runtime::{
    AgentHandle, ExecutionEnvironment, PhaseAssignment, PhaseFailure, PhaseOutput,
    ResourceLimits, RuntimeError,
};

const DEPENDENCY_PLACEHOLDER: &str = "{dependency}";

pub struct ProcessEnvironment {
    config: EnvironmentConfig,
}

impl ProcessEnvironment {
    pub fn new(config: EnvironmentConfig) -> Self {
        Self { config }
    }

    fn command_for(&self, role: Role) -> Option<&CommandSpec> {
        self.config
            .commands
            .get(&role)
            .or(self.config.default_command.as_ref())
    }
}

#[async_trait]
impl ExecutionEnvironment for ProcessEnvironment {
    async fn spawn(
        &self,
        role: Role,
        limits: &ResourceLimits,
    ) -> Result<Arc<dyn AgentHandle>, RuntimeError> {
        let command = self.command_for(role).cloned().ok_or_else(|| {
            RuntimeError::SpawnFailed(format!("no command configured for role '{}'", role))
        })?;

        if limits.cpu_millis.is_some() || limits.memory_bytes.is_some() {
            debug!("CPU and memory limits are not enforced for process agents");
        }
        info!("Provisioned process agent for role '{}' ({})", role, command.program);

        Ok(Arc::new(ProcessAgent {
            role,
            command,
            install: self.config.install.clone(),
            working_dir: self.config.working_dir.clone(),
            alive: AtomicBool::new(true),
            cancel: CancellationToken::new(),
        }))
    }
}

pub struct ProcessAgent {
    role: Role,
    command: CommandSpec,
    install: Option<CommandSpec>,
    working_dir: Option<PathBuf>,
    alive: AtomicBool,
    cancel: CancellationToken,
}

impl ProcessAgent {
    fn base_command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

fn parse_result(stdout: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::Value::String(trimmed.to_string()))
}

#[async_trait]
impl AgentHandle for ProcessAgent {
    async fn run(&self, assignment: PhaseAssignment) -> Result<PhaseOutput, PhaseFailure> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(PhaseFailure::new("agent is terminated"));
        }

        let context = serde_json::to_string(&assignment.context).unwrap_or_else(|_| "{}".to_string());
        let mut cmd = self.base_command(&self.command);
        cmd.stdin(Stdio::piped())
            .env("CONDUCTOR_TASK_ID", assignment.task_id.to_string())
            .env("CONDUCTOR_PHASE_ID", assignment.phase_id.as_str())
            .env("CONDUCTOR_ROLE", self.role.as_str())
            .env("CONDUCTOR_ATTEMPT", assignment.attempt.to_string())
            .env("CONDUCTOR_CONTEXT", context);

        let mut child = cmd.spawn().map_err(|e| {
            PhaseFailure::new(format!("{}: {}", self.command.program, e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(assignment.description.as_bytes()).await {
                warn!("Failed to write phase description to stdin: {}", e);
            }
        }

        let output = tokio::select! {
            output = child.wait_with_output() => output
                .map_err(|e| PhaseFailure::new(format!("failed to wait for agent process: {}", e)))?,
            _ = self.cancel.cancelled() => {
                return Err(PhaseFailure::new("agent terminated while running"));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let logs: Vec<String> = stderr.lines().map(str::to_string).collect();

        if output.status.success() {
            return Ok(PhaseOutput {
                result: parse_result(&output.stdout),
                logs,
            });
        }

        let summary = logs
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| String::from_utf8_lossy(&output.stdout).trim().to_string());
        Err(PhaseFailure::new(format!("{} ({})", summary, output.status)).with_details(stderr))
    }

    async fn install(&self, dependency: &str) -> Result<(), RuntimeError> {
        let spec = self
            .install
            .as_ref()
            .ok_or_else(|| RuntimeError::Unsupported("no install command configured".to_string()))?;

        let mut spec = spec.clone();
        for arg in spec.args.iter_mut() {
            *arg = arg.replace(DEPENDENCY_PLACEHOLDER, dependency);
        }

        info!("Installing '{}' with {}", dependency, spec.program);
        let output = self
            .base_command(&spec)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RuntimeError::InstallFailed(format!("{}: {}", spec.program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::InstallFailed(format!(
                "{} exited with {}: {}",
                spec.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    async fn terminate(&self) -> Result<(), RuntimeError> {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.cancel.cancel();
            debug!("Process agent for role '{}' terminated", self.role);
        }
        Ok(())
    }

    async fn heartbeat(&self) -> Result<DateTime<Utc>, RuntimeError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(Utc::now())
        } else {
            Err(RuntimeError::HeartbeatFailed("agent is terminated".to_string()))
        }
    }
}
