// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration
//
// Defines the YAML configuration for a Conductor node:
// - Scheduler concurrency ceiling and per-role caps
// - Agent pool heartbeat, lifetime and idle settings
// - Recovery thresholds, budgets and backoff
// - Coordination bus sizing
// - Roles served and the commands that host them
//
// Discovery, environment overrides and validation follow the same
// precedence as every other 100monkeys.ai node configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::role::{Role, RoleCatalog};
use crate::domain::runtime::ResourceLimits;

pub const CONFIG_PATH_ENV: &str = "CONDUCTOR_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub bus: BusConfig,

    /// Roles the execution environment can host. Empty means all roles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,

    #[serde(default)]
    pub environment: EnvironmentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on agents alive at once, and on phases assigned or running.
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,

    /// Optional tighter bound per role.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_role_caps: BTreeMap<Role, usize>,

    /// Wall-clock limit on a single phase run. `None` disables it.
    #[serde(default = "default_phase_timeout", with = "humantime_serde")]
    pub phase_timeout: Option<Duration>,
}

fn default_max_concurrent_agents() -> usize {
    10
}

fn default_phase_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30 * 60))
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: default_max_concurrent_agents(),
            per_role_caps: BTreeMap::new(),
            phase_timeout: default_phase_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum lifetime of a single agent.
    #[serde(default = "default_agent_timeout", with = "humantime_serde")]
    pub agent_timeout: Duration,

    #[serde(default = "default_heartbeat_interval", with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// An agent silent for longer than this is marked unhealthy.
    #[serde(default = "default_heartbeat_grace", with = "humantime_serde")]
    pub heartbeat_grace: Duration,

    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_millis: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

fn default_agent_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_heartbeat_grace() -> Duration {
    Duration::from_secs(60)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            agent_timeout: default_agent_timeout(),
            heartbeat_interval: default_heartbeat_interval(),
            heartbeat_grace: default_heartbeat_grace(),
            idle_timeout: default_idle_timeout(),
            cpu_millis: None,
            memory_bytes: None,
        }
    }
}

impl PoolConfig {
    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            wall_time: self.agent_timeout,
            cpu_millis: self.cpu_millis,
            memory_bytes: self.memory_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// A fix is applied automatically only when confidence exceeds this.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Failures a single phase may accumulate before it escalates.
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_phase: u32,

    /// Recovery decisions a whole task may take.
    #[serde(default = "default_max_task_attempts")]
    pub max_task_recovery_attempts: u32,

    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,

    #[serde(default = "default_backoff_max", with = "humantime_serde")]
    pub backoff_max: Duration,

    #[serde(default = "default_help_timeout", with = "humantime_serde")]
    pub help_timeout: Duration,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_task_attempts() -> u32 {
    10
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(2)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(60)
}

fn default_help_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_attempts_per_phase: default_max_attempts(),
            max_task_recovery_attempts: default_max_task_attempts(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
            help_timeout: default_help_timeout(),
        }
    }
}

impl RecoveryConfig {
    /// `base * 2^(attempt - 1)`, capped at `backoff_max`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Messages kept per task for inspection.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Buffered orchestration events before slow subscribers lag.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_history_limit() -> usize {
    1000
}

fn default_event_capacity() -> usize {
    1000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Program invocation used by the process-backed execution environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EnvironmentConfig {
    /// Command per role; phases of other roles use `default_command`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<Role, CommandSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_command: Option<CommandSpec>,

    /// Dependency installer; `{dependency}` in its args is substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<CommandSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl OrchestratorConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. CONDUCTOR_CONFIG_PATH environment variable
    /// 2. ./conductor-config.yaml (working directory)
    /// 3. ~/.conductor/config.yaml (user home)
    /// 4. /etc/conductor/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./conductor-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".conductor").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/conductor/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load from an explicit path (which must exist), else discovery, else defaults.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = env_override::<usize>("CONDUCTOR_MAX_CONCURRENT_AGENTS") {
            self.scheduler.max_concurrent_agents = value;
        }
        if let Some(value) = env_override::<u32>("CONDUCTOR_MAX_ATTEMPTS") {
            self.recovery.max_attempts_per_phase = value;
        }
        if let Some(value) = env_override::<f64>("CONDUCTOR_CONFIDENCE_THRESHOLD") {
            self.recovery.confidence_threshold = value;
        }
        if let Ok(raw) = std::env::var("CONDUCTOR_PHASE_TIMEOUT") {
            match humantime_serde::re::humantime::parse_duration(&raw) {
                Ok(timeout) => {
                    tracing::info!("Environment override: CONDUCTOR_PHASE_TIMEOUT={}", raw);
                    self.scheduler.phase_timeout = Some(timeout);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for CONDUCTOR_PHASE_TIMEOUT: '{}'. Expected a duration like '10m'. Ignoring.",
                    raw
                ),
            }
        }
    }

    pub fn role_catalog(&self) -> RoleCatalog {
        if self.roles.is_empty() {
            RoleCatalog::all()
        } else {
            RoleCatalog::new(self.roles.iter().copied())
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scheduler.max_concurrent_agents == 0 {
            anyhow::bail!("scheduler.max_concurrent_agents must be at least 1");
        }
        for (role, cap) in &self.scheduler.per_role_caps {
            if *cap == 0 {
                anyhow::bail!("scheduler.per_role_caps.{} must be at least 1", role);
            }
        }
        if let Some(timeout) = self.scheduler.phase_timeout {
            if timeout.is_zero() {
                anyhow::bail!("scheduler.phase_timeout cannot be zero");
            }
        }

        let threshold = self.recovery.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!(
                "recovery.confidence_threshold must be within [0, 1], got {}",
                threshold
            );
        }
        if self.recovery.max_attempts_per_phase == 0 {
            anyhow::bail!("recovery.max_attempts_per_phase must be at least 1");
        }
        if self.recovery.backoff_max < self.recovery.backoff_base {
            anyhow::bail!("recovery.backoff_max cannot be shorter than recovery.backoff_base");
        }

        if self.pool.heartbeat_grace < self.pool.heartbeat_interval {
            anyhow::bail!("pool.heartbeat_grace cannot be shorter than pool.heartbeat_interval");
        }
        if self.pool.heartbeat_interval.is_zero() {
            anyhow::bail!("pool.heartbeat_interval cannot be zero");
        }

        if self.bus.event_capacity == 0 {
            anyhow::bail!("bus.event_capacity must be at least 1");
        }

        for role in self.environment.commands.keys() {
            if !self.role_catalog().contains(*role) {
                anyhow::bail!("environment.commands.{} configures a role that is not served", role);
            }
        }

        Ok(())
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => {
            tracing::info!("Environment override: {}={}", name, raw);
            Some(value)
        }
        Err(_) => {
            tracing::warn!("Invalid value for {}: '{}'. Ignoring.", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.scheduler.max_concurrent_agents, 10);
        assert_eq!(config.recovery.max_attempts_per_phase, 3);
        assert_eq!(config.recovery.confidence_threshold, 0.7);
        assert_eq!(config.pool.agent_timeout, Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml_with_durations() {
        let yaml = r#"
scheduler:
  max_concurrent_agents: 4
  per_role_caps:
    code: 2
  phase_timeout: 10m
pool:
  heartbeat_interval: 5s
  heartbeat_grace: 20s
recovery:
  backoff_base: 500ms
roles: [code, qa]
environment:
  commands:
    code:
      program: python3
      args: ["agent.py"]
"#;
        let config = OrchestratorConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.scheduler.max_concurrent_agents, 4);
        assert_eq!(config.scheduler.per_role_caps.get(&Role::Code), Some(&2));
        assert_eq!(config.scheduler.phase_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.pool.heartbeat_grace, Duration::from_secs(20));
        assert_eq!(config.recovery.backoff_base, Duration::from_millis(500));
        assert_eq!(config.recovery.max_attempts_per_phase, 3);
        assert!(config.role_catalog().contains(Role::Qa));
        assert!(!config.role_catalog().contains(Role::Writer));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = OrchestratorConfig::default();
        config.recovery.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_command_for_unserved_role() {
        let mut config = OrchestratorConfig::default();
        config.roles = vec![Role::Code];
        config.environment.commands.insert(
            Role::Writer,
            CommandSpec {
                program: "echo".to_string(),
                args: vec![],
                env: HashMap::new(),
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let recovery = RecoveryConfig::default();
        assert_eq!(recovery.backoff_for(1), Duration::from_secs(2));
        assert_eq!(recovery.backoff_for(2), Duration::from_secs(4));
        assert_eq!(recovery.backoff_for(3), Duration::from_secs(8));
        assert_eq!(recovery.backoff_for(10), Duration::from_secs(60));
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let config = OrchestratorConfig::default();
        config.to_yaml_file(&path).unwrap();

        let loaded = OrchestratorConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.scheduler, config.scheduler);
        assert_eq!(loaded.recovery, config.recovery);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let result = OrchestratorConfig::load_or_default(Some(PathBuf::from("/nonexistent/conductor.yaml")));
        assert!(result.is_err());
    }
}
