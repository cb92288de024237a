use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for an [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Concurrency cap used by the drain algorithm.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Period of the maintenance tick.
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    /// Timeout hint forwarded to workers. Never enforced.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// How long terminal workflows stay visible.
    #[serde(default = "default_workflow_retention_secs")]
    pub workflow_retention_secs: u64,
}

fn default_max_concurrent_tasks() -> usize {
    10
}

fn default_health_check_interval_secs() -> u64 {
    60
}

fn default_task_timeout_secs() -> u64 {
    300
}

fn default_workflow_retention_secs() -> u64 {
    3600
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            health_check_interval_secs: default_health_check_interval_secs(),
            task_timeout_secs: default_task_timeout_secs(),
            workflow_retention_secs: default_workflow_retention_secs(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    orchestrator: OrchestratorConfig,
}

impl OrchestratorConfig {
    /// Parse the `[orchestrator]` table of a TOML document. A missing table
    /// yields the defaults.
    pub fn from_toml_str(s: &str) -> MaestroResult<Self> {
        let file: ConfigFile = toml::from_str(s)
            .map_err(|e| MaestroError::Configuration(format!("Invalid config: {e}")))?;
        let config = file.orchestrator;
        config.validate()?;
        Ok(config)
    }

    /// Reject a zero concurrency cap or a zero maintenance interval.
    pub fn validate(&self) -> MaestroResult<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(MaestroError::Configuration(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.health_check_interval_secs == 0 {
            return Err(MaestroError::Configuration(
                "health_check_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Maintenance tick period.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Timeout hint handed to workers.
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Retention window for terminal workflows.
    pub fn workflow_retention(&self) -> Duration {
        Duration::from_secs(self.workflow_retention_secs)
    }
}
