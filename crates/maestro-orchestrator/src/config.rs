use maestro_core::AutonomyLevel;
use serde::{Deserialize, Serialize};

/// When worker load is reserved during a task's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationMode {
    /// Reserve a worker only while it runs one dispatched action.
    #[default]
    PerAction,
    /// Reserve every assigned worker once for the whole task.
    PerTask,
}

/// Tunables for one [`Orchestrator`](crate::Orchestrator) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Which action kinds need approval before dispatch.
    #[serde(default)]
    pub autonomy: AutonomyLevel,
    /// Upper bound on workers assigned to one task when the caller gives none.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// Duration estimate used when classification fails.
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u64,
    /// When worker load is reserved.
    #[serde(default)]
    pub reservation: ReservationMode,
    /// Write a pattern line to the learning store after each task.
    #[serde(default = "default_true")]
    pub record_outcomes: bool,
    /// Category under which outcome patterns are stored.
    #[serde(default = "default_learning_category")]
    pub learning_category: String,
    /// Endpoint the single-action fallback posts `{"task": <description>}` to
    /// when decomposition fails.
    #[serde(default)]
    pub fallback_endpoint: Option<String>,
}

fn default_max_agents() -> usize {
    3
}

fn default_duration_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_learning_category() -> String {
    "task_patterns".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            autonomy: AutonomyLevel::default(),
            max_agents: default_max_agents(),
            default_duration_secs: default_duration_secs(),
            reservation: ReservationMode::default(),
            record_outcomes: true,
            learning_category: default_learning_category(),
            fallback_endpoint: None,
        }
    }
}
