use crate::oracle::{parse_decomposition, DecompositionOutcome, OracleError, ReasoningOracle};
use crate::types::{dependency_edges, Action, ActionPayload, ApprovalStatus, DependencyEdge, Task};
use maestro_core::{requires_approval, AutonomyLevel};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of decomposing one task.
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// Materialized actions, IDs assigned and approval applied.
    pub actions: Vec<Action>,
    /// Edges derived from the actions' dependency lists.
    pub edges: Vec<DependencyEdge>,
    /// The oracle answer was unusable and the single-action fallback was used.
    pub used_fallback: bool,
}

/// Splits a task into actions with dependencies.
pub struct TaskDecomposer {
    oracle: Arc<dyn ReasoningOracle>,
    autonomy: AutonomyLevel,
    fallback_endpoint: String,
}

impl TaskDecomposer {
    /// Create a decomposer whose actions are gated by `autonomy`.
    pub fn new(oracle: Arc<dyn ReasoningOracle>, autonomy: AutonomyLevel) -> Self {
        Self {
            oracle,
            autonomy,
            fallback_endpoint: String::new(),
        }
    }

    /// URL the fallback action posts the task to. Without one the fallback
    /// carries an empty URL and it is up to the executor to handle it.
    pub fn with_fallback_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.fallback_endpoint = endpoint.into();
        self
    }

    /// Decompose `task`. Never fails: an unusable oracle answer yields the
    /// single-action fallback from [`TaskDecomposer::fallback`].
    ///
    /// Cycles in the proposed dependencies are not detected here; they surface
    /// when the execution order is built.
    pub async fn decompose(&self, task: &Task) -> Decomposition {
        match self.try_decompose(task).await {
            Ok(outcome) => {
                let actions = self.materialize(task, outcome);
                let edges = dependency_edges(&actions);
                info!(task_id = %task.id, actions = actions.len(), edges = edges.len(), "Task decomposed");
                Decomposition {
                    actions,
                    edges,
                    used_fallback: false,
                }
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Decomposition failed, using single-action fallback");
                let actions = vec![self.fallback(task)];
                Decomposition {
                    actions,
                    edges: Vec::new(),
                    used_fallback: true,
                }
            }
        }
    }

    /// Ask the oracle and validate the answer, without falling back.
    pub async fn try_decompose(&self, task: &Task) -> Result<DecompositionOutcome, OracleError> {
        let reply = self
            .oracle
            .ask(&decomposition_prompt(task))
            .await
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;
        parse_decomposition(&reply)
    }

    /// A generic API call carrying the description verbatim, with no dependencies.
    pub fn fallback(&self, task: &Task) -> Action {
        let payload = ActionPayload::CallApi {
            url: self.fallback_endpoint.clone(),
            method: "POST".to_string(),
            data: serde_json::json!({ "task": task.description }),
        };
        self.with_policy(Action::new(Action::id_for(task.id, 0), task.description.clone(), payload))
    }

    fn materialize(&self, task: &Task, outcome: DecompositionOutcome) -> Vec<Action> {
        outcome
            .actions
            .into_iter()
            .enumerate()
            .map(|(index, proposed)| {
                let dependencies = proposed
                    .dependencies
                    .iter()
                    .map(|dep| Action::id_for(task.id, *dep))
                    .collect();
                let action = Action::new(
                    Action::id_for(task.id, index),
                    proposed.description,
                    proposed.payload,
                )
                .with_priority(proposed.priority)
                .with_dependencies(dependencies);
                self.with_policy(action)
            })
            .collect()
    }

    fn with_policy(&self, action: Action) -> Action {
        let approval = if requires_approval(action.kind, self.autonomy) {
            ApprovalStatus::PendingApproval
        } else {
            ApprovalStatus::Approved
        };
        action.with_approval(approval)
    }
}

fn decomposition_prompt(task: &Task) -> String {
    let mut prompt = format!(
        "Break the following task into concrete executable actions.\n\n\
         Task: {}\nComplexity: {}\n",
        task.description, task.complexity
    );
    if !task.context.is_empty() {
        prompt.push_str("\nContext:\n");
        for line in &task.context {
            prompt.push_str(&format!("- {line}\n"));
        }
    }
    prompt.push_str(
        "\nAllowed action types and payloads:\n\
         - read_file: {\"path\"}\n\
         - write_file: {\"path\", \"content\"}\n\
         - web_search: {\"query\"}\n\
         - execute_code: {\"code\", \"language\"}\n\
         - call_api: {\"url\", \"method\", \"data\"}\n\n\
         Dependencies refer to other actions by their zero-based index in the list.\n\
         Priority ranges from 1 (lowest) to 10 (highest).\n\n\
         Respond with a single JSON object and nothing else:\n\
         {\"actions\": [{\"type\", \"description\", \"payload\", \"dependencies\": [<index>], \"priority\"}], \
         \"dependencies\": [{\"taskId\": <index>, \"dependsOn\": <index>, \"priority\"}]}\n",
    );
    prompt
}
