use crate::assigner::{assign, required_capabilities};
use crate::classifier::ComplexityClassifier;
use crate::config::OrchestratorConfig;
use crate::coordinator::Coordinator;
use crate::decomposer::TaskDecomposer;
use crate::executor::ActionExecutor;
use crate::graph::build_execution_order;
use crate::oracle::ReasoningOracle;
use crate::recorder::OutcomeRecorder;
use crate::registry::WorkerRegistry;
use crate::types::{Action, DependencyEdge, ExecutionRecord, Priority, Task, TaskStatus};
use chrono::{DateTime, Duration, Utc};
use maestro_core::{ApprovalChannel, MaestroResult};
use maestro_memory::LearningStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Caller-supplied knobs for one submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub priority: Priority,
    /// Advisory only; a late finish is logged, never enforced.
    pub deadline: Option<DateTime<Utc>>,
    /// Overrides [`OrchestratorConfig::max_agents`].
    pub max_agents: Option<usize>,
}

/// What a caller gets back from [`Orchestrator::submit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub actions: Vec<Action>,
    pub assigned_worker_ids: Vec<String>,
    pub dependency_edges: Vec<DependencyEdge>,
    pub estimated_completion: DateTime<Utc>,
    pub summary: String,
    pub record: ExecutionRecord,
}

/// A classified and decomposed task that has not been run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    pub task: Task,
    pub order: Vec<String>,
    pub edges: Vec<DependencyEdge>,
    /// Workers that would be considered right now, best first.
    pub candidate_worker_ids: Vec<String>,
}

/// The orchestration engine.
/// Implements the classify → decompose → order → assign → coordinate → record pipeline.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<WorkerRegistry>,
    classifier: ComplexityClassifier,
    decomposer: TaskDecomposer,
    coordinator: Coordinator,
    recorder: OutcomeRecorder,
    history: RwLock<HashMap<Uuid, Task>>,
}

impl Orchestrator {
    /// Create an orchestrator over an explicit set of collaborators.
    pub fn new(
        config: OrchestratorConfig,
        oracle: Arc<dyn ReasoningOracle>,
        registry: Arc<WorkerRegistry>,
        executor: Arc<dyn ActionExecutor>,
        learning: Arc<dyn LearningStore>,
    ) -> Self {
        Self {
            classifier: ComplexityClassifier::new(oracle.clone(), config.default_duration_secs),
            decomposer: TaskDecomposer::new(oracle, config.autonomy)
                .with_fallback_endpoint(config.fallback_endpoint.clone().unwrap_or_default()),
            coordinator: Coordinator::new(registry.clone(), executor, config.reservation),
            recorder: OutcomeRecorder::new(learning, config.learning_category.clone()),
            registry,
            config,
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Send `pending-approval` actions to `channel` for a decision.
    pub fn with_approvals(mut self, channel: Arc<dyn ApprovalChannel>) -> Self {
        self.coordinator = self.coordinator.with_approvals(channel);
        self
    }

    /// Get a reference to the worker registry.
    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the full pipeline for one task description.
    ///
    /// Classification and decomposition problems degrade to fallbacks and
    /// per-action problems end up in the summary. The only error is a
    /// dependency cycle (or a dangling dependency), raised before anything runs.
    pub async fn submit(
        &self,
        description: &str,
        context: &[String],
        options: SubmitOptions,
    ) -> MaestroResult<SubmitResponse> {
        let mut task = Task::new(description)
            .with_context(context.to_vec())
            .with_priority(options.priority)
            .with_deadline(options.deadline);
        info!(task_id = %task.id, priority = %task.priority, "Task submitted");

        // Phase 1: classify
        let classification = self.classifier.classify(&task.description, &task.context).await;
        task.complexity = classification.complexity;
        task.estimated_duration_secs = classification.estimated_duration_secs;
        task.required_capabilities = classification.required_capabilities;
        let estimated_completion = estimated_completion(task.created_at, task.estimated_duration_secs);

        // Phase 2: decompose
        let decomposition = self.decomposer.decompose(&task).await;
        task.actions = decomposition.actions;

        // Phase 3: order
        let order = match build_execution_order(&task.actions) {
            Ok(order) => order,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Invalid action graph, nothing executed");
                task.advance(TaskStatus::Failed)?;
                self.history.write().await.insert(task.id, task);
                return Err(e);
            }
        };

        // Phase 4: assign
        let max_agents = options.max_agents.unwrap_or(self.config.max_agents);
        let assigned = assign(&self.registry, &task, max_agents, self.config.reservation);
        task.advance(TaskStatus::Assigned)?;

        // Phase 5: execute
        task.advance(TaskStatus::Executing)?;
        let record = self.coordinator.coordinate(&task, &order, &assigned).await;
        task.actual_duration_ms = Some(record.elapsed_ms);
        let status = if record.is_success() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        task.advance(status)?;

        if let (Some(deadline), Some(done)) = (task.deadline, task.completed_at) {
            if done > deadline {
                warn!(
                    task_id = %task.id,
                    late_ms = (done - deadline).num_milliseconds(),
                    "Task finished after its deadline"
                );
            }
        }

        // Phase 6: record
        if self.config.record_outcomes {
            self.recorder.record(&task, &record).await;
        }

        let response = SubmitResponse {
            task_id: task.id,
            status: task.status,
            actions: task.actions.clone(),
            assigned_worker_ids: assigned.iter().map(|w| w.id.clone()).collect(),
            dependency_edges: task.dependency_edges(),
            estimated_completion,
            summary: record.summary(),
            record,
        };
        info!(task_id = %task.id, status = %task.status, "Task finished");
        self.history.write().await.insert(task.id, task);
        Ok(response)
    }

    /// Classify, decompose and order a task without running or recording it.
    pub async fn plan(&self, description: &str, context: &[String]) -> MaestroResult<TaskPlan> {
        let mut task = Task::new(description).with_context(context.to_vec());
        let classification = self.classifier.classify(&task.description, &task.context).await;
        task.complexity = classification.complexity;
        task.estimated_duration_secs = classification.estimated_duration_secs;
        task.required_capabilities = classification.required_capabilities;
        task.actions = self.decomposer.decompose(&task).await.actions;

        let order = build_execution_order(&task.actions)?;
        let candidate_worker_ids = self
            .registry
            .find_candidates(&required_capabilities(&task.actions))
            .into_iter()
            .map(|w| w.id)
            .collect();
        Ok(TaskPlan {
            edges: task.dependency_edges(),
            task,
            order,
            candidate_worker_ids,
        })
    }

    /// A finished task from history.
    pub async fn task(&self, id: Uuid) -> Option<Task> {
        self.history.read().await.get(&id).cloned()
    }

    /// Every finished task, oldest first.
    pub async fn history(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.history.read().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }
}

fn estimated_completion(submitted: DateTime<Utc>, estimate_secs: u64) -> DateTime<Utc> {
    let secs = i64::try_from(estimate_secs).unwrap_or(i64::MAX);
    Duration::try_seconds(secs)
        .and_then(|d| submitted.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{ActionState, Complexity, Worker, WorkerRole};
    use async_trait::async_trait;
    use maestro_core::{MaestroError, MaestroResult};
    use maestro_memory::InMemoryLearningStore;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::VecDeque;

    struct Scripted(Mutex<VecDeque<String>>);

    impl Scripted {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                replies.iter().map(|r| (*r).to_string()).collect(),
            )))
        }
    }

    #[async_trait]
    impl ReasoningOracle for Scripted {
        async fn ask(&self, _prompt: &str) -> MaestroResult<String> {
            self.0
                .lock()
                .pop_front()
                .ok_or_else(|| MaestroError::Oracle("no more replies".to_string()))
        }
    }

    struct Echo;

    #[async_trait]
    impl ActionExecutor for Echo {
        async fn read_file(&self, path: &str) -> MaestroResult<String> {
            Ok(path.to_string())
        }
        async fn write_file(&self, path: &str, _content: &str) -> MaestroResult<String> {
            Ok(path.to_string())
        }
        async fn web_search(&self, query: &str) -> MaestroResult<String> {
            Ok(query.to_string())
        }
        async fn execute_code(&self, code: &str, _language: &str) -> MaestroResult<String> {
            Ok(code.to_string())
        }
        async fn call_api(&self, url: &str, _method: &str, _data: &Value) -> MaestroResult<String> {
            Ok(url.to_string())
        }
    }

    const CLASSIFY: &str = r#"{"complexity": "complex", "estimatedDuration": 120, "requiredCapabilities": ["file_management"]}"#;
    const DECOMPOSE: &str = r#"{"actions": [
        {"type": "read_file", "description": "read input", "payload": {"path": "in.txt"}},
        {"type": "write_file", "description": "write output", "payload": {"path": "out.txt", "content": "x"}, "dependencies": ["action_0"]}
    ]}"#;

    fn orchestrator(replies: &[&str]) -> (Orchestrator, Arc<InMemoryLearningStore>) {
        let registry = Arc::new(
            WorkerRegistry::with_workers([Worker::new(
                "files",
                WorkerRole::Executor,
                ["file_management", "api_integration"],
                2,
            )])
            .unwrap(),
        );
        let store = Arc::new(InMemoryLearningStore::new());
        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            Scripted::new(replies),
            registry,
            Arc::new(Echo),
            store.clone(),
        );
        (orchestrator, store)
    }

    #[tokio::test]
    async fn test_submit_runs_pipeline() {
        let (orchestrator, store) = orchestrator(&[CLASSIFY, DECOMPOSE]);
        let response = orchestrator
            .submit("copy in.txt to out.txt", &[], SubmitOptions::default())
            .await
            .unwrap();

        assert_eq!(response.status, TaskStatus::Completed);
        assert_eq!(response.actions.len(), 2);
        assert_eq!(response.assigned_worker_ids, vec!["files"]);
        assert_eq!(response.dependency_edges.len(), 1);
        assert_eq!(response.record.count(ActionState::Completed), 2);
        assert!(response.summary.contains("2 completed"));

        let task = orchestrator.task(response.task_id).await.unwrap();
        assert_eq!(task.complexity, Complexity::Complex);
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.actual_duration_ms.is_some());
        assert_eq!(
            (response.estimated_completion - task.created_at).num_seconds(),
            120
        );
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_oracle_outage_still_runs_fallback() {
        let (orchestrator, _) = orchestrator(&[]);
        let response = orchestrator
            .submit("ping the service", &[], SubmitOptions::default())
            .await
            .unwrap();
        assert_eq!(response.actions.len(), 1);
        assert_eq!(response.record.count(ActionState::Completed), 1);
        let task = orchestrator.task(response.task_id).await.unwrap();
        assert_eq!(task.estimated_duration_secs, 300);
    }

    #[tokio::test]
    async fn test_plan_does_not_execute_or_record() {
        let (orchestrator, store) = orchestrator(&[CLASSIFY, DECOMPOSE]);
        let plan = orchestrator.plan("copy", &[]).await.unwrap();
        assert_eq!(plan.order.len(), 2);
        assert!(plan.order[0].ends_with("_action_0"));
        assert_eq!(plan.candidate_worker_ids, vec!["files"]);
        assert!(orchestrator.history().await.is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recording_can_be_disabled() {
        let registry = Arc::new(WorkerRegistry::new());
        let store = Arc::new(InMemoryLearningStore::new());
        let config = OrchestratorConfig {
            record_outcomes: false,
            ..OrchestratorConfig::default()
        };
        let orchestrator = Orchestrator::new(config, Scripted::new(&[]), registry, Arc::new(Echo), store.clone());
        let response = orchestrator.submit("x", &[], SubmitOptions::default()).await.unwrap();
        assert_eq!(response.status, TaskStatus::Failed);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[test]
    fn test_estimated_completion_saturates() {
        let now = Utc::now();
        assert_eq!(estimated_completion(now, 0), now);
        assert_eq!(estimated_completion(now, u64::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
