use chrono::{DateTime, Utc};
use maestro_core::{ActionKind, MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Complexity class assigned by the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Complex,
    Coordination,
}

impl Complexity {
    /// Parse an oracle label. Returns `None` for anything outside the three classes.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Some(Complexity::Simple),
            "complex" => Some(Complexity::Complex),
            "coordination" => Some(Complexity::Coordination),
            _ => None,
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Complex => write!(f, "complex"),
            Complexity::Coordination => write!(f, "coordination"),
        }
    }
}

/// Caller-supplied task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Lifecycle status of a task. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Executing,
    Completed,
    Failed,
}

impl TaskStatus {
    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Assigned => 1,
            TaskStatus::Executing => 2,
            TaskStatus::Completed | TaskStatus::Failed => 3,
        }
    }

    /// Whether the task has reached a final state.
    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Assigned => write!(f, "assigned"),
            TaskStatus::Executing => write!(f, "executing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Whether an action may be dispatched without a human sign-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Approved,
    PendingApproval,
}

/// Kind-specific arguments of an action, validated at the decomposition boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: String,
    },
    WebSearch {
        query: String,
    },
    ExecuteCode {
        code: String,
        language: String,
    },
    CallApi {
        url: String,
        method: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl ActionPayload {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionPayload::ReadFile { .. } => ActionKind::ReadFile,
            ActionPayload::WriteFile { .. } => ActionKind::WriteFile,
            ActionPayload::WebSearch { .. } => ActionKind::WebSearch,
            ActionPayload::ExecuteCode { .. } => ActionKind::ExecuteCode,
            ActionPayload::CallApi { .. } => ActionKind::CallApi,
        }
    }

    /// One-line rendering for logs and approval prompts.
    pub fn brief(&self) -> String {
        match self {
            ActionPayload::ReadFile { path } => format!("read {path}"),
            ActionPayload::WriteFile { path, content } => {
                format!("write {} bytes to {path}", content.len())
            }
            ActionPayload::WebSearch { query } => format!("search \"{query}\""),
            ActionPayload::ExecuteCode { code, language } => {
                format!("run {} lines of {language}", code.lines().count())
            }
            ActionPayload::CallApi { url, method, .. } => format!("{method} {url}"),
        }
    }
}

/// One executable step of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// `<taskId>_action_<index>`, unique within its task.
    pub id: String,
    pub kind: ActionKind,
    pub description: String,
    pub payload: ActionPayload,
    pub approval: ApprovalStatus,
    /// 1 (lowest) to 10 (highest).
    pub priority: u8,
    /// IDs of actions in the same task that must complete first.
    pub dependencies: Vec<String>,
}

impl Action {
    pub fn new(id: impl Into<String>, description: impl Into<String>, payload: ActionPayload) -> Self {
        Self {
            id: id.into(),
            kind: payload.kind(),
            description: description.into(),
            payload,
            approval: ApprovalStatus::Approved,
            priority: 5,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    pub fn with_approval(mut self, approval: ApprovalStatus) -> Self {
        self.approval = approval;
        self
    }

    /// Canonical ID for the `index`-th action of `task_id`.
    pub fn id_for(task_id: Uuid, index: usize) -> String {
        format!("{task_id}_action_{index}")
    }
}

/// `to` cannot start before `from` completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub priority: u8,
}

/// A unit of work submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    #[serde(default)]
    pub context: Vec<String>,
    pub complexity: Complexity,
    pub priority: Priority,
    pub status: TaskStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_duration_secs: u64,
    pub actual_duration_ms: Option<u64>,
    /// Capabilities the classifier thinks the task needs.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    pub actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            context: Vec::new(),
            complexity: Complexity::Simple,
            priority: Priority::Medium,
            status: TaskStatus::Pending,
            deadline: None,
            estimated_duration_secs: 0,
            actual_duration_ms: None,
            required_capabilities: Vec::new(),
            actions: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<DateTime<Utc>>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    /// Move the task forward. Regressions and sideways moves between the two
    /// terminal states are rejected.
    pub fn advance(&mut self, next: TaskStatus) -> MaestroResult<()> {
        if next == self.status {
            return Ok(());
        }
        if next.rank() <= self.status.rank() {
            return Err(MaestroError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// Edges derived from the actions' declared dependencies.
    pub fn dependency_edges(&self) -> Vec<DependencyEdge> {
        dependency_edges(&self.actions)
    }
}

/// One edge per declared dependency, weighted by the dependent's priority.
pub fn dependency_edges(actions: &[Action]) -> Vec<DependencyEdge> {
    actions
        .iter()
        .flat_map(|action| {
            action.dependencies.iter().map(|dep| DependencyEdge {
                from: dep.clone(),
                to: action.id.clone(),
                priority: action.priority,
            })
        })
        .collect()
}

/// Functional role of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerRole {
    /// Generalist; preferred by candidate ranking.
    Coordinator,
    Executor,
    Specialist,
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerRole::Coordinator => write!(f, "coordinator"),
            WorkerRole::Executor => write!(f, "executor"),
            WorkerRole::Specialist => write!(f, "specialist"),
        }
    }
}

/// Availability of a worker, derived from its load unless set offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// No reservations held.
    Idle,
    /// At least one reservation held.
    Busy,
    /// Excluded from selection and reservation.
    Offline,
}

/// A named executor with a capability set and a bounded load counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    /// Unique within a registry.
    pub id: String,
    pub role: WorkerRole,
    /// Action capabilities this worker can run.
    pub capabilities: BTreeSet<String>,
    /// Reservations currently held; never above `max_load`.
    pub current_load: u32,
    pub max_load: u32,
    pub status: WorkerStatus,
}

impl Worker {
    /// An idle worker with no load.
    pub fn new<I, S>(id: impl Into<String>, role: WorkerRole, capabilities: I, max_load: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            role,
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            current_load: 0,
            max_load,
            status: WorkerStatus::Idle,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status != WorkerStatus::Offline && self.current_load < self.max_load
    }

    /// Whether the capability set intersects `required`.
    pub fn can_handle<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required
            .iter()
            .any(|cap| self.capabilities.contains(cap.as_ref()))
    }

    /// Ranking key: lower is better. Coordinators get a head start of two.
    pub fn effective_score(&self) -> i64 {
        let bonus = if self.role == WorkerRole::Coordinator { -2 } else { 0 };
        i64::from(self.current_load) + bonus
    }
}

/// Per-action state inside one coordination run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Waiting on dependencies.
    Pending,
    /// A dependency ended without completing.
    Blocked,
    /// Every dependency completed; waiting for a worker or approval.
    Ready,
    /// Dispatched to the executor.
    Executing,
    Completed,
    Failed,
    /// No assigned worker has a matching capability.
    Unassignable,
    /// Needs approval and no approval channel is configured.
    AwaitingApproval,
    /// Approval was requested and denied.
    Rejected,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ActionState::Pending | ActionState::Ready | ActionState::Executing
        )
    }
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ActionState::Pending => "pending",
            ActionState::Blocked => "blocked",
            ActionState::Ready => "ready",
            ActionState::Executing => "executing",
            ActionState::Completed => "completed",
            ActionState::Failed => "failed",
            ActionState::Unassignable => "unassignable",
            ActionState::AwaitingApproval => "awaiting approval",
            ActionState::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

/// Outcome of a single action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_id: String,
    pub kind: ActionKind,
    pub state: ActionState,
    /// Worker the action was dispatched to, if any.
    pub worker_id: Option<String>,
    /// Executor output, truncated for long results.
    pub output: Option<String>,
    /// Why the action did not complete.
    pub error: Option<String>,
    /// Time spent executing; zero when never dispatched.
    pub duration_ms: u64,
}

/// Immutable summary of one task's run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: Uuid,
    /// One entry per action, in execution order.
    pub outcomes: Vec<ActionOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ExecutionRecord {
    pub fn count(&self, state: ActionState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn outcome(&self, action_id: &str) -> Option<&ActionOutcome> {
        self.outcomes.iter().find(|o| o.action_id == action_id)
    }

    pub fn ids_in(&self, state: ActionState) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.state == state)
            .map(|o| o.action_id.as_str())
            .collect()
    }

    /// True when every action completed.
    pub fn is_success(&self) -> bool {
        !self.outcomes.is_empty()
            && self
                .outcomes
                .iter()
                .all(|o| o.state == ActionState::Completed)
    }

    /// Human-readable per-action report.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "Task {}: {} actions in {}ms. {} completed, {} failed, {} blocked, {} unassignable",
            self.task_id,
            self.outcomes.len(),
            self.elapsed_ms,
            self.count(ActionState::Completed),
            self.count(ActionState::Failed),
            self.count(ActionState::Blocked),
            self.count(ActionState::Unassignable),
        );
        let gated = self.count(ActionState::AwaitingApproval) + self.count(ActionState::Rejected);
        if gated > 0 {
            text.push_str(&format!(
                ", {} awaiting approval, {} rejected",
                self.count(ActionState::AwaitingApproval),
                self.count(ActionState::Rejected)
            ));
        }
        for outcome in &self.outcomes {
            text.push_str(&format!(
                "\n  [{}] {} ({})",
                outcome.state, outcome.action_id, outcome.kind
            ));
            if let Some(worker) = &outcome.worker_id {
                text.push_str(&format!(" on {worker}"));
            }
            if let Some(error) = &outcome.error {
                text.push_str(&format!(": {error}"));
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &str) -> ActionPayload {
        ActionPayload::ReadFile {
            path: path.to_string(),
        }
    }

    #[test]
    fn test_task_creation() {
        let task = Task::new("Summarize the changelog");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.actions.is_empty());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_task_status_only_advances() {
        let mut task = Task::new("t");
        task.advance(TaskStatus::Assigned).unwrap();
        task.advance(TaskStatus::Executing).unwrap();
        assert!(task.advance(TaskStatus::Pending).is_err());
        task.advance(TaskStatus::Completed).unwrap();
        assert!(task.completed_at.is_some());

        let err = task.advance(TaskStatus::Failed).unwrap_err();
        assert!(matches!(err, MaestroError::InvalidTransition { .. }));
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_task_advance_same_status_is_noop() {
        let mut task = Task::new("t");
        task.advance(TaskStatus::Pending).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_action_kind_follows_payload() {
        let action = Action::new("a", "write notes", ActionPayload::WriteFile {
            path: "notes.md".to_string(),
            content: "hi".to_string(),
        });
        assert_eq!(action.kind, ActionKind::WriteFile);
        assert_eq!(action.approval, ApprovalStatus::Approved);
    }

    #[test]
    fn test_action_priority_is_clamped() {
        assert_eq!(Action::new("a", "", read("x")).with_priority(0).priority, 1);
        assert_eq!(Action::new("a", "", read("x")).with_priority(42).priority, 10);
    }

    #[test]
    fn test_action_id_format() {
        let id = Uuid::nil();
        assert_eq!(
            Action::id_for(id, 2),
            "00000000-0000-0000-0000-000000000000_action_2"
        );
    }

    #[test]
    fn test_dependency_edges_are_derived() {
        let task = Task::new("t").with_actions(vec![
            Action::new("a", "", read("x")),
            Action::new("b", "", read("y"))
                .with_dependencies(vec!["a".to_string()])
                .with_priority(7),
        ]);
        let edges = task.dependency_edges();
        assert_eq!(
            edges,
            vec![DependencyEdge {
                from: "a".to_string(),
                to: "b".to_string(),
                priority: 7,
            }]
        );
    }

    #[test]
    fn test_worker_effective_score_prefers_coordinators() {
        let mut coordinator = Worker::new("c", WorkerRole::Coordinator, ["web_search"], 3);
        let executor = Worker::new("e", WorkerRole::Executor, ["web_search"], 3);
        coordinator.current_load = 2;
        assert_eq!(coordinator.effective_score(), 0);
        assert_eq!(executor.effective_score(), 0);
        assert!(coordinator.can_handle(&["web_search"]));
        assert!(!coordinator.can_handle(&["code_execution"]));
    }

    #[test]
    fn test_payload_serialization_is_tagged() {
        let payload = ActionPayload::CallApi {
            url: "https://api.example.com".to_string(),
            method: "GET".to_string(),
            data: serde_json::Value::Null,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "call_api");
        let parsed: ActionPayload = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_record_summary_counts() {
        let outcome = |id: &str, state| ActionOutcome {
            action_id: id.to_string(),
            kind: ActionKind::ReadFile,
            state,
            worker_id: None,
            output: None,
            error: None,
            duration_ms: 0,
        };
        let record = ExecutionRecord {
            task_id: Uuid::nil(),
            outcomes: vec![
                outcome("a", ActionState::Failed),
                outcome("b", ActionState::Blocked),
            ],
            started_at: Utc::now(),
            finished_at: Utc::now(),
            elapsed_ms: 3,
        };
        let summary = record.summary();
        assert!(summary.contains("0 completed, 1 failed, 1 blocked"));
        assert!(summary.contains("[blocked] b"));
        assert!(!record.is_success());
        assert_eq!(record.ids_in(ActionState::Failed), vec!["a"]);
    }
}
