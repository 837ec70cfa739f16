use crate::config::ReservationMode;
use crate::executor::{dispatch, ActionExecutor};
use crate::registry::WorkerRegistry;
use crate::types::{
    Action, ActionOutcome, ActionState, ApprovalStatus, ExecutionRecord, Task, Worker, WorkerStatus,
};
use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use maestro_core::{ApprovalChannel, ApprovalRequest, MaestroError, MaestroResult, RiskLevel};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const MAX_OUTPUT_CHARS: usize = 4096;

/// Runs a task's action graph against its assigned workers.
///
/// Actions whose dependencies have all completed are dispatched concurrently,
/// bounded by worker capacity. A failed, rejected or unassignable action only
/// blocks its transitive dependents; everything else keeps running.
pub struct Coordinator {
    registry: Arc<WorkerRegistry>,
    executor: Arc<dyn ActionExecutor>,
    approvals: Option<Arc<dyn ApprovalChannel>>,
    mode: ReservationMode,
}

/// Result of one dispatched action, as seen by the scheduling loop.
struct Settled {
    action_id: String,
    worker_id: String,
    result: MaestroResult<String>,
    duration_ms: u64,
}

enum Gate {
    Ready,
    Wait,
    Blocked(String),
}

impl Coordinator {
    /// Coordinator reserving workers from `registry` according to `mode`.
    pub fn new(
        registry: Arc<WorkerRegistry>,
        executor: Arc<dyn ActionExecutor>,
        mode: ReservationMode,
    ) -> Self {
        Self {
            registry,
            executor,
            approvals: None,
            mode,
        }
    }

    /// Route `pending-approval` actions through `channel` instead of parking them.
    pub fn with_approvals(mut self, channel: Arc<dyn ApprovalChannel>) -> Self {
        self.approvals = Some(channel);
        self
    }

    /// Execute `task`'s actions in a manner consistent with `order`.
    ///
    /// `order` must be a topological order of the task's actions. In
    /// [`ReservationMode::PerTask`] every worker in `assigned` is expected to
    /// hold one reservation, which is released before returning.
    pub async fn coordinate(
        &self,
        task: &Task,
        order: &[String],
        assigned: &[Worker],
    ) -> ExecutionRecord {
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut outcomes: HashMap<&str, ActionOutcome> = HashMap::with_capacity(order.len());
        let mut actions: Vec<&Action> = Vec::with_capacity(order.len());
        for id in order {
            match task.action(id) {
                Some(action) => {
                    outcomes.insert(action.id.as_str(), pending_outcome(action));
                    actions.push(action);
                }
                None => warn!(task_id = %task.id, action_id = %id, "Ordered action not found in task"),
            }
        }

        let mut approved: HashSet<&str> = HashSet::new();
        // per-task mode: workers running one of this task's actions right now
        let mut occupied: HashSet<String> = HashSet::new();
        let mut in_flight = FuturesUnordered::new();

        loop {
            let released = self.registry.released();
            tokio::pin!(released);
            let mut waiting = false;

            for &action in &actions {
                let id = action.id.as_str();
                if !advance(action, &mut outcomes) {
                    continue;
                }

                let required = action.kind.capabilities();
                let capable: Vec<String> = assigned
                    .iter()
                    .filter(|w| w.can_handle(required))
                    .map(|w| w.id.clone())
                    .collect();
                if capable.is_empty() {
                    warn!(task_id = %task.id, action_id = %id, kind = %action.kind, "No suitable worker");
                    finish(&mut outcomes, id, ActionState::Unassignable, "no suitable worker".to_string());
                    continue;
                }

                if action.approval == ApprovalStatus::PendingApproval && !approved.contains(id) {
                    match self.seek_approval(task, action).await {
                        Ok(()) => {
                            approved.insert(id);
                        }
                        Err((state, reason)) => {
                            finish(&mut outcomes, id, state, reason);
                            continue;
                        }
                    }
                }

                let Some(worker_id) = self.acquire(&capable, required, &occupied) else {
                    if self.all_offline(&capable) {
                        warn!(task_id = %task.id, action_id = %id, "All capable workers are offline");
                        let reason = "all capable workers are offline".to_string();
                        finish(&mut outcomes, id, ActionState::Unassignable, reason);
                    } else {
                        waiting = true;
                    }
                    continue;
                };

                if self.mode == ReservationMode::PerTask {
                    occupied.insert(worker_id.clone());
                }
                if let Some(outcome) = outcomes.get_mut(id) {
                    outcome.state = ActionState::Executing;
                    outcome.worker_id = Some(worker_id.clone());
                }
                debug!(
                    task_id = %task.id,
                    action_id = %id,
                    worker = %worker_id,
                    action = %action.payload.brief(),
                    "Dispatching action"
                );

                let executor = self.executor.clone();
                let payload = action.payload.clone();
                let action_id = action.id.clone();
                let dispatched = Instant::now();
                let handle = tokio::spawn(async move { dispatch(executor.as_ref(), &payload).await });
                in_flight.push(async move {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(MaestroError::Executor(format!("action task aborted: {e}"))),
                    };
                    Settled {
                        action_id,
                        worker_id,
                        result,
                        duration_ms: dispatched.elapsed().as_millis() as u64,
                    }
                });
            }

            if in_flight.is_empty() {
                if !waiting {
                    break;
                }
                debug!(task_id = %task.id, "Waiting for worker capacity");
                released.await;
                continue;
            }

            let settled = if waiting {
                tokio::select! {
                    settled = in_flight.next() => settled,
                    _ = &mut released => None,
                }
            } else {
                in_flight.next().await
            };

            if let Some(settled) = settled {
                self.settle(task, settled, &mut outcomes, &mut occupied);
            }
        }

        // unreachable under a valid order; keeps the record total
        for outcome in outcomes.values_mut() {
            if matches!(outcome.state, ActionState::Pending | ActionState::Ready) {
                outcome.state = ActionState::Blocked;
                outcome.error = Some("dependencies never resolved".to_string());
            }
        }

        if self.mode == ReservationMode::PerTask {
            for worker in assigned {
                if let Err(e) = self.registry.release(&worker.id, 1) {
                    warn!(worker = %worker.id, error = %e, "Failed to release worker");
                }
            }
        }

        let outcomes: Vec<ActionOutcome> = actions
            .iter()
            .filter_map(|a| outcomes.remove(a.id.as_str()))
            .collect();
        let record = ExecutionRecord {
            task_id: task.id,
            outcomes,
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: clock.elapsed().as_millis() as u64,
        };
        info!(
            task_id = %task.id,
            completed = record.count(ActionState::Completed),
            failed = record.count(ActionState::Failed),
            blocked = record.count(ActionState::Blocked),
            unassignable = record.count(ActionState::Unassignable),
            elapsed_ms = record.elapsed_ms,
            "Execution finished"
        );
        record
    }

    /// Reserve a worker for one action. `None` means nothing capable is free.
    fn acquire(&self, capable: &[String], required: &[&str], occupied: &HashSet<String>) -> Option<String> {
        match self.mode {
            ReservationMode::PerAction => self.registry.try_reserve_first(capable, required),
            ReservationMode::PerTask => capable
                .iter()
                .filter(|id| !occupied.contains(*id))
                .find(|id| {
                    self.registry
                        .get(id)
                        .map_or(false, |w| w.status != WorkerStatus::Offline)
                })
                .cloned(),
        }
    }

    fn all_offline(&self, capable: &[String]) -> bool {
        capable.iter().all(|id| {
            self.registry
                .get(id)
                .map_or(true, |w| w.status == WorkerStatus::Offline)
        })
    }

    async fn seek_approval(&self, task: &Task, action: &Action) -> Result<(), (ActionState, String)> {
        let Some(channel) = &self.approvals else {
            info!(task_id = %task.id, action_id = %action.id, "Action awaiting approval");
            return Err((ActionState::AwaitingApproval, "awaiting approval".to_string()));
        };

        let request = ApprovalRequest {
            task_id: task.id.to_string(),
            action_id: action.id.clone(),
            kind: action.kind,
            description: action.description.clone(),
            risk_level: RiskLevel::for_kind(action.kind),
            context: action.payload.brief(),
        };
        match channel.request_approval(request).await {
            Ok(decision) if decision.approved => {
                info!(action_id = %action.id, reviewer = %decision.reviewer, "Action approved");
                Ok(())
            }
            Ok(decision) => {
                warn!(action_id = %action.id, reviewer = %decision.reviewer, "Action rejected");
                let reason = decision
                    .reason
                    .map(|r| format!("rejected by {}: {r}", decision.reviewer))
                    .unwrap_or_else(|| format!("rejected by {}", decision.reviewer));
                Err((ActionState::Rejected, reason))
            }
            Err(e) => {
                warn!(action_id = %action.id, error = %e, "Approval request failed");
                Err((ActionState::Rejected, format!("approval failed: {e}")))
            }
        }
    }

    fn settle(
        &self,
        task: &Task,
        settled: Settled,
        outcomes: &mut HashMap<&str, ActionOutcome>,
        occupied: &mut HashSet<String>,
    ) {
        match self.mode {
            ReservationMode::PerAction => {
                if let Err(e) = self.registry.release(&settled.worker_id, 1) {
                    warn!(worker = %settled.worker_id, error = %e, "Failed to release worker");
                }
            }
            ReservationMode::PerTask => {
                occupied.remove(&settled.worker_id);
            }
        }

        let Some(outcome) = outcomes.get_mut(settled.action_id.as_str()) else {
            return;
        };
        outcome.duration_ms = settled.duration_ms;
        match settled.result {
            Ok(output) => {
                info!(
                    task_id = %task.id,
                    action_id = %settled.action_id,
                    worker = %settled.worker_id,
                    duration_ms = settled.duration_ms,
                    "Action completed"
                );
                outcome.state = ActionState::Completed;
                outcome.output = Some(truncate(output));
            }
            Err(e) => {
                error!(
                    task_id = %task.id,
                    action_id = %settled.action_id,
                    worker = %settled.worker_id,
                    error = %e,
                    "Action failed"
                );
                outcome.state = ActionState::Failed;
                outcome.error = Some(e.to_string());
            }
        }
    }
}

fn pending_outcome(action: &Action) -> ActionOutcome {
    ActionOutcome {
        action_id: action.id.clone(),
        kind: action.kind,
        state: ActionState::Pending,
        worker_id: None,
        output: None,
        error: None,
        duration_ms: 0,
    }
}

/// Dependencies decide readiness: all completed, some still running, or one
/// ended without completing.
fn gate(action: &Action, outcomes: &HashMap<&str, ActionOutcome>) -> Gate {
    let mut ready = true;
    for dep in &action.dependencies {
        match outcomes.get(dep.as_str()).map(|o| o.state) {
            Some(ActionState::Completed) => {}
            Some(state) if !state.is_terminal() => ready = false,
            _ => return Gate::Blocked(dep.clone()),
        }
    }
    if ready {
        Gate::Ready
    } else {
        Gate::Wait
    }
}

/// Moves a pending action to `Ready` once every dependency completed, or to
/// `Blocked` when one ended otherwise. Returns whether the action may be
/// dispatched; a `Ready` action stays dispatchable while it waits for a worker.
fn advance(action: &Action, outcomes: &mut HashMap<&str, ActionOutcome>) -> bool {
    let id = action.id.as_str();
    match outcomes.get(id).map(|o| o.state) {
        Some(ActionState::Ready) => return true,
        Some(ActionState::Pending) => {}
        _ => return false,
    }
    match gate(action, outcomes) {
        Gate::Wait => false,
        Gate::Blocked(dep) => {
            debug!(action_id = %id, dependency = %dep, "Action blocked");
            let reason = format!("dependency {dep} did not complete");
            finish(outcomes, id, ActionState::Blocked, reason);
            false
        }
        Gate::Ready => {
            if let Some(outcome) = outcomes.get_mut(id) {
                outcome.state = ActionState::Ready;
            }
            true
        }
    }
}

fn finish(outcomes: &mut HashMap<&str, ActionOutcome>, id: &str, state: ActionState, reason: String) {
    if let Some(outcome) = outcomes.get_mut(id) {
        outcome.state = state;
        outcome.error = Some(reason);
    }
}

fn truncate(output: String) -> String {
    if output.chars().count() <= MAX_OUTPUT_CHARS {
        return output;
    }
    let mut cut: String = output.chars().take(MAX_OUTPUT_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{ActionPayload, WorkerRole};
    use async_trait::async_trait;
    use maestro_core::ApprovalDecision;
    use parking_lot::Mutex;
    use serde_json::Value;

    /// Fails any read of a path starting with "bad".
    #[derive(Default)]
    struct PathExecutor {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActionExecutor for PathExecutor {
        async fn read_file(&self, path: &str) -> MaestroResult<String> {
            self.calls.lock().push(path.to_string());
            if path.starts_with("bad") {
                return Err(MaestroError::Executor(format!("cannot read {path}")));
            }
            Ok(format!("contents of {path}"))
        }

        async fn write_file(&self, path: &str, _content: &str) -> MaestroResult<String> {
            self.calls.lock().push(path.to_string());
            Ok("written".to_string())
        }

        async fn web_search(&self, query: &str) -> MaestroResult<String> {
            self.calls.lock().push(query.to_string());
            Ok("results".to_string())
        }

        async fn execute_code(&self, code: &str, _language: &str) -> MaestroResult<String> {
            self.calls.lock().push(code.to_string());
            Ok("x".repeat(10_000))
        }

        async fn call_api(&self, url: &str, _method: &str, _data: &Value) -> MaestroResult<String> {
            self.calls.lock().push(url.to_string());
            Ok("{}".to_string())
        }
    }

    struct Verdict(bool);

    #[async_trait]
    impl ApprovalChannel for Verdict {
        async fn request_approval(&self, _request: ApprovalRequest) -> MaestroResult<ApprovalDecision> {
            Ok(ApprovalDecision {
                approved: self.0,
                reason: None,
                reviewer: "test".to_string(),
            })
        }
    }

    fn read(id: &str, path: &str, deps: &[&str]) -> Action {
        Action::new(
            id,
            id,
            ActionPayload::ReadFile {
                path: path.to_string(),
            },
        )
        .with_dependencies(deps.iter().map(|d| (*d).to_string()).collect())
    }

    fn setup(mode: ReservationMode) -> (Arc<WorkerRegistry>, Arc<PathExecutor>, Coordinator, Vec<Worker>) {
        let registry = Arc::new(
            WorkerRegistry::with_workers([Worker::new(
                "w",
                WorkerRole::Executor,
                ["file_management", "code_execution"],
                2,
            )])
            .unwrap(),
        );
        let executor = Arc::new(PathExecutor::default());
        let coordinator = Coordinator::new(registry.clone(), executor.clone(), mode);
        let assigned = registry.workers();
        (registry, executor, coordinator, assigned)
    }

    fn order(actions: &[Action]) -> Vec<String> {
        crate::graph::build_execution_order(actions).unwrap()
    }

    #[tokio::test]
    async fn test_failure_blocks_only_dependents() {
        let (registry, _, coordinator, assigned) = setup(ReservationMode::PerAction);
        let task = Task::new("t").with_actions(vec![
            read("a", "bad.txt", &[]),
            read("b", "ok.txt", &["a"]),
            read("c", "ok.txt", &["b"]),
            read("d", "other.txt", &[]),
        ]);
        let record = coordinator.coordinate(&task, &order(&task.actions), &assigned).await;

        assert_eq!(record.outcome("a").unwrap().state, ActionState::Failed);
        assert_eq!(record.outcome("b").unwrap().state, ActionState::Blocked);
        assert_eq!(record.outcome("c").unwrap().state, ActionState::Blocked);
        assert_eq!(record.outcome("d").unwrap().state, ActionState::Completed);
        assert_eq!(
            record.outcome("b").unwrap().error.as_deref(),
            Some("dependency a did not complete")
        );
        assert_eq!(registry.get("w").unwrap().current_load, 0);
    }

    #[tokio::test]
    async fn test_outcomes_follow_execution_order() {
        let (_, executor, coordinator, assigned) = setup(ReservationMode::PerAction);
        let task = Task::new("t").with_actions(vec![read("b", "b", &["a"]), read("a", "a", &[])]);
        let record = coordinator.coordinate(&task, &order(&task.actions), &assigned).await;
        let ids: Vec<&str> = record.outcomes.iter().map(|o| o.action_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(*executor.calls.lock(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_no_assigned_workers_means_unassignable() {
        let (_, executor, coordinator, _) = setup(ReservationMode::PerAction);
        let task = Task::new("t").with_actions(vec![read("a", "a", &[]), read("b", "b", &["a"])]);
        let record = coordinator.coordinate(&task, &order(&task.actions), &[]).await;
        assert_eq!(record.outcome("a").unwrap().state, ActionState::Unassignable);
        assert_eq!(record.outcome("a").unwrap().error.as_deref(), Some("no suitable worker"));
        assert_eq!(record.outcome("b").unwrap().state, ActionState::Blocked);
        assert!(executor.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_pending_approval_without_channel_is_parked() {
        let (_, executor, coordinator, assigned) = setup(ReservationMode::PerAction);
        let task = Task::new("t").with_actions(vec![
            read("a", "a", &[]).with_approval(ApprovalStatus::PendingApproval),
            read("b", "b", &["a"]),
        ]);
        let record = coordinator.coordinate(&task, &order(&task.actions), &assigned).await;
        assert_eq!(record.outcome("a").unwrap().state, ActionState::AwaitingApproval);
        assert_eq!(record.outcome("b").unwrap().state, ActionState::Blocked);
        assert!(executor.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_approval_channel_decides() {
        let (registry, executor, _, assigned) = setup(ReservationMode::PerAction);
        let task = Task::new("t").with_actions(vec![
            read("a", "a", &[]).with_approval(ApprovalStatus::PendingApproval)
        ]);

        let approving = Coordinator::new(registry.clone(), executor.clone(), ReservationMode::PerAction)
            .with_approvals(Arc::new(Verdict(true)));
        let record = approving.coordinate(&task, &order(&task.actions), &assigned).await;
        assert_eq!(record.outcome("a").unwrap().state, ActionState::Completed);

        let denying = Coordinator::new(registry, executor, ReservationMode::PerAction)
            .with_approvals(Arc::new(Verdict(false)));
        let record = denying.coordinate(&task, &order(&task.actions), &assigned).await;
        assert_eq!(record.outcome("a").unwrap().state, ActionState::Rejected);
        assert_eq!(record.outcome("a").unwrap().error.as_deref(), Some("rejected by test"));
    }

    #[tokio::test]
    async fn test_per_task_mode_releases_assigned_workers() {
        let (registry, _, coordinator, _) = setup(ReservationMode::PerTask);
        let required = ["file_management".to_string()].into_iter().collect();
        let assigned = registry.reserve_candidates(&required, 3);
        assert_eq!(registry.get("w").unwrap().current_load, 1);

        let task = Task::new("t").with_actions(vec![read("a", "a", &[]), read("b", "b", &[])]);
        let record = coordinator.coordinate(&task, &order(&task.actions), &assigned).await;
        assert!(record.is_success());
        assert_eq!(registry.get("w").unwrap().current_load, 0);
    }

    #[tokio::test]
    async fn test_offline_worker_makes_action_unassignable() {
        let (registry, _, coordinator, assigned) = setup(ReservationMode::PerAction);
        registry.set_offline("w").unwrap();
        let task = Task::new("t").with_actions(vec![read("a", "a", &[])]);
        let record = coordinator.coordinate(&task, &order(&task.actions), &assigned).await;
        assert_eq!(record.outcome("a").unwrap().state, ActionState::Unassignable);
    }

    #[tokio::test]
    async fn test_long_output_is_truncated() {
        let (_, _, coordinator, assigned) = setup(ReservationMode::PerAction);
        let task = Task::new("t").with_actions(vec![Action::new(
            "code",
            "run",
            ActionPayload::ExecuteCode {
                code: "print('x' * 10000)".to_string(),
                language: "python".to_string(),
            },
        )]);
        let record = coordinator.coordinate(&task, &order(&task.actions), &assigned).await;
        let output = record.outcome("code").unwrap().output.clone().unwrap();
        assert_eq!(output.chars().count(), MAX_OUTPUT_CHARS + 3);
    }

    #[tokio::test]
    async fn test_saturated_worker_is_waited_for() {
        let (registry, executor, coordinator, assigned) = setup(ReservationMode::PerAction);
        registry.reserve("w", 2).unwrap();

        let releaser = {
            let registry = registry.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                registry.release("w", 2).unwrap();
            })
        };

        let task = Task::new("t").with_actions(vec![read("a", "a", &[])]);
        let record = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            coordinator.coordinate(&task, &order(&task.actions), &assigned),
        )
        .await
        .unwrap();
        releaser.await.unwrap();

        assert!(record.is_success());
        assert_eq!(executor.calls.lock().len(), 1);
        assert_eq!(registry.get("w").unwrap().current_load, 0);
    }

    #[tokio::test]
    async fn test_waiting_action_gives_up_when_worker_goes_offline() {
        let (registry, executor, coordinator, assigned) = setup(ReservationMode::PerAction);
        registry.reserve("w", 2).unwrap();

        let switcher = {
            let registry = registry.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                registry.set_offline("w").unwrap();
            })
        };

        let task = Task::new("t").with_actions(vec![read("a", "a", &[])]);
        let record = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            coordinator.coordinate(&task, &order(&task.actions), &assigned),
        )
        .await
        .expect("coordinator must not stay parked on an offline worker");
        switcher.await.unwrap();

        let outcome = record.outcome("a").unwrap();
        assert_eq!(outcome.state, ActionState::Unassignable);
        assert_eq!(outcome.error.as_deref(), Some("all capable workers are offline"));
        assert!(executor.calls.lock().is_empty());
        assert_eq!(registry.get("w").unwrap().current_load, 2);
    }

    #[test]
    fn test_gate_moves_pending_through_ready() {
        let a = read("a", "a", &[]);
        let b = read("b", "b", &["a"]);
        let c = read("c", "c", &["b"]);
        let mut outcomes: HashMap<&str, ActionOutcome> = [&a, &b, &c]
            .into_iter()
            .map(|x| (x.id.as_str(), pending_outcome(x)))
            .collect();

        assert!(advance(&a, &mut outcomes));
        assert_eq!(outcomes["a"].state, ActionState::Ready);
        // still ready on the next pass, e.g. while waiting for a worker
        assert!(advance(&a, &mut outcomes));
        assert!(!advance(&b, &mut outcomes));
        assert_eq!(outcomes["b"].state, ActionState::Pending);

        outcomes.get_mut("a").unwrap().state = ActionState::Completed;
        assert!(advance(&b, &mut outcomes));
        assert_eq!(outcomes["b"].state, ActionState::Ready);

        outcomes.get_mut("b").unwrap().state = ActionState::Failed;
        assert!(!advance(&c, &mut outcomes));
        assert_eq!(outcomes["c"].state, ActionState::Blocked);
        assert!(!advance(&b, &mut outcomes));
    }
}
