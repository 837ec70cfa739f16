use crate::types::{ExecutionRecord, Task};
use maestro_memory::LearningStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Writes one pattern line per finished task to the learning store.
pub struct OutcomeRecorder {
    store: Arc<dyn LearningStore>,
    category: String,
}

impl OutcomeRecorder {
    pub fn new(store: Arc<dyn LearningStore>, category: impl Into<String>) -> Self {
        Self {
            store,
            category: category.into(),
        }
    }

    /// Persist the task's pattern. Storage failures are logged and swallowed.
    pub async fn record(&self, task: &Task, record: &ExecutionRecord) {
        let line = pattern_line(task, record);
        let tags = pattern_tags(task, record);
        match self.store.store(&line, &self.category, &tags).await {
            Ok(()) => debug!(task_id = %task.id, pattern = %line, "Outcome recorded"),
            Err(e) => warn!(task_id = %task.id, error = %e, "Failed to record outcome"),
        }
    }
}

/// `type=<complexity> actions=<n> kinds=<k,..> estimated_secs=<e> actual_ms=<a> success=<bool>`
pub fn pattern_line(task: &Task, record: &ExecutionRecord) -> String {
    let kinds: BTreeSet<&str> = task.actions.iter().map(|a| a.kind.as_str()).collect();
    let kinds: Vec<&str> = kinds.into_iter().collect();
    format!(
        "type={} actions={} kinds={} estimated_secs={} actual_ms={} success={}",
        task.complexity,
        task.actions.len(),
        kinds.join(","),
        task.estimated_duration_secs,
        record.elapsed_ms,
        record.is_success()
    )
}

/// Complexity, outcome, then the task's capability domains.
fn pattern_tags(task: &Task, record: &ExecutionRecord) -> Vec<String> {
    let mut tags = vec![
        task.complexity.to_string(),
        if record.is_success() { "success" } else { "failure" }.to_string(),
    ];
    let domains: BTreeSet<&str> = task
        .actions
        .iter()
        .flat_map(|a| a.kind.capabilities().iter().copied())
        .chain(task.required_capabilities.iter().map(String::as_str))
        .collect();
    tags.extend(domains.into_iter().map(ToString::to_string));
    tags
}
