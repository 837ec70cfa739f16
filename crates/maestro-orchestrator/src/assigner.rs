use crate::config::ReservationMode;
use crate::registry::WorkerRegistry;
use crate::types::{Action, Task, Worker};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Union of the capabilities implied by every action kind present.
pub fn required_capabilities(actions: &[Action]) -> BTreeSet<String> {
    actions
        .iter()
        .flat_map(|a| a.kind.capabilities().iter())
        .map(|cap| (*cap).to_string())
        .collect()
}

/// Select up to `max_agents` workers for `task`, best-ranked first.
///
/// In [`ReservationMode::PerTask`] each selected worker is reserved once here
/// and must be released by the coordinator. In per-action mode nothing is
/// reserved yet. An empty selection is not an error.
pub fn assign(
    registry: &WorkerRegistry,
    task: &Task,
    max_agents: usize,
    mode: ReservationMode,
) -> Vec<Worker> {
    let required = required_capabilities(&task.actions);
    let selected = match mode {
        ReservationMode::PerAction => registry
            .find_candidates(&required)
            .into_iter()
            .take(max_agents)
            .collect::<Vec<_>>(),
        ReservationMode::PerTask => registry.reserve_candidates(&required, max_agents),
    };

    if selected.is_empty() {
        warn!(task_id = %task.id, required = ?required, "No suitable worker found");
    } else {
        info!(
            task_id = %task.id,
            workers = ?selected.iter().map(|w| w.id.as_str()).collect::<Vec<_>>(),
            "Workers assigned"
        );
    }
    selected
}
