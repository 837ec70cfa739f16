use crate::types::Action;
use maestro_core::{MaestroError, MaestroResult};
use std::collections::HashMap;

const IN_PROGRESS: u8 = 1;
const DONE: u8 = 2;

/// Topologically order a task's actions.
///
/// Depth-first: each action is emitted after all of its dependencies, so every
/// action appears strictly after the actions it depends on. Actions are visited
/// in list order and dependencies in declared order, which makes the result
/// deterministic. Fails with [`MaestroError::Cycle`] naming the action that
/// closed the loop, or [`MaestroError::UnknownDependency`] for a dangling ID.
pub fn build_execution_order(actions: &[Action]) -> MaestroResult<Vec<String>> {
    let mut by_id: HashMap<&str, &Action> = HashMap::with_capacity(actions.len());
    for action in actions {
        if by_id.insert(action.id.as_str(), action).is_some() {
            return Err(MaestroError::Orchestrator(format!(
                "duplicate action id '{}'",
                action.id
            )));
        }
    }

    let mut marks: HashMap<&str, u8> = HashMap::with_capacity(actions.len());
    let mut order = Vec::with_capacity(actions.len());
    for action in actions {
        visit(action, &by_id, &mut marks, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    action: &'a Action,
    by_id: &HashMap<&'a str, &'a Action>,
    marks: &mut HashMap<&'a str, u8>,
    order: &mut Vec<String>,
) -> MaestroResult<()> {
    match marks.get(action.id.as_str()) {
        Some(&DONE) => return Ok(()),
        Some(&IN_PROGRESS) => {
            return Err(MaestroError::Cycle {
                action_id: action.id.clone(),
            })
        }
        _ => {}
    }

    marks.insert(action.id.as_str(), IN_PROGRESS);
    for dep in &action.dependencies {
        let Some(dependency) = by_id.get(dep.as_str()) else {
            return Err(MaestroError::UnknownDependency {
                action_id: action.id.clone(),
                dependency_id: dep.clone(),
            });
        };
        visit(dependency, by_id, marks, order)?;
    }
    marks.insert(action.id.as_str(), DONE);
    order.push(action.id.clone());
    Ok(())
}

/// Whether the actions' dependency relation contains a cycle.
pub fn has_cycle(actions: &[Action]) -> bool {
    matches!(
        build_execution_order(actions),
        Err(MaestroError::Cycle { .. })
    )
}
