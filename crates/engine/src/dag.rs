//! DAG validation — run this before persisting or executing a workflow.
//!
//! Rules enforced:
//! 1. Action IDs must be unique within the workflow.
//! 2. Every `run_after` entry must reference an action of the same workflow.
//! 3. The dependency graph must be acyclic (topological sort must succeed).
//!
//! Returns the dispatch order on success: among actions whose predecessors
//! have all been placed, the one declared first goes next.

use std::collections::{BTreeSet, HashMap, HashSet};

use uuid::Uuid;

use crate::{EngineError, Workflow};

/// Validate the workflow's action graph and return action ids in dispatch order.
///
/// # Errors
/// - [`EngineError::DuplicateActionId`] if two actions share an ID.
/// - [`EngineError::UnknownDependency`] if `run_after` references a missing action.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_dag(workflow: &Workflow) -> Result<Vec<Uuid>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure action IDs are unique
    // -----------------------------------------------------------------------
    let mut index: HashMap<Uuid, usize> = HashMap::with_capacity(workflow.actions.len());
    for (position, action) in workflow.actions.iter().enumerate() {
        if index.insert(action.id, position).is_some() {
            return Err(EngineError::DuplicateActionId(action.id));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate dependency references
    // -----------------------------------------------------------------------
    for action in &workflow.actions {
        if let Some(&dependency) = action.run_after.iter().find(|d| !index.contains_key(d)) {
            return Err(EngineError::UnknownDependency {
                action_id: action.id,
                dependency,
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Topological sort (Kahn's algorithm, declaration order breaks ties)
    // -----------------------------------------------------------------------
    let count = workflow.actions.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree: Vec<usize> = vec![0; count];

    for (position, action) in workflow.actions.iter().enumerate() {
        let predecessors: HashSet<&Uuid> = action.run_after.iter().collect();
        for predecessor in predecessors {
            dependents[index[predecessor]].push(position);
            in_degree[position] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted: Vec<Uuid> = Vec::with_capacity(count);

    while let Some(position) = ready.pop_first() {
        sorted.push(workflow.actions[position].id);

        for &dependent in &dependents[position] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    // If we didn't visit every action the graph contains a cycle.
    if sorted.len() != count {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}
