//! Dependency graph checks and wave layering for task lists

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use crate::domain::{PlannerTask, TripField};

/// Errors from building or validating a task graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Trip is missing required fields: {0:?}")]
    IncompleteTrip(Vec<TripField>),

    #[error("Trip returns on {ret}, before it departs on {depart}")]
    InvertedDates { depart: NaiveDate, ret: NaiveDate },

    #[error("Duplicate task id: {0}")]
    DuplicateId(String),

    #[error("Task {task} depends on {dependency}, which is not defined before it")]
    ForwardReference { task: String, dependency: String },

    #[error("Cyclic dependency: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Template error: {0}")]
    Template(String),
}

/// Check that `tasks` form a DAG whose edges only point backwards
///
/// Duplicate ids, cycles and forward or unknown references are all rejected.
pub fn validate(tasks: &[PlannerTask]) -> Result<(), GraphError> {
    debug!(task_count = tasks.len(), "validate: called");

    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(GraphError::DuplicateId(task.id.clone()));
        }
    }

    let task_map: HashMap<&str, &PlannerTask> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut cycle_path = Vec::new();

    for task in tasks {
        if !visited.contains(task.id.as_str())
            && has_cycle_dfs(&task.id, &task_map, &mut visited, &mut rec_stack, &mut cycle_path)
        {
            debug!(?cycle_path, "validate: cycle detected");
            return Err(GraphError::Cycle(cycle_path));
        }
    }

    let mut defined: HashSet<&str> = HashSet::new();
    for task in tasks {
        for dep in &task.depends_on {
            if !defined.contains(dep.as_str()) {
                return Err(GraphError::ForwardReference {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        defined.insert(task.id.as_str());
    }

    Ok(())
}

/// DFS helper for cycle detection
fn has_cycle_dfs<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, &'a PlannerTask>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    cycle_path: &mut Vec<String>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    cycle_path.push(node.to_string());

    if let Some(task) = graph.get(node) {
        for dep_id in &task.depends_on {
            if !visited.contains(dep_id.as_str()) {
                if graph.contains_key(dep_id.as_str())
                    && has_cycle_dfs(dep_id.as_str(), graph, visited, rec_stack, cycle_path)
                {
                    return true;
                }
            } else if rec_stack.contains(dep_id.as_str()) {
                cycle_path.push(dep_id.clone());
                return true;
            }
        }
    }

    rec_stack.remove(node);
    cycle_path.pop();
    false
}

/// Layer tasks into dispatch waves (Kahn's algorithm)
///
/// Wave `n` holds every task whose dependencies all sit in earlier waves.
/// Inside a wave tasks are ordered by priority, then list position. Returns
/// indices into `tasks`.
pub fn waves(tasks: &[PlannerTask]) -> Result<Vec<Vec<usize>>, GraphError> {
    validate(tasks)?;

    let index_map: HashMap<&str, usize> = tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();
    let mut remaining: Vec<usize> = tasks.iter().map(|t| t.depends_on.len()).collect();
    let mut dependants: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (idx, task) in tasks.iter().enumerate() {
        for dep in &task.depends_on {
            if let Some(&dep_idx) = index_map.get(dep.as_str()) {
                dependants[dep_idx].push(idx);
            }
        }
    }

    let mut ready: Vec<usize> = (0..tasks.len()).filter(|i| remaining[*i] == 0).collect();
    let mut layers = Vec::new();
    let mut placed = 0;

    while !ready.is_empty() {
        ready.sort_by_key(|i| (tasks[*i].priority(), *i));
        let mut next = Vec::new();
        for &idx in &ready {
            for &child in &dependants[idx] {
                remaining[child] -= 1;
                if remaining[child] == 0 {
                    next.push(child);
                }
            }
        }
        placed += ready.len();
        layers.push(std::mem::take(&mut ready));
        ready = next;
    }

    if placed != tasks.len() {
        let stuck = (0..tasks.len())
            .filter(|i| remaining[*i] > 0)
            .map(|i| tasks[i].id.clone())
            .collect();
        return Err(GraphError::Cycle(stuck));
    }

    debug!(wave_count = layers.len(), "waves: layered");
    Ok(layers)
}

/// Critical-path estimate: the longest task of each wave, summed
pub fn critical_path_minutes(tasks: &[PlannerTask], layers: &[Vec<usize>]) -> u32 {
    layers
        .iter()
        .map(|wave| {
            wave.iter()
                .map(|i| tasks[*i].metadata.estimated_minutes)
                .max()
                .unwrap_or(0)
        })
        .sum()
}
