//! Task movement and reordering.
//!
//! Columns keep a dense 0..n-1 `order` per status. A move renumbers only
//! the destination column; every other column keeps its existing values.

use chrono::Utc;

use tablero_data::{Task, TaskStatus, WorkspaceSummary};

/// Move a task to `new_status`, placed at `new_index` within that column.
///
/// The index is clamped to the destination column's bounds. Entering Done
/// stamps `completed_at` unless one is already present; leaving Done
/// clears it. An unknown `task_id` returns the input unchanged.
pub fn move_task(
    tasks: &[Task],
    task_id: &str,
    new_status: TaskStatus,
    new_index: usize,
) -> Vec<Task> {
    let Some(task_to_move) = tasks.iter().find(|t| t.id == task_id) else {
        return tasks.to_vec();
    };

    // Everything except the moving task, split into the destination
    // column (sorted by current order) and the untouched rest.
    let mut dest_column: Vec<Task> = tasks
        .iter()
        .filter(|t| t.id != task_id && t.status == new_status)
        .cloned()
        .collect();
    dest_column.sort_by_key(|t| t.order);

    let mut rest: Vec<Task> = tasks
        .iter()
        .filter(|t| t.id != task_id && t.status != new_status)
        .cloned()
        .collect();

    let mut updated = task_to_move.clone();
    updated.status = new_status;
    updated.completed_at = if new_status == TaskStatus::Done {
        updated
            .completed_at
            .or_else(|| Some(Utc::now().to_rfc3339()))
    } else {
        None
    };

    let index = new_index.min(dest_column.len());
    dest_column.insert(index, updated);

    for (i, task) in dest_column.iter_mut().enumerate() {
        task.order = i as u32;
    }

    rest.extend(dest_column);
    rest
}

/// Renumber a workspace list densely after a manual rearrangement.
pub fn reorder_summaries(ordered: Vec<WorkspaceSummary>) -> Vec<WorkspaceSummary> {
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, mut ws)| {
            ws.order = i as u32;
            ws
        })
        .collect()
}
