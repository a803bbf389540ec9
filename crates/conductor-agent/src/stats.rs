//! Aggregate statistics over task sets.

use serde::{Deserialize, Serialize};

use conductor_core::{Task, TaskState};

/// Counts and rates computed from a set of tasks.
///
/// Success rate is `completed / total` (0.0 for an empty set) and average
/// response time is the mean over completed tasks only.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Ratio in `0.0..=1.0`
    pub success_rate: f64,
    /// Seconds
    pub avg_response_time: f64,
}

impl TaskStats {
    /// Compute statistics for a task set.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut stats = TaskStats::default();
        let mut response_sum = 0.0;
        let mut response_samples = 0usize;

        for task in tasks {
            stats.total += 1;
            match task.state {
                TaskState::Pending => stats.pending += 1,
                TaskState::Running => stats.running += 1,
                TaskState::Completed => {
                    stats.completed += 1;
                    if let Some(rt) = task.response_time() {
                        response_sum += rt;
                        response_samples += 1;
                    }
                }
                TaskState::Failed => stats.failed += 1,
                TaskState::Cancelled => stats.cancelled += 1,
            }
        }

        if stats.total > 0 {
            stats.success_rate = stats.completed as f64 / stats.total as f64;
        }
        if response_samples > 0 {
            stats.avg_response_time = response_sum / response_samples as f64;
        }
        stats
    }
}
