//! Task records and the task state machine.
//!
//! ```text
//!   pending ──► running ──► completed
//!      │           │
//!      │           ├──────► failed ──(retry)──► pending
//!      │           │
//!      └───────────┴──────► cancelled
//! ```
//!
//! All derived fields (start/end timestamps, error detail) are maintained by
//! [`Task::transition`], so the invariants below hold for every record that
//! was only mutated through it:
//!
//! - `start_time` is set iff the state is not `pending`
//! - `end_time` is set iff the state is `completed` or `failed`
//! - `end_time >= start_time` whenever both are set

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::ids::{AgentId, ConversationId, OrchestratorId, TaskId};
use crate::payload::Payload;

/// State of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Every task state.
    pub const ALL: [TaskState; 5] = [
        TaskState::Pending,
        TaskState::Running,
        TaskState::Completed,
        TaskState::Failed,
        TaskState::Cancelled,
    ];

    /// Whether the task has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Whether the state machine allows moving to `next`.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Advisory task priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        };
        f.write_str(s)
    }
}

/// Why a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// Input payload was malformed; never retried automatically
    InvalidInput,
    /// The capability handler returned an error
    Handler,
    /// The handler exceeded the task time limit
    Timeout,
}

/// Error detail stored on a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Failure category
    pub kind: TaskErrorKind,
    /// Human-readable message
    pub message: String,
}

impl TaskError {
    /// Create an error detail.
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Map an orchestration error to stored task error detail.
    pub fn from_error(err: &OrchestrationError) -> Self {
        let kind = match err {
            OrchestrationError::InvalidInput(_) => TaskErrorKind::InvalidInput,
            OrchestrationError::Timeout(_) => TaskErrorKind::Timeout,
            _ => TaskErrorKind::Handler,
        };
        let message = match err {
            OrchestrationError::Handler(detail) => detail.clone(),
            other => other.to_string(),
        };
        Self { kind, message }
    }

    /// Whether this failure counts against the retry budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, TaskErrorKind::InvalidInput)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A unit of work bound to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,
    /// Human-readable name
    pub name: String,
    /// Task type passed to the capability handler
    pub task_type: String,
    /// Assigned agent
    pub agent_id: AgentId,
    /// Owning orchestrator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_id: Option<OrchestratorId>,
    /// Owning conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    /// Requesting user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Raw input, validated on execution
    pub input: Value,
    /// Handler output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Payload>,
    /// Current state
    pub state: TaskState,
    /// Advisory priority
    pub priority: Priority,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Set when the task leaves pending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Set when the task completes or fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Failed executions so far
    pub retry_count: u32,
    /// Failed executions allowed before retries stop
    pub max_retries: u32,
}

impl Task {
    /// Default retry limit.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Create a pending task.
    pub fn new(
        name: impl Into<String>,
        task_type: impl Into<String>,
        agent_id: AgentId,
        input: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            name: name.into(),
            task_type: task_type.into(),
            agent_id,
            orchestrator_id: None,
            conversation_id: None,
            user_id: None,
            input,
            output: None,
            state: TaskState::Pending,
            priority: Priority::Medium,
            created_at: now,
            updated_at: now,
            start_time: None,
            end_time: None,
            error: None,
            retry_count: 0,
            max_retries: Self::DEFAULT_MAX_RETRIES,
        }
    }

    /// Bind to an orchestrator.
    pub fn with_orchestrator(mut self, id: OrchestratorId) -> Self {
        self.orchestrator_id = Some(id);
        self
    }

    /// Bind to a conversation.
    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    /// Record the requesting user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry limit.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Move to `next`, maintaining every derived field.
    ///
    /// Entering `running` (or `cancelled` straight from `pending`) stamps
    /// `start_time` if unset. Entering `completed`/`failed` stamps `end_time`.
    /// Going back to `pending` clears timestamps and error detail.
    pub fn transition(&mut self, next: TaskState, now: DateTime<Utc>) -> OrchestrationResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(OrchestrationError::invalid_transition("task", self.state, next));
        }

        match next {
            TaskState::Pending => {
                self.start_time = None;
                self.end_time = None;
                self.error = None;
            }
            TaskState::Running | TaskState::Cancelled => {
                self.start_time.get_or_insert(now);
            }
            TaskState::Completed | TaskState::Failed => {
                let start = *self.start_time.get_or_insert(now);
                self.end_time.get_or_insert(now.max(start));
            }
        }

        self.state = next;
        self.updated_at = now;
        Ok(())
    }

    /// Store output and move to completed.
    pub fn complete(&mut self, output: Payload, now: DateTime<Utc>) -> OrchestrationResult<()> {
        self.transition(TaskState::Completed, now)?;
        self.output = Some(output);
        Ok(())
    }

    /// Store error detail and move to failed.
    ///
    /// Retryable failures increment `retry_count`.
    pub fn fail(&mut self, error: TaskError, now: DateTime<Utc>) -> OrchestrationResult<()> {
        self.transition(TaskState::Failed, now)?;
        if error.is_retryable() {
            self.retry_count += 1;
        }
        self.error = Some(error);
        Ok(())
    }

    /// Whether another retry is allowed right now.
    pub fn can_retry(&self) -> bool {
        self.state == TaskState::Failed && self.retry_count < self.max_retries
    }

    /// Seconds between start and end, when both are set.
    pub fn response_time(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    /// Whether the task completed.
    pub fn is_success(&self) -> bool {
        self.state == TaskState::Completed
    }
}
