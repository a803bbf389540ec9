//! Error types for the orchestration engine.

use std::time::Duration;
use thiserror::Error;

use crate::agent::AgentType;
use crate::ids::{AgentId, ConversationId, OrchestratorId, TaskId};

/// Errors that can occur while planning, routing or executing work.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// A goal, context or task payload is malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No active agent of the requested type exists.
    #[error("No agent found for type: {0}")]
    NoCapableAgent(AgentType),

    /// A plan step could not be routed to an agent.
    #[error("Routing failed: {reason}")]
    RoutingFailure { reason: String },

    /// A capability handler reported an error.
    #[error("Handler error: {0}")]
    Handler(String),

    /// A task exceeded its time limit.
    #[error("Task timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Retry requested for a task that is not failed or has used its retries.
    #[error(
        "Cannot retry task {task_id}: state {state}, {retry_count} of {max_retries} retries used"
    )]
    RetryNotAllowed {
        task_id: TaskId,
        state: String,
        retry_count: u32,
        max_retries: u32,
    },

    /// A lifecycle change that the state machine does not allow.
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Planner or router agent is missing or unusable.
    #[error("Orchestrator misconfigured: {0}")]
    MisconfiguredOrchestrator(String),

    /// The orchestrator does not accept work in its current state.
    #[error("Orchestrator {id} is not active (state: {state})")]
    OrchestratorNotActive { id: OrchestratorId, state: String },

    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// Agent not found.
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    /// Conversation not found.
    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// Agent cannot be removed while live tasks reference it.
    #[error("Agent {agent_id} is referenced by {live_tasks} live task(s)")]
    AgentInUse { agent_id: AgentId, live_tasks: usize },

    /// Backing store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OrchestrationError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestrationError::Handler(_) | OrchestrationError::Timeout(_)
        )
    }

    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            OrchestrationError::InvalidInput(_) => "INVALID_INPUT",
            OrchestrationError::NoCapableAgent(_) => "NO_CAPABLE_AGENT",
            OrchestrationError::RoutingFailure { .. } => "ROUTING_FAILURE",
            OrchestrationError::Handler(_) => "HANDLER_ERROR",
            OrchestrationError::Timeout(_) => "TIMEOUT",
            OrchestrationError::RetryNotAllowed { .. } => "RETRY_NOT_ALLOWED",
            OrchestrationError::InvalidTransition { .. } => "INVALID_TRANSITION",
            OrchestrationError::MisconfiguredOrchestrator(_) => "MISCONFIGURED_ORCHESTRATOR",
            OrchestrationError::OrchestratorNotActive { .. } => "ORCHESTRATOR_NOT_ACTIVE",
            OrchestrationError::TaskNotFound(_) => "TASK_NOT_FOUND",
            OrchestrationError::AgentNotFound(_) => "AGENT_NOT_FOUND",
            OrchestrationError::ConversationNotFound(_) => "CONVERSATION_NOT_FOUND",
            OrchestrationError::AgentInUse { .. } => "AGENT_IN_USE",
            OrchestrationError::Store(_) => "STORE_ERROR",
            OrchestrationError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Shorthand for an [`OrchestrationError::InvalidTransition`].
    pub fn invalid_transition(
        entity: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        OrchestrationError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Result type for orchestration operations.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

impl From<serde_json::Error> for OrchestrationError {
    fn from(err: serde_json::Error) -> Self {
        OrchestrationError::Serialization(err.to_string())
    }
}

impl From<HandlerError> for OrchestrationError {
    fn from(err: HandlerError) -> Self {
        OrchestrationError::Handler(err.detail)
    }
}

/// Error returned by a capability handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct HandlerError {
    /// Human-readable failure detail, stored on the failed task.
    pub detail: String,
}

impl HandlerError {
    /// Create a handler error with the given detail.
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Error returned by a notification sink.
#[derive(Debug, Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_capable_agent_display() {
        let err = OrchestrationError::NoCapableAgent(AgentType::Crm);
        assert_eq!(err.to_string(), "No agent found for type: crm");
    }

    #[test]
    fn test_is_retryable() {
        assert!(OrchestrationError::Handler("boom".to_string()).is_retryable());
        assert!(OrchestrationError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!OrchestrationError::InvalidInput("bad".to_string()).is_retryable());
        assert!(
            !OrchestrationError::MisconfiguredOrchestrator("no planner".to_string())
                .is_retryable()
        );
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            OrchestrationError::RoutingFailure {
                reason: "x".to_string()
            }
            .error_code(),
            "ROUTING_FAILURE"
        );
        assert_eq!(
            OrchestrationError::invalid_transition("task", "completed", "running").error_code(),
            "INVALID_TRANSITION"
        );
    }

    #[test]
    fn test_handler_error_converts() {
        let err: OrchestrationError = HandlerError::new("lead creation rejected").into();
        assert_eq!(err.to_string(), "Handler error: lead creation rejected");
    }

    #[test]
    fn test_timeout_display() {
        let err = OrchestrationError::Timeout(Duration::from_secs(300));
        assert_eq!(err.to_string(), "Task timed out after 300s");
    }
}
