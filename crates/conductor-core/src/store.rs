//! Persistence abstractions for agents, tasks and conversations.
//!
//! Stores are simple keyed collections with read-your-writes consistency.
//! Every write replaces the whole record, so readers never observe a
//! partially updated descriptor. Callers that need read-modify-write
//! atomicity serialize through their own lock (the registry and the task
//! engine both do).
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor_core::{InMemoryTaskStore, TaskQuery, TaskState, TaskStore};
//!
//! let store = InMemoryTaskStore::new();
//! store.save(&task).await?;
//!
//! let failed = store
//!     .query(&TaskQuery::new().with_state(TaskState::Failed))
//!     .await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentState, AgentType};
use crate::conversation::{Conversation, ConversationState};
use crate::error::OrchestrationResult;
use crate::ids::{AgentId, ConversationId, OrchestratorId, TaskId};
use crate::task::{Task, TaskState};

// ============================================================================
// Agent Query
// ============================================================================

/// Query parameters for filtering agents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentQuery {
    /// Filter by agent type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,
    /// Filter by state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<AgentState>,
    /// Filter by enabled capability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Maximum number of results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl AgentQuery {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by agent type.
    pub fn with_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = Some(agent_type);
        self
    }

    /// Filter by state.
    pub fn with_state(mut self, state: AgentState) -> Self {
        self.state = Some(state);
        self
    }

    /// Only resolvable agents.
    pub fn active(self) -> Self {
        self.with_state(AgentState::Active)
    }

    /// Filter by capability.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    /// Set maximum results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check if an agent matches this query.
    pub fn matches(&self, agent: &Agent) -> bool {
        if let Some(agent_type) = self.agent_type
            && agent.agent_type != agent_type
        {
            return false;
        }

        if let Some(state) = self.state
            && agent.state != state
        {
            return false;
        }

        if self
            .capability
            .as_ref()
            .is_some_and(|c| !agent.has_capability(c))
        {
            return false;
        }

        true
    }
}

// ============================================================================
// Task Query
// ============================================================================

/// Query parameters for filtering tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskQuery {
    /// Filter by any of these states (OR)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<TaskState>,
    /// Filter by assigned agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Filter by owning orchestrator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestrator_id: Option<OrchestratorId>,
    /// Filter by owning conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    /// Filter by creation time (strictly before)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
    /// Filter by creation time (at or after)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    /// Include only terminal tasks
    #[serde(default)]
    pub terminal_only: bool,
    /// Include only non-terminal tasks
    #[serde(default)]
    pub live_only: bool,
    /// Maximum number of results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Sort order (true = newest first)
    #[serde(default)]
    pub newest_first: bool,
}

impl TaskQuery {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by single state.
    pub fn with_state(mut self, state: TaskState) -> Self {
        self.states = vec![state];
        self
    }

    /// Filter by multiple states (OR).
    pub fn with_states(mut self, states: Vec<TaskState>) -> Self {
        self.states = states;
        self
    }

    /// Filter by assigned agent.
    pub fn with_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Filter by owning orchestrator.
    pub fn with_orchestrator(mut self, orchestrator_id: OrchestratorId) -> Self {
        self.orchestrator_id = Some(orchestrator_id);
        self
    }

    /// Filter by owning conversation.
    pub fn with_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    /// Filter by tasks created strictly before a time.
    pub fn created_before(mut self, before: DateTime<Utc>) -> Self {
        self.created_before = Some(before);
        self
    }

    /// Filter by tasks created at or after a time.
    pub fn created_after(mut self, after: DateTime<Utc>) -> Self {
        self.created_after = Some(after);
        self
    }

    /// Include only terminal tasks.
    pub fn terminal_only(mut self) -> Self {
        self.terminal_only = true;
        self.live_only = false;
        self
    }

    /// Include only pending or running tasks.
    pub fn live_only(mut self) -> Self {
        self.live_only = true;
        self.terminal_only = false;
        self
    }

    /// Set maximum results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sort newest first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Check if a task matches this query.
    pub fn matches(&self, task: &Task) -> bool {
        if !self.states.is_empty() && !self.states.contains(&task.state) {
            return false;
        }

        if self.agent_id.as_ref().is_some_and(|a| &task.agent_id != a) {
            return false;
        }

        if self
            .orchestrator_id
            .as_ref()
            .is_some_and(|o| task.orchestrator_id.as_ref() != Some(o))
        {
            return false;
        }

        if self
            .conversation_id
            .as_ref()
            .is_some_and(|c| task.conversation_id.as_ref() != Some(c))
        {
            return false;
        }

        if self.created_before.is_some_and(|b| task.created_at >= b) {
            return false;
        }

        if self.created_after.is_some_and(|a| task.created_at < a) {
            return false;
        }

        if self.terminal_only && !task.state.is_terminal() {
            return false;
        }

        if self.live_only && task.state.is_terminal() {
            return false;
        }

        true
    }
}

// ============================================================================
// Conversation Query
// ============================================================================

/// Query parameters for filtering conversations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationQuery {
    /// Filter by owning user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Filter by any of these states (OR)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<ConversationState>,
    /// Filter by orchestrator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestrator_id: Option<OrchestratorId>,
    /// Filter by creation time (strictly before)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
    /// Include only terminal conversations
    #[serde(default)]
    pub terminal_only: bool,
    /// Maximum number of results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Sort order (true = newest first)
    #[serde(default)]
    pub newest_first: bool,
}

impl ConversationQuery {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by owning user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Filter by single state.
    pub fn with_state(mut self, state: ConversationState) -> Self {
        self.states = vec![state];
        self
    }

    /// Filter by orchestrator.
    pub fn with_orchestrator(mut self, orchestrator_id: OrchestratorId) -> Self {
        self.orchestrator_id = Some(orchestrator_id);
        self
    }

    /// Filter by conversations created strictly before a time.
    pub fn created_before(mut self, before: DateTime<Utc>) -> Self {
        self.created_before = Some(before);
        self
    }

    /// Include only terminal conversations.
    pub fn terminal_only(mut self) -> Self {
        self.terminal_only = true;
        self
    }

    /// Set maximum results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sort newest first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Check if a conversation matches this query.
    pub fn matches(&self, conversation: &Conversation) -> bool {
        if self
            .user_id
            .as_ref()
            .is_some_and(|u| &conversation.user_id != u)
        {
            return false;
        }

        if !self.states.is_empty() && !self.states.contains(&conversation.state) {
            return false;
        }

        if self
            .orchestrator_id
            .as_ref()
            .is_some_and(|o| conversation.orchestrator_id.as_ref() != Some(o))
        {
            return false;
        }

        if self
            .created_before
            .is_some_and(|b| conversation.created_at >= b)
        {
            return false;
        }

        if self.terminal_only && !conversation.state.is_terminal() {
            return false;
        }

        true
    }
}

// ============================================================================
// Store Traits
// ============================================================================

/// Async trait for agent persistence.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Save or update an agent.
    async fn save(&self, agent: &Agent) -> OrchestrationResult<()>;

    /// Get an agent by ID.
    async fn get(&self, agent_id: &AgentId) -> OrchestrationResult<Option<Agent>>;

    /// Delete an agent by ID.
    async fn delete(&self, agent_id: &AgentId) -> OrchestrationResult<bool>;

    /// Query agents, ordered by `(sequence, ordinal)`.
    async fn query(&self, query: &AgentQuery) -> OrchestrationResult<Vec<Agent>>;

    /// Count agents matching a query.
    async fn count(&self, query: &AgentQuery) -> OrchestrationResult<usize> {
        Ok(self.query(query).await?.len())
    }
}

/// Async trait for task persistence.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Save or update a task.
    async fn save(&self, task: &Task) -> OrchestrationResult<()>;

    /// Get a task by ID.
    async fn get(&self, task_id: &TaskId) -> OrchestrationResult<Option<Task>>;

    /// Delete a task by ID.
    async fn delete(&self, task_id: &TaskId) -> OrchestrationResult<bool>;

    /// Query tasks with filters.
    async fn query(&self, query: &TaskQuery) -> OrchestrationResult<Vec<Task>>;

    /// Count tasks matching a query.
    async fn count(&self, query: &TaskQuery) -> OrchestrationResult<usize> {
        Ok(self.query(query).await?.len())
    }

    /// Delete all tasks matching a query.
    async fn delete_matching(&self, query: &TaskQuery) -> OrchestrationResult<usize> {
        let tasks = self.query(query).await?;
        let mut deleted = 0;
        for task in tasks {
            if self.delete(&task.id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

/// Async trait for conversation persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Save or update a conversation.
    async fn save(&self, conversation: &Conversation) -> OrchestrationResult<()>;

    /// Get a conversation by ID.
    async fn get(
        &self,
        conversation_id: &ConversationId,
    ) -> OrchestrationResult<Option<Conversation>>;

    /// Delete a conversation by ID.
    async fn delete(&self, conversation_id: &ConversationId) -> OrchestrationResult<bool>;

    /// Query conversations with filters.
    async fn query(&self, query: &ConversationQuery) -> OrchestrationResult<Vec<Conversation>>;

    /// Delete all conversations matching a query.
    async fn delete_matching(&self, query: &ConversationQuery) -> OrchestrationResult<usize> {
        let conversations = self.query(query).await?;
        let mut deleted = 0;
        for conversation in conversations {
            if self.delete(&conversation.id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
