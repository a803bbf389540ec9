//! In-memory stores for tests, the CLI and single-process deployments.
//!
//! Records are lost when the process exits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::agent::Agent;
use crate::conversation::Conversation;
use crate::error::OrchestrationResult;
use crate::ids::{AgentId, ConversationId, TaskId};
use crate::store::{
    AgentQuery, AgentStore, ConversationQuery, ConversationStore, TaskQuery, TaskStore,
};
use crate::task::Task;

// ============================================================================
// Agents
// ============================================================================

/// In-memory agent store.
#[derive(Debug, Default)]
pub struct InMemoryAgentStore {
    agents: RwLock<HashMap<AgentId, Agent>>,
}

impl InMemoryAgentStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn save(&self, agent: &Agent) -> OrchestrationResult<()> {
        debug!(agent_id = %agent.id, state = %agent.state, "Saving agent to memory");
        self.agents
            .write()
            .await
            .insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn get(&self, agent_id: &AgentId) -> OrchestrationResult<Option<Agent>> {
        Ok(self.agents.read().await.get(agent_id).cloned())
    }

    async fn delete(&self, agent_id: &AgentId) -> OrchestrationResult<bool> {
        Ok(self.agents.write().await.remove(agent_id).is_some())
    }

    async fn query(&self, query: &AgentQuery) -> OrchestrationResult<Vec<Agent>> {
        let agents = self.agents.read().await;
        let mut results: Vec<_> = agents
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();

        results.sort_by_key(Agent::priority_key);

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// In-memory task store.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Get the number of stored tasks.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task: &Task) -> OrchestrationResult<()> {
        debug!(task_id = %task.id, state = %task.state, "Saving task to memory");
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> OrchestrationResult<Option<Task>> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn delete(&self, task_id: &TaskId) -> OrchestrationResult<bool> {
        Ok(self.tasks.write().await.remove(task_id).is_some())
    }

    async fn query(&self, query: &TaskQuery) -> OrchestrationResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut results: Vec<_> = tasks
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();

        // Sort by created_at, id as tie-break for a stable order
        results.sort_by(|a, b| {
            let order = a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id));
            if query.newest_first {
                order.reverse()
            } else {
                order
            }
        });

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }
}

// ============================================================================
// Conversations
// ============================================================================

/// In-memory conversation store.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
}

impl InMemoryConversationStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn save(&self, conversation: &Conversation) -> OrchestrationResult<()> {
        debug!(
            conversation_id = %conversation.id,
            state = %conversation.state,
            "Saving conversation to memory"
        );
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn get(
        &self,
        conversation_id: &ConversationId,
    ) -> OrchestrationResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(conversation_id).cloned())
    }

    async fn delete(&self, conversation_id: &ConversationId) -> OrchestrationResult<bool> {
        Ok(self
            .conversations
            .write()
            .await
            .remove(conversation_id)
            .is_some())
    }

    async fn query(&self, query: &ConversationQuery) -> OrchestrationResult<Vec<Conversation>> {
        let conversations = self.conversations.read().await;
        let mut results: Vec<_> = conversations
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();

        results.sort_by(|a, b| {
            let order = a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id));
            if query.newest_first {
                order.reverse()
            } else {
                order
            }
        });

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }
}
