//! Conversation lifecycle management.
//!
//! [`ConversationManager`] persists conversations and applies lifecycle
//! changes through [`Conversation::transition`]. Read-modify-write cycles are
//! serialized by one lock, so concurrent message appends and task
//! attachments never lose updates.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use conductor_core::{
    Clock, Complexity, Conversation, ConversationId, ConversationQuery, ConversationState,
    ConversationStore, MessageRole, Notification, Notifier, OrchestrationError,
    OrchestrationResult, OrchestratorId, Payload, RequestType, TaskId,
};

/// Condensed view of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub name: String,
    pub user_id: String,
    pub request_type: RequestType,
    pub complexity: Complexity,
    pub goal: String,
    pub status: ConversationState,
    /// Seconds, zero while unfinished
    pub duration: f64,
    pub task_count: usize,
    pub success: bool,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            name: conversation.name.clone(),
            user_id: conversation.user_id.clone(),
            request_type: conversation.request_type,
            complexity: conversation.complexity(),
            goal: conversation.goal().to_string(),
            status: conversation.state,
            duration: conversation.duration(),
            task_count: conversation.task_ids.len(),
            success: conversation.success(),
        }
    }
}

/// Stores conversations and drives their lifecycle.
pub struct ConversationManager {
    store: Arc<dyn ConversationStore>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl ConversationManager {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Open an active conversation for a request.
    pub async fn create(
        &self,
        user_id: impl Into<String>,
        request: Payload,
        orchestrator_id: Option<OrchestratorId>,
    ) -> OrchestrationResult<Conversation> {
        let mut conversation = Conversation::new(user_id, request, self.clock.now());
        conversation.orchestrator_id = orchestrator_id;
        self.store.save(&conversation).await?;

        info!(
            conversation_id = %conversation.id,
            user_id = %conversation.user_id,
            request_type = %conversation.request_type,
            "Conversation created"
        );
        Ok(conversation)
    }

    /// Get a conversation by ID.
    pub async fn get(&self, id: &ConversationId) -> OrchestrationResult<Conversation> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| OrchestrationError::ConversationNotFound(id.clone()))
    }

    /// Append a message. Allowed in every state.
    pub async fn add_message(
        &self,
        id: &ConversationId,
        role: MessageRole,
        content: impl Into<String>,
        metadata: Payload,
    ) -> OrchestrationResult<Conversation> {
        let now = self.clock.now();
        self.update(id, |c| {
            c.add_message(role, content, metadata, now);
            Ok(())
        })
        .await
    }

    /// Record a task spawned for the conversation.
    pub async fn attach_task(
        &self,
        id: &ConversationId,
        task_id: TaskId,
    ) -> OrchestrationResult<Conversation> {
        self.update(id, |c| {
            c.attach_task(task_id);
            Ok(())
        })
        .await
    }

    /// Store the response and mark the conversation completed.
    pub async fn complete(
        &self,
        id: &ConversationId,
        response: Payload,
    ) -> OrchestrationResult<Conversation> {
        let now = self.clock.now();
        let conversation = self
            .update(id, |c| {
                c.transition(ConversationState::Completed, now)?;
                let steps = c.task_ids.len();
                c.response = Some(response);
                c.add_message(
                    MessageRole::Assistant,
                    format!("Request processed successfully ({steps} task(s))"),
                    Payload::new(),
                    now,
                );
                Ok(())
            })
            .await?;

        self.notifier.send(Notification::ConversationCompleted {
            conversation_id: conversation.id.clone(),
        });
        Ok(conversation)
    }

    /// Mark the conversation failed with a reason.
    pub async fn fail(
        &self,
        id: &ConversationId,
        reason: impl Into<String>,
    ) -> OrchestrationResult<Conversation> {
        let reason = reason.into();
        let now = self.clock.now();
        let conversation = self
            .update(id, |c| {
                c.transition(ConversationState::Failed, now)?;
                c.error = Some(reason.clone());
                c.add_message(
                    MessageRole::System,
                    format!("Error processing request: {reason}"),
                    Payload::new(),
                    now,
                );
                Ok(())
            })
            .await?;

        self.notifier.send(Notification::ConversationFailed {
            conversation_id: conversation.id.clone(),
            reason,
        });
        Ok(conversation)
    }

    /// Reopen a failed conversation for another processing attempt.
    pub async fn begin_retry(&self, id: &ConversationId) -> OrchestrationResult<Conversation> {
        let now = self.clock.now();
        let conversation = self
            .update(id, |c| {
                if c.state != ConversationState::Failed {
                    return Err(OrchestrationError::invalid_transition(
                        "conversation",
                        c.state,
                        ConversationState::Active,
                    ));
                }
                c.transition(ConversationState::Active, now)?;
                c.response = None;
                Ok(())
            })
            .await?;
        info!(conversation_id = %id, "Conversation reopened for retry");
        Ok(conversation)
    }

    /// Cancel an active conversation.
    pub async fn cancel(&self, id: &ConversationId) -> OrchestrationResult<Conversation> {
        let now = self.clock.now();
        let conversation = self
            .update(id, |c| c.transition(ConversationState::Cancelled, now))
            .await?;
        info!(conversation_id = %id, "Conversation cancelled");
        Ok(conversation)
    }

    /// Summary of a conversation.
    pub async fn summary(&self, id: &ConversationId) -> OrchestrationResult<ConversationSummary> {
        Ok(ConversationSummary::from(&self.get(id).await?))
    }

    /// A user's conversations, newest first.
    pub async fn user_conversations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> OrchestrationResult<Vec<Conversation>> {
        self.store
            .query(
                &ConversationQuery::new()
                    .with_user(user_id)
                    .newest_first()
                    .with_limit(limit),
            )
            .await
    }

    /// Conversations matching a query.
    pub async fn list(&self, query: &ConversationQuery) -> OrchestrationResult<Vec<Conversation>> {
        self.store.query(query).await
    }

    /// Delete terminal conversations created more than `days` days ago.
    pub async fn cleanup(&self, days: u32) -> OrchestrationResult<usize> {
        let cutoff = self.clock.now() - ChronoDuration::days(i64::from(days));
        let removed = self
            .store
            .delete_matching(&ConversationQuery::new().terminal_only().created_before(cutoff))
            .await?;
        if removed > 0 {
            info!(removed, "Cleaned up old conversations");
        }
        Ok(removed)
    }

    async fn update<F>(&self, id: &ConversationId, apply: F) -> OrchestrationResult<Conversation>
    where
        F: FnOnce(&mut Conversation) -> OrchestrationResult<()>,
    {
        let _guard = self.write_lock.lock().await;
        let mut conversation = self.get(id).await?;
        apply(&mut conversation)?;
        self.store.save(&conversation).await?;
        debug!(conversation_id = %id, state = %conversation.state, "Conversation saved");
        Ok(conversation)
    }
}
