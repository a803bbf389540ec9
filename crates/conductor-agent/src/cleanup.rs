//! Periodic removal of old terminal tasks and conversations.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::OrchestratorConfig;
use crate::conversation::ConversationManager;
use crate::engine::TaskEngine;

/// Counts from one cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub tasks: usize,
    pub conversations: usize,
}

/// Run one cleanup pass over both collections.
///
/// A failure in one collection does not stop the other; errors are logged.
pub async fn run_cleanup(
    engine: &TaskEngine,
    conversations: &ConversationManager,
    days: u32,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    match engine.cleanup(days).await {
        Ok(n) => report.tasks = n,
        Err(e) => warn!(error = %e, "Task cleanup failed"),
    }
    match conversations.cleanup(days).await {
        Ok(n) => report.conversations = n,
        Err(e) => warn!(error = %e, "Conversation cleanup failed"),
    }

    debug!(
        days,
        tasks = report.tasks,
        conversations = report.conversations,
        "Cleanup pass finished"
    );
    report
}

/// Start the periodic cleanup job.
///
/// The first pass runs immediately. The job runs until
/// [`CleanupJobHandle::stop`] is called. A zero interval is replaced by the
/// default period.
pub fn spawn_cleanup_job(
    engine: Arc<TaskEngine>,
    conversations: Arc<ConversationManager>,
    days: u32,
    interval: Duration,
) -> CleanupJobHandle {
    let interval = if interval.is_zero() {
        let fallback = OrchestratorConfig::default().cleanup_interval;
        warn!(?fallback, "Cleanup interval must be greater than zero, using default");
        fallback
    } else {
        interval
    };

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            run_cleanup(&engine, &conversations, days).await;
        }
    });

    CleanupJobHandle { handle }
}

/// Handle for the cleanup job.
pub struct CleanupJobHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl CleanupJobHandle {
    /// Stop the job.
    pub fn stop(self) {
        self.handle.abort();
    }

    /// Whether the job has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TaskSpec;
    use crate::handler::{CustomHandler, HandlerRegistry};
    use crate::registry::AgentRegistry;
    use chrono::{Duration as ChronoDuration, Utc};
    use conductor_core::{
        Agent, AgentState, AgentType, Clock, InMemoryAgentStore, InMemoryConversationStore,
        InMemoryTaskStore, ManualClock, Notifier, Payload, TracingSink,
    };
    use serde_json::json;

    #[tokio::test]
    async fn test_zero_interval_does_not_panic() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let tasks = InMemoryTaskStore::shared();
        let registry = Arc::new(AgentRegistry::new(
            InMemoryAgentStore::shared(),
            tasks.clone(),
            clock.clone(),
        ));
        let engine = TaskEngine::new(
            OrchestratorConfig::default(),
            tasks,
            registry,
            HandlerRegistry::new(),
            Notifier::spawn(Arc::new(TracingSink)),
            clock.clone(),
        );
        let conversations = Arc::new(ConversationManager::new(
            InMemoryConversationStore::shared(),
            Notifier::spawn(Arc::new(TracingSink)),
            clock,
        ));

        let job = spawn_cleanup_job(engine, conversations, 30, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!job.is_finished());
        job.stop();
    }

    #[tokio::test]
    async fn test_job_removes_old_records() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let tasks = InMemoryTaskStore::shared();
        let registry = Arc::new(AgentRegistry::new(
            InMemoryAgentStore::shared(),
            tasks.clone(),
            dyn_clock.clone(),
        ));
        let agent = registry
            .register(Agent::new("custom", AgentType::Custom).with_state(AgentState::Active))
            .await
            .unwrap();
        let engine = TaskEngine::new(
            OrchestratorConfig::default(),
            tasks.clone(),
            registry,
            HandlerRegistry::new().with_handler(AgentType::Custom, Arc::new(CustomHandler)),
            Notifier::spawn(Arc::new(TracingSink)),
            dyn_clock.clone(),
        );
        let conversations = Arc::new(ConversationManager::new(
            InMemoryConversationStore::shared(),
            Notifier::spawn(Arc::new(TracingSink)),
            dyn_clock,
        ));

        engine
            .run(TaskSpec::new("old", "custom", agent.id.clone(), json!({})))
            .await
            .unwrap();
        let c = conversations
            .create("u", Payload::new().with("goal", "old"), None)
            .await
            .unwrap();
        conversations.complete(&c.id, Payload::new()).await.unwrap();

        clock.advance(ChronoDuration::days(40));

        let job = spawn_cleanup_job(
            engine.clone(),
            conversations.clone(),
            30,
            Duration::from_millis(10),
        );
        for _ in 0..200 {
            if tasks.is_empty().await && conversations.get(&c.id).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        job.stop();

        assert!(tasks.is_empty().await);
        assert!(conversations.get(&c.id).await.is_err());
    }
}
