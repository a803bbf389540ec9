//! Task Engine
//!
//! The only component that changes a task's state. Every transition happens
//! while holding that task's lock, so readers never see a half-applied
//! change such as `running` without a start time.
//!
//! # Execution
//!
//! 1. `pending -> running`, stamped and saved under the task lock
//! 2. input validated as a JSON object (malformed input fails without
//!    consuming a retry)
//! 3. handler for the agent's type invoked under a concurrency permit and
//!    the configured time limit
//! 4. result settled under the task lock; if the task was cancelled in the
//!    meantime the result is discarded
//!
//! # Retries
//!
//! Failed tasks with retries left are queued for the retry worker, which
//! waits `retry_delay` and calls [`TaskEngine::retry`]. Retries never
//! happen inline in the failing call. Cleanup skips tasks with a queued
//! retry.
//!
//! # Locks
//!
//! Per-task locks live in a table keyed by task ID. An entry is dropped
//! once its task is terminal or deleted and no other caller holds it, so
//! the table tracks live tasks only.

use chrono::Duration as ChronoDuration;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tracing::{debug, info, warn};

use conductor_core::{
    AgentId, Clock, ConversationId, Notification, Notifier, OrchestrationError,
    OrchestrationResult, OrchestratorId, Payload, Priority, Task, TaskError, TaskId, TaskQuery,
    TaskState, TaskStore,
};

use crate::config::OrchestratorConfig;
use crate::handler::HandlerRegistry;
use crate::registry::{AgentRegistry, TaskOutcome};
use crate::stats::TaskStats;

/// Description of a task to create.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub task_type: String,
    pub agent_id: AgentId,
    pub input: Value,
    pub orchestrator_id: Option<OrchestratorId>,
    pub conversation_id: Option<ConversationId>,
    pub user_id: Option<String>,
    pub priority: Priority,
    /// Overrides the configured retry limit
    pub max_retries: Option<u32>,
}

impl TaskSpec {
    /// Describe a task for an agent.
    pub fn new(
        name: impl Into<String>,
        task_type: impl Into<String>,
        agent_id: AgentId,
        input: impl Into<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            task_type: task_type.into(),
            agent_id,
            input: input.into(),
            orchestrator_id: None,
            conversation_id: None,
            user_id: None,
            priority: Priority::default(),
            max_retries: None,
        }
    }

    pub fn with_orchestrator(mut self, id: OrchestratorId) -> Self {
        self.orchestrator_id = Some(id);
        self
    }

    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Executes tasks and owns their state machine.
pub struct TaskEngine {
    config: OrchestratorConfig,
    tasks: Arc<dyn TaskStore>,
    registry: Arc<AgentRegistry>,
    handlers: HandlerRegistry,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    locks: DashMap<TaskId, Arc<Mutex<()>>>,
    queued_retries: DashSet<TaskId>,
    permits: Arc<Semaphore>,
    retry_tx: mpsc::UnboundedSender<TaskId>,
}

impl TaskEngine {
    /// Create the engine and start its retry worker.
    ///
    /// Must be called from within a Tokio runtime. The worker stops once the
    /// engine is dropped.
    pub fn new(
        config: OrchestratorConfig,
        tasks: Arc<dyn TaskStore>,
        registry: Arc<AgentRegistry>,
        handlers: HandlerRegistry,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let retry_delay = config.retry_delay;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks));

        let engine = Arc::new(Self {
            config,
            tasks,
            registry,
            handlers,
            notifier,
            clock,
            locks: DashMap::new(),
            queued_retries: DashSet::new(),
            permits,
            retry_tx,
        });

        tokio::spawn(retry_worker(Arc::downgrade(&engine), retry_rx, retry_delay));
        engine
    }

    /// The engine configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The agent registry tasks are dispatched against.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Create a pending task.
    pub async fn submit(&self, spec: TaskSpec) -> OrchestrationResult<Task> {
        // Reject tasks for unknown agents up front
        self.registry.get(&spec.agent_id).await?;

        let mut task = Task::new(
            spec.name,
            spec.task_type,
            spec.agent_id,
            spec.input,
            self.clock.now(),
        )
        .with_priority(spec.priority)
        .with_max_retries(spec.max_retries.unwrap_or(self.config.max_retries));
        task.orchestrator_id = spec.orchestrator_id;
        task.conversation_id = spec.conversation_id;
        task.user_id = spec.user_id;

        self.tasks.save(&task).await?;
        info!(
            task_id = %task.id,
            agent_id = %task.agent_id,
            task_type = %task.task_type,
            priority = %task.priority,
            "Task created"
        );
        Ok(task)
    }

    /// Submit and execute a task in one call.
    pub async fn run(&self, spec: TaskSpec) -> OrchestrationResult<Task> {
        let task = self.submit(spec).await?;
        self.execute(&task.id).await
    }

    /// Execute a pending task.
    ///
    /// Handler failures are recorded on the returned task rather than
    /// returned as errors. Errors mean the call itself was invalid: unknown
    /// task, task not pending, or the task was cancelled while running.
    pub async fn execute(&self, task_id: &TaskId) -> OrchestrationResult<Task> {
        let task = {
            let lock = self.lock_for(task_id);
            let _guard = lock.lock().await;
            let mut task = self.load(task_id).await?;
            if let Err(e) = task.transition(TaskState::Running, self.clock.now()) {
                self.release_lock(task_id);
                return Err(e);
            }
            self.tasks.save(&task).await?;
            task
        };

        self.notifier.send(Notification::TaskStarted {
            task_id: task.id.clone(),
            agent_id: task.agent_id.clone(),
            task_type: task.task_type.clone(),
        });
        if let Err(e) = self.registry.touch(&task.agent_id).await {
            warn!(agent_id = %task.agent_id, error = %e, "Failed to record agent activity");
        }

        let result = self.invoke(&task).await;
        self.settle(task_id, result).await
    }

    /// Reset a failed task to pending and execute it again.
    pub async fn retry(&self, task_id: &TaskId) -> OrchestrationResult<Task> {
        {
            let lock = self.lock_for(task_id);
            let _guard = lock.lock().await;
            self.queued_retries.remove(task_id);
            let mut task = self.load(task_id).await?;
            if !task.can_retry() {
                self.release_lock(task_id);
                return Err(OrchestrationError::RetryNotAllowed {
                    task_id: task.id.clone(),
                    state: task.state.to_string(),
                    retry_count: task.retry_count,
                    max_retries: task.max_retries,
                });
            }
            task.transition(TaskState::Pending, self.clock.now())?;
            self.tasks.save(&task).await?;
            info!(
                task_id = %task_id,
                retry_count = task.retry_count,
                max_retries = task.max_retries,
                "Retrying task"
            );
        }

        self.execute(task_id).await
    }

    /// Cancel a pending or running task.
    ///
    /// A running handler is not interrupted; its result is discarded when it
    /// returns.
    pub async fn cancel(&self, task_id: &TaskId) -> OrchestrationResult<Task> {
        let task = {
            let lock = self.lock_for(task_id);
            let _guard = lock.lock().await;
            let mut task = self.load(task_id).await?;
            task.transition(TaskState::Cancelled, self.clock.now())?;
            self.tasks.save(&task).await?;
            self.release_lock(task_id);
            task
        };

        self.notifier.send(Notification::TaskCancelled {
            task_id: task.id.clone(),
        });
        Ok(task)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Get a task by ID.
    pub async fn get(&self, task_id: &TaskId) -> OrchestrationResult<Task> {
        self.load(task_id).await
    }

    /// Tasks matching a query.
    pub async fn tasks(&self, query: &TaskQuery) -> OrchestrationResult<Vec<Task>> {
        self.tasks.query(query).await
    }

    /// Statistics over the tasks matching a query.
    pub async fn stats(&self, query: &TaskQuery) -> OrchestrationResult<TaskStats> {
        let tasks = self.tasks.query(query).await?;
        Ok(TaskStats::from_tasks(&tasks))
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Delete terminal tasks created more than `days` days ago.
    pub async fn cleanup(&self, days: u32) -> OrchestrationResult<usize> {
        let cutoff = self.clock.now() - ChronoDuration::days(i64::from(days));
        self.cleanup_matching(TaskQuery::new().created_before(cutoff))
            .await
    }

    /// Delete the terminal tasks matching a query. Live tasks are never
    /// deleted regardless of the query.
    ///
    /// Each candidate is reloaded under its lock before deletion, so a task
    /// revived by a concurrent retry is kept. Failed tasks with a queued
    /// retry are kept too.
    pub async fn cleanup_matching(&self, query: TaskQuery) -> OrchestrationResult<usize> {
        let query = query.terminal_only();
        let candidates = self.tasks.query(&query).await?;

        let mut removed = 0;
        for candidate in candidates {
            let lock = self.lock_for(&candidate.id);
            let _guard = lock.lock().await;

            let Some(task) = self.tasks.get(&candidate.id).await? else {
                self.release_lock(&candidate.id);
                continue;
            };
            if !query.matches(&task) || self.queued_retries.contains(&task.id) {
                debug!(task_id = %task.id, state = %task.state, "Task no longer eligible for cleanup");
                continue;
            }
            if self.tasks.delete(&task.id).await? {
                removed += 1;
            }
            self.release_lock(&task.id);
        }

        if removed > 0 {
            info!(removed, "Cleaned up old tasks");
        }
        Ok(removed)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lock_for(&self, task_id: &TaskId) -> Arc<Mutex<()>> {
        self.locks.entry(task_id.clone()).or_default().clone()
    }

    /// Drop a task's lock entry unless another caller holds a handle to it.
    ///
    /// Call while holding the lock and after the last store write; the map
    /// and the caller account for two references.
    fn release_lock(&self, task_id: &TaskId) {
        self.locks
            .remove_if(task_id, |_, lock| Arc::strong_count(lock) <= 2);
    }

    async fn load(&self, task_id: &TaskId) -> OrchestrationResult<Task> {
        self.tasks
            .get(task_id)
            .await?
            .ok_or_else(|| OrchestrationError::TaskNotFound(task_id.clone()))
    }

    /// Validate input and run the handler. Never touches task state.
    async fn invoke(&self, task: &Task) -> OrchestrationResult<Payload> {
        let input = Payload::from_value(task.input.clone())?;
        let agent = self.registry.get(&task.agent_id).await?;
        let handler = self.handlers.get(agent.agent_type).ok_or_else(|| {
            OrchestrationError::Handler(format!(
                "no handler registered for agent type {}",
                agent.agent_type
            ))
        })?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OrchestrationError::Handler("task engine is shut down".to_string()))?;

        debug!(task_id = %task.id, agent_type = %agent.agent_type, "Invoking handler");
        let limit = self.config.task_timeout;
        match tokio::time::timeout(limit, handler.handle(&task.task_type, &input)).await {
            Ok(result) => result.map_err(OrchestrationError::from),
            Err(_) => Err(OrchestrationError::Timeout(limit)),
        }
    }

    /// Apply a handler result to the task.
    async fn settle(
        &self,
        task_id: &TaskId,
        result: OrchestrationResult<Payload>,
    ) -> OrchestrationResult<Task> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock().await;
        let mut task = self.load(task_id).await?;
        let now = self.clock.now();

        if task.state != TaskState::Running {
            let target = if result.is_ok() {
                TaskState::Completed
            } else {
                TaskState::Failed
            };
            debug!(task_id = %task_id, state = %task.state, "Discarding result of task that is no longer running");
            return Err(OrchestrationError::invalid_transition("task", task.state, target));
        }

        match result {
            Ok(output) => {
                task.complete(output, now)?;
                self.tasks.save(&task).await?;

                let response_time = task.response_time().unwrap_or(0.0);
                self.record(
                    &task.agent_id,
                    TaskOutcome {
                        success: true,
                        response_time: Some(response_time),
                        error: None,
                        at: now,
                    },
                )
                .await;
                self.notifier.send(Notification::TaskCompleted {
                    task_id: task.id.clone(),
                    agent_id: task.agent_id.clone(),
                    response_time_secs: response_time,
                });
            }
            Err(err) => {
                let error = TaskError::from_error(&err);
                task.fail(error.clone(), now)?;
                self.tasks.save(&task).await?;

                let retry_scheduled =
                    self.config.enable_retry && error.is_retryable() && task.can_retry();
                self.record(
                    &task.agent_id,
                    TaskOutcome {
                        success: false,
                        response_time: None,
                        error: Some(error.message.clone()),
                        at: now,
                    },
                )
                .await;
                self.notifier.send(Notification::TaskFailed {
                    task_id: task.id.clone(),
                    agent_id: task.agent_id.clone(),
                    error: error.message,
                    retry_count: task.retry_count,
                    retry_scheduled,
                });

                if retry_scheduled {
                    self.queued_retries.insert(task.id.clone());
                    if self.retry_tx.send(task.id.clone()).is_err() {
                        self.queued_retries.remove(&task.id);
                        warn!(task_id = %task.id, "Retry worker is gone, retry not scheduled");
                    }
                }
            }
        }

        self.release_lock(task_id);
        Ok(task)
    }

    async fn record(&self, agent_id: &AgentId, outcome: TaskOutcome) {
        if let Err(e) = self.registry.record_outcome(agent_id, &outcome).await {
            warn!(agent_id = %agent_id, error = %e, "Failed to update agent counters");
        }
    }
}

/// Runs scheduled retries after the configured delay.
async fn retry_worker(
    engine: Weak<TaskEngine>,
    mut rx: mpsc::UnboundedReceiver<TaskId>,
    delay: Duration,
) {
    while let Some(task_id) = rx.recv().await {
        let engine = engine.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(engine) = engine.upgrade() else {
                return;
            };
            match engine.retry(&task_id).await {
                Ok(task) => debug!(task_id = %task_id, state = %task.state, "Scheduled retry finished"),
                Err(e) => warn!(task_id = %task_id, error = %e, "Scheduled retry did not run"),
            }
        });
    }
    debug!("Retry worker stopped");
}
