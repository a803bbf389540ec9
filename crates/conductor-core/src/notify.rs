//! Lifecycle notifications.
//!
//! Notifications are fire-and-forget. Producers hand them to a [`Notifier`],
//! which queues them for a background worker that calls the sink in
//! submission order. [`deliver`] logs sink failures and never propagates
//! them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::error::NotifyError;
use crate::ids::{AgentId, ConversationId, TaskId};

/// A lifecycle event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// A task entered `running`.
    TaskStarted {
        task_id: TaskId,
        agent_id: AgentId,
        task_type: String,
    },
    /// A task completed.
    TaskCompleted {
        task_id: TaskId,
        agent_id: AgentId,
        response_time_secs: f64,
    },
    /// A task failed.
    TaskFailed {
        task_id: TaskId,
        agent_id: AgentId,
        error: String,
        retry_count: u32,
        retry_scheduled: bool,
    },
    /// A task was cancelled.
    TaskCancelled { task_id: TaskId },
    /// A conversation completed.
    ConversationCompleted { conversation_id: ConversationId },
    /// A conversation failed.
    ConversationFailed {
        conversation_id: ConversationId,
        reason: String,
    },
}

impl Notification {
    /// Short event name.
    pub fn name(&self) -> &'static str {
        match self {
            Notification::TaskStarted { .. } => "task_started",
            Notification::TaskCompleted { .. } => "task_completed",
            Notification::TaskFailed { .. } => "task_failed",
            Notification::TaskCancelled { .. } => "task_cancelled",
            Notification::ConversationCompleted { .. } => "conversation_completed",
            Notification::ConversationFailed { .. } => "conversation_failed",
        }
    }
}

/// Receiver of lifecycle notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Deliver a notification, logging (not returning) any sink failure.
pub async fn deliver(sink: &dyn NotificationSink, notification: Notification) {
    if let Err(e) = sink.notify(&notification).await {
        warn!(event = notification.name(), error = %e, "Notification sink failed");
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// Default number of notifications buffered ahead of the sink.
pub const DEFAULT_NOTIFY_CAPACITY: usize = 1024;

/// Non-blocking handle for emitting notifications.
///
/// One worker drains the queue, so notifications reach the sink in the order
/// they were sent. When the queue is full new notifications are dropped and
/// logged. The worker stops once every handle is dropped.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    /// Start a worker for the sink with the default capacity.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_capacity(sink, DEFAULT_NOTIFY_CAPACITY)
    }

    /// Start a worker for the sink with an explicit queue capacity.
    pub fn with_capacity(sink: Arc<dyn NotificationSink>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(sink_worker(sink, rx));
        Self { tx }
    }

    /// Queue a notification. Never waits for the sink.
    pub fn send(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            let (reason, notification) = match e {
                mpsc::error::TrySendError::Full(n) => ("queue full", n),
                mpsc::error::TrySendError::Closed(n) => ("worker stopped", n),
            };
            warn!(event = notification.name(), reason, "Notification dropped");
        }
    }
}

async fn sink_worker(sink: Arc<dyn NotificationSink>, mut rx: mpsc::Receiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        deliver(sink.as_ref(), notification).await;
    }
    debug!("Notification worker stopped");
}

// ============================================================================
// Tracing Sink
// ============================================================================

/// Sink that turns every notification into a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::TaskStarted {
                task_id,
                agent_id,
                task_type,
            } => {
                info!(task_id = %task_id, agent_id = %agent_id, task_type = %task_type, "Task started execution");
            }
            Notification::TaskCompleted {
                task_id,
                agent_id,
                response_time_secs,
            } => {
                info!(task_id = %task_id, agent_id = %agent_id, response_time_secs, "Task completed successfully");
            }
            Notification::TaskFailed {
                task_id,
                agent_id,
                error: detail,
                retry_count,
                retry_scheduled,
            } => {
                error!(
                    task_id = %task_id,
                    agent_id = %agent_id,
                    retry_count,
                    retry_scheduled,
                    error = %detail,
                    "Task failed"
                );
            }
            Notification::TaskCancelled { task_id } => {
                info!(task_id = %task_id, "Task cancelled");
            }
            Notification::ConversationCompleted { conversation_id } => {
                info!(conversation_id = %conversation_id, "Conversation completed successfully");
            }
            Notification::ConversationFailed {
                conversation_id,
                reason,
            } => {
                error!(conversation_id = %conversation_id, reason = %reason, "Conversation failed");
            }
        }
        Ok(())
    }
}

// ============================================================================
// Broadcast Sink
// ============================================================================

/// Sink that republishes notifications on a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    /// Create a sink with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        // Ignore send errors (no subscribers)
        let _ = self.tx.send(notification.clone());
        Ok(())
    }
}

// ============================================================================
// Fan-out Sink
// ============================================================================

/// Sink that forwards to several sinks; every sink is tried.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.notify(notification).await {
                failures.push(e.0);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError(failures.join("; ")))
        }
    }
}
