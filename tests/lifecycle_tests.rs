//! Integration Tests for Task Lifecycle, Notifications and Cleanup
//!
//! These tests wire custom handlers, a broadcast sink and a manual clock
//! into a bootstrapped system and follow tasks past the request that
//! created them.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use conductor_core::{
    BroadcastSink, InMemoryTaskStore, Notification, NotificationSink, NotifyError, TaskId,
    TaskQuery, TaskStore,
};
use conductor_workspace::{
    AgentType, Bootstrap, CapabilityHandler, HandlerError, ManualClock, OrchestrationResult,
    OrchestratorConfig, Payload, ProcessRequest, Stores, Task, TaskSpec, TaskState,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Fails the first `failures` calls, then acknowledges.
struct FlakyCrm {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyCrm {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CapabilityHandler for FlakyCrm {
    async fn handle(&self, _task_type: &str, _input: &Payload) -> Result<Payload, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(HandlerError::new(format!("CRM busy (call {call})")));
        }
        Ok(Payload::new().with("status", "stored"))
    }
}

/// Fails the first call, then takes `delay` to acknowledge.
struct SlowAfterFailure {
    delay: Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl CapabilityHandler for SlowAfterFailure {
    async fn handle(&self, _task_type: &str, _input: &Payload) -> Result<Payload, HandlerError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(HandlerError::new("export target offline"));
        }
        tokio::time::sleep(self.delay).await;
        Ok(Payload::new().with("status", "exported"))
    }
}

/// Forwards to a broadcast sink after a fixed delay.
struct SlowSink {
    delay: Duration,
    inner: BroadcastSink,
}

#[async_trait]
impl NotificationSink for SlowSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tokio::time::sleep(self.delay).await;
        self.inner.notify(notification).await
    }
}

/// In-memory task store whose queries can be made to stall after reading.
#[derive(Default)]
struct StallingTaskStore {
    inner: InMemoryTaskStore,
    stall: AtomicBool,
}

#[async_trait]
impl TaskStore for StallingTaskStore {
    async fn save(&self, task: &Task) -> OrchestrationResult<()> {
        self.inner.save(task).await
    }

    async fn get(&self, task_id: &TaskId) -> OrchestrationResult<Option<Task>> {
        self.inner.get(task_id).await
    }

    async fn delete(&self, task_id: &TaskId) -> OrchestrationResult<bool> {
        self.inner.delete(task_id).await
    }

    async fn query(&self, query: &TaskQuery) -> OrchestrationResult<Vec<Task>> {
        let tasks = self.inner.query(query).await;
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        tasks
    }
}

fn fast_retry() -> OrchestratorConfig {
    OrchestratorConfig {
        retry_delay: Duration::from_millis(10),
        max_retries: 3,
        ..OrchestratorConfig::default()
    }
}

async fn wait_for_state(
    conductor: &conductor_workspace::Conductor,
    task_id: &conductor_core::TaskId,
    state: TaskState,
) -> conductor_workspace::Task {
    for _ in 0..200 {
        let task = conductor.engine.get(task_id).await.expect("Task exists");
        if task.state == state {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {task_id} never reached {state}");
}

/// A failing step is reported in the aggregate and retried afterwards
#[tokio::test]
async fn test_failed_step_is_retried_after_response() {
    let conductor = Bootstrap::new(fast_retry())
        .with_handler(AgentType::Crm, Arc::new(FlakyCrm::new(1)))
        .build()
        .await
        .expect("Bootstrap should succeed");

    let result = conductor
        .orchestrator
        .process(ProcessRequest::new("create a lead for Acme"))
        .await
        .expect("Process should succeed");

    let failed_step = &result.results[1];
    assert_eq!(failed_step.error.as_deref(), Some("CRM busy (call 0)"));
    let task_id = failed_step.task_id.clone().expect("Step created a task");

    let task = wait_for_state(&conductor, &task_id, TaskState::Completed).await;
    assert_eq!(task.retry_count, 1);
    assert!(task.error.is_none());
    assert!(task.end_time.is_some());
    assert_eq!(
        task.output.as_ref().and_then(|o| o.get("status")),
        Some(&json!("stored"))
    );
}

/// Retries stop at the task's limit
#[tokio::test]
async fn test_retries_stop_at_limit() {
    let sink = Arc::new(BroadcastSink::default());
    let mut events = sink.subscribe();
    let conductor = Bootstrap::new(fast_retry())
        .with_sink(sink.clone())
        .with_handler(AgentType::Crm, Arc::new(FlakyCrm::new(usize::MAX)))
        .build()
        .await
        .expect("Bootstrap should succeed");

    let crm = conductor
        .registry
        .resolve(AgentType::Crm)
        .await
        .expect("CRM agent");
    let task = conductor
        .engine
        .run(TaskSpec::new("lead", "crm_lead", crm.id, json!({"name": "Acme"})).with_max_retries(2))
        .await
        .expect("Run should succeed");
    assert_eq!(task.state, TaskState::Failed);

    let mut scheduled = Vec::new();
    while scheduled.len() < 2 {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("Failure events should arrive")
            .expect("Channel open");
        if let Notification::TaskFailed {
            retry_count,
            retry_scheduled,
            ..
        } = event
        {
            scheduled.push((retry_count, retry_scheduled));
        }
    }
    assert_eq!(scheduled, vec![(1, true), (2, false)]);

    let task = conductor.engine.get(&task.id).await.expect("Task exists");
    assert_eq!(task.state, TaskState::Failed);
    assert!(!task.can_retry());
    assert!(conductor.engine.retry(&task.id).await.is_err());
}

/// Notifications follow the pipeline in order
#[tokio::test]
async fn test_notifications_for_one_request() {
    let sink = Arc::new(BroadcastSink::default());
    let mut events = sink.subscribe();
    let conductor = Bootstrap::new(OrchestratorConfig {
        enable_retry: false,
        ..OrchestratorConfig::default()
    })
    .with_sink(sink.clone())
    .build()
    .await
    .expect("Bootstrap should succeed");

    conductor
        .orchestrator
        .process(ProcessRequest::new("check stock of product 42"))
        .await
        .expect("Process should succeed");

    let mut names = Vec::new();
    while names.len() < 7 {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("Notifications should arrive")
            .expect("Channel open");
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec![
            "task_started",
            "task_completed",
            "task_started",
            "task_completed",
            "task_started",
            "task_completed",
            "conversation_completed",
        ]
    );
}

/// Cleanup removes old terminal records and nothing else
#[tokio::test]
async fn test_cleanup_respects_age_and_state() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let conductor = Bootstrap::new(OrchestratorConfig {
        enable_retry: false,
        ..OrchestratorConfig::default()
    })
    .with_clock(clock.clone())
    .build()
    .await
    .expect("Bootstrap should succeed");

    // Old finished request
    let old = conductor
        .orchestrator
        .process(ProcessRequest::new("create a lead for Acme"))
        .await
        .expect("Process should succeed");

    // Old but still live records
    let custom = conductor
        .registry
        .resolve(AgentType::Custom)
        .await
        .expect("Custom agent");
    let pending = conductor
        .engine
        .submit(TaskSpec::new("waiting", "custom", custom.id, json!({})))
        .await
        .expect("Submit should succeed");
    let open = conductor
        .conversations
        .create("carol", Payload::new().with("goal", "still open"), None)
        .await
        .expect("Create conversation");

    clock.advance(ChronoDuration::days(40));

    // Recent finished request
    let recent = conductor
        .orchestrator
        .process(ProcessRequest::new("create a sales order"))
        .await
        .expect("Process should succeed");

    let report = conductor.cleanup_older_than(30).await;
    assert_eq!(report.tasks, 3);
    assert_eq!(report.conversations, 1);

    assert!(conductor.conversations.get(&old.conversation_id).await.is_err());
    assert!(conductor.conversations.get(&open.id).await.is_ok());
    assert!(conductor.conversations.get(&recent.conversation_id).await.is_ok());
    assert_eq!(
        conductor
            .engine
            .get(&pending.id)
            .await
            .expect("Pending task kept")
            .state,
        TaskState::Pending
    );

    let remaining = conductor
        .engine
        .tasks(&TaskQuery::new())
        .await
        .expect("Query tasks");
    assert_eq!(remaining.len(), 4);

    // A second pass finds nothing more
    assert_eq!(conductor.cleanup_older_than(30).await.tasks, 0);
}

/// Orchestrator-scoped cleanup leaves other callers' tasks alone
#[tokio::test]
async fn test_orchestrator_cleanup_is_scoped() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let conductor = Bootstrap::new(OrchestratorConfig {
        enable_retry: false,
        ..OrchestratorConfig::default()
    })
    .with_clock(clock.clone())
    .build()
    .await
    .expect("Bootstrap should succeed");

    conductor
        .orchestrator
        .process(ProcessRequest::new("create a lead for Acme"))
        .await
        .expect("Process should succeed");
    let custom = conductor
        .registry
        .resolve(AgentType::Custom)
        .await
        .expect("Custom agent");
    let direct = conductor
        .engine
        .run(TaskSpec::new("direct", "custom", custom.id, json!({})))
        .await
        .expect("Run should succeed");

    clock.advance(ChronoDuration::days(10));

    let removed = conductor
        .orchestrator
        .cleanup_completed_tasks(7)
        .await
        .expect("Cleanup should succeed");
    assert_eq!(removed, 3);
    assert!(conductor.engine.get(&direct.id).await.is_ok());
}

/// Cancelling a conversation cancels its live tasks
#[tokio::test]
async fn test_cancel_conversation_cancels_pending_tasks() {
    let conductor = Bootstrap::new(OrchestratorConfig {
        enable_retry: false,
        ..OrchestratorConfig::default()
    })
    .build()
    .await
    .expect("Bootstrap should succeed");

    let conversation = conductor
        .conversations
        .create(
            "dave",
            Payload::new().with("goal", "long job"),
            Some(conductor.orchestrator.id().clone()),
        )
        .await
        .expect("Create conversation");
    let custom = conductor
        .registry
        .resolve(AgentType::Custom)
        .await
        .expect("Custom agent");
    let task = conductor
        .engine
        .submit(
            TaskSpec::new("queued", "custom", custom.id, json!({}))
                .with_conversation(conversation.id.clone()),
        )
        .await
        .expect("Submit should succeed");

    let cancelled = conductor
        .orchestrator
        .cancel_conversation(&conversation.id)
        .await
        .expect("Cancel should succeed");
    assert!(cancelled.state.is_terminal());

    let task = conductor.engine.get(&task.id).await.expect("Task exists");
    assert_eq!(task.state, TaskState::Cancelled);
    assert!(task.start_time.is_some());
    assert!(task.end_time.is_none());
}

/// A slow notification sink neither delays processing nor reorders events
#[tokio::test]
async fn test_slow_sink_does_not_block_processing() {
    let sink = Arc::new(SlowSink {
        delay: Duration::from_millis(300),
        inner: BroadcastSink::default(),
    });
    let mut events = sink.inner.subscribe();
    let conductor = Bootstrap::new(OrchestratorConfig {
        enable_retry: false,
        ..OrchestratorConfig::default()
    })
    .with_sink(sink.clone())
    .build()
    .await
    .expect("Bootstrap should succeed");

    let started = Instant::now();
    conductor
        .orchestrator
        .process(ProcessRequest::new("create a lead for Acme"))
        .await
        .expect("Process should succeed");
    assert!(started.elapsed() < Duration::from_millis(300));

    let mut names = Vec::new();
    while names.len() < 7 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("Notifications should arrive")
            .expect("Channel open");
        names.push(event.name());
    }
    assert_eq!(names.first(), Some(&"task_started"));
    assert_eq!(names.last(), Some(&"conversation_completed"));
}

/// Cleanup keeps a task that a concurrent retry brought back to life
#[tokio::test]
async fn test_cleanup_keeps_task_revived_by_retry() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let tasks = Arc::new(StallingTaskStore::default());
    let conductor = Bootstrap::new(OrchestratorConfig {
        enable_retry: false,
        ..OrchestratorConfig::default()
    })
    .with_stores(Stores {
        tasks: tasks.clone(),
        ..Stores::in_memory()
    })
    .with_clock(clock.clone())
    .with_handler(
        AgentType::Custom,
        Arc::new(SlowAfterFailure {
            delay: Duration::from_millis(300),
            calls: AtomicUsize::new(0),
        }),
    )
    .build()
    .await
    .expect("Bootstrap should succeed");

    let custom = conductor
        .registry
        .resolve(AgentType::Custom)
        .await
        .expect("Custom agent");
    let failed = conductor
        .engine
        .run(TaskSpec::new("export", "custom", custom.id, json!({})))
        .await
        .expect("Run should succeed");
    assert_eq!(failed.state, TaskState::Failed);

    clock.advance(ChronoDuration::days(40));
    tasks.stall.store(true, Ordering::SeqCst);

    // Cleanup selects the failed task, then stalls before deleting it
    let cleanup = {
        let engine = conductor.engine.clone();
        tokio::spawn(async move { engine.cleanup(30).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let retry = {
        let engine = conductor.engine.clone();
        let task_id = failed.id.clone();
        tokio::spawn(async move { engine.retry(&task_id).await })
    };
    wait_for_state(&conductor, &failed.id, TaskState::Running).await;

    let removed = cleanup
        .await
        .expect("Cleanup task joins")
        .expect("Cleanup should succeed");
    assert_eq!(removed, 0);

    let retried = retry
        .await
        .expect("Retry task joins")
        .expect("Retry should succeed");
    assert_eq!(retried.state, TaskState::Completed);
    assert!(conductor.engine.get(&failed.id).await.is_ok());
}
