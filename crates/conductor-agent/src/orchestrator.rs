//! Orchestrator
//!
//! Runs a goal end to end: conversation, plan, then route and execute each
//! step in order, aggregating per-step results.
//!
//! # Failure semantics
//!
//! - Setup failures (inactive orchestrator, unusable planner or router
//!   agent, planning error) fail the conversation and are returned.
//! - Step failures (routing or execution) are recorded in that step's
//!   result and the loop moves on.
//!
//! # Example
//!
//! ```rust,ignore
//! let result = orchestrator
//!     .process(ProcessRequest::new("create a lead for Acme").with_user("alice"))
//!     .await?;
//! assert_eq!(result.results.len(), 3);
//! ```

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use conductor_core::{
    Agent, AgentId, AgentQuery, AgentState, AgentType, Clock, Conversation, ConversationId,
    MessageRole, OrchestrationError, OrchestrationResult, OrchestratorId, OrchestratorState,
    Payload, Plan, PlanStep, TaskId, TaskQuery, TaskState,
};

use crate::conversation::ConversationManager;
use crate::engine::{TaskEngine, TaskSpec};
use crate::planner::Planner;
use crate::router::Router;

// ============================================================================
// Requests and Results
// ============================================================================

/// A goal submitted for processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub goal: String,
    /// Must be a JSON object or null
    #[serde(default)]
    pub context: Value,
    /// Must be a JSON object or null
    #[serde(default)]
    pub constraints: Value,
    pub user_id: String,
}

impl ProcessRequest {
    /// User recorded when none is given.
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            context: Value::Null,
            constraints: Value::Null,
            user_id: Self::ANONYMOUS.to_string(),
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_constraints(mut self, constraints: Value) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Rebuild a request from a stored conversation.
    pub fn from_conversation(conversation: &Conversation) -> Self {
        let field = |key: &str| conversation.request.get(key).cloned().unwrap_or(Value::Null);
        Self {
            goal: conversation.goal().to_string(),
            context: field("context"),
            constraints: field("constraints"),
            user_id: conversation.user_id.clone(),
        }
    }

    fn to_payload(&self) -> Payload {
        Payload::new()
            .with("goal", self.goal.clone())
            .with("context", self.context.clone())
            .with("constraints", self.constraints.clone())
    }
}

/// Parse an optional object field; null means empty.
fn optional_object(name: &str, value: &Value) -> OrchestrationResult<Payload> {
    match value {
        Value::Null => Ok(Payload::new()),
        other => Payload::from_value(other.clone()).map_err(|_| {
            OrchestrationError::InvalidInput(format!("{name} must be a JSON object"))
        }),
    }
}

/// Outcome of one plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    fn failed(action: &str, task_id: Option<TaskId>, error: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            task_id,
            agent_id: None,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Whether the step produced output.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate response of [`Orchestrator::process`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub conversation_id: ConversationId,
    pub plan: Plan,
    /// One entry per plan step, in plan order
    pub results: Vec<StepResult>,
    pub status: String,
}

/// Task counts by state for one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskQueueStatus {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

/// Processing performance of one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrchestratorPerformance {
    pub total_tasks_processed: usize,
    /// Ratio in `0.0..=1.0`
    pub success_rate: f64,
    /// Seconds, completed tasks only
    pub avg_processing_time: f64,
}

/// Status snapshot suitable for a status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub orchestrator_id: OrchestratorId,
    pub orchestrator_name: String,
    pub orchestrator_state: OrchestratorState,
    pub total_agents: usize,
    pub active_agents: usize,
    pub total_tasks: usize,
    pub success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

// ============================================================================
// Orchestrator
// ============================================================================

#[derive(Debug, Default)]
struct Runtime {
    state: OrchestratorState,
    last_activity: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

/// Coordinates planner, router, task engine and conversations.
pub struct Orchestrator {
    id: OrchestratorId,
    name: String,
    planner_agent: Option<AgentId>,
    router_agent: Option<AgentId>,
    runtime: RwLock<Runtime>,
    planner: Arc<dyn Planner>,
    router: Arc<Router>,
    engine: Arc<TaskEngine>,
    conversations: Arc<ConversationManager>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// Create a draft orchestrator.
    pub fn new(
        name: impl Into<String>,
        planner: Arc<dyn Planner>,
        router: Arc<Router>,
        engine: Arc<TaskEngine>,
        conversations: Arc<ConversationManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id: OrchestratorId::generate(),
            name: name.into(),
            planner_agent: None,
            router_agent: None,
            runtime: RwLock::new(Runtime::default()),
            planner,
            router,
            engine,
            conversations,
            clock,
        }
    }

    pub fn with_id(mut self, id: OrchestratorId) -> Self {
        self.id = id;
        self
    }

    /// Bind the planner agent.
    pub fn with_planner_agent(mut self, agent_id: AgentId) -> Self {
        self.planner_agent = Some(agent_id);
        self
    }

    /// Bind the router agent.
    pub fn with_router_agent(mut self, agent_id: AgentId) -> Self {
        self.router_agent = Some(agent_id);
        self
    }

    pub fn id(&self) -> &OrchestratorId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn planner_agent(&self) -> Option<&AgentId> {
        self.planner_agent.as_ref()
    }

    pub fn router_agent(&self) -> Option<&AgentId> {
        self.router_agent.as_ref()
    }

    /// The task engine this orchestrator dispatches to.
    pub fn engine(&self) -> &Arc<TaskEngine> {
        &self.engine
    }

    /// The conversation manager this orchestrator records into.
    pub fn conversations(&self) -> &Arc<ConversationManager> {
        &self.conversations
    }

    pub async fn state(&self) -> OrchestratorState {
        self.runtime.read().await.state
    }

    pub async fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.runtime.read().await.last_activity
    }

    pub async fn error_message(&self) -> Option<String> {
        self.runtime.read().await.error_message.clone()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Validate the planner and router agents and start accepting work.
    ///
    /// A failed validation moves the orchestrator to `error`.
    pub async fn start(&self) -> OrchestrationResult<()> {
        let mut runtime = self.runtime.write().await;
        if !runtime.state.can_start() {
            return Err(OrchestrationError::invalid_transition(
                "orchestrator",
                runtime.state,
                OrchestratorState::Active,
            ));
        }

        if let Err(e) = self.check_agents().await {
            error!(orchestrator_id = %self.id, error = %e, "Orchestrator failed to start");
            runtime.state = OrchestratorState::Error;
            runtime.error_message = Some(e.to_string());
            return Err(e);
        }

        runtime.state = OrchestratorState::Active;
        runtime.error_message = None;
        runtime.last_activity = Some(self.clock.now());
        info!(orchestrator_id = %self.id, name = %self.name, "Orchestrator started");
        Ok(())
    }

    /// Stop accepting new work. In-flight tasks keep running.
    pub async fn pause(&self) -> OrchestrationResult<()> {
        self.move_to(OrchestratorState::Paused, OrchestratorState::can_pause)
            .await?;
        info!(orchestrator_id = %self.id, "Orchestrator paused");
        Ok(())
    }

    /// Accept work again after a pause.
    pub async fn resume(&self) -> OrchestrationResult<()> {
        self.move_to(OrchestratorState::Active, OrchestratorState::can_resume)
            .await?;
        info!(orchestrator_id = %self.id, "Orchestrator resumed");
        Ok(())
    }

    /// Return to draft from any state.
    pub async fn stop(&self) {
        self.runtime.write().await.state = OrchestratorState::Draft;
        info!(orchestrator_id = %self.id, "Orchestrator stopped");
    }

    async fn move_to(
        &self,
        next: OrchestratorState,
        allowed: fn(&OrchestratorState) -> bool,
    ) -> OrchestrationResult<()> {
        let mut runtime = self.runtime.write().await;
        if !allowed(&runtime.state) {
            return Err(OrchestrationError::invalid_transition(
                "orchestrator",
                runtime.state,
                next,
            ));
        }
        runtime.state = next;
        Ok(())
    }

    async fn ensure_active(&self) -> OrchestrationResult<()> {
        let state = self.state().await;
        if state != OrchestratorState::Active {
            return Err(OrchestrationError::OrchestratorNotActive {
                id: self.id.clone(),
                state: state.to_string(),
            });
        }
        Ok(())
    }

    /// Planner and router agents must be bound, exist, have the right type
    /// and be active.
    async fn check_agents(&self) -> OrchestrationResult<()> {
        self.check_agent("planner", self.planner_agent.as_ref(), AgentType::Planner)
            .await?;
        self.check_agent("router", self.router_agent.as_ref(), AgentType::Router)
            .await?;
        Ok(())
    }

    async fn check_agent(
        &self,
        role: &str,
        agent_id: Option<&AgentId>,
        expected: AgentType,
    ) -> OrchestrationResult<Agent> {
        use OrchestrationError::MisconfiguredOrchestrator as Misconfigured;

        let agent_id = agent_id.ok_or_else(|| Misconfigured(format!("no {role} agent configured")))?;
        let agent = match self.engine.registry().get(agent_id).await {
            Ok(agent) => agent,
            Err(OrchestrationError::AgentNotFound(_)) => {
                return Err(Misconfigured(format!("{role} agent {agent_id} not found")));
            }
            Err(e) => return Err(e),
        };
        if agent.agent_type != expected {
            return Err(Misconfigured(format!(
                "{role} agent {agent_id} has type {}",
                agent.agent_type
            )));
        }
        if agent.state != AgentState::Active {
            return Err(Misconfigured(format!(
                "{role} agent {agent_id} is {}",
                agent.state
            )));
        }
        Ok(agent)
    }

    // ========================================================================
    // Processing
    // ========================================================================

    /// Process a goal end to end.
    pub async fn process(&self, request: ProcessRequest) -> OrchestrationResult<AggregateResult> {
        self.ensure_active().await?;

        let conversation = self
            .conversations
            .create(
                request.user_id.clone(),
                request.to_payload(),
                Some(self.id.clone()),
            )
            .await?;
        self.conversations
            .add_message(
                &conversation.id,
                MessageRole::User,
                request.goal.clone(),
                Payload::new(),
            )
            .await?;

        self.run_pipeline(&conversation.id, &request).await
    }

    /// Re-process a failed conversation with its stored request.
    pub async fn retry_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> OrchestrationResult<AggregateResult> {
        self.ensure_active().await?;

        let conversation = self.conversations.begin_retry(conversation_id).await?;
        let request = ProcessRequest::from_conversation(&conversation);
        self.run_pipeline(conversation_id, &request).await
    }

    /// Cancel an active conversation and its live tasks.
    ///
    /// Running handlers are not interrupted; their results are discarded.
    pub async fn cancel_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> OrchestrationResult<Conversation> {
        let conversation = self.conversations.cancel(conversation_id).await?;

        let live = self
            .engine
            .tasks(
                &TaskQuery::new()
                    .with_conversation(conversation_id.clone())
                    .live_only(),
            )
            .await?;
        let outcomes = join_all(live.iter().map(|task| self.engine.cancel(&task.id))).await;
        for (task, outcome) in live.iter().zip(outcomes) {
            // The task may have settled since the query
            if let Err(e) = outcome {
                warn!(task_id = %task.id, error = %e, "Could not cancel conversation task");
            }
        }
        Ok(conversation)
    }

    async fn run_pipeline(
        &self,
        conversation_id: &ConversationId,
        request: &ProcessRequest,
    ) -> OrchestrationResult<AggregateResult> {
        let plan = match self.prepare(request).await {
            Ok(plan) => plan,
            Err(e) => return Err(self.abandon(conversation_id, e).await),
        };

        info!(
            orchestrator_id = %self.id,
            conversation_id = %conversation_id,
            steps = plan.len(),
            "Executing plan"
        );

        let mut results = Vec::with_capacity(plan.len());
        for step in &plan.steps {
            results.push(self.execute_step(step, conversation_id, request).await);
        }

        let aggregate = AggregateResult {
            conversation_id: conversation_id.clone(),
            plan,
            results,
            status: "completed".to_string(),
        };

        let response = serde_json::to_value(&aggregate)
            .map_err(OrchestrationError::from)
            .and_then(Payload::from_value);
        let completed = match response {
            Ok(response) => {
                self.conversations
                    .complete(conversation_id, response)
                    .await
            }
            Err(e) => Err(e),
        };
        match completed {
            Ok(_) => {}
            Err(e @ OrchestrationError::InvalidTransition { .. }) => {
                // Cancelled while the plan was running
                warn!(conversation_id = %conversation_id, error = %e, "Conversation not completed");
            }
            Err(e) => return Err(self.abandon(conversation_id, e).await),
        }

        self.runtime.write().await.last_activity = Some(self.clock.now());
        Ok(aggregate)
    }

    /// Record a processing error on the conversation and hand it back.
    async fn abandon(
        &self,
        conversation_id: &ConversationId,
        err: OrchestrationError,
    ) -> OrchestrationError {
        error!(
            orchestrator_id = %self.id,
            conversation_id = %conversation_id,
            error = %err,
            "Request processing failed"
        );
        if let Err(e) = self
            .conversations
            .fail(conversation_id, err.to_string())
            .await
        {
            warn!(conversation_id = %conversation_id, error = %e, "Could not mark conversation failed");
        }
        err
    }

    /// Validate configuration and input, then plan.
    async fn prepare(&self, request: &ProcessRequest) -> OrchestrationResult<Plan> {
        self.check_agents().await?;
        let context = optional_object("context", &request.context)?;
        let constraints = optional_object("constraints", &request.constraints)?;
        self.planner
            .plan(&request.goal, &context, &constraints)
            .await
    }

    /// Route and run one step. Every failure is recorded on the result.
    async fn execute_step(
        &self,
        step: &PlanStep,
        conversation_id: &ConversationId,
        request: &ProcessRequest,
    ) -> StepResult {
        let decision = match self.router.route(step).await {
            Ok(decision) => decision,
            Err(OrchestrationError::RoutingFailure { reason }) => {
                warn!(action = %step.action, reason = %reason, "Step not routed");
                return StepResult::failed(&step.action, None, reason);
            }
            Err(e) => {
                warn!(action = %step.action, error = %e, "Step routing failed");
                return StepResult::failed(&step.action, None, e.to_string());
            }
        };

        let spec = TaskSpec::new(
            format!("Execute: {}", step.action),
            decision.agent_type.as_str(),
            decision.agent_id.clone(),
            json!({
                "action": step.action,
                "data": step.data.to_value(),
                "context": step.context.to_value(),
            }),
        )
        .with_orchestrator(self.id.clone())
        .with_conversation(conversation_id.clone())
        .with_user(request.user_id.clone())
        .with_priority(step.priority.unwrap_or_default());

        let task = match self.engine.submit(spec).await {
            Ok(task) => task,
            Err(e) => {
                warn!(action = %step.action, error = %e, "Step task not created");
                return StepResult::failed(&step.action, None, e.to_string());
            }
        };
        if let Err(e) = self
            .conversations
            .attach_task(conversation_id, task.id.clone())
            .await
        {
            warn!(task_id = %task.id, error = %e, "Step task not attached, cancelling it");
            if let Err(cancel_err) = self.engine.cancel(&task.id).await {
                warn!(task_id = %task.id, error = %cancel_err, "Could not cancel unattached task");
            }
            return StepResult::failed(&step.action, Some(task.id), e.to_string());
        }

        let mut result = match self.engine.execute(&task.id).await {
            Ok(task) if task.state == TaskState::Completed => StepResult {
                action: step.action.clone(),
                task_id: Some(task.id),
                agent_id: None,
                output: task.output,
                error: None,
            },
            Ok(task) => {
                let message = task
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| format!("task ended in state {}", task.state));
                StepResult::failed(&step.action, Some(task.id), message)
            }
            Err(e) => StepResult::failed(&step.action, Some(task.id), e.to_string()),
        };
        result.agent_id = Some(decision.agent_id);
        result
    }

    // ========================================================================
    // Views
    // ========================================================================

    fn own_tasks(&self) -> TaskQuery {
        TaskQuery::new().with_orchestrator(self.id.clone())
    }

    /// Task counts by state for this orchestrator's tasks.
    pub async fn task_queue_status(&self) -> OrchestrationResult<TaskQueueStatus> {
        let stats = self.engine.stats(&self.own_tasks()).await?;
        Ok(TaskQueueStatus {
            pending: stats.pending,
            running: stats.running,
            completed: stats.completed,
            failed: stats.failed,
            cancelled: stats.cancelled,
            total: stats.total,
        })
    }

    /// Success rate and average processing time of this orchestrator's tasks.
    pub async fn performance(&self) -> OrchestrationResult<OrchestratorPerformance> {
        let stats = self.engine.stats(&self.own_tasks()).await?;
        Ok(OrchestratorPerformance {
            total_tasks_processed: stats.total,
            success_rate: stats.success_rate,
            avg_processing_time: stats.avg_response_time,
        })
    }

    /// Active agents, optionally of one type.
    pub async fn available_agents(
        &self,
        agent_type: Option<AgentType>,
    ) -> OrchestrationResult<Vec<Agent>> {
        self.engine.registry().available(agent_type).await
    }

    /// Status snapshot.
    pub async fn system_status(&self) -> OrchestrationResult<SystemStatus> {
        let registry = self.engine.registry();
        let total_agents = registry.count(&AgentQuery::new()).await?;
        let active_agents = registry.available(None).await?.len();
        let stats = self.engine.stats(&self.own_tasks()).await?;
        let runtime = self.runtime.read().await;

        Ok(SystemStatus {
            orchestrator_id: self.id.clone(),
            orchestrator_name: self.name.clone(),
            orchestrator_state: runtime.state,
            total_agents,
            active_agents,
            total_tasks: stats.total,
            success_rate: stats.success_rate,
            last_activity: runtime.last_activity,
            error_message: runtime.error_message.clone(),
        })
    }

    /// Delete this orchestrator's terminal tasks older than `days` days.
    pub async fn cleanup_completed_tasks(&self, days: u32) -> OrchestrationResult<usize> {
        let cutoff = self.clock.now() - ChronoDuration::days(i64::from(days));
        self.engine
            .cleanup_matching(self.own_tasks().created_before(cutoff))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::handler::HandlerRegistry;
    use crate::planner::TemplatePlanner;
    use crate::registry::AgentRegistry;
    use crate::router::RoutingTable;
    use conductor_core::{
        ConversationState, InMemoryAgentStore, InMemoryConversationStore, InMemoryTaskStore,
        ManualClock, Notifier, TracingSink,
    };

    struct Fixture {
        orchestrator: Orchestrator,
        registry: Arc<AgentRegistry>,
    }

    async fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let tasks = InMemoryTaskStore::shared();
        let registry = Arc::new(AgentRegistry::new(
            InMemoryAgentStore::shared(),
            tasks.clone(),
            clock.clone(),
        ));
        registry.register_defaults().await.unwrap();

        let planner: Arc<dyn Planner> = Arc::new(TemplatePlanner::new());
        let router = Arc::new(Router::new(RoutingTable::default(), registry.clone()));
        let handlers = HandlerRegistry::with_defaults(planner.clone(), router.clone());
        let config = OrchestratorConfig {
            enable_retry: false,
            ..OrchestratorConfig::default()
        };
        let notifier = Notifier::spawn(Arc::new(TracingSink));
        let engine = TaskEngine::new(
            config,
            tasks,
            registry.clone(),
            handlers,
            notifier.clone(),
            clock.clone(),
        );
        let conversations = Arc::new(ConversationManager::new(
            InMemoryConversationStore::shared(),
            notifier,
            clock.clone(),
        ));

        let planner_agent = registry.resolve(AgentType::Planner).await.unwrap();
        let router_agent = registry.resolve(AgentType::Router).await.unwrap();
        let orchestrator = Orchestrator::new(
            "Test Orchestrator",
            planner,
            router,
            engine,
            conversations,
            clock,
        )
        .with_planner_agent(planner_agent.id)
        .with_router_agent(router_agent.id);

        Fixture {
            orchestrator,
            registry,
        }
    }

    #[tokio::test]
    async fn test_process_requires_active() {
        let f = fixture().await;
        let err = f
            .orchestrator
            .process(ProcessRequest::new("create a lead"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "ORCHESTRATOR_NOT_ACTIVE");
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let f = fixture().await;
        let o = &f.orchestrator;

        assert!(o.pause().await.is_err());
        o.start().await.unwrap();
        assert_eq!(o.state().await, OrchestratorState::Active);
        assert!(o.start().await.is_err());

        o.pause().await.unwrap();
        let err = o.process(ProcessRequest::new("x")).await.unwrap_err();
        assert_eq!(err.error_code(), "ORCHESTRATOR_NOT_ACTIVE");

        o.resume().await.unwrap();
        assert_eq!(o.state().await, OrchestratorState::Active);
        o.stop().await;
        assert_eq!(o.state().await, OrchestratorState::Draft);
    }

    #[tokio::test]
    async fn test_start_fails_without_router() {
        let mut f = fixture().await;
        f.orchestrator.router_agent = None;
        let err = f.orchestrator.start().await.unwrap_err();
        assert_eq!(err.error_code(), "MISCONFIGURED_ORCHESTRATOR");
        assert_eq!(f.orchestrator.state().await, OrchestratorState::Error);
        assert!(f.orchestrator.error_message().await.is_some());
    }

    #[tokio::test]
    async fn test_process_create_lead() {
        let f = fixture().await;
        f.orchestrator.start().await.unwrap();

        let result = f
            .orchestrator
            .process(
                ProcessRequest::new("create a lead for Acme")
                    .with_context(json!({"customer": "Acme"}))
                    .with_user("alice"),
            )
            .await
            .unwrap();

        assert_eq!(result.status, "completed");
        assert_eq!(result.plan.len(), 3);
        assert_eq!(result.results.len(), 3);
        assert!(result.results.iter().all(StepResult::is_success));

        let conversation = f
            .orchestrator
            .conversations()
            .get(&result.conversation_id)
            .await
            .unwrap();
        assert_eq!(conversation.state, ConversationState::Completed);
        assert_eq!(conversation.task_ids.len(), 3);
        assert_eq!(conversation.messages.first().unwrap().content, "create a lead for Acme");

        let task = f
            .orchestrator
            .engine()
            .get(&conversation.task_ids[1])
            .await
            .unwrap();
        assert_eq!(task.name, "Execute: execute_tasks");
        assert_eq!(task.task_type, "crm");
        assert_eq!(task.user_id.as_deref(), Some("alice"));

        let queue = f.orchestrator.task_queue_status().await.unwrap();
        assert_eq!(queue.completed, 3);
        assert_eq!(queue.total, 3);
    }

    #[tokio::test]
    async fn test_inactive_domain_agent_degrades_one_step() {
        let f = fixture().await;
        f.orchestrator.start().await.unwrap();
        let crm = f.registry.resolve(AgentType::Crm).await.unwrap();
        f.registry
            .set_state(&crm.id, AgentState::Archived)
            .await
            .unwrap();

        let result = f
            .orchestrator
            .process(ProcessRequest::new("create a lead for Acme"))
            .await
            .unwrap();

        assert_eq!(result.results.len(), 3);
        assert!(result.results[0].is_success());
        assert_eq!(
            result.results[1].error.as_deref(),
            Some("No agent found for type: crm")
        );
        assert!(result.results[2].is_success());
        assert_eq!(result.status, "completed");
    }

    #[tokio::test]
    async fn test_planner_archived_fails_conversation() {
        let f = fixture().await;
        f.orchestrator.start().await.unwrap();
        let planner = f.orchestrator.planner_agent().unwrap().clone();
        f.registry
            .set_state(&planner, AgentState::Archived)
            .await
            .unwrap();

        let err = f
            .orchestrator
            .process(ProcessRequest::new("create a lead").with_user("bob"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MISCONFIGURED_ORCHESTRATOR");

        let conversations = f
            .orchestrator
            .conversations()
            .user_conversations("bob", 10)
            .await
            .unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].state, ConversationState::Failed);

        // fixing the agent lets the conversation be retried
        f.registry.activate(&planner).await.unwrap();
        let retried = f
            .orchestrator
            .retry_conversation(&conversations[0].id)
            .await
            .unwrap();
        assert_eq!(retried.conversation_id, conversations[0].id);
        assert_eq!(retried.results.len(), 3);
    }

    #[tokio::test]
    async fn test_non_object_context_is_invalid_input() {
        let f = fixture().await;
        f.orchestrator.start().await.unwrap();
        let err = f
            .orchestrator
            .process(ProcessRequest::new("create a lead").with_context(json!([1, 2])))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_system_status() {
        let f = fixture().await;
        f.orchestrator.start().await.unwrap();
        f.orchestrator
            .process(ProcessRequest::new("check stock of product 42"))
            .await
            .unwrap();

        let status = f.orchestrator.system_status().await.unwrap();
        assert_eq!(status.orchestrator_state, OrchestratorState::Active);
        assert_eq!(
            status.total_agents,
            f.registry.count(&AgentQuery::new()).await.unwrap()
        );
        assert_eq!(status.active_agents, status.total_agents);
        assert_eq!(status.total_tasks, 3);
        assert_eq!(status.success_rate, 1.0);
        assert!(status.last_activity.is_some());
    }
}
