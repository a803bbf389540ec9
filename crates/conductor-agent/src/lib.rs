//! # Conductor Agent - Multi-Agent Request Orchestration
//!
//! Turns a natural-language goal into a plan, dispatches each step to a
//! capable agent as a tracked task, and records the exchange as a
//! conversation.
//!
//! ## Features
//!
//! - **Agent Registry**: Registration, default seeding, state changes and
//!   per-agent performance counters
//! - **Task Engine**: Task state machine with bounded concurrency, per-task
//!   timeouts and delayed automatic retries
//! - **Planner**: Keyword classification into a request type, complexity and
//!   ordered plan steps
//! - **Router**: Action table mapping plan steps to an active agent
//! - **Orchestrator**: Lifecycle, the plan-route-dispatch pipeline and
//!   status views
//! - **Conversation**: Message log, attached tasks and summaries per request
//!
//! ## Example
//!
//! ```rust,ignore
//! use conductor_agent::{OrchestratorConfig, ProcessRequest, bootstrap};
//!
//! let conductor = bootstrap(OrchestratorConfig::from_env()?).await?;
//!
//! let result = conductor
//!     .orchestrator
//!     .process(ProcessRequest::new("create a lead for Acme").with_user("user-1"))
//!     .await?;
//!
//! for step in &result.results {
//!     println!("{}: {}", step.action, step.is_success());
//! }
//! ```
//!
//! ## Custom Handlers
//!
//! ```rust,ignore
//! use conductor_agent::{Bootstrap, CapabilityHandler};
//! use conductor_core::{AgentType, HandlerError, Payload};
//!
//! struct MyCrm;
//!
//! #[async_trait::async_trait]
//! impl CapabilityHandler for MyCrm {
//!     async fn handle(&self, task_type: &str, input: &Payload) -> Result<Payload, HandlerError> {
//!         Ok(Payload::new().with("status", "stored"))
//!     }
//! }
//!
//! let conductor = Bootstrap::new(config)
//!     .with_handler(AgentType::Crm, std::sync::Arc::new(MyCrm))
//!     .build()
//!     .await?;
//! ```

pub mod bootstrap;
pub mod cleanup;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod handler;
pub mod orchestrator;
pub mod planner;
pub mod registry;
pub mod router;
pub mod stats;

pub use bootstrap::{Bootstrap, Conductor, DEFAULT_ORCHESTRATOR_NAME, Stores, bootstrap};
pub use cleanup::{CleanupJobHandle, CleanupReport, run_cleanup, spawn_cleanup_job};
pub use config::{ConfigError, OrchestratorConfig, OrchestratorConfigBuilder};
pub use conversation::{ConversationManager, ConversationSummary};
pub use engine::{TaskEngine, TaskSpec};
pub use handler::{
    CapabilityHandler, CustomHandler, DomainHandler, HandlerRegistry, PlannerHandler,
    RouterHandler,
};
pub use orchestrator::{
    AggregateResult, Orchestrator, OrchestratorPerformance, ProcessRequest, StepResult,
    SystemStatus, TaskQueueStatus,
};
pub use planner::{Planner, TemplatePlanner};
pub use registry::{AgentPerformance, AgentRegistry, TaskOutcome};
pub use router::{RouteDecision, Router, RoutingTable};
pub use stats::TaskStats;
