//! # Conductor
//!
//! Conductor turns a natural-language goal into a plan, routes each step to
//! a capable agent, runs the steps as tracked tasks and records the exchange
//! as a conversation.
//!
//! ## Core Components
//!
//! - **[AgentRegistry]**: Registered agents, their states and performance
//! - **[TaskEngine]**: Task state machine, bounded execution and retries
//! - **[Planner]**: Goal classification and plan construction
//! - **[Router]**: Maps plan steps to active agents
//! - **[Orchestrator]**: The plan-route-dispatch pipeline and status views
//! - **[ConversationManager]**: Message logs and summaries per request
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conductor_workspace::{OrchestratorConfig, ProcessRequest, bootstrap};
//!
//! let conductor = bootstrap(OrchestratorConfig::default()).await?;
//! let result = conductor
//!     .orchestrator
//!     .process(ProcessRequest::new("check stock of product 42"))
//!     .await?;
//! assert_eq!(result.results.len(), 3);
//! ```

pub use conductor_agent;
pub use conductor_core;

pub use conductor_agent::{
    AgentRegistry, AggregateResult, Bootstrap, CapabilityHandler, Conductor,
    ConversationManager, ConversationSummary, HandlerRegistry, Orchestrator, OrchestratorConfig,
    Planner, ProcessRequest, Router, RoutingTable, StepResult, Stores, SystemStatus, TaskEngine,
    TaskSpec, TemplatePlanner, bootstrap,
};
pub use conductor_core::{
    Agent, AgentState, AgentType, Clock, Conversation, ConversationState, HandlerError,
    ManualClock, OrchestrationError, OrchestrationResult, Payload, Plan, PlanStep, Task,
    TaskState,
};
