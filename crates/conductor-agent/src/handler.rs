//! Capability handlers: the code that actually performs an agent's work.
//!
//! Each agent type maps to one [`CapabilityHandler`] in a
//! [`HandlerRegistry`]. The task engine looks up the handler for the
//! assigned agent's type and calls it with the task type and validated
//! input.
//!
//! The built-in handlers are deliberately thin. Domain handlers acknowledge
//! the actions they recognise; real business integrations replace them by
//! registering their own handler for the type.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use conductor_core::{AgentType, HandlerError, Payload, PlanStep, RequestType};

use crate::planner::{Planner, TemplatePlanner};
use crate::router::Router;

/// Performs the work of one agent type.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Handle a task. Errors are stored on the task and count toward retries.
    async fn handle(&self, task_type: &str, input: &Payload) -> Result<Payload, HandlerError>;
}

/// Handlers keyed by agent type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<AgentType, Arc<dyn CapabilityHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handler for every agent type.
    pub fn with_defaults(planner: Arc<dyn Planner>, router: Arc<Router>) -> Self {
        let mut registry = Self::new()
            .with_handler(AgentType::Planner, Arc::new(PlannerHandler::new(planner)))
            .with_handler(AgentType::Router, Arc::new(RouterHandler::new(router)))
            .with_handler(AgentType::Custom, Arc::new(CustomHandler));
        for agent_type in AgentType::ALL.into_iter().filter(AgentType::is_domain) {
            registry.register(agent_type, Arc::new(DomainHandler::new(agent_type)));
        }
        registry
    }

    /// Register or replace a handler.
    pub fn register(&mut self, agent_type: AgentType, handler: Arc<dyn CapabilityHandler>) {
        self.handlers.insert(agent_type, handler);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_handler(
        mut self,
        agent_type: AgentType,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        self.register(agent_type, handler);
        self
    }

    /// Handler for an agent type.
    pub fn get(&self, agent_type: AgentType) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(&agent_type).cloned()
    }

    /// Whether a handler is registered for the type.
    pub fn contains(&self, agent_type: AgentType) -> bool {
        self.handlers.contains_key(&agent_type)
    }
}

/// Action name carried in a step task's input.
fn action_of(input: &Payload) -> &str {
    input.get_str("action").unwrap_or_default()
}

/// Goal carried either at the top level or inside `data`.
fn goal_of(input: &Payload) -> Option<String> {
    input
        .get_str("goal")
        .map(str::to_string)
        .or_else(|| input.get_object("data")?.get_str("goal").map(str::to_string))
        .filter(|g| !g.trim().is_empty())
}

// ============================================================================
// Planner Handler
// ============================================================================

/// Plans goals and validates executed plans.
pub struct PlannerHandler {
    planner: Arc<dyn Planner>,
}

impl PlannerHandler {
    pub fn new(planner: Arc<dyn Planner>) -> Self {
        Self { planner }
    }
}

#[async_trait]
impl CapabilityHandler for PlannerHandler {
    async fn handle(&self, _task_type: &str, input: &Payload) -> Result<Payload, HandlerError> {
        if action_of(input) == TemplatePlanner::VALIDATE {
            let mut output = Payload::new().with("status", "validated");
            if let Some(goal) = goal_of(input) {
                output.insert("goal", goal);
            }
            return Ok(output);
        }

        let goal = goal_of(input).ok_or_else(|| HandlerError::new("no goal to plan"))?;
        let context = input.get_object("context").unwrap_or_default();
        let constraints = input.get_object("constraints").unwrap_or_default();
        let plan = self
            .planner
            .plan(&goal, &context, &constraints)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;
        let plan = serde_json::to_value(&plan).map_err(|e| HandlerError::new(e.to_string()))?;

        Ok(Payload::new().with("plan", plan).with("status", "planned"))
    }
}

// ============================================================================
// Router Handler
// ============================================================================

/// Analyses requests and reports routing decisions.
pub struct RouterHandler {
    router: Arc<Router>,
}

impl RouterHandler {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl CapabilityHandler for RouterHandler {
    async fn handle(&self, _task_type: &str, input: &Payload) -> Result<Payload, HandlerError> {
        let action = action_of(input);

        if action == TemplatePlanner::ANALYZE {
            let goal = goal_of(input).unwrap_or_default();
            let request_type = RequestType::classify(&goal);
            let target = request_type.agent_type().unwrap_or(AgentType::Custom);
            return Ok(Payload::new()
                .with("status", "analyzed")
                .with("request_type", request_type.to_string())
                .with("target_agent_type", target.as_str()));
        }

        // Anything else is a routing query for the named request type
        let request = input.get_str("type").unwrap_or(action);
        let decision = self
            .router
            .route(&PlanStep::new(request))
            .await
            .map_err(|e| match e {
                conductor_core::OrchestrationError::RoutingFailure { reason } => {
                    HandlerError::new(reason)
                }
                other => HandlerError::new(other.to_string()),
            })?;

        Ok(Payload::new()
            .with("status", "routed")
            .with("routed_to", decision.agent_name)
            .with("agent_id", decision.agent_id.as_str())
            .with("agent_type", decision.agent_type.as_str()))
    }
}

// ============================================================================
// Domain Handler
// ============================================================================

/// Acknowledges the business actions of one domain agent type.
pub struct DomainHandler {
    agent_type: AgentType,
    actions: &'static [&'static str],
}

impl DomainHandler {
    /// Handler with the standard action set for a domain type.
    pub fn new(agent_type: AgentType) -> Self {
        let actions: &'static [&'static str] = match agent_type {
            AgentType::Crm => &["create_lead", "search_leads", "crm_lead"],
            AgentType::Sales => &["create_order", "sales_order"],
            AgentType::Inventory => &["check_stock", "inventory_check"],
            AgentType::Accounting => &["create_invoice", "accounting_report"],
            AgentType::Hr => &["search_employees", "hr_employee"],
            _ => &[],
        };
        Self {
            agent_type,
            actions,
        }
    }

    /// Actions this handler recognises.
    pub fn actions(&self) -> &'static [&'static str] {
        self.actions
    }
}

#[async_trait]
impl CapabilityHandler for DomainHandler {
    async fn handle(&self, _task_type: &str, input: &Payload) -> Result<Payload, HandlerError> {
        let action = action_of(input);
        let base = Payload::new()
            .with("agent_type", self.agent_type.as_str())
            .with("action", action);

        if action == TemplatePlanner::EXECUTE {
            let mut output = base.with("status", "executed");
            if let Some(goal) = goal_of(input) {
                output.insert("goal", goal);
            }
            return Ok(output);
        }

        if self.actions.contains(&action) {
            let data = input.get_object("data").unwrap_or_default();
            return Ok(base.with("status", "accepted").with("data", data.into_value()));
        }

        Ok(base.with("status", "unknown_action"))
    }
}

// ============================================================================
// Custom Handler
// ============================================================================

/// Echoes its input back.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomHandler;

#[async_trait]
impl CapabilityHandler for CustomHandler {
    async fn handle(&self, task_type: &str, input: &Payload) -> Result<Payload, HandlerError> {
        Ok(Payload::new()
            .with("status", "custom_task_executed")
            .with("data", json!({"type": task_type, "input": input.to_value()})))
    }
}
