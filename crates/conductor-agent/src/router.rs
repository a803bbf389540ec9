//! Step routing.
//!
//! A step's target agent type is chosen in this order:
//!
//! 1. the static routing table, keyed by the step's action
//! 2. the step's agent hint
//! 3. [`AgentType::Custom`]
//!
//! The type is then resolved to a live agent through the registry. Any
//! failure is reported as [`OrchestrationError::RoutingFailure`] so the
//! orchestrator can record it against the step and carry on.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use conductor_core::{AgentId, AgentType, OrchestrationError, OrchestrationResult, PlanStep};

use crate::registry::AgentRegistry;

/// Static mapping from action name to agent type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
    routes: HashMap<String, AgentType>,
}

impl RoutingTable {
    /// An empty table; everything falls through to hints or custom.
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Add or replace a route.
    pub fn with_route(mut self, action: impl Into<String>, agent_type: AgentType) -> Self {
        self.routes.insert(action.into(), agent_type);
        self
    }

    /// Look up an action.
    pub fn lookup(&self, action: &str) -> Option<AgentType> {
        self.routes.get(action).copied()
    }

    /// Target type for a step: table, then hint, then custom.
    pub fn target_for(&self, step: &PlanStep) -> AgentType {
        self.lookup(&step.action)
            .or(step.agent_hint)
            .unwrap_or(AgentType::Custom)
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::empty()
            .with_route("crm_lead", AgentType::Crm)
            .with_route("create_lead", AgentType::Crm)
            .with_route("search_leads", AgentType::Crm)
            .with_route("sales_order", AgentType::Sales)
            .with_route("create_order", AgentType::Sales)
            .with_route("inventory_check", AgentType::Inventory)
            .with_route("check_stock", AgentType::Inventory)
            .with_route("accounting_report", AgentType::Accounting)
            .with_route("create_invoice", AgentType::Accounting)
            .with_route("hr_employee", AgentType::Hr)
            .with_route("search_employees", AgentType::Hr)
    }
}

/// Where a step was routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub agent_id: AgentId,
    pub agent_type: AgentType,
    pub agent_name: String,
}

/// Routes plan steps to live agents.
pub struct Router {
    table: RoutingTable,
    registry: Arc<AgentRegistry>,
}

impl Router {
    /// Create a router.
    pub fn new(table: RoutingTable, registry: Arc<AgentRegistry>) -> Self {
        Self { table, registry }
    }

    /// The routing table.
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Route a step to an agent.
    pub async fn route(&self, step: &PlanStep) -> OrchestrationResult<RouteDecision> {
        let agent_type = self.table.target_for(step);
        debug!(action = %step.action, agent_type = %agent_type, "Routing step");

        match self.registry.resolve(agent_type).await {
            Ok(agent) => Ok(RouteDecision {
                agent_id: agent.id,
                agent_type,
                agent_name: agent.name,
            }),
            Err(e) => {
                warn!(action = %step.action, agent_type = %agent_type, error = %e, "Routing failed");
                Err(OrchestrationError::RoutingFailure {
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::{
        Agent, AgentState, InMemoryAgentStore, InMemoryTaskStore, SystemClock,
    };
    use rstest::rstest;

    async fn router_with(types: &[AgentType]) -> Router {
        let registry = Arc::new(AgentRegistry::new(
            InMemoryAgentStore::shared(),
            InMemoryTaskStore::shared(),
            Arc::new(SystemClock),
        ));
        for t in types {
            registry
                .register(Agent::new(format!("{t} agent"), *t).with_state(AgentState::Active))
                .await
                .unwrap();
        }
        Router::new(RoutingTable::default(), registry)
    }

    #[rstest]
    #[case("crm_lead", AgentType::Crm)]
    #[case("sales_order", AgentType::Sales)]
    #[case("inventory_check", AgentType::Inventory)]
    #[case("accounting_report", AgentType::Accounting)]
    #[case("hr_employee", AgentType::Hr)]
    #[case("something_else", AgentType::Custom)]
    fn test_default_table(#[case] action: &str, #[case] expected: AgentType) {
        let table = RoutingTable::default();
        assert_eq!(table.target_for(&PlanStep::new(action)), expected);
    }

    #[test]
    fn test_table_wins_over_hint() {
        let table = RoutingTable::default();
        let step = PlanStep::new("crm_lead").with_hint(AgentType::Hr);
        assert_eq!(table.target_for(&step), AgentType::Crm);

        let step = PlanStep::new("analyze_requirements").with_hint(AgentType::Router);
        assert_eq!(table.target_for(&step), AgentType::Router);
    }

    #[tokio::test]
    async fn test_identical_steps_route_identically() {
        let router = router_with(&[AgentType::Crm, AgentType::Custom]).await;
        let step = PlanStep::new("crm_lead");
        let a = router.route(&step).await.unwrap();
        let b = router.route(&step).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.agent_type, AgentType::Crm);
    }

    #[tokio::test]
    async fn test_unresolvable_type_is_routing_failure() {
        let router = router_with(&[AgentType::Custom]).await;
        let err = router.route(&PlanStep::new("crm_lead")).await.unwrap_err();
        match err {
            OrchestrationError::RoutingFailure { reason } => {
                assert_eq!(reason, "No agent found for type: crm");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
