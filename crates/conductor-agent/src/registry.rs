//! Agent Registry
//!
//! Stores agent descriptors and resolves an agent type to a live agent.
//!
//! # Resolution
//!
//! [`AgentRegistry::resolve`] returns the `active` agent of the requested
//! type with the lowest `sequence`, breaking ties by registration order.
//! With no state change in between, two calls return the same agent.
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor_agent::AgentRegistry;
//! use conductor_core::AgentType;
//!
//! let registry = AgentRegistry::new(agent_store, task_store, clock);
//! registry.register_defaults().await?;
//!
//! let crm = registry.resolve(AgentType::Crm).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use conductor_core::{
    Agent, AgentId, AgentQuery, AgentState, AgentStore, AgentType, Clock, OrchestrationError,
    OrchestrationResult, TaskQuery, TaskStore,
};

use crate::stats::TaskStats;

// ============================================================================
// Default Agents
// ============================================================================

struct DefaultAgent {
    name: &'static str,
    agent_type: AgentType,
    description: &'static str,
    capabilities: &'static [&'static str],
}

const DEFAULT_AGENTS: [DefaultAgent; 8] = [
    DefaultAgent {
        name: "Planner Agent",
        agent_type: AgentType::Planner,
        description: "Plans and coordinates complex tasks",
        capabilities: &["planning", "coordination", "task_breakdown"],
    },
    DefaultAgent {
        name: "Router Agent",
        agent_type: AgentType::Router,
        description: "Routes requests to appropriate specialized agents",
        capabilities: &["routing", "request_analysis", "agent_selection"],
    },
    DefaultAgent {
        name: "CRM Agent",
        agent_type: AgentType::Crm,
        description: "Handles CRM-related tasks and operations",
        capabilities: &[
            "lead_management",
            "opportunity_tracking",
            "customer_analysis",
        ],
    },
    DefaultAgent {
        name: "Sales Agent",
        agent_type: AgentType::Sales,
        description: "Handles sales-related tasks and operations",
        capabilities: &["order_management", "quotation_handling", "sales_analysis"],
    },
    DefaultAgent {
        name: "Inventory Agent",
        agent_type: AgentType::Inventory,
        description: "Handles inventory-related tasks and operations",
        capabilities: &[
            "stock_management",
            "warehouse_operations",
            "inventory_analysis",
        ],
    },
    DefaultAgent {
        name: "Accounting Agent",
        agent_type: AgentType::Accounting,
        description: "Handles accounting-related tasks and operations",
        capabilities: &[
            "invoice_management",
            "financial_reporting",
            "account_analysis",
        ],
    },
    DefaultAgent {
        name: "HR Agent",
        agent_type: AgentType::Hr,
        description: "Handles HR-related tasks and operations",
        capabilities: &[
            "employee_management",
            "attendance_tracking",
            "hr_analytics",
        ],
    },
    DefaultAgent {
        name: "Custom Agent",
        agent_type: AgentType::Custom,
        description: "Handles requests no specialized agent claims",
        capabilities: &["custom_execution"],
    },
];

// ============================================================================
// Performance
// ============================================================================

/// Performance of one agent, recomputed from its tasks on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub agent_id: AgentId,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    /// `completed / total`, 0.0 without tasks
    pub success_rate: f64,
    /// Mean response time of completed tasks in seconds, 0.0 without any
    pub avg_response_time: f64,
}

/// Outcome of one task execution, reported by the task engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub success: bool,
    /// Seconds, for completed tasks
    pub response_time: Option<f64>,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Agent Registry
// ============================================================================

/// Registry of agents backed by an [`AgentStore`].
pub struct AgentRegistry {
    agents: Arc<dyn AgentStore>,
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    /// Serializes read-modify-write cycles on agent records.
    write_lock: Mutex<()>,
}

impl AgentRegistry {
    /// Create a registry over the given stores.
    pub fn new(
        agents: Arc<dyn AgentStore>,
        tasks: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            agents,
            tasks,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Register an agent, assigning its registration order.
    pub async fn register(&self, mut agent: Agent) -> OrchestrationResult<Agent> {
        let _guard = self.write_lock.lock().await;

        let existing = self.agents.query(&AgentQuery::new()).await?;
        agent.ordinal = existing.iter().map(|a| a.ordinal).max().unwrap_or(0) + 1;
        agent.created_at = self.clock.now();

        self.agents.save(&agent).await?;
        info!(
            agent_id = %agent.id,
            agent_type = %agent.agent_type,
            name = %agent.name,
            state = %agent.state,
            "Registered agent"
        );
        Ok(agent)
    }

    /// Ensure one agent per built-in type exists.
    ///
    /// Types that already have an agent (in any state) are left alone, so
    /// calling this repeatedly is harmless. New agents start `active`.
    /// Returns the agents created by this call.
    pub async fn register_defaults(&self) -> OrchestrationResult<Vec<Agent>> {
        let mut created = Vec::new();
        for def in &DEFAULT_AGENTS {
            let existing = self
                .agents
                .count(&AgentQuery::new().with_type(def.agent_type))
                .await?;
            if existing > 0 {
                debug!(agent_type = %def.agent_type, "Default agent already present");
                continue;
            }

            let agent = def.capabilities.iter().fold(
                Agent::new(def.name, def.agent_type)
                    .with_description(def.description)
                    .with_state(AgentState::Active),
                |agent, cap| agent.with_capability(*cap),
            );
            created.push(self.register(agent).await?);
        }
        Ok(created)
    }

    /// Get an agent by ID.
    pub async fn get(&self, agent_id: &AgentId) -> OrchestrationResult<Agent> {
        self.agents
            .get(agent_id)
            .await?
            .ok_or_else(|| OrchestrationError::AgentNotFound(agent_id.clone()))
    }

    /// List agents matching a query, in resolution order.
    pub async fn list(&self, query: &AgentQuery) -> OrchestrationResult<Vec<Agent>> {
        self.agents.query(query).await
    }

    /// Active agents, optionally of one type.
    pub async fn available(&self, agent_type: Option<AgentType>) -> OrchestrationResult<Vec<Agent>> {
        let mut query = AgentQuery::new().active();
        if let Some(t) = agent_type {
            query = query.with_type(t);
        }
        self.agents.query(&query).await
    }

    /// Resolve a type to the highest-priority active agent.
    pub async fn resolve(&self, agent_type: AgentType) -> OrchestrationResult<Agent> {
        let agent = self
            .agents
            .query(&AgentQuery::new().with_type(agent_type).active().with_limit(1))
            .await?
            .into_iter()
            .next()
            .ok_or(OrchestrationError::NoCapableAgent(agent_type))?;

        debug!(agent_type = %agent_type, agent_id = %agent.id, "Resolved agent");
        Ok(agent)
    }

    /// Change an agent's lifecycle state.
    pub async fn set_state(
        &self,
        agent_id: &AgentId,
        state: AgentState,
    ) -> OrchestrationResult<Agent> {
        let _guard = self.write_lock.lock().await;
        let mut agent = self.get(agent_id).await?;
        let previous = agent.state;
        agent.state = state;
        self.agents.save(&agent).await?;
        info!(agent_id = %agent_id, from = %previous, to = %state, "Agent state changed");
        Ok(agent)
    }

    /// Make an agent resolvable.
    pub async fn activate(&self, agent_id: &AgentId) -> OrchestrationResult<Agent> {
        self.set_state(agent_id, AgentState::Active).await
    }

    /// Remove an agent. Refused while pending or running tasks reference it.
    pub async fn remove(&self, agent_id: &AgentId) -> OrchestrationResult<()> {
        let _guard = self.write_lock.lock().await;
        let live_tasks = self
            .tasks
            .count(&TaskQuery::new().with_agent(agent_id.clone()).live_only())
            .await?;
        if live_tasks > 0 {
            return Err(OrchestrationError::AgentInUse {
                agent_id: agent_id.clone(),
                live_tasks,
            });
        }

        if !self.agents.delete(agent_id).await? {
            return Err(OrchestrationError::AgentNotFound(agent_id.clone()));
        }
        info!(agent_id = %agent_id, "Removed agent");
        Ok(())
    }

    /// Record that an agent picked up a task.
    pub async fn touch(&self, agent_id: &AgentId) -> OrchestrationResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut agent = self.get(agent_id).await?;
        agent.last_activity = Some(self.clock.now());
        self.agents.save(&agent).await
    }

    /// Fold one task outcome into the agent's running counters.
    pub async fn record_outcome(
        &self,
        agent_id: &AgentId,
        outcome: &TaskOutcome,
    ) -> OrchestrationResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut agent = self.get(agent_id).await?;

        agent.counters.task_count += 1;
        if outcome.success {
            agent.counters.success_count += 1;
            agent.counters.response_time_sum += outcome.response_time.unwrap_or(0.0);
        }
        if let Some(error) = &outcome.error {
            agent.last_error = Some(error.clone());
        }
        agent.last_activity = Some(outcome.at);

        self.agents.save(&agent).await
    }

    /// Performance recomputed from the agent's tasks.
    pub async fn performance(&self, agent_id: &AgentId) -> OrchestrationResult<AgentPerformance> {
        // Surface unknown ids instead of reporting zeros
        self.get(agent_id).await?;

        let tasks = self
            .tasks
            .query(&TaskQuery::new().with_agent(agent_id.clone()))
            .await?;
        let stats = TaskStats::from_tasks(&tasks);

        Ok(AgentPerformance {
            agent_id: agent_id.clone(),
            total_tasks: stats.total,
            completed_tasks: stats.completed,
            success_rate: stats.success_rate,
            avg_response_time: stats.avg_response_time,
        })
    }

    /// Number of agents matching a query.
    pub async fn count(&self, query: &AgentQuery) -> OrchestrationResult<usize> {
        self.agents.count(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use conductor_core::{
        InMemoryAgentStore, InMemoryTaskStore, Payload, SystemClock, Task, TaskState,
    };
    use serde_json::json;

    fn registry() -> (AgentRegistry, Arc<InMemoryTaskStore>) {
        let tasks = InMemoryTaskStore::shared();
        let registry = AgentRegistry::new(
            InMemoryAgentStore::shared(),
            tasks.clone(),
            Arc::new(SystemClock),
        );
        (registry, tasks)
    }

    #[tokio::test]
    async fn test_register_defaults_is_idempotent() {
        let (registry, _) = registry();
        let first = registry.register_defaults().await.unwrap();
        assert_eq!(first.len(), AgentType::ALL.len());
        assert!(first.iter().all(|a| a.state == AgentState::Active));

        let second = registry.register_defaults().await.unwrap();
        assert!(second.is_empty());
        assert_eq!(
            registry.count(&AgentQuery::new()).await.unwrap(),
            AgentType::ALL.len()
        );
    }

    #[tokio::test]
    async fn test_default_capabilities() {
        let (registry, _) = registry();
        registry.register_defaults().await.unwrap();
        let crm = registry.resolve(AgentType::Crm).await.unwrap();
        assert!(crm.has_capability("lead_management"));
        assert_eq!(crm.name, "CRM Agent");
    }

    #[tokio::test]
    async fn test_resolve_prefers_sequence_then_registration_order() {
        let (registry, _) = registry();
        let a = registry
            .register(Agent::new("a", AgentType::Sales).with_state(AgentState::Active))
            .await
            .unwrap();
        let _b = registry
            .register(Agent::new("b", AgentType::Sales).with_state(AgentState::Active))
            .await
            .unwrap();

        assert_eq!(registry.resolve(AgentType::Sales).await.unwrap().id, a.id);
        // stable without state change
        assert_eq!(registry.resolve(AgentType::Sales).await.unwrap().id, a.id);

        let c = registry
            .register(
                Agent::new("c", AgentType::Sales)
                    .with_state(AgentState::Active)
                    .with_sequence(1),
            )
            .await
            .unwrap();
        assert_eq!(registry.resolve(AgentType::Sales).await.unwrap().id, c.id);
    }

    #[tokio::test]
    async fn test_resolve_skips_inactive() {
        let (registry, _) = registry();
        let agent = registry
            .register(Agent::new("hr", AgentType::Hr).with_state(AgentState::Active))
            .await
            .unwrap();
        registry
            .set_state(&agent.id, AgentState::Busy)
            .await
            .unwrap();

        let err = registry.resolve(AgentType::Hr).await.unwrap_err();
        assert_eq!(err.to_string(), "No agent found for type: hr");

        registry.activate(&agent.id).await.unwrap();
        assert!(registry.resolve(AgentType::Hr).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_refused_with_live_tasks() {
        let (registry, tasks) = registry();
        let agent = registry
            .register(Agent::new("crm", AgentType::Crm))
            .await
            .unwrap();
        let task = Task::new("t", "crm", agent.id.clone(), json!({}), Utc::now());
        tasks.save(&task).await.unwrap();

        let err = registry.remove(&agent.id).await.unwrap_err();
        assert_eq!(err.error_code(), "AGENT_IN_USE");

        let mut done = task;
        done.transition(TaskState::Cancelled, Utc::now()).unwrap();
        tasks.save(&done).await.unwrap();
        registry.remove(&agent.id).await.unwrap();
        assert!(registry.get(&agent.id).await.is_err());
    }

    #[tokio::test]
    async fn test_performance_recomputed_from_tasks() {
        let (registry, tasks) = registry();
        let agent = registry
            .register(Agent::new("crm", AgentType::Crm))
            .await
            .unwrap();

        let t0 = Utc::now();
        for (i, succeed) in [true, true, false, true].into_iter().enumerate() {
            let mut task = Task::new("t", "crm", agent.id.clone(), json!({}), t0);
            task.transition(TaskState::Running, t0).unwrap();
            let end = t0 + Duration::seconds(i as i64 + 1);
            if succeed {
                task.complete(Payload::new(), end).unwrap();
            } else {
                task.transition(TaskState::Failed, end).unwrap();
            }
            tasks.save(&task).await.unwrap();
        }

        let perf = registry.performance(&agent.id).await.unwrap();
        assert_eq!(perf.total_tasks, 4);
        assert_eq!(perf.completed_tasks, 3);
        assert_eq!(perf.success_rate, 0.75);
        // (1 + 2 + 4) / 3
        assert!((perf.avg_response_time - 7.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_record_outcome_updates_counters() {
        let (registry, _) = registry();
        let agent = registry
            .register(Agent::new("crm", AgentType::Crm))
            .await
            .unwrap();
        let now = Utc::now();

        registry
            .record_outcome(
                &agent.id,
                &TaskOutcome {
                    success: true,
                    response_time: Some(1.5),
                    error: None,
                    at: now,
                },
            )
            .await
            .unwrap();
        registry
            .record_outcome(
                &agent.id,
                &TaskOutcome {
                    success: false,
                    response_time: None,
                    error: Some("boom".to_string()),
                    at: now,
                },
            )
            .await
            .unwrap();

        let agent = registry.get(&agent.id).await.unwrap();
        assert_eq!(agent.counters.task_count, 2);
        assert_eq!(agent.counters.success_count, 1);
        assert_eq!(agent.counters.response_time_sum, 1.5);
        assert_eq!(agent.last_error.as_deref(), Some("boom"));
        assert_eq!(agent.last_activity, Some(now));
        // counters never flip the lifecycle state
        assert_eq!(agent.state, AgentState::Draft);
    }
}
