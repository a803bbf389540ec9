//! System assembly.
//!
//! [`Bootstrap`] wires stores, registry, handlers, engine, conversations and
//! one started "Default Orchestrator" into a [`Conductor`] handle. There is
//! no process-wide default; callers keep the handle.
//!
//! ```rust,ignore
//! let conductor = bootstrap(OrchestratorConfig::from_env()?).await?;
//! let result = conductor
//!     .orchestrator
//!     .process(ProcessRequest::new("check stock of product 42"))
//!     .await?;
//! ```

use std::sync::Arc;
use tracing::info;

use conductor_core::{
    AgentStore, AgentType, Clock, ConversationStore, InMemoryAgentStore,
    InMemoryConversationStore, InMemoryTaskStore, NotificationSink, Notifier,
    OrchestrationError, OrchestrationResult, SystemClock, TaskStore, TracingSink,
};

use crate::cleanup::{CleanupJobHandle, CleanupReport, run_cleanup, spawn_cleanup_job};
use crate::config::OrchestratorConfig;
use crate::conversation::ConversationManager;
use crate::engine::TaskEngine;
use crate::handler::{CapabilityHandler, HandlerRegistry};
use crate::orchestrator::Orchestrator;
use crate::planner::{Planner, TemplatePlanner};
use crate::registry::AgentRegistry;
use crate::router::{Router, RoutingTable};

/// Name of the orchestrator created by bootstrap.
pub const DEFAULT_ORCHESTRATOR_NAME: &str = "Default Orchestrator";

/// Backing stores for the three record collections.
#[derive(Clone)]
pub struct Stores {
    pub agents: Arc<dyn AgentStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub conversations: Arc<dyn ConversationStore>,
}

impl Stores {
    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            agents: InMemoryAgentStore::shared(),
            tasks: InMemoryTaskStore::shared(),
            conversations: InMemoryConversationStore::shared(),
        }
    }
}

/// A fully wired system.
pub struct Conductor {
    pub config: OrchestratorConfig,
    pub registry: Arc<AgentRegistry>,
    pub router: Arc<Router>,
    pub engine: Arc<TaskEngine>,
    pub conversations: Arc<ConversationManager>,
    pub orchestrator: Arc<Orchestrator>,
    pub clock: Arc<dyn Clock>,
}

impl Conductor {
    /// One cleanup pass with the configured age cutoff.
    pub async fn cleanup(&self) -> CleanupReport {
        self.cleanup_older_than(self.config.cleanup_after_days)
            .await
    }

    /// One cleanup pass with an explicit age cutoff.
    pub async fn cleanup_older_than(&self, days: u32) -> CleanupReport {
        run_cleanup(&self.engine, &self.conversations, days).await
    }

    /// Start the periodic cleanup job with the configured cutoff and period.
    pub fn spawn_cleanup_job(&self) -> CleanupJobHandle {
        spawn_cleanup_job(
            self.engine.clone(),
            self.conversations.clone(),
            self.config.cleanup_after_days,
            self.config.cleanup_interval,
        )
    }
}

/// Builder for a [`Conductor`].
pub struct Bootstrap {
    config: OrchestratorConfig,
    stores: Stores,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    routing_table: RoutingTable,
    planner: Arc<dyn Planner>,
    handlers: Vec<(AgentType, Arc<dyn CapabilityHandler>)>,
}

impl Bootstrap {
    /// In-memory stores, tracing notifications, wall clock, default table
    /// and template planner.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            stores: Stores::in_memory(),
            sink: Arc::new(TracingSink),
            clock: Arc::new(SystemClock),
            routing_table: RoutingTable::default(),
            planner: Arc::new(TemplatePlanner::new()),
            handlers: Vec::new(),
        }
    }

    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = stores;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_routing_table(mut self, table: RoutingTable) -> Self {
        self.routing_table = table;
        self
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }

    /// Replace the built-in handler for an agent type.
    pub fn with_handler(
        mut self,
        agent_type: AgentType,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        self.handlers.push((agent_type, handler));
        self
    }

    /// Seed default agents, wire every component and start the default
    /// orchestrator.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn build(self) -> OrchestrationResult<Conductor> {
        let registry = Arc::new(AgentRegistry::new(
            self.stores.agents.clone(),
            self.stores.tasks.clone(),
            self.clock.clone(),
        ));
        let seeded = registry.register_defaults().await?;

        let planner_agent = registry.resolve(AgentType::Planner).await.map_err(|e| {
            OrchestrationError::MisconfiguredOrchestrator(format!("planner agent: {e}"))
        })?;
        let router_agent = registry.resolve(AgentType::Router).await.map_err(|e| {
            OrchestrationError::MisconfiguredOrchestrator(format!("router agent: {e}"))
        })?;

        let router = Arc::new(Router::new(self.routing_table, registry.clone()));
        let mut handlers = HandlerRegistry::with_defaults(self.planner.clone(), router.clone());
        for (agent_type, handler) in self.handlers {
            handlers.register(agent_type, handler);
        }

        // One queue for every producer keeps notifications in emission order
        let notifier = Notifier::spawn(self.sink);
        let engine = TaskEngine::new(
            self.config.clone(),
            self.stores.tasks,
            registry.clone(),
            handlers,
            notifier.clone(),
            self.clock.clone(),
        );
        let conversations = Arc::new(ConversationManager::new(
            self.stores.conversations,
            notifier,
            self.clock.clone(),
        ));

        let orchestrator = Orchestrator::new(
            DEFAULT_ORCHESTRATOR_NAME,
            self.planner,
            router.clone(),
            engine.clone(),
            conversations.clone(),
            self.clock.clone(),
        )
        .with_planner_agent(planner_agent.id)
        .with_router_agent(router_agent.id);
        orchestrator.start().await?;

        info!(
            orchestrator_id = %orchestrator.id(),
            seeded_agents = seeded.len(),
            "Conductor bootstrapped"
        );

        Ok(Conductor {
            config: self.config,
            registry,
            router,
            engine,
            conversations,
            orchestrator: Arc::new(orchestrator),
            clock: self.clock,
        })
    }
}

/// Bootstrap with in-memory stores and the built-in components.
pub async fn bootstrap(config: OrchestratorConfig) -> OrchestrationResult<Conductor> {
    Bootstrap::new(config).build().await
}
