//! Agent descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OrchestrationError;
use crate::ids::AgentId;

/// Kind of work an agent performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Decomposes goals into plans
    Planner,
    /// Maps plan steps to agent types
    Router,
    Crm,
    Sales,
    Inventory,
    Accounting,
    Hr,
    /// Catch-all for steps no specialised agent claims
    Custom,
}

impl AgentType {
    /// Every built-in agent type, in declaration order.
    pub const ALL: [AgentType; 8] = [
        AgentType::Planner,
        AgentType::Router,
        AgentType::Crm,
        AgentType::Sales,
        AgentType::Inventory,
        AgentType::Accounting,
        AgentType::Hr,
        AgentType::Custom,
    ];

    /// Lowercase name used in routing tables and payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Planner => "planner",
            AgentType::Router => "router",
            AgentType::Crm => "crm",
            AgentType::Sales => "sales",
            AgentType::Inventory => "inventory",
            AgentType::Accounting => "accounting",
            AgentType::Hr => "hr",
            AgentType::Custom => "custom",
        }
    }

    /// Whether this type handles business-domain work.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            AgentType::Crm
                | AgentType::Sales
                | AgentType::Inventory
                | AgentType::Accounting
                | AgentType::Hr
        )
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| OrchestrationError::InvalidInput(format!("unknown agent type '{s}'")))
    }
}

/// Lifecycle state of an agent.
///
/// Only `Active` agents are resolvable. `Busy` is advisory and is never
/// set by the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    #[default]
    Draft,
    Active,
    Busy,
    Error,
    Archived,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Draft => "draft",
            AgentState::Active => "active",
            AgentState::Busy => "busy",
            AgentState::Error => "error",
            AgentState::Archived => "archived",
        };
        f.write_str(s)
    }
}

/// A declared capability of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    /// Capability name (e.g. `lead_management`)
    pub name: String,
    /// Whether the capability is currently enabled
    #[serde(default = "Capability::enabled_default")]
    pub enabled: bool,
}

impl Capability {
    fn enabled_default() -> bool {
        true
    }

    /// Create an enabled capability.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }
}

/// Running counters maintained by the task engine.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentCounters {
    /// Tasks that reached completed or failed
    pub task_count: u64,
    /// Tasks that completed
    pub success_count: u64,
    /// Sum of response times of completed tasks, in seconds
    pub response_time_sum: f64,
}

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier
    pub id: AgentId,
    /// Display name
    pub name: String,
    /// Agent type
    pub agent_type: AgentType,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared capabilities
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Lifecycle state
    pub state: AgentState,
    /// Resolution priority, lower wins
    pub sequence: i32,
    /// Registration order, breaks ties between equal sequences
    #[serde(default)]
    pub ordinal: u64,
    /// Cumulative counters
    #[serde(default)]
    pub counters: AgentCounters,
    /// Last time the agent ran a task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    /// Last task failure reported by this agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Default resolution priority.
    pub const DEFAULT_SEQUENCE: i32 = 10;

    /// Create a draft agent.
    pub fn new(name: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            id: AgentId::generate(),
            name: name.into(),
            agent_type,
            description: None,
            capabilities: Vec::new(),
            state: AgentState::Draft,
            sequence: Self::DEFAULT_SEQUENCE,
            ordinal: 0,
            counters: AgentCounters::default(),
            last_activity: None,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Use a specific identifier.
    pub fn with_id(mut self, id: AgentId) -> Self {
        self.id = id;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a capability.
    pub fn with_capability(mut self, name: impl Into<String>) -> Self {
        self.capabilities.push(Capability::new(name));
        self
    }

    /// Set the initial state.
    pub fn with_state(mut self, state: AgentState) -> Self {
        self.state = state;
        self
    }

    /// Set the resolution priority.
    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Whether the resolver may select this agent.
    pub fn is_available(&self) -> bool {
        self.state == AgentState::Active
    }

    /// Check for an enabled capability.
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.enabled && c.name == name)
    }

    /// Resolution sort key.
    pub fn priority_key(&self) -> (i32, u64) {
        (self.sequence, self.ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("planner", AgentType::Planner)]
    #[case("crm", AgentType::Crm)]
    #[case("hr", AgentType::Hr)]
    #[case("custom", AgentType::Custom)]
    fn test_agent_type_parses(#[case] input: &str, #[case] expected: AgentType) {
        assert_eq!(input.parse::<AgentType>().unwrap(), expected);
        assert_eq!(expected.to_string(), input);
    }

    #[test]
    fn test_unknown_agent_type() {
        assert!("specialized".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_domain_types() {
        assert!(AgentType::Crm.is_domain());
        assert!(!AgentType::Router.is_domain());
        assert!(!AgentType::Custom.is_domain());
    }

    #[test]
    fn test_agent_builder() {
        let agent = Agent::new("CRM Agent", AgentType::Crm)
            .with_capability("lead_management")
            .with_state(AgentState::Active)
            .with_sequence(5);

        assert!(agent.is_available());
        assert!(agent.has_capability("lead_management"));
        assert!(!agent.has_capability("payroll"));
        assert_eq!(agent.priority_key(), (5, 0));
    }

    #[test]
    fn test_busy_is_not_available() {
        let agent = Agent::new("CRM Agent", AgentType::Crm).with_state(AgentState::Busy);
        assert!(!agent.is_available());
    }
}
