//! Plans produced by planners and consumed by the orchestrator.

use serde::{Deserialize, Serialize};

use crate::agent::AgentType;
use crate::payload::Payload;
use crate::task::Priority;

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Action name, looked up in the routing table
    pub action: String,
    /// Preferred agent type when the action is not in the routing table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_hint: Option<AgentType>,
    /// Step input
    #[serde(default)]
    pub data: Payload,
    /// Shared context
    #[serde(default)]
    pub context: Payload,
    /// Priority of the task created for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl PlanStep {
    /// Create a step for an action.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            agent_hint: None,
            data: Payload::new(),
            context: Payload::new(),
            priority: None,
        }
    }

    /// Set the agent hint.
    pub fn with_hint(mut self, agent_type: AgentType) -> Self {
        self.agent_hint = Some(agent_type);
        self
    }

    /// Set the step data.
    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }

    /// Set the step context.
    pub fn with_context(mut self, context: Payload) -> Self {
        self.context = context;
        self
    }

    /// Set the step priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// An ordered decomposition of a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Goal being planned
    pub goal: String,
    /// Steps, executed in order
    pub steps: Vec<PlanStep>,
    /// Advisory duration estimate
    pub estimated_duration: String,
    /// Advisory priority
    pub priority: Priority,
}

impl Plan {
    /// Create a plan with no steps.
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            steps: Vec::new(),
            estimated_duration: String::new(),
            priority: Priority::Medium,
        }
    }

    /// Append a step.
    pub fn with_step(mut self, step: PlanStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the duration estimate.
    pub fn with_estimated_duration(mut self, estimate: impl Into<String>) -> Self {
        self.estimated_duration = estimate.into();
        self
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
