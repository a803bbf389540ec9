//! Planners turn a goal into an ordered list of steps.
//!
//! [`Planner`] is the seam; [`TemplatePlanner`] is the deterministic
//! built-in that always produces the same three-step shape:
//!
//! 1. `analyze_requirements` (router)
//! 2. `execute_tasks` (the agent type matching the goal's request type)
//! 3. `validate_results` (planner)

use async_trait::async_trait;

use conductor_core::{
    AgentType, OrchestrationError, OrchestrationResult, Payload, Plan, PlanStep, Priority,
    RequestType,
};

/// Produces plans for goals.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Plan a goal. Fails only on malformed input.
    async fn plan(
        &self,
        goal: &str,
        context: &Payload,
        constraints: &Payload,
    ) -> OrchestrationResult<Plan>;
}

/// Fixed three-step planner.
#[derive(Debug, Clone)]
pub struct TemplatePlanner {
    estimated_duration: String,
}

impl TemplatePlanner {
    /// Action of the first step.
    pub const ANALYZE: &'static str = "analyze_requirements";
    /// Action of the second step.
    pub const EXECUTE: &'static str = "execute_tasks";
    /// Action of the third step.
    pub const VALIDATE: &'static str = "validate_results";

    /// Create the planner with the default duration estimate.
    pub fn new() -> Self {
        Self {
            estimated_duration: "5-10 minutes".to_string(),
        }
    }

    /// Override the advisory duration estimate.
    pub fn with_estimated_duration(mut self, estimate: impl Into<String>) -> Self {
        self.estimated_duration = estimate.into();
        self
    }
}

impl Default for TemplatePlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Planner for TemplatePlanner {
    async fn plan(
        &self,
        goal: &str,
        context: &Payload,
        constraints: &Payload,
    ) -> OrchestrationResult<Plan> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(OrchestrationError::InvalidInput(
                "goal must not be empty".to_string(),
            ));
        }

        let executor = RequestType::classify(goal)
            .agent_type()
            .unwrap_or(AgentType::Custom);
        let goal_data = Payload::new().with("goal", goal);

        Ok(Plan::new(goal)
            .with_estimated_duration(self.estimated_duration.clone())
            .with_step(
                PlanStep::new(Self::ANALYZE)
                    .with_hint(AgentType::Router)
                    .with_data(goal_data.clone())
                    .with_context(context.clone()),
            )
            .with_step(
                PlanStep::new(Self::EXECUTE)
                    .with_hint(executor)
                    .with_data(
                        goal_data
                            .clone()
                            .with("context", context.to_value())
                            .with("constraints", constraints.to_value()),
                    )
                    .with_context(context.clone())
                    .with_priority(Priority::Medium),
            )
            .with_step(
                PlanStep::new(Self::VALIDATE)
                    .with_hint(AgentType::Planner)
                    .with_data(goal_data)
                    .with_context(context.clone()),
            ))
    }
}
