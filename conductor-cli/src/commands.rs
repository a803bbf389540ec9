//! Subcommand implementations. Each runs against a freshly bootstrapped
//! in-memory system and returns the JSON to print.

use conductor_agent::{Conductor, ConfigError, OrchestratorConfig, ProcessRequest, bootstrap};
use conductor_core::{AgentQuery, AgentState, AgentType, OrchestrationError};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "CONFIG_ERROR",
            CliError::Orchestration(e) => e.error_code(),
            CliError::Json(_) => "INVALID_JSON",
        }
    }
}

async fn start() -> Result<Conductor, CliError> {
    let config = OrchestratorConfig::from_env()?;
    Ok(bootstrap(config).await?)
}

pub async fn run_process(
    goal: String,
    context: Option<String>,
    user: Option<String>,
    disable: Vec<String>,
) -> Result<Value, CliError> {
    let conductor = start().await?;

    for name in &disable {
        let agent_type: AgentType = name.parse()?;
        let agents = conductor
            .registry
            .list(&AgentQuery::new().with_type(agent_type))
            .await?;
        for agent in agents {
            conductor
                .registry
                .set_state(&agent.id, AgentState::Archived)
                .await?;
        }
        info!(agent_type = %agent_type, "Disabled agents");
    }

    let mut request = ProcessRequest::new(goal);
    if let Some(raw) = context {
        request = request.with_context(serde_json::from_str(&raw)?);
    }
    if let Some(user) = user {
        request = request.with_user(user);
    }

    let result = conductor.orchestrator.process(request).await?;
    Ok(serde_json::to_value(result)?)
}

pub async fn run_agents() -> Result<Value, CliError> {
    let conductor = start().await?;
    let agents = conductor.registry.list(&AgentQuery::new()).await?;
    Ok(serde_json::to_value(agents)?)
}

pub async fn run_status() -> Result<Value, CliError> {
    let conductor = start().await?;
    let status = conductor.orchestrator.system_status().await?;
    let queue = conductor.orchestrator.task_queue_status().await?;
    Ok(json!({
        "system": status,
        "task_queue": queue,
    }))
}

pub async fn run_cleanup(days: u32) -> Result<Value, CliError> {
    let conductor = start().await?;
    let report = conductor.cleanup_older_than(days).await;
    Ok(serde_json::to_value(report)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_process_reports_three_steps() {
        let output = run_process("create a lead for Acme".into(), None, None, Vec::new())
            .await
            .unwrap();
        assert_eq!(output["results"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_disable_unknown_type_fails() {
        let err = run_process("anything".into(), None, None, vec!["robots".into()])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_malformed_context_is_rejected() {
        let err = run_process("anything".into(), Some("{not json".into()), None, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Json(_)));
    }

    #[tokio::test]
    async fn test_agents_lists_defaults() {
        let output = run_agents().await.unwrap();
        assert_eq!(
            output.as_array().map(Vec::len),
            Some(AgentType::ALL.len())
        );
    }
}
