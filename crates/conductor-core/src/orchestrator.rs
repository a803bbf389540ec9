//! Orchestrator lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an orchestrator. Only `Active` accepts new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorState {
    #[default]
    Draft,
    Active,
    Paused,
    Error,
}

impl OrchestratorState {
    /// Whether `start` may be called from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, OrchestratorState::Draft | OrchestratorState::Error)
    }

    /// Whether `pause` may be called from this state.
    pub fn can_pause(&self) -> bool {
        matches!(self, OrchestratorState::Active)
    }

    /// Whether `resume` may be called from this state.
    pub fn can_resume(&self) -> bool {
        matches!(self, OrchestratorState::Paused)
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrchestratorState::Draft => "draft",
            OrchestratorState::Active => "active",
            OrchestratorState::Paused => "paused",
            OrchestratorState::Error => "error",
        };
        f.write_str(s)
    }
}
