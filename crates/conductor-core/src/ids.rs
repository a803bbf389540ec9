//! Typed identifiers for Conductor records.
//!
//! Every record kind gets its own newtype so an `AgentId` can never be passed
//! where a `TaskId` is expected. Identifiers are opaque strings; freshly
//! generated ones are UUID v4.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::OrchestrationError;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Parse an identifier, rejecting empty or padded input.
            pub fn parse(id: impl AsRef<str>) -> Result<Self, OrchestrationError> {
                let id = id.as_ref();
                if id.is_empty() || id.trim() != id {
                    return Err(OrchestrationError::InvalidInput(format!(
                        "invalid {} '{}'",
                        $label, id
                    )));
                }
                Ok(Self(id.to_string()))
            }

            /// Get the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = OrchestrationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identifier of a registered agent.
    AgentId,
    "agent id"
);
define_id!(
    /// Identifier of a task.
    TaskId,
    "task id"
);
define_id!(
    /// Identifier of a conversation.
    ConversationId,
    "conversation id"
);
define_id!(
    /// Identifier of an orchestrator instance.
    OrchestratorId,
    "orchestrator id"
);
