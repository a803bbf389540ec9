//! # Conductor Core
//!
//! Records, state machines and persistence traits shared by every Conductor
//! crate.
//!
//! ## Contents
//!
//! - **Records**: [`Agent`], [`Task`], [`Conversation`], [`Plan`]
//! - **State machines**: [`Task::transition`] and
//!   [`Conversation::transition`] keep derived fields consistent
//! - **Errors**: [`OrchestrationError`] with retryability and error codes
//! - **Stores**: async [`AgentStore`], [`TaskStore`], [`ConversationStore`]
//!   traits plus in-memory implementations
//! - **Seams**: [`Clock`] and [`NotificationSink`]

pub mod agent;
pub mod clock;
pub mod conversation;
pub mod error;
pub mod ids;
pub mod memory;
pub mod notify;
pub mod orchestrator;
pub mod payload;
pub mod plan;
pub mod store;
pub mod task;

pub use agent::{Agent, AgentCounters, AgentState, AgentType, Capability};
pub use clock::{Clock, ManualClock, SystemClock};
pub use conversation::{
    Complexity, Conversation, ConversationState, Message, MessageRole, RequestType,
};
pub use error::{HandlerError, NotifyError, OrchestrationError, OrchestrationResult};
pub use ids::{AgentId, ConversationId, OrchestratorId, TaskId};
pub use memory::{InMemoryAgentStore, InMemoryConversationStore, InMemoryTaskStore};
pub use notify::{
    BroadcastSink, DEFAULT_NOTIFY_CAPACITY, FanoutSink, Notification, NotificationSink,
    Notifier, TracingSink, deliver,
};
pub use orchestrator::OrchestratorState;
pub use payload::Payload;
pub use plan::{Plan, PlanStep};
pub use store::{
    AgentQuery, AgentStore, ConversationQuery, ConversationStore, TaskQuery, TaskStore,
};
pub use task::{Priority, Task, TaskError, TaskErrorKind, TaskState};
