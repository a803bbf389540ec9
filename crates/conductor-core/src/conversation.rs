//! Conversations: the envelope around one end-to-end goal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agent::AgentType;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::ids::{ConversationId, OrchestratorId, TaskId};
use crate::payload::Payload;

/// State of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    #[default]
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl ConversationState {
    /// Whether the conversation has finished.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConversationState::Active)
    }

    /// Whether the lifecycle allows moving to `next`.
    ///
    /// Terminal states never regress on their own; `failed -> active` is
    /// only taken by an explicit retry.
    pub fn can_transition_to(&self, next: ConversationState) -> bool {
        use ConversationState::*;
        matches!(
            (self, next),
            (Active, Completed) | (Active, Failed) | (Active, Cancelled) | (Failed, Active)
        )
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConversationState::Active => "active",
            ConversationState::Completed => "completed",
            ConversationState::Failed => "failed",
            ConversationState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Request category derived from the goal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Crm,
    Sales,
    Inventory,
    Accounting,
    Hr,
    Custom,
    #[default]
    General,
}

/// Keyword groups, checked in order; the first group with a hit wins.
const REQUEST_KEYWORDS: [(RequestType, &[&str]); 6] = [
    (RequestType::Crm, &["lead", "customer", "opportunity", "crm"]),
    (RequestType::Sales, &["sale", "order", "quotation", "invoice"]),
    (
        RequestType::Inventory,
        &["stock", "inventory", "warehouse", "product"],
    ),
    (
        RequestType::Accounting,
        &["account", "financial", "invoice", "payment"],
    ),
    (
        RequestType::Hr,
        &["employee", "hr", "attendance", "recruitment"],
    ),
    (RequestType::Custom, &["custom", "specific"]),
];

impl RequestType {
    /// Classify a goal by substring keyword match.
    pub fn classify(goal: &str) -> Self {
        let goal = goal.to_lowercase();
        REQUEST_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| goal.contains(k)))
            .map(|(kind, _)| *kind)
            .unwrap_or(RequestType::General)
    }

    /// Agent type that handles this request category, if any.
    pub fn agent_type(&self) -> Option<AgentType> {
        match self {
            RequestType::Crm => Some(AgentType::Crm),
            RequestType::Sales => Some(AgentType::Sales),
            RequestType::Inventory => Some(AgentType::Inventory),
            RequestType::Accounting => Some(AgentType::Accounting),
            RequestType::Hr => Some(AgentType::Hr),
            RequestType::Custom => Some(AgentType::Custom),
            RequestType::General => None,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.agent_type() {
            Some(t) => f.write_str(t.as_str()),
            None => f.write_str("general"),
        }
    }
}

/// Complexity bucket derived from the number of tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    /// `<= 2` simple, `<= 5` medium, otherwise complex.
    pub fn for_task_count(count: usize) -> Self {
        match count {
            0..=2 => Complexity::Simple,
            3..=5 => Complexity::Medium,
            _ => Complexity::Complex,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        };
        f.write_str(s)
    }
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Payload,
}

/// A conversation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation identifier
    pub id: ConversationId,
    /// Display name, derived from the goal
    pub name: String,
    /// Owning user
    pub user_id: String,
    /// Orchestrator that processes this conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_id: Option<OrchestratorId>,
    /// Original request (goal, context, constraints)
    pub request: Payload,
    /// Aggregate response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Payload>,
    /// Message history, oldest first
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Lifecycle state
    pub state: ConversationState,
    /// Category derived from the goal
    pub request_type: RequestType,
    /// Tasks spawned for this conversation
    #[serde(default)]
    pub task_ids: Vec<TaskId>,
    /// Reason for the last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Start of the current processing attempt
    pub start_time: DateTime<Utc>,
    /// Set when the conversation reaches a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl Conversation {
    const NAME_LIMIT: usize = 64;

    /// Create an active conversation for a request.
    pub fn new(user_id: impl Into<String>, request: Payload, now: DateTime<Utc>) -> Self {
        let goal = request.get_str("goal").unwrap_or_default();
        let name = if goal.is_empty() {
            "Conversation".to_string()
        } else {
            goal.chars().take(Self::NAME_LIMIT).collect()
        };
        let request_type = RequestType::classify(goal);

        Self {
            id: ConversationId::generate(),
            name,
            user_id: user_id.into(),
            orchestrator_id: None,
            request,
            response: None,
            messages: Vec::new(),
            state: ConversationState::Active,
            request_type,
            task_ids: Vec::new(),
            error: None,
            created_at: now,
            start_time: now,
            end_time: None,
        }
    }

    /// Bind to an orchestrator.
    pub fn with_orchestrator(mut self, id: OrchestratorId) -> Self {
        self.orchestrator_id = Some(id);
        self
    }

    /// Goal text from the request.
    pub fn goal(&self) -> &str {
        self.request.get_str("goal").unwrap_or_default()
    }

    /// Append a message. Allowed in any state.
    pub fn add_message(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
        metadata: Payload,
        now: DateTime<Utc>,
    ) {
        self.messages.push(Message {
            role,
            content: content.into(),
            timestamp: now,
            metadata,
        });
    }

    /// Record a task spawned for this conversation.
    pub fn attach_task(&mut self, task_id: TaskId) {
        if !self.task_ids.contains(&task_id) {
            self.task_ids.push(task_id);
        }
    }

    /// Move to `next`, maintaining timestamps.
    ///
    /// Entering a terminal state stamps `end_time`. Returning to `active`
    /// (retry) restarts the clock and clears the previous error.
    pub fn transition(
        &mut self,
        next: ConversationState,
        now: DateTime<Utc>,
    ) -> OrchestrationResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(OrchestrationError::invalid_transition(
                "conversation",
                self.state,
                next,
            ));
        }
        if next.is_terminal() {
            self.end_time.get_or_insert(now.max(self.start_time));
        } else {
            self.start_time = now;
            self.end_time = None;
            self.error = None;
        }
        self.state = next;
        Ok(())
    }

    /// Complexity bucket for the current task set.
    pub fn complexity(&self) -> Complexity {
        Complexity::for_task_count(self.task_ids.len())
    }

    /// Whether the conversation completed.
    pub fn success(&self) -> bool {
        self.state == ConversationState::Completed
    }

    /// Seconds from start to end, zero while unfinished.
    pub fn duration(&self) -> f64 {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn conversation(goal: &str) -> Conversation {
        Conversation::new("user-1", Payload::new().with("goal", goal), Utc::now())
    }

    #[rstest]
    #[case("create a lead for Acme", RequestType::Crm)]
    #[case("Prepare a quotation", RequestType::Sales)]
    #[case("check warehouse levels", RequestType::Inventory)]
    #[case("reconcile the payment", RequestType::Accounting)]
    #[case("onboard a new employee", RequestType::Hr)]
    #[case("run my specific job", RequestType::Custom)]
    #[case("say hello", RequestType::General)]
    // "invoice" appears in both sales and accounting; sales is checked first
    #[case("send the invoice", RequestType::Sales)]
    fn test_request_type_classification(#[case] goal: &str, #[case] expected: RequestType) {
        assert_eq!(RequestType::classify(goal), expected);
    }

    #[rstest]
    #[case(0, Complexity::Simple)]
    #[case(2, Complexity::Simple)]
    #[case(3, Complexity::Medium)]
    #[case(5, Complexity::Medium)]
    #[case(6, Complexity::Complex)]
    fn test_complexity_thresholds(#[case] count: usize, #[case] expected: Complexity) {
        assert_eq!(Complexity::for_task_count(count), expected);
    }

    #[test]
    fn test_complexity_follows_task_set() {
        let mut conv = conversation("create a lead");
        for _ in 0..6 {
            conv.attach_task(TaskId::generate());
        }
        assert_eq!(conv.complexity(), Complexity::Complex);
    }

    #[test]
    fn test_success_iff_completed() {
        let mut conv = conversation("create a lead");
        assert!(!conv.success());
        conv.transition(ConversationState::Completed, Utc::now())
            .unwrap();
        assert!(conv.success());

        let mut failed = conversation("create a lead");
        failed
            .transition(ConversationState::Failed, Utc::now())
            .unwrap();
        assert!(!failed.success());
    }

    #[test]
    fn test_terminal_does_not_regress() {
        let mut conv = conversation("x");
        conv.transition(ConversationState::Completed, Utc::now())
            .unwrap();
        assert!(
            conv.transition(ConversationState::Active, Utc::now())
                .is_err()
        );
        // messages may still be appended for audit
        conv.add_message(MessageRole::System, "note", Payload::new(), Utc::now());
        assert_eq!(conv.messages.len(), 1);
    }

    #[test]
    fn test_retry_restarts_clock() {
        let t0 = Utc::now();
        let mut conv = Conversation::new("u", Payload::new().with("goal", "x"), t0);
        conv.transition(ConversationState::Failed, t0 + Duration::seconds(4))
            .unwrap();
        assert_eq!(conv.duration(), 4.0);

        conv.transition(ConversationState::Active, t0 + Duration::seconds(10))
            .unwrap();
        assert!(conv.end_time.is_none());
        assert_eq!(conv.duration(), 0.0);
        assert_eq!(conv.start_time, t0 + Duration::seconds(10));
    }

    #[test]
    fn test_name_derived_from_goal() {
        let conv = conversation("create a lead for Acme");
        assert_eq!(conv.name, "create a lead for Acme");
        assert_eq!(conv.request_type, RequestType::Crm);
    }
}
