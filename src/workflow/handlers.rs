//! Built-in step handlers.
//!
//! The agent-backed actions are thin request/response calls over the
//! message bus to the corresponding agent topic; `wait` and `condition`
//! run locally. Handlers return a success flag plus context entries that
//! merge into the workflow context.

use crate::bus::{MessageBus, MessagePriority, Payload};
use crate::error::{Error, Result};
use crate::workflow::condition::evaluate;
use crate::workflow::model::{Workflow, WorkflowStep};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// What a step handler hands back to the engine.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Whether the action reports success.
    pub success: bool,
    /// Entries merged into the workflow context.
    pub context: serde_json::Map<String, serde_json::Value>,
}

/// A registered step action.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Runs the action for one step. The engine enforces the deadline.
    async fn run(&self, workflow: &Workflow, step: &WorkflowStep) -> Result<StepOutcome>;
}

/// Agent-backed action: request/response over the bus.
pub struct AgentRequestHandler {
    bus: Arc<MessageBus>,
    topic: String,
    target: String,
    /// Key the response payload is stored under in the context.
    context_key: String,
}

impl AgentRequestHandler {
    /// Creates a handler calling `topic` on the bus, addressing `target`.
    #[must_use]
    pub fn new(
        bus: Arc<MessageBus>,
        topic: impl Into<String>,
        target: impl Into<String>,
        context_key: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            topic: topic.into(),
            target: target.into(),
            context_key: context_key.into(),
        }
    }
}

#[async_trait]
impl StepHandler for AgentRequestHandler {
    async fn run(&self, _workflow: &Workflow, step: &WorkflowStep) -> Result<StepOutcome> {
        let response = self
            .bus
            .request(
                self.topic.clone(),
                step.parameters.clone(),
                "workflow_engine",
                Some(self.target.clone()),
                Duration::from_secs(step.timeout_secs),
                MessagePriority::Normal,
            )
            .await?;

        let Some(response) = response else {
            return Err(Error::Dependency(format!(
                "no response from {}",
                self.target
            )));
        };

        let success = response
            .payload
            .get("success")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        let mut context = Payload::new();
        context.insert(
            self.context_key.clone(),
            serde_json::Value::Object(response.payload),
        );
        Ok(StepOutcome { success, context })
    }
}

/// `wait(duration)`: bounded sleep.
pub struct WaitHandler;

#[async_trait]
impl StepHandler for WaitHandler {
    async fn run(&self, _workflow: &Workflow, step: &WorkflowStep) -> Result<StepOutcome> {
        let duration = step
            .parameters
            .get("duration")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(1.0)
            .max(0.0);
        tokio::time::sleep(Duration::from_secs_f64(duration)).await;

        let mut context = Payload::new();
        context.insert("waited_seconds".to_string(), serde_json::json!(duration));
        Ok(StepOutcome {
            success: true,
            context,
        })
    }
}

/// `condition(condition, true_action, false_action)`: evaluates a
/// boolean expression against the workflow context and records the
/// outcome; the branch actions are recorded for downstream gating.
pub struct ConditionHandler;

#[async_trait]
impl StepHandler for ConditionHandler {
    async fn run(&self, workflow: &Workflow, step: &WorkflowStep) -> Result<StepOutcome> {
        let condition = step
            .parameters
            .get("condition")
            .and_then(|v| v.as_str())
            .unwrap_or("false");
        let result = evaluate(condition, &workflow.context);

        let branch = if result { "true_action" } else { "false_action" };
        let mut context = Payload::new();
        context.insert("condition_result".to_string(), serde_json::json!(result));
        if let Some(action) = step.parameters.get(branch) {
            context.insert("selected_action".to_string(), action.clone());
        }
        Ok(StepOutcome {
            success: true,
            context,
        })
    }
}

/// Agent topics for the built-in actions.
pub const AGENT_ACTIONS: &[(&str, &str, &str, &str)] = &[
    (
        "ingest_document",
        "ingestion.process_document",
        "ingestion_agent",
        "ingestion_result",
    ),
    (
        "extract_entities",
        "entities.extract",
        "entity_agent",
        "entities_result",
    ),
    (
        "create_links",
        "linking.create_links",
        "linking_agent",
        "linking_result",
    ),
    (
        "generate_summary",
        "synthesis.generate_summary",
        "synthesis_agent",
        "summary_result",
    ),
    (
        "answer_question",
        "synthesis.answer_question",
        "synthesis_agent",
        "answer_result",
    ),
    (
        "search_knowledge",
        "retrieval.search",
        "retrieval_agent",
        "search_result",
    ),
];
