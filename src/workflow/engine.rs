//! Persisted DAG executor.
//!
//! Executes workflow step graphs wave by wave: every pending step whose
//! dependencies are all completed launches concurrently, each under its
//! own deadline and retry budget. A wave's failures never cancel its
//! siblings. When no step is runnable and some are still pending, the
//! workflow is stalled and fails; cancellation is cooperative (running
//! steps finish, no new wave launches).

use crate::bus::MessageBus;
use crate::error::{Error, Result};
use crate::workflow::handlers::{
    AGENT_ACTIONS, AgentRequestHandler, ConditionHandler, StepHandler, StepOutcome, WaitHandler,
};
use crate::workflow::model::{StepSpec, StepStatus, Workflow, WorkflowStatus, WorkflowStep};
use crate::workflow::store::WorkflowStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Progress snapshot for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowProgress {
    /// Workflow id.
    pub id: String,
    /// Workflow name.
    pub name: String,
    /// Lifecycle state.
    pub status: WorkflowStatus,
    /// Percentage of completed steps.
    pub progress: f64,
    /// Most recently launched step id.
    pub current_step: Option<String>,
    /// Per-step name and status.
    pub steps: Vec<(String, StepStatus)>,
}

struct StepRun {
    step_id: String,
    status: StepStatus,
    result: Option<serde_json::Map<String, serde_json::Value>>,
    error: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    context_updates: serde_json::Map<String, serde_json::Value>,
}

/// Executes persisted workflows against registered action handlers.
pub struct WorkflowEngine {
    store: WorkflowStore,
    handlers: Mutex<HashMap<String, Arc<dyn StepHandler>>>,
    cancels: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl WorkflowEngine {
    /// Creates an engine with the local built-in handlers (`wait`,
    /// `condition`) registered.
    #[must_use]
    pub fn new(store: WorkflowStore) -> Arc<Self> {
        let engine = Arc::new(Self {
            store,
            handlers: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
        });
        engine.register_handler("wait", Arc::new(WaitHandler));
        engine.register_handler("condition", Arc::new(ConditionHandler));
        engine
    }

    /// Registers the six agent-backed actions as bus request handlers.
    pub fn register_agent_handlers(&self, bus: &Arc<MessageBus>) {
        for (action, topic, target, context_key) in AGENT_ACTIONS {
            self.register_handler(
                action,
                Arc::new(AgentRequestHandler::new(
                    Arc::clone(bus),
                    *topic,
                    *target,
                    *context_key,
                )),
            );
        }
    }

    /// Registers (or replaces) a step handler for an action tag.
    pub fn register_handler(&self, action: &str, handler: Arc<dyn StepHandler>) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.insert(action.to_string(), handler);
        }
    }

    fn handler(&self, action: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.lock().ok()?.get(action).cloned()
    }

    /// Creates and persists a workflow. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed step graph or a store
    /// error from persistence.
    pub fn create_workflow(
        &self,
        name: &str,
        description: &str,
        steps: Vec<StepSpec>,
        created_by: &str,
    ) -> Result<String> {
        let workflow = Workflow::build(name, description, steps, created_by)?;
        self.store.save(&workflow)?;
        tracing::info!(id = %workflow.id, %name, "workflow created");
        Ok(workflow.id)
    }

    /// Starts a pending workflow and spawns its execution loop.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `Conflict` (without
    /// mutation) when the workflow is not pending.
    pub fn start_workflow(self: &Arc<Self>, workflow_id: &str) -> Result<()> {
        self.begin(workflow_id)?;
        let engine = Arc::clone(self);
        let id = workflow_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.execute(&id).await {
                tracing::error!(workflow = %id, error = %e, "workflow execution error");
            }
        });
        Ok(())
    }

    /// Starts a pending workflow and drives it to a terminal state.
    ///
    /// # Errors
    ///
    /// Same as [`WorkflowEngine::start_workflow`], plus execution-loop
    /// store errors.
    pub async fn run_workflow(self: &Arc<Self>, workflow_id: &str) -> Result<WorkflowStatus> {
        self.begin(workflow_id)?;
        self.execute(workflow_id).await
    }

    fn begin(&self, workflow_id: &str) -> Result<()> {
        let mut workflow = self
            .store
            .load(workflow_id)?
            .ok_or_else(|| Error::not_found(format!("workflow {workflow_id}")))?;
        if workflow.status != WorkflowStatus::Pending {
            return Err(Error::conflict(format!(
                "workflow {workflow_id} is {}, not pending",
                workflow.status.as_str()
            )));
        }
        workflow.status = WorkflowStatus::Running;
        workflow.started_at = Some(Utc::now());
        self.store.save(&workflow)?;

        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.insert(workflow_id.to_string(), Arc::new(AtomicBool::new(false)));
        }
        tracing::info!(workflow = %workflow_id, "workflow started");
        Ok(())
    }

    /// Requests cooperative cancellation. A pending workflow cancels
    /// immediately; a running one stops launching new waves.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn cancel_workflow(&self, workflow_id: &str) -> Result<()> {
        let mut workflow = self
            .store
            .load(workflow_id)?
            .ok_or_else(|| Error::not_found(format!("workflow {workflow_id}")))?;

        match workflow.status {
            WorkflowStatus::Pending => {
                workflow.status = WorkflowStatus::Cancelled;
                workflow.completed_at = Some(Utc::now());
                self.store.save(&workflow)?;
            }
            WorkflowStatus::Running => {
                if let Ok(cancels) = self.cancels.lock()
                    && let Some(flag) = cancels.get(workflow_id)
                {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn cancel_requested(&self, workflow_id: &str) -> bool {
        self.cancels
            .lock()
            .ok()
            .and_then(|cancels| cancels.get(workflow_id).map(|f| f.load(Ordering::SeqCst)))
            .unwrap_or(false)
    }

    fn finish(&self, workflow: &mut Workflow, status: WorkflowStatus) -> Result<WorkflowStatus> {
        workflow.status = status;
        workflow.completed_at = Some(Utc::now());
        self.store.save(workflow)?;
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.remove(&workflow.id);
        }
        tracing::info!(workflow = %workflow.id, status = status.as_str(), "workflow finished");
        Ok(status)
    }

    async fn execute(&self, workflow_id: &str) -> Result<WorkflowStatus> {
        loop {
            let mut workflow = self
                .store
                .load(workflow_id)?
                .ok_or_else(|| Error::not_found(format!("workflow {workflow_id}")))?;

            if self.cancel_requested(workflow_id) {
                return self.finish(&mut workflow, WorkflowStatus::Cancelled);
            }

            let ready: Vec<WorkflowStep> =
                workflow.ready_steps().into_iter().cloned().collect();

            if ready.is_empty() {
                let any_pending = workflow
                    .steps
                    .iter()
                    .any(|s| s.status == StepStatus::Pending);
                let any_failed = workflow
                    .steps
                    .iter()
                    .any(|s| s.status == StepStatus::Failed);
                let status = if any_pending || any_failed {
                    // Unrunnable pending steps mean the DAG stalled.
                    WorkflowStatus::Failed
                } else {
                    WorkflowStatus::Completed
                };
                return self.finish(&mut workflow, status);
            }

            // Mark the wave running before launching so observers see it.
            for step in &ready {
                if let Some(slot) = workflow.step_mut(&step.id) {
                    slot.status = StepStatus::Running;
                    slot.started_at = Some(Utc::now());
                }
                workflow.current_step = Some(step.id.clone());
            }
            self.store.save(&workflow)?;

            let runs = futures::future::join_all(
                ready.iter().map(|step| self.execute_step(&workflow, step)),
            )
            .await;

            for run in runs {
                if let Some(slot) = workflow.step_mut(&run.step_id) {
                    slot.status = run.status;
                    slot.result = run.result;
                    slot.error = run.error;
                    slot.started_at = Some(run.started_at);
                    slot.completed_at = Some(run.completed_at);
                }
                for (key, value) in run.context_updates {
                    workflow.context.insert(key, value);
                }
            }
            self.store.save(&workflow)?;
        }
    }

    /// Runs one step under its deadline, retrying per its budget.
    async fn execute_step(&self, workflow: &Workflow, step: &WorkflowStep) -> StepRun {
        let started_at = Utc::now();
        tracing::info!(workflow = %workflow.id, step = %step.name, "step launched");

        let Some(handler) = self.handler(&step.action) else {
            return StepRun {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                result: None,
                error: Some(format!("no handler for action '{}'", step.action)),
                started_at,
                completed_at: Utc::now(),
                context_updates: serde_json::Map::new(),
            };
        };

        let mut budget = step.retry_count;
        loop {
            let attempt =
                tokio::time::timeout(Duration::from_secs(step.timeout_secs), handler.run(workflow, step))
                    .await;

            let error = match attempt {
                Ok(Ok(outcome)) => {
                    tracing::info!(workflow = %workflow.id, step = %step.name, "step completed");
                    return Self::completed_run(step, started_at, outcome);
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("step timed out after {} seconds", step.timeout_secs),
            };

            if budget > 0 {
                budget -= 1;
                tracing::warn!(
                    workflow = %workflow.id,
                    step = %step.name,
                    %error,
                    remaining = budget,
                    "step attempt failed, retrying"
                );
                tokio::time::sleep(Duration::from_secs(step.retry_delay_secs)).await;
                continue;
            }

            tracing::error!(workflow = %workflow.id, step = %step.name, %error, "step failed");
            return StepRun {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                result: None,
                error: Some(error),
                started_at,
                completed_at: Utc::now(),
                context_updates: serde_json::Map::new(),
            };
        }
    }

    fn completed_run(step: &WorkflowStep, started_at: DateTime<Utc>, outcome: StepOutcome) -> StepRun {
        let mut result = serde_json::Map::new();
        result.insert("success".to_string(), serde_json::json!(outcome.success));
        result.insert(
            "context".to_string(),
            serde_json::Value::Object(outcome.context.clone()),
        );
        StepRun {
            step_id: step.id.clone(),
            status: StepStatus::Completed,
            result: Some(result),
            error: None,
            started_at,
            completed_at: Utc::now(),
            context_updates: outcome.context,
        }
    }

    /// Progress snapshot of a workflow.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn progress(&self, workflow_id: &str) -> Result<WorkflowProgress> {
        let workflow = self
            .store
            .load(workflow_id)?
            .ok_or_else(|| Error::not_found(format!("workflow {workflow_id}")))?;
        Ok(WorkflowProgress {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            status: workflow.status,
            progress: workflow.progress(),
            current_step: workflow.current_step.clone(),
            steps: workflow
                .steps
                .iter()
                .map(|s| (s.name.clone(), s.status))
                .collect(),
        })
    }

    /// The backing store.
    #[must_use]
    pub const fn store(&self) -> &WorkflowStore {
        &self.store
    }
}
