//! Workflow and step data types.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Workflow lifecycle states.
///
/// Legal transitions: `pending → running → {completed, failed,
/// cancelled}`. `paused` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created, not yet started.
    Pending,
    /// Executing.
    Running,
    /// Every step completed or was skipped.
    Completed,
    /// A step failed terminally or the DAG stalled.
    Failed,
    /// Cancelled cooperatively.
    Cancelled,
    /// Reserved for future use.
    Paused,
}

impl WorkflowStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Paused => "paused",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

/// Individual step states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting on dependencies or a free slot.
    Pending,
    /// Handler in flight.
    Running,
    /// Handler returned.
    Completed,
    /// Handler errored or timed out past the retry budget.
    Failed,
    /// Intentionally not run.
    Skipped,
}

impl StepStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// Default step timeout in seconds.
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

/// Default retry budget per step.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default delay between retries in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// A step definition supplied at workflow creation.
///
/// Dependencies reference other steps of the same workflow by NAME;
/// they resolve to generated step ids when the workflow is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step name, unique within the workflow.
    pub name: String,
    /// Action tag resolved against the registered handlers.
    pub action: String,
    /// Handler parameters.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Names of steps that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Handler deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Retry budget.
    #[serde(default = "default_retries")]
    pub retry_count: u32,
    /// Delay between retries in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

const fn default_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}
const fn default_retries() -> u32 {
    DEFAULT_RETRY_COUNT
}
const fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

impl StepSpec {
    /// A spec with defaults for everything but name and action.
    #[must_use]
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
            parameters: serde_json::Map::new(),
            dependencies: Vec::new(),
            timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }

    /// Adds a dependency by step name.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Sets a handler parameter.
    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the retry budget and delay.
    #[must_use]
    pub const fn retries(mut self, count: u32, delay_secs: u64) -> Self {
        self.retry_count = count;
        self.retry_delay_secs = delay_secs;
        self
    }
}

/// A step instance owned by a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step id (UUID within the workflow).
    pub id: String,
    /// Step name.
    pub name: String,
    /// Action tag.
    pub action: String,
    /// Handler parameters.
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Ids of steps that must complete first.
    pub dependencies: Vec<String>,
    /// Handler deadline in seconds.
    pub timeout_secs: u64,
    /// Remaining retry budget.
    pub retry_count: u32,
    /// Delay between retries in seconds.
    pub retry_delay_secs: u64,
    /// Current status.
    pub status: StepStatus,
    /// Handler result map, once completed.
    pub result: Option<serde_json::Map<String, serde_json::Value>>,
    /// Error string, once failed.
    pub error: Option<String>,
    /// Launch instant.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal instant.
    pub completed_at: Option<DateTime<Utc>>,
}

/// A persisted workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow id (UUID).
    pub id: String,
    /// Workflow name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Owned steps.
    pub steps: Vec<WorkflowStep>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Creator identifier.
    pub created_by: String,
    /// Lifecycle state.
    pub status: WorkflowStatus,
    /// Start instant.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal instant.
    pub completed_at: Option<DateTime<Utc>>,
    /// Most recently launched step id.
    pub current_step: Option<String>,
    /// Accumulated context map, merged from step results.
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl Workflow {
    /// Builds a workflow from step specs, resolving name dependencies to
    /// ids and validating the DAG.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for duplicate step names, unknown
    /// dependencies, or cycles.
    pub fn build(
        name: impl Into<String>,
        description: impl Into<String>,
        specs: Vec<StepSpec>,
        created_by: impl Into<String>,
    ) -> Result<Self> {
        let mut ids_by_name: HashMap<String, String> = HashMap::new();
        for spec in &specs {
            let id = Uuid::new_v4().to_string();
            if ids_by_name.insert(spec.name.clone(), id).is_some() {
                return Err(Error::invalid_input(format!(
                    "duplicate step name '{}'",
                    spec.name
                )));
            }
        }

        let mut steps = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = ids_by_name[&spec.name].clone();
            let dependencies = spec
                .dependencies
                .iter()
                .map(|dep| {
                    ids_by_name.get(dep).cloned().ok_or_else(|| {
                        Error::invalid_input(format!(
                            "step '{}' depends on unknown step '{dep}'",
                            spec.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            steps.push(WorkflowStep {
                id,
                name: spec.name,
                action: spec.action,
                parameters: spec.parameters,
                dependencies,
                timeout_secs: spec.timeout_secs,
                retry_count: spec.retry_count,
                retry_delay_secs: spec.retry_delay_secs,
                status: StepStatus::Pending,
                result: None,
                error: None,
                started_at: None,
                completed_at: None,
            });
        }

        let workflow = Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            steps,
            created_at: Utc::now(),
            created_by: created_by.into(),
            status: WorkflowStatus::Pending,
            started_at: None,
            completed_at: None,
            current_step: None,
            context: serde_json::Map::new(),
        };
        workflow.validate_dag()?;
        Ok(workflow)
    }

    /// Verifies the dependency graph is acyclic.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when a cycle exists.
    pub fn validate_dag(&self) -> Result<()> {
        let deps: HashMap<&str, &Vec<String>> = self
            .steps
            .iter()
            .map(|s| (s.id.as_str(), &s.dependencies))
            .collect();

        // Iterative DFS with a three-color marking.
        let mut done: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if done.contains(step.id.as_str()) {
                continue;
            }
            let mut on_path: HashSet<&str> = HashSet::new();
            let mut stack: Vec<(&str, usize)> = vec![(step.id.as_str(), 0)];
            on_path.insert(step.id.as_str());
            while let Some((node, next)) = stack.pop() {
                let node_deps = deps.get(node).copied();
                let dep = node_deps.and_then(|d| d.get(next));
                match dep {
                    Some(dep) => {
                        stack.push((node, next + 1));
                        let dep = dep.as_str();
                        if on_path.contains(dep) {
                            return Err(Error::invalid_input("dependency cycle detected"));
                        }
                        if !done.contains(dep) && deps.contains_key(dep) {
                            on_path.insert(dep);
                            stack.push((dep, 0));
                        }
                    }
                    None => {
                        on_path.remove(node);
                        done.insert(node);
                    }
                }
            }
        }
        Ok(())
    }

    /// Steps runnable now: pending with every dependency completed.
    #[must_use]
    pub fn ready_steps(&self) -> Vec<&WorkflowStep> {
        let completed: HashSet<&str> = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.id.as_str())
            .collect();

        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .filter(|s| s.dependencies.iter().all(|d| completed.contains(d.as_str())))
            .collect()
    }

    /// True when every step is completed or skipped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Completed | StepStatus::Skipped))
    }

    /// Completion percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 100.0;
        }
        let completed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        completed as f64 / self.steps.len() as f64 * 100.0
    }

    /// Mutable access to a step by id.
    pub fn step_mut(&mut self, id: &str) -> Option<&mut WorkflowStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }
}
