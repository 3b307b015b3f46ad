//! Workflow engine: persisted DAGs of actions executed against
//! registered handlers.

pub mod condition;
pub mod engine;
pub mod handlers;
pub mod model;
pub mod store;

pub use condition::evaluate;
pub use engine::{WorkflowEngine, WorkflowProgress};
pub use handlers::{
    AGENT_ACTIONS, AgentRequestHandler, ConditionHandler, StepHandler, StepOutcome, WaitHandler,
};
pub use model::{
    DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_SECS, DEFAULT_STEP_TIMEOUT_SECS, StepSpec, StepStatus,
    Workflow, WorkflowStatus, WorkflowStep,
};
pub use store::WorkflowStore;
