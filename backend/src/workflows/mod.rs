// Workflow Automation Engine
//
// Evaluates ticket events against configured notification workflows and
// dispatches the actions of every workflow that matches.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod executor;
pub mod recipients;
pub mod store;
pub mod triggers;

pub use actions::{ActionError, ActionOutcome, ActionStatus, ActionType};
pub use conditions::{ConditionError, ConditionField, ConditionOperator, FieldValue};
pub use engine::{
    conditions_match, match_workflows, EngineError, EvaluationReport, MatchOutcome,
    WorkflowEngine, WorkflowReport,
};
pub use executor::ActionDispatcher;
pub use recipients::{
    PgRecipientDirectory, RecipientDirectory, RecipientResolver, RecipientSet, RecipientType,
};
pub use store::{ConfigSnapshot, InMemoryWorkflowStore, PgWorkflowStore, StoreError, WorkflowStore};
pub use triggers::EventContext;
