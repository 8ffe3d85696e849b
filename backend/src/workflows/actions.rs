// Workflow Actions - Action kinds, payload parsing and per-action outcomes

use serde::{Deserialize, Serialize};
use soporte_shared::{MutableTicketField, TicketMutationRequest, WorkflowAction};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::notifications::SinkError;

/// Types of actions a notification workflow can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    SendNotification,
    SetStatus,
    SetPriority,
    SetField,
    AssignAgent,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::SendNotification => "SEND_NOTIFICATION",
            ActionType::SetStatus => "SET_STATUS",
            ActionType::SetPriority => "SET_PRIORITY",
            ActionType::SetField => "SET_FIELD",
            ActionType::AssignAgent => "ASSIGN_AGENT",
        }
    }

    /// Whether the effect is meaningless without at least one recipient
    pub fn requires_recipients(&self) -> bool {
        matches!(self, ActionType::SendNotification)
    }

    /// Build the ticket mutation for a non-notification action.
    ///
    /// `SET_FIELD` payloads are written as `FIELD=VALUE` (`FIELD:VALUE` is also
    /// accepted); the other mutation kinds take the bare target value.
    pub fn mutation(&self, ticket_id: Uuid, value: Option<&str>) -> Result<TicketMutationRequest, ActionError> {
        let payload = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ActionError::MissingPayload(*self))?;

        let (field, value) = match self {
            ActionType::SendNotification => return Err(ActionError::NotAMutation(*self)),
            ActionType::SetStatus => (MutableTicketField::Status, payload),
            ActionType::SetPriority => (MutableTicketField::Priority, payload),
            ActionType::AssignAgent => {
                Uuid::parse_str(payload)
                    .map_err(|_| ActionError::InvalidPayload(format!("'{}' is not an agent id", payload)))?;
                (MutableTicketField::AssignedAgent, payload)
            }
            ActionType::SetField => {
                let (field, value) = payload
                    .split_once(['=', ':'])
                    .ok_or_else(|| ActionError::InvalidPayload(format!("expected FIELD=VALUE, got '{}'", payload)))?;
                let field = field.parse::<MutableTicketField>().map_err(ActionError::InvalidPayload)?;
                let value = value.trim();
                if value.is_empty() {
                    return Err(ActionError::MissingPayload(*self));
                }
                (field, value)
            }
        };

        Ok(TicketMutationRequest {
            ticket_id,
            field,
            value: value.to_string(),
        })
    }
}

impl FromStr for ActionType {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "SEND_NOTIFICATION" | "NOTIFY" | "ENVIAR_NOTIFICACION" => ActionType::SendNotification,
            "SET_STATUS" | "CAMBIAR_ESTADO" => ActionType::SetStatus,
            "SET_PRIORITY" | "CAMBIAR_PRIORIDAD" => ActionType::SetPriority,
            "SET_FIELD" | "ESTABLECER_CAMPO" => ActionType::SetField,
            "ASSIGN_AGENT" | "ASIGNAR_AGENTE" => ActionType::AssignAgent,
            _ => return Err(ActionError::UnknownType(s.to_string())),
        };
        Ok(action)
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown action type '{0}'")]
    UnknownType(String),

    #[error("action {0:?} requires a value")]
    MissingPayload(ActionType),

    #[error("invalid action value: {0}")]
    InvalidPayload(String),

    #[error("action {0:?} does not mutate the ticket")]
    NotAMutation(ActionType),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// What happened to one action during dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Executed,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_id: Uuid,
    pub action_type: String,
    pub action_order: i32,
    #[serde(flatten)]
    pub status: ActionStatus,
}

impl ActionOutcome {
    pub fn executed(action: &WorkflowAction) -> Self {
        Self::with_status(action, ActionStatus::Executed)
    }

    pub fn skipped(action: &WorkflowAction, reason: &str) -> Self {
        Self::with_status(action, ActionStatus::Skipped { reason: reason.to_string() })
    }

    pub fn failed(action: &WorkflowAction, error: &ActionError) -> Self {
        Self::with_status(action, ActionStatus::Failed { error: error.to_string() })
    }

    fn with_status(action: &WorkflowAction, status: ActionStatus) -> Self {
        Self {
            action_id: action.id,
            action_type: action.action_type.clone(),
            action_order: action.action_order,
            status,
        }
    }

    pub fn is_executed(&self) -> bool {
        self.status == ActionStatus::Executed
    }
}
