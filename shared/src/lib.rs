use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ===== Triggers =====

/// Ticket lifecycle events a workflow can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    TicketCreated,
    ClientMessage,
    AgentReply,
    InternalNote,
    StatusChanged,
    AssignmentChanged,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 6] = [
        TriggerKind::TicketCreated,
        TriggerKind::ClientMessage,
        TriggerKind::AgentReply,
        TriggerKind::InternalNote,
        TriggerKind::StatusChanged,
        TriggerKind::AssignmentChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::TicketCreated => "TICKET_CREATED",
            TriggerKind::ClientMessage => "CLIENT_MESSAGE",
            TriggerKind::AgentReply => "AGENT_REPLY",
            TriggerKind::InternalNote => "INTERNAL_NOTE",
            TriggerKind::StatusChanged => "STATUS_CHANGED",
            TriggerKind::AssignmentChanged => "ASSIGNMENT_CHANGED",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTrigger(pub String);

impl fmt::Display for UnknownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown trigger kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownTrigger {}

impl FromStr for TriggerKind {
    type Err = UnknownTrigger;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        TriggerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == code)
            .ok_or_else(|| UnknownTrigger(s.to_string()))
    }
}

// ===== Ticket events =====

/// Point-in-time copy of the ticket attributes a workflow may inspect.
///
/// Code-valued attributes (priority, status, channel, ...) carry the codes used
/// by the ticketing subsystem verbatim; the engine never normalizes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketSnapshot {
    pub ticket_id: Uuid,
    pub ticket_number: i32,
    pub client_id: Option<Uuid>,
    pub client_code: Option<String>,
    pub commercial_unit: Option<String>,
    pub priority: Option<String>,
    pub ticket_type: Option<String>,
    pub module: Option<String>,
    pub status: Option<String>,
    pub previous_status: Option<String>,
    pub channel: Option<String>,
    pub actor_kind: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub requester_email: Option<String>,
    pub assigned_agent_id: Option<Uuid>,
    pub message_count: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// An event emitted by the ticket/timeline subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketEvent {
    pub event_id: Uuid,
    pub trigger: TriggerKind,
    pub snapshot: TicketSnapshot,
    pub occurred_at: DateTime<Utc>,
}

impl TicketEvent {
    pub fn new(trigger: TriggerKind, snapshot: TicketSnapshot) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trigger,
            snapshot,
            occurred_at: Utc::now(),
        }
    }

    pub fn ticket_created(snapshot: TicketSnapshot, channel: &str) -> Self {
        let snapshot = TicketSnapshot {
            channel: Some(channel.to_string()),
            actor_kind: Some("CLIENTE".to_string()),
            ..snapshot
        };
        Self::new(TriggerKind::TicketCreated, snapshot)
    }

    pub fn client_message(snapshot: TicketSnapshot, channel: &str, body: &str) -> Self {
        let snapshot = TicketSnapshot {
            channel: Some(channel.to_string()),
            actor_kind: Some("CLIENTE".to_string()),
            body: Some(body.to_string()),
            ..snapshot
        };
        Self::new(TriggerKind::ClientMessage, snapshot)
    }

    pub fn agent_reply(snapshot: TicketSnapshot, body: &str) -> Self {
        let snapshot = TicketSnapshot {
            actor_kind: Some("AGENTE".to_string()),
            body: Some(body.to_string()),
            ..snapshot
        };
        Self::new(TriggerKind::AgentReply, snapshot)
    }

    pub fn internal_note(snapshot: TicketSnapshot, body: &str) -> Self {
        let snapshot = TicketSnapshot {
            actor_kind: Some("AGENTE".to_string()),
            body: Some(body.to_string()),
            ..snapshot
        };
        Self::new(TriggerKind::InternalNote, snapshot)
    }

    pub fn status_changed(snapshot: TicketSnapshot, old_status: &str, new_status: &str) -> Self {
        let snapshot = TicketSnapshot {
            previous_status: Some(old_status.to_string()),
            status: Some(new_status.to_string()),
            ..snapshot
        };
        Self::new(TriggerKind::StatusChanged, snapshot)
    }

    pub fn assignment_changed(snapshot: TicketSnapshot, new_assignee: Option<Uuid>) -> Self {
        let snapshot = TicketSnapshot {
            assigned_agent_id: new_assignee,
            ..snapshot
        };
        Self::new(TriggerKind::AssignmentChanged, snapshot)
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

// ===== Workflow configuration =====

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCondition {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub field: String,
    pub operator: String,
    pub value: Option<String>,
    pub or_group: i32,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecipient {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub recipient_type: String,
    pub value: Option<String>,
    pub is_cc: bool,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAction {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub action_type: String,
    pub value: Option<String>,
    pub action_order: i32,
}

/// A notification workflow together with all of its child rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger: TriggerKind,
    pub active: bool,
    pub execution_order: i32,
    pub stop_on_match: bool,
    pub template_code: Option<String>,
    pub custom_subject: Option<String>,
    pub cc_project_manager_1: bool,
    pub cc_project_manager_2: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub conditions: Vec<WorkflowCondition>,
    #[serde(default)]
    pub recipients: Vec<WorkflowRecipient>,
    #[serde(default)]
    pub actions: Vec<WorkflowAction>,
}

impl WorkflowCondition {
    pub fn new(workflow_id: Uuid, field: &str, operator: &str, value: Option<&str>, or_group: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            field: field.to_string(),
            operator: operator.to_string(),
            value: value.map(str::to_string),
            or_group,
        }
    }
}

impl WorkflowRecipient {
    pub fn new(workflow_id: Uuid, recipient_type: &str, value: Option<&str>, is_cc: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            recipient_type: recipient_type.to_string(),
            value: value.map(str::to_string),
            is_cc,
        }
    }
}

impl WorkflowAction {
    pub fn new(workflow_id: Uuid, action_type: &str, value: Option<&str>, action_order: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            action_type: action_type.to_string(),
            value: value.map(str::to_string),
            action_order,
        }
    }
}

impl Workflow {
    pub fn new(name: &str, trigger: TriggerKind, execution_order: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            trigger,
            active: true,
            execution_order,
            stop_on_match: false,
            template_code: None,
            custom_subject: None,
            cc_project_manager_1: false,
            cc_project_manager_2: false,
            created_at: Utc::now(),
            conditions: Vec::new(),
            recipients: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, field: &str, operator: &str, value: Option<&str>, or_group: i32) -> Self {
        self.conditions
            .push(WorkflowCondition::new(self.id, field, operator, value, or_group));
        self
    }

    pub fn with_recipient(mut self, recipient_type: &str, value: Option<&str>, is_cc: bool) -> Self {
        self.recipients
            .push(WorkflowRecipient::new(self.id, recipient_type, value, is_cc));
        self
    }

    pub fn with_action(mut self, action_type: &str, value: Option<&str>, action_order: i32) -> Self {
        self.actions
            .push(WorkflowAction::new(self.id, action_type, value, action_order));
        self
    }

    pub fn stop_on_match(mut self) -> Self {
        self.stop_on_match = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn with_template(mut self, template_code: &str) -> Self {
        self.template_code = Some(template_code.to_string());
        self
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.custom_subject = Some(subject.to_string());
        self
    }

    pub fn cc_project_managers(mut self, first: bool, second: bool) -> Self {
        self.cc_project_manager_1 = first;
        self.cc_project_manager_2 = second;
        self
    }
}

/// Trigger-level master switch and default messaging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEventConfig {
    pub trigger: TriggerKind,
    pub enabled: bool,
    pub notify_client: bool,
    pub notify_agent: bool,
    pub default_subject: Option<String>,
    pub default_template_code: Option<String>,
}

impl NotificationEventConfig {
    pub fn enabled(trigger: TriggerKind) -> Self {
        Self {
            trigger,
            enabled: true,
            notify_client: true,
            notify_agent: true,
            default_subject: None,
            default_template_code: None,
        }
    }
}

// ===== Effect requests =====

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedRecipient {
    pub address: String,
    pub is_cc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub event_id: Uuid,
    pub ticket_id: Uuid,
    pub workflow_id: Uuid,
    pub action_id: Uuid,
    pub recipients: Vec<ResolvedRecipient>,
    pub subject: String,
    pub template_ref: Option<String>,
    /// Ticket snapshot handed to the render step
    pub variables: serde_json::Value,
}

impl NotificationRequest {
    pub fn to_addresses(&self) -> impl Iterator<Item = &str> {
        self.recipients.iter().filter(|r| !r.is_cc).map(|r| r.address.as_str())
    }

    pub fn cc_addresses(&self) -> impl Iterator<Item = &str> {
        self.recipients.iter().filter(|r| r.is_cc).map(|r| r.address.as_str())
    }
}

/// Ticket columns a workflow action is allowed to write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutableTicketField {
    Status,
    Priority,
    AssignedAgent,
    TicketType,
    Module,
}

impl MutableTicketField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutableTicketField::Status => "status",
            MutableTicketField::Priority => "priority",
            MutableTicketField::AssignedAgent => "assigned_agent",
            MutableTicketField::TicketType => "ticket_type",
            MutableTicketField::Module => "module",
        }
    }
}

impl FromStr for MutableTicketField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "status" | "estado" => Ok(MutableTicketField::Status),
            "priority" | "prioridad" => Ok(MutableTicketField::Priority),
            "assigned_agent" | "agente" => Ok(MutableTicketField::AssignedAgent),
            "ticket_type" | "type" | "tipo" => Ok(MutableTicketField::TicketType),
            "module" | "modulo" => Ok(MutableTicketField::Module),
            other => Err(format!("unknown ticket field '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketMutationRequest {
    pub ticket_id: Uuid,
    pub field: MutableTicketField,
    pub value: String,
}
