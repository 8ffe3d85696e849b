// Workflow Triggers - Event context shared by the matcher, resolver and dispatcher

use serde_json::json;
use soporte_shared::{TicketEvent, TicketSnapshot, TriggerKind};
use uuid::Uuid;

/// Read-only view over the event being evaluated.
///
/// Every component of one pass borrows the same `TicketEvent`, so the snapshot
/// cannot change between condition evaluation and action dispatch.
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    event: &'a TicketEvent,
}

impl<'a> EventContext<'a> {
    pub fn new(event: &'a TicketEvent) -> Self {
        Self { event }
    }

    pub fn event(&self) -> &'a TicketEvent {
        self.event
    }

    pub fn snapshot(&self) -> &'a TicketSnapshot {
        &self.event.snapshot
    }

    pub fn trigger(&self) -> TriggerKind {
        self.event.trigger
    }

    pub fn event_id(&self) -> Uuid {
        self.event.event_id
    }

    pub fn ticket_id(&self) -> Uuid {
        self.event.snapshot.ticket_id
    }

    /// Subject used when neither the workflow nor the event-type config sets one
    pub fn fallback_subject(&self) -> String {
        let snapshot = self.snapshot();
        match snapshot.subject.as_deref().map(str::trim) {
            Some(subject) if !subject.is_empty() => {
                format!("[#{}] {}", snapshot.ticket_number, subject)
            }
            _ => format!("[#{}] Ticket update", snapshot.ticket_number),
        }
    }

    /// Variables handed to the render step alongside a notification request
    pub fn template_variables(&self) -> serde_json::Value {
        let snapshot = self.snapshot();
        json!({
            "event_id": self.event.event_id,
            "trigger": self.event.trigger,
            "occurred_at": self.event.occurred_at.to_rfc3339(),
            "ticket_id": snapshot.ticket_id,
            "ticket_number": snapshot.ticket_number,
            "client_code": snapshot.client_code,
            "commercial_unit": snapshot.commercial_unit,
            "priority": snapshot.priority,
            "ticket_type": snapshot.ticket_type,
            "module": snapshot.module,
            "status": snapshot.status,
            "previous_status": snapshot.previous_status,
            "channel": snapshot.channel,
            "actor_kind": snapshot.actor_kind,
            "subject": snapshot.subject,
            "body": snapshot.body,
            "requester_email": snapshot.requester_email,
            "assigned_agent_id": snapshot.assigned_agent_id,
        })
    }
}
