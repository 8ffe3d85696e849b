// Workflow endpoints: event ingestion and workflow/event-config administration

use axum::{
    extract::{Path, State},
    routing::{post, put},
    Json, Router,
};
use soporte_shared::{NotificationEventConfig, TicketEvent, TriggerKind, Workflow};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiResult, AppError, ValidationBuilder};
use crate::workflows::{ActionType, ConditionField, ConditionOperator, EvaluationReport, RecipientType};
use crate::AppState;

pub fn workflow_event_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(process_event))
}

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:id", put(replace_workflow))
}

pub fn event_config_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:trigger", put(upsert_event_config))
}

async fn process_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<TicketEvent>,
) -> ApiResult<Json<EvaluationReport>> {
    if let Some(err) = ValidationBuilder::new()
        .check(event.snapshot.ticket_id.is_nil(), "snapshot.ticket_id", "Ticket id is required")
        .check(event.event_id.is_nil(), "event_id", "Event id is required")
        .build()
    {
        return Err(err);
    }

    let report = state.engine.process_event(&event).await?;
    Ok(Json(report))
}

/// Reject workflows whose codes the engine could never evaluate
pub fn validate_workflow(workflow: &Workflow) -> ValidationBuilder {
    let mut v = ValidationBuilder::new().check(workflow.name.trim().is_empty(), "name", "Name is required");

    for c in &workflow.conditions {
        v = v
            .check(c.field.parse::<ConditionField>().is_err(), "conditions", &format!("Unknown field '{}'", c.field))
            .check(
                c.operator.parse::<ConditionOperator>().is_err(),
                "conditions",
                &format!("Unknown operator '{}'", c.operator),
            );
    }
    for r in &workflow.recipients {
        v = v.check(
            r.recipient_type.parse::<RecipientType>().is_err(),
            "recipients",
            &format!("Unknown recipient type '{}'", r.recipient_type),
        );
    }
    for a in &workflow.actions {
        v = v.check(
            a.action_type.parse::<ActionType>().is_err(),
            "actions",
            &format!("Unknown action type '{}'", a.action_type),
        );
    }
    v
}

async fn replace_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(workflow): Json<Workflow>,
) -> ApiResult<Json<Workflow>> {
    if let Some(err) = validate_workflow(&workflow)
        .check(workflow.id != id, "id", "Path and body ids differ")
        .build()
    {
        return Err(err);
    }

    state.store.replace_workflow(&workflow).await?;
    info!("Workflow '{}' ({}) replaced", workflow.name, workflow.id);
    Ok(Json(workflow))
}

async fn upsert_event_config(
    State(state): State<Arc<AppState>>,
    Path(trigger): Path<String>,
    Json(config): Json<NotificationEventConfig>,
) -> ApiResult<Json<NotificationEventConfig>> {
    let trigger: TriggerKind = trigger
        .parse()
        .map_err(|e: soporte_shared::UnknownTrigger| AppError::BadRequest(e.to_string()))?;
    if let Some(err) = ValidationBuilder::new()
        .check(config.trigger != trigger, "trigger", "Path and body triggers differ")
        .build()
    {
        return Err(err);
    }

    state.store.upsert_event_config(&config).await?;
    info!("Notification config for {} updated (enabled={})", trigger, config.enabled);
    Ok(Json(config))
}
