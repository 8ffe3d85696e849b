// Workflow Executor - Dispatches a matched workflow's actions in order

use soporte_shared::{
    NotificationEventConfig, NotificationRequest, ResolvedRecipient, Workflow, WorkflowAction,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::actions::{ActionError, ActionOutcome, ActionType};
use super::triggers::EventContext;
use crate::notifications::{NotificationSink, TicketMutator};

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Build the notification for a send action.
///
/// Subject: workflow override, then the event-type default, then a generic
/// ticket subject. Template: the action's own value, then the workflow's
/// template, then the event-type default.
pub fn build_notification(
    workflow: &Workflow,
    action: &WorkflowAction,
    ctx: &EventContext<'_>,
    config: &NotificationEventConfig,
    recipients: &[ResolvedRecipient],
) -> NotificationRequest {
    let subject = non_blank(workflow.custom_subject.as_ref())
        .or_else(|| non_blank(config.default_subject.as_ref()))
        .map(str::to_string)
        .unwrap_or_else(|| ctx.fallback_subject());

    let template_ref = non_blank(action.value.as_ref())
        .or_else(|| non_blank(workflow.template_code.as_ref()))
        .or_else(|| non_blank(config.default_template_code.as_ref()))
        .map(str::to_string);

    NotificationRequest {
        event_id: ctx.event_id(),
        ticket_id: ctx.ticket_id(),
        workflow_id: workflow.id,
        action_id: action.id,
        recipients: recipients.to_vec(),
        subject,
        template_ref,
        variables: ctx.template_variables(),
    }
}

pub struct ActionDispatcher {
    sink: Arc<dyn NotificationSink>,
    mutator: Arc<dyn TicketMutator>,
}

impl ActionDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, mutator: Arc<dyn TicketMutator>) -> Self {
        Self { sink, mutator }
    }

    /// Run every action of `workflow` in ascending order, one at a time.
    /// A failing action is recorded and the next one still runs.
    pub async fn dispatch(
        &self,
        workflow: &Workflow,
        ctx: &EventContext<'_>,
        config: &NotificationEventConfig,
        recipients: &[ResolvedRecipient],
    ) -> Vec<ActionOutcome> {
        let mut actions: Vec<&WorkflowAction> = workflow.actions.iter().collect();
        actions.sort_by_key(|a| (a.action_order, a.id));

        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            let outcome = match action.action_type.parse::<ActionType>() {
                Err(e) => {
                    warn!(
                        workflow_id = %workflow.id,
                        action_id = %action.id,
                        "Skipping misconfigured action: {}",
                        e
                    );
                    ActionOutcome::failed(action, &e)
                }
                Ok(kind) if kind.requires_recipients() && recipients.is_empty() => {
                    info!(
                        workflow_id = %workflow.id,
                        action_id = %action.id,
                        "No recipients resolved, skipping {}",
                        kind.as_str()
                    );
                    ActionOutcome::skipped(action, "no recipients resolved")
                }
                Ok(kind) => match self.execute(kind, workflow, action, ctx, config, recipients).await {
                    Ok(()) => ActionOutcome::executed(action),
                    Err(e) => {
                        error!(
                            workflow_id = %workflow.id,
                            action_id = %action.id,
                            "Action {} of workflow '{}' failed: {}",
                            kind.as_str(),
                            workflow.name,
                            e
                        );
                        ActionOutcome::failed(action, &e)
                    }
                },
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn execute(
        &self,
        kind: ActionType,
        workflow: &Workflow,
        action: &WorkflowAction,
        ctx: &EventContext<'_>,
        config: &NotificationEventConfig,
        recipients: &[ResolvedRecipient],
    ) -> Result<(), ActionError> {
        match kind {
            ActionType::SendNotification => {
                let request = build_notification(workflow, action, ctx, config, recipients);
                self.sink.send(&request).await?;
            }
            _ => {
                let mutation = kind.mutation(ctx.ticket_id(), action.value.as_deref())?;
                self.mutator.apply(&mutation).await?;
            }
        }
        Ok(())
    }
}
