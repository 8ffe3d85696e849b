// Workflow Engine - Matching of ticket events against configured workflows

use serde::{Deserialize, Serialize};
use soporte_shared::{
    NotificationEventConfig, ResolvedRecipient, TicketEvent, TriggerKind, Workflow,
    WorkflowCondition,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::actions::ActionOutcome;
use super::conditions;
use super::executor::ActionDispatcher;
use super::recipients::{RecipientDirectory, RecipientResolver};
use super::store::{ConfigSnapshot, StoreError, WorkflowStore};
use super::triggers::EventContext;
use crate::notifications::{NotificationSink, TicketMutator};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not load workflow configuration: {0}")]
    Store(#[from] StoreError),
}

/// Result of matching one event against a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome<'a> {
    pub trigger_enabled: bool,
    pub matched: Vec<&'a Workflow>,
    pub stopped_by: Option<Uuid>,
}

impl MatchOutcome<'_> {
    fn disabled() -> Self {
        Self {
            trigger_enabled: false,
            matched: Vec::new(),
            stopped_by: None,
        }
    }
}

/// Conditions sharing an `or_group` are OR'ed; the groups are AND'ed.
/// No conditions at all means the workflow always matches.
pub fn conditions_match(conditions: &[WorkflowCondition], ctx: &EventContext<'_>) -> bool {
    let mut groups: BTreeMap<i32, bool> = BTreeMap::new();
    for condition in conditions {
        let satisfied = groups.entry(condition.or_group).or_insert(false);
        if !*satisfied {
            *satisfied = conditions::evaluate(condition, ctx);
        }
    }
    groups.values().all(|satisfied| *satisfied)
}

/// Select the workflows an event fires, in execution order.
///
/// A trigger without config, or with config disabled, fires nothing.
/// Inactive workflows and workflows of other triggers are ignored. A
/// matching workflow flagged `stop_on_match` ends the pass after itself.
pub fn match_workflows<'a>(
    config: Option<&NotificationEventConfig>,
    ctx: &EventContext<'_>,
    workflows: &'a [Workflow],
) -> MatchOutcome<'a> {
    let trigger = ctx.trigger();
    let enabled = match config {
        Some(c) if c.trigger == trigger => c.enabled,
        Some(c) => {
            warn!("Event config for {} supplied to a {} event, ignoring", c.trigger, trigger);
            false
        }
        None => {
            debug!("No notification config for {}, treating as disabled", trigger);
            false
        }
    };
    if !enabled {
        return MatchOutcome::disabled();
    }

    let mut candidates: Vec<&Workflow> = workflows
        .iter()
        .filter(|w| w.trigger == trigger && w.active)
        .collect();
    candidates.sort_by(|a, b| {
        a.execution_order
            .cmp(&b.execution_order)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });

    let mut matched = Vec::new();
    let mut stopped_by = None;
    for workflow in candidates {
        if !conditions_match(&workflow.conditions, ctx) {
            continue;
        }
        debug!("Workflow '{}' matched event {}", workflow.name, ctx.event_id());
        matched.push(workflow);
        if workflow.stop_on_match {
            stopped_by = Some(workflow.id);
            break;
        }
    }

    MatchOutcome {
        trigger_enabled: true,
        matched,
        stopped_by,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub recipients: Vec<ResolvedRecipient>,
    pub actions: Vec<ActionOutcome>,
}

/// What one evaluation pass did. Contains no timings, so two passes over
/// the same event and configuration produce equal reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub event_id: Uuid,
    pub trigger: TriggerKind,
    pub trigger_enabled: bool,
    pub workflows: Vec<WorkflowReport>,
    pub stopped_by: Option<Uuid>,
}

impl EvaluationReport {
    pub fn matched_ids(&self) -> Vec<Uuid> {
        self.workflows.iter().map(|w| w.workflow_id).collect()
    }

    pub fn failed_actions(&self) -> usize {
        self.workflows
            .iter()
            .flat_map(|w| w.actions.iter())
            .filter(|a| matches!(a.status, super::actions::ActionStatus::Failed { .. }))
            .count()
    }
}

pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    resolver: RecipientResolver,
    dispatcher: ActionDispatcher,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn RecipientDirectory>,
        sink: Arc<dyn NotificationSink>,
        mutator: Arc<dyn TicketMutator>,
    ) -> Self {
        Self {
            store,
            resolver: RecipientResolver::new(directory),
            dispatcher: ActionDispatcher::new(sink, mutator),
        }
    }

    /// Load a consistent configuration snapshot for the event's trigger and
    /// run one evaluation pass over it.
    pub async fn process_event(&self, event: &TicketEvent) -> Result<EvaluationReport, EngineError> {
        info!("Processing event {} ({})", event.event_id, event.trigger);
        let snapshot = self.store.load_snapshot(event.trigger).await?;
        Ok(self.run(event, &snapshot).await)
    }

    /// Evaluate `event` against an already loaded snapshot
    pub async fn run(&self, event: &TicketEvent, snapshot: &ConfigSnapshot) -> EvaluationReport {
        let ctx = EventContext::new(event);
        let outcome = match_workflows(snapshot.event_config.as_ref(), &ctx, &snapshot.workflows);

        let mut report = EvaluationReport {
            event_id: event.event_id,
            trigger: event.trigger,
            trigger_enabled: outcome.trigger_enabled,
            workflows: Vec::with_capacity(outcome.matched.len()),
            stopped_by: outcome.stopped_by,
        };

        // Matching a workflow implies the config is present and enabled
        let Some(config) = snapshot.event_config.as_ref() else {
            return report;
        };

        for workflow in outcome.matched {
            let recipients = self.resolver.resolve(workflow, &ctx, config).await;
            let actions = self
                .dispatcher
                .dispatch(workflow, &ctx, config, &recipients)
                .await;
            info!(
                "Workflow '{}' ran {} action(s) for {} recipient(s)",
                workflow.name,
                actions.len(),
                recipients.len()
            );
            report.workflows.push(WorkflowReport {
                workflow_id: workflow.id,
                workflow_name: workflow.name.clone(),
                recipients,
                actions,
            });
        }

        if let Some(stop) = report.stopped_by {
            debug!("Evaluation of event {} stopped by workflow {}", event.event_id, stop);
        }
        report
    }
}
