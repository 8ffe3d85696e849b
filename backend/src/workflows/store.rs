// Workflow Store - Point-in-time configuration snapshots and atomic child replacement

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use soporte_shared::{
    NotificationEventConfig, TriggerKind, Workflow, WorkflowAction, WorkflowCondition,
    WorkflowRecipient,
};
use sqlx::{FromRow, PgPool};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),
}

/// Everything one evaluation pass reads, captured at a single point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    pub event_config: Option<NotificationEventConfig>,
    pub workflows: Vec<Workflow>,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Read the trigger's event config and all of its workflows with their
    /// children as one consistent snapshot.
    async fn load_snapshot(&self, trigger: TriggerKind) -> Result<ConfigSnapshot, StoreError>;

    /// Insert or update a workflow and swap all of its children at once.
    async fn replace_workflow(&self, workflow: &Workflow) -> Result<(), StoreError>;

    async fn upsert_event_config(&self, config: &NotificationEventConfig) -> Result<(), StoreError>;
}

/// Children must point at their parent before anything is written
pub fn validate_children(workflow: &Workflow) -> Result<(), StoreError> {
    let orphan = workflow
        .conditions
        .iter()
        .map(|c| c.workflow_id)
        .chain(workflow.recipients.iter().map(|r| r.workflow_id))
        .chain(workflow.actions.iter().map(|a| a.workflow_id))
        .find(|id| *id != workflow.id);

    match orphan {
        Some(other) => Err(StoreError::InvalidWorkflow(format!(
            "child row of workflow {} points at {}",
            workflow.id, other
        ))),
        None => Ok(()),
    }
}

// ===== In-memory store =====

#[derive(Debug, Default)]
struct StoreState {
    workflows: BTreeMap<Uuid, Workflow>,
    configs: HashMap<TriggerKind, NotificationEventConfig>,
}

/// Store kept entirely in memory; each workflow is swapped as a whole value
/// under the write lock, so readers never see partial children.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    state: RwLock<StoreState>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn remove_workflow(&self, workflow_id: Uuid) -> bool {
        self.state.write().await.workflows.remove(&workflow_id).is_some()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn load_snapshot(&self, trigger: TriggerKind) -> Result<ConfigSnapshot, StoreError> {
        let state = self.state.read().await;
        Ok(ConfigSnapshot {
            event_config: state.configs.get(&trigger).cloned(),
            workflows: state
                .workflows
                .values()
                .filter(|w| w.trigger == trigger)
                .cloned()
                .collect(),
        })
    }

    async fn replace_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        validate_children(workflow)?;
        let mut state = self.state.write().await;
        state.workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn upsert_event_config(&self, config: &NotificationEventConfig) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.configs.insert(config.trigger, config.clone());
        Ok(())
    }
}

// ===== PostgreSQL store =====

#[derive(Debug, FromRow)]
struct WorkflowRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    trigger: String,
    active: bool,
    execution_order: i32,
    stop_on_match: bool,
    template_code: Option<String>,
    custom_subject: Option<String>,
    cc_project_manager_1: bool,
    cc_project_manager_2: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct EventConfigRow {
    trigger: String,
    enabled: bool,
    notify_client: bool,
    notify_agent: bool,
    default_subject: Option<String>,
    default_template_code: Option<String>,
}

fn group_by_workflow<T>(rows: Vec<T>, key: impl Fn(&T) -> Uuid) -> HashMap<Uuid, Vec<T>> {
    let mut grouped: HashMap<Uuid, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(key(&row)).or_default().push(row);
    }
    grouped
}

pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn load_snapshot(&self, trigger: TriggerKind) -> Result<ConfigSnapshot, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let config_row = sqlx::query_as::<_, EventConfigRow>(
            r#"
            SELECT trigger, enabled, notify_client, notify_agent, default_subject, default_template_code
            FROM notification_event_configs
            WHERE trigger = $1
            "#,
        )
        .bind(trigger.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let rows = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT
                id, name, description, trigger, active, execution_order, stop_on_match,
                template_code, custom_subject, cc_project_manager_1, cc_project_manager_2, created_at
            FROM workflows
            WHERE trigger = $1
            ORDER BY execution_order ASC, created_at ASC, id ASC
            "#,
        )
        .bind(trigger.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let conditions = sqlx::query_as::<_, WorkflowCondition>(
            r#"
            SELECT id, workflow_id, field, operator, value, or_group
            FROM workflow_conditions
            WHERE workflow_id = ANY($1)
            ORDER BY or_group ASC, id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        let recipients = sqlx::query_as::<_, WorkflowRecipient>(
            r#"
            SELECT id, workflow_id, recipient_type, value, is_cc
            FROM workflow_recipients
            WHERE workflow_id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        let actions = sqlx::query_as::<_, WorkflowAction>(
            r#"
            SELECT id, workflow_id, action_type, value, action_order
            FROM workflow_actions
            WHERE workflow_id = ANY($1)
            ORDER BY action_order ASC, id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut conditions = group_by_workflow(conditions, |c| c.workflow_id);
        let mut recipients = group_by_workflow(recipients, |r| r.workflow_id);
        let mut actions = group_by_workflow(actions, |a| a.workflow_id);

        let workflows = rows
            .into_iter()
            .filter_map(|row| {
                let parsed = match row.trigger.parse::<TriggerKind>() {
                    Ok(kind) => kind,
                    Err(e) => {
                        warn!("Skipping workflow {}: {}", row.id, e);
                        return None;
                    }
                };
                Some(Workflow {
                    id: row.id,
                    name: row.name,
                    description: row.description,
                    trigger: parsed,
                    active: row.active,
                    execution_order: row.execution_order,
                    stop_on_match: row.stop_on_match,
                    template_code: row.template_code,
                    custom_subject: row.custom_subject,
                    cc_project_manager_1: row.cc_project_manager_1,
                    cc_project_manager_2: row.cc_project_manager_2,
                    created_at: row.created_at,
                    conditions: conditions.remove(&row.id).unwrap_or_default(),
                    recipients: recipients.remove(&row.id).unwrap_or_default(),
                    actions: actions.remove(&row.id).unwrap_or_default(),
                })
            })
            .collect();

        let event_config = config_row.and_then(|row| match row.trigger.parse::<TriggerKind>() {
            Ok(kind) => Some(NotificationEventConfig {
                trigger: kind,
                enabled: row.enabled,
                notify_client: row.notify_client,
                notify_agent: row.notify_agent,
                default_subject: row.default_subject,
                default_template_code: row.default_template_code,
            }),
            Err(e) => {
                warn!("Ignoring notification event config: {}", e);
                None
            }
        });

        Ok(ConfigSnapshot {
            event_config,
            workflows,
        })
    }

    async fn replace_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        validate_children(workflow)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflows
            (id, name, description, trigger, active, execution_order, stop_on_match,
             template_code, custom_subject, cc_project_manager_1, cc_project_manager_2, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, description = EXCLUDED.description, trigger = EXCLUDED.trigger,
                active = EXCLUDED.active, execution_order = EXCLUDED.execution_order,
                stop_on_match = EXCLUDED.stop_on_match, template_code = EXCLUDED.template_code,
                custom_subject = EXCLUDED.custom_subject,
                cc_project_manager_1 = EXCLUDED.cc_project_manager_1,
                cc_project_manager_2 = EXCLUDED.cc_project_manager_2,
                updated_at = NOW()
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.trigger.as_str())
        .bind(workflow.active)
        .bind(workflow.execution_order)
        .bind(workflow.stop_on_match)
        .bind(&workflow.template_code)
        .bind(&workflow.custom_subject)
        .bind(workflow.cc_project_manager_1)
        .bind(workflow.cc_project_manager_2)
        .bind(workflow.created_at)
        .execute(&mut *tx)
        .await?;

        for table in ["workflow_conditions", "workflow_recipients", "workflow_actions"] {
            sqlx::query(&format!("DELETE FROM {} WHERE workflow_id = $1", table))
                .bind(workflow.id)
                .execute(&mut *tx)
                .await?;
        }

        for c in &workflow.conditions {
            sqlx::query(
                "INSERT INTO workflow_conditions (id, workflow_id, field, operator, value, or_group) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(c.id)
            .bind(c.workflow_id)
            .bind(&c.field)
            .bind(&c.operator)
            .bind(&c.value)
            .bind(c.or_group)
            .execute(&mut *tx)
            .await?;
        }

        for r in &workflow.recipients {
            sqlx::query(
                "INSERT INTO workflow_recipients (id, workflow_id, recipient_type, value, is_cc) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(r.id)
            .bind(r.workflow_id)
            .bind(&r.recipient_type)
            .bind(&r.value)
            .bind(r.is_cc)
            .execute(&mut *tx)
            .await?;
        }

        for a in &workflow.actions {
            sqlx::query(
                "INSERT INTO workflow_actions (id, workflow_id, action_type, value, action_order) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(a.id)
            .bind(a.workflow_id)
            .bind(&a.action_type)
            .bind(&a.value)
            .bind(a.action_order)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            "Workflow '{}' saved with {} condition(s), {} recipient(s), {} action(s)",
            workflow.name,
            workflow.conditions.len(),
            workflow.recipients.len(),
            workflow.actions.len()
        );
        Ok(())
    }

    async fn upsert_event_config(&self, config: &NotificationEventConfig) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notification_event_configs
            (trigger, enabled, notify_client, notify_agent, default_subject, default_template_code)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (trigger) DO UPDATE
            SET enabled = EXCLUDED.enabled, notify_client = EXCLUDED.notify_client,
                notify_agent = EXCLUDED.notify_agent, default_subject = EXCLUDED.default_subject,
                default_template_code = EXCLUDED.default_template_code
            "#,
        )
        .bind(config.trigger.as_str())
        .bind(config.enabled)
        .bind(config.notify_client)
        .bind(config.notify_agent)
        .bind(&config.default_subject)
        .bind(&config.default_template_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_filters_by_trigger() {
        let store = InMemoryWorkflowStore::new();
        let created = Workflow::new("Alta", TriggerKind::TicketCreated, 1);
        let message = Workflow::new("Mensaje", TriggerKind::ClientMessage, 1);
        store.replace_workflow(&created).await.unwrap();
        store.replace_workflow(&message).await.unwrap();
        store
            .upsert_event_config(&NotificationEventConfig::enabled(TriggerKind::ClientMessage))
            .await
            .unwrap();

        let snapshot = store.load_snapshot(TriggerKind::ClientMessage).await.unwrap();
        assert_eq!(snapshot.workflows, vec![message]);
        assert!(snapshot.event_config.unwrap().enabled);

        let snapshot = store.load_snapshot(TriggerKind::TicketCreated).await.unwrap();
        assert!(snapshot.event_config.is_none());
    }

    #[tokio::test]
    async fn test_replace_swaps_all_children() {
        let store = InMemoryWorkflowStore::new();
        let original = Workflow::new("Urgentes", TriggerKind::ClientMessage, 1)
            .with_condition("PRIORITY", "EQUALS", Some("URGENTE"), 0)
            .with_condition("CANAL", "EQUALS", Some("EMAIL"), 1)
            .with_action("SEND_NOTIFICATION", None, 1);
        store.replace_workflow(&original).await.unwrap();

        let mut edited = original.clone();
        edited.conditions.clear();
        edited.actions.clear();
        let edited = edited.with_condition("MODULO", "EQUALS", Some("AVA-GENERAL"), 0);
        store.replace_workflow(&edited).await.unwrap();

        let snapshot = store.load_snapshot(TriggerKind::ClientMessage).await.unwrap();
        assert_eq!(snapshot.workflows.len(), 1);
        assert_eq!(snapshot.workflows[0].conditions.len(), 1);
        assert_eq!(snapshot.workflows[0].conditions[0].field, "MODULO");
        assert!(snapshot.workflows[0].actions.is_empty());
    }

    #[tokio::test]
    async fn test_orphan_children_are_rejected() {
        let store = InMemoryWorkflowStore::new();
        let mut workflow = Workflow::new("Roto", TriggerKind::AgentReply, 1);
        workflow
            .conditions
            .push(WorkflowCondition::new(Uuid::new_v4(), "PRIORITY", "EQUALS", Some("ALTA"), 0));

        assert!(matches!(
            store.replace_workflow(&workflow).await,
            Err(StoreError::InvalidWorkflow(_))
        ));
        assert!(store.load_snapshot(TriggerKind::AgentReply).await.unwrap().workflows.is_empty());
    }

    #[tokio::test]
    async fn test_remove_workflow() {
        let store = InMemoryWorkflowStore::new();
        let workflow = Workflow::new("Temporal", TriggerKind::InternalNote, 1);
        store.replace_workflow(&workflow).await.unwrap();
        assert!(store.remove_workflow(workflow.id).await);
        assert!(!store.remove_workflow(workflow.id).await);
    }
}
