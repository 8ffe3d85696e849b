// Workflow Recipients - Resolution of recipient specs into concrete addresses

use async_trait::async_trait;
use soporte_shared::{NotificationEventConfig, ResolvedRecipient, Workflow, WorkflowRecipient};
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::triggers::EventContext;

/// How a recipient spec derives its addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipientType {
    AssignedAgent,
    AllAgents,
    ClientPrimaryContact,
    AllClientContacts,
    Requester,
    FixedEmail,
    ProjectManager1,
    ProjectManager2,
}

/// Side of the conversation a recipient type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Agent,
    Client,
    Other,
}

impl RecipientType {
    pub fn audience(&self) -> Audience {
        match self {
            RecipientType::AssignedAgent | RecipientType::AllAgents => Audience::Agent,
            RecipientType::ClientPrimaryContact
            | RecipientType::AllClientContacts
            | RecipientType::Requester => Audience::Client,
            RecipientType::FixedEmail
            | RecipientType::ProjectManager1
            | RecipientType::ProjectManager2 => Audience::Other,
        }
    }
}

impl FromStr for RecipientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "ASSIGNED_AGENT" | "AGENTE_ASIGNADO" => RecipientType::AssignedAgent,
            "ALL_AGENTS" | "TODOS_AGENTES" => RecipientType::AllAgents,
            "CLIENT_PRIMARY_CONTACT" | "CONTACTO_PRINCIPAL" => RecipientType::ClientPrimaryContact,
            "ALL_CLIENT_CONTACTS" | "TODOS_CONTACTOS" => RecipientType::AllClientContacts,
            "REQUESTER" | "SOLICITANTE" => RecipientType::Requester,
            "FIXED_EMAIL" | "EMAIL" | "EMAIL_FIJO" => RecipientType::FixedEmail,
            "PROJECT_MANAGER_1" | "JEFE_PROYECTO_1" => RecipientType::ProjectManager1,
            "PROJECT_MANAGER_2" | "JEFE_PROYECTO_2" => RecipientType::ProjectManager2,
            _ => return Err(format!("unknown recipient type '{}'", s)),
        };
        Ok(kind)
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("ticket has no client")]
    MissingClient,

    #[error("directory lookup failed: {0}")]
    Lookup(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContact {
    pub email: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectManagers {
    pub first: Option<String>,
    pub second: Option<String>,
}

/// Lookups into the agent/client records owned by the surrounding system
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn agent_email(&self, agent_id: Uuid) -> Result<Option<String>, DirectoryError>;

    async fn active_agent_emails(&self) -> Result<Vec<String>, DirectoryError>;

    async fn active_client_contacts(&self, client_id: Uuid) -> Result<Vec<ClientContact>, DirectoryError>;

    async fn project_managers(&self, client_id: Uuid) -> Result<ProjectManagers, DirectoryError>;
}

/// Ordered, deduplicated recipient list where a primary entry beats a CC one
#[derive(Debug, Default)]
pub struct RecipientSet {
    entries: Vec<ResolvedRecipient>,
    index: HashMap<String, usize>,
}

impl RecipientSet {
    pub fn insert(&mut self, address: &str, is_cc: bool) {
        let address = address.trim();
        if address.is_empty() || !address.contains('@') {
            if !address.is_empty() {
                warn!("Ignoring malformed recipient address '{}'", address);
            }
            return;
        }

        let key = address.to_lowercase();
        match self.index.get(&key) {
            Some(&i) => {
                if !is_cc {
                    self.entries[i].is_cc = false;
                }
            }
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(ResolvedRecipient {
                    address: address.to_string(),
                    is_cc,
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<ResolvedRecipient> {
        self.entries
    }
}

pub struct RecipientResolver {
    directory: Arc<dyn RecipientDirectory>,
}

impl RecipientResolver {
    pub fn new(directory: Arc<dyn RecipientDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve every recipient spec of a matched workflow.
    ///
    /// Lookup failures and malformed specs contribute no address; an empty
    /// result is a valid outcome.
    pub async fn resolve(
        &self,
        workflow: &Workflow,
        ctx: &EventContext<'_>,
        config: &NotificationEventConfig,
    ) -> Vec<ResolvedRecipient> {
        let mut set = RecipientSet::default();
        let mut managers: Option<ProjectManagers> = None;

        for spec in &workflow.recipients {
            let kind = match spec.recipient_type.parse::<RecipientType>() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!(workflow_id = %workflow.id, recipient_id = %spec.id, "{}", e);
                    continue;
                }
            };

            let allowed = match kind.audience() {
                Audience::Agent => config.notify_agent,
                Audience::Client => config.notify_client,
                Audience::Other => true,
            };
            if !allowed {
                debug!(
                    workflow_id = %workflow.id,
                    "Recipient {:?} suppressed by {} event config",
                    kind,
                    config.trigger
                );
                continue;
            }

            match self.addresses_for(kind, spec, ctx, &mut managers).await {
                Ok(addresses) => {
                    for address in addresses {
                        set.insert(&address, spec.is_cc);
                    }
                }
                Err(e) => warn!(
                    workflow_id = %workflow.id,
                    recipient_id = %spec.id,
                    "Could not resolve {:?} recipient: {}",
                    kind,
                    e
                ),
            }
        }

        if workflow.cc_project_manager_1 || workflow.cc_project_manager_2 {
            match self.project_managers(ctx, &mut managers).await {
                Ok(pms) => {
                    if workflow.cc_project_manager_1 {
                        if let Some(address) = pms.first.as_deref() {
                            set.insert(address, true);
                        }
                    }
                    if workflow.cc_project_manager_2 {
                        if let Some(address) = pms.second.as_deref() {
                            set.insert(address, true);
                        }
                    }
                }
                Err(e) => warn!(
                    workflow_id = %workflow.id,
                    "Could not resolve project manager CC: {}",
                    e
                ),
            }
        }

        debug!(workflow_id = %workflow.id, "Resolved {} recipient(s)", set.len());
        set.into_vec()
    }

    async fn addresses_for(
        &self,
        kind: RecipientType,
        spec: &WorkflowRecipient,
        ctx: &EventContext<'_>,
        managers: &mut Option<ProjectManagers>,
    ) -> Result<Vec<String>, DirectoryError> {
        let snapshot = ctx.snapshot();
        let addresses = match kind {
            RecipientType::AssignedAgent => match snapshot.assigned_agent_id {
                Some(agent_id) => self.directory.agent_email(agent_id).await?.into_iter().collect(),
                None => Vec::new(),
            },
            RecipientType::AllAgents => self.directory.active_agent_emails().await?,
            RecipientType::ClientPrimaryContact => self
                .client_contacts(ctx)
                .await?
                .into_iter()
                .find(|c| c.is_primary)
                .map(|c| c.email)
                .into_iter()
                .collect(),
            RecipientType::AllClientContacts => self
                .client_contacts(ctx)
                .await?
                .into_iter()
                .map(|c| c.email)
                .collect(),
            RecipientType::Requester => snapshot.requester_email.iter().cloned().collect(),
            RecipientType::FixedEmail => match spec.value.as_deref().map(str::trim) {
                Some(address) if !address.is_empty() => vec![address.to_string()],
                _ => return Err(DirectoryError::Lookup("fixed recipient has no address".into())),
            },
            RecipientType::ProjectManager1 => self
                .project_managers(ctx, managers)
                .await?
                .first
                .into_iter()
                .collect(),
            RecipientType::ProjectManager2 => self
                .project_managers(ctx, managers)
                .await?
                .second
                .into_iter()
                .collect(),
        };
        Ok(addresses)
    }

    async fn client_contacts(&self, ctx: &EventContext<'_>) -> Result<Vec<ClientContact>, DirectoryError> {
        let client_id = ctx.snapshot().client_id.ok_or(DirectoryError::MissingClient)?;
        self.directory.active_client_contacts(client_id).await
    }

    async fn project_managers(
        &self,
        ctx: &EventContext<'_>,
        cache: &mut Option<ProjectManagers>,
    ) -> Result<ProjectManagers, DirectoryError> {
        if let Some(pms) = cache {
            return Ok(pms.clone());
        }
        let client_id = ctx.snapshot().client_id.ok_or(DirectoryError::MissingClient)?;
        let pms = self.directory.project_managers(client_id).await?;
        *cache = Some(pms.clone());
        Ok(pms)
    }
}

/// Directory backed by the helpdesk's `users`, `contacts` and `clients` tables
pub struct PgRecipientDirectory {
    pool: PgPool,
}

impl PgRecipientDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientDirectory for PgRecipientDirectory {
    async fn agent_email(&self, agent_id: Uuid) -> Result<Option<String>, DirectoryError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT email FROM users WHERE id = $1 AND is_active = true",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(email,)| email))
    }

    async fn active_agent_emails(&self) -> Result<Vec<String>, DirectoryError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT email FROM users WHERE is_active = true AND role IN ('agent', 'admin') ORDER BY email",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(email,)| email).collect())
    }

    async fn active_client_contacts(&self, client_id: Uuid) -> Result<Vec<ClientContact>, DirectoryError> {
        let rows = sqlx::query_as::<_, (String, bool)>(
            r#"
            SELECT email, is_primary
            FROM contacts
            WHERE client_id = $1 AND is_active = true AND email IS NOT NULL
            ORDER BY is_primary DESC, email
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(email, is_primary)| ClientContact { email, is_primary })
            .collect())
    }

    async fn project_managers(&self, client_id: Uuid) -> Result<ProjectManagers, DirectoryError> {
        let row = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            r#"
            SELECT pm1.email, pm2.email
            FROM clients c
            LEFT JOIN users pm1 ON pm1.id = c.project_manager_1_id AND pm1.is_active = true
            LEFT JOIN users pm2 ON pm2.id = c.project_manager_2_id AND pm2.is_active = true
            WHERE c.id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        let (first, second) = row.ok_or_else(|| DirectoryError::Lookup(format!("client {} not found", client_id)))?;
        Ok(ProjectManagers { first, second })
    }
}
