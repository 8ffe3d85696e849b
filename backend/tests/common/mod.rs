// Common test utilities that are shared across integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use soporte_backend::notifications::{NotificationSink, SinkError, TicketMutator};
use soporte_backend::workflows::recipients::{
    ClientContact, DirectoryError, ProjectManagers, RecipientDirectory,
};
use soporte_shared::{NotificationRequest, TicketMutationRequest};
use std::collections::HashMap;
use std::sync::{Mutex, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

/// Agent and client records held in memory
#[derive(Debug, Default)]
pub struct StaticDirectory {
    pub agents: HashMap<Uuid, String>,
    pub contacts: HashMap<Uuid, Vec<ClientContact>>,
    pub managers: HashMap<Uuid, ProjectManagers>,
}

impl StaticDirectory {
    pub fn with_agent(mut self, agent_id: Uuid, email: &str) -> Self {
        self.agents.insert(agent_id, email.to_string());
        self
    }

    pub fn with_contact(mut self, client_id: Uuid, email: &str, is_primary: bool) -> Self {
        self.contacts.entry(client_id).or_default().push(ClientContact {
            email: email.to_string(),
            is_primary,
        });
        self
    }

    pub fn with_managers(mut self, client_id: Uuid, first: Option<&str>, second: Option<&str>) -> Self {
        self.managers.insert(
            client_id,
            ProjectManagers {
                first: first.map(str::to_string),
                second: second.map(str::to_string),
            },
        );
        self
    }
}

#[async_trait]
impl RecipientDirectory for StaticDirectory {
    async fn agent_email(&self, agent_id: Uuid) -> Result<Option<String>, DirectoryError> {
        Ok(self.agents.get(&agent_id).cloned())
    }

    async fn active_agent_emails(&self) -> Result<Vec<String>, DirectoryError> {
        let mut emails: Vec<String> = self.agents.values().cloned().collect();
        emails.sort();
        Ok(emails)
    }

    async fn active_client_contacts(&self, client_id: Uuid) -> Result<Vec<ClientContact>, DirectoryError> {
        Ok(self.contacts.get(&client_id).cloned().unwrap_or_default())
    }

    async fn project_managers(&self, client_id: Uuid) -> Result<ProjectManagers, DirectoryError> {
        Ok(self.managers.get(&client_id).cloned().unwrap_or_default())
    }
}

/// One effect handed to the sink boundary
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Notified(NotificationRequest),
    Mutated(TicketMutationRequest),
}

/// Sink and mutator that record every effect in arrival order
#[derive(Debug, Default)]
pub struct RecordingSink {
    effects: Mutex<Vec<Effect>>,
}

impl RecordingSink {
    pub fn effects(&self) -> Vec<Effect> {
        self.effects.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<NotificationRequest> {
        self.effects()
            .into_iter()
            .filter_map(|e| match e {
                Effect::Notified(request) => Some(request),
                Effect::Mutated(_) => None,
            })
            .collect()
    }

    pub fn mutations(&self) -> Vec<TicketMutationRequest> {
        self.effects()
            .into_iter()
            .filter_map(|e| match e {
                Effect::Mutated(request) => Some(request),
                Effect::Notified(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, request: &NotificationRequest) -> Result<(), SinkError> {
        self.effects.lock().unwrap().push(Effect::Notified(request.clone()));
        Ok(())
    }
}

#[async_trait]
impl TicketMutator for RecordingSink {
    async fn apply(&self, request: &TicketMutationRequest) -> Result<(), SinkError> {
        self.effects.lock().unwrap().push(Effect::Mutated(request.clone()));
        Ok(())
    }
}
