mod common;

use common::{init_test_logging, Effect, RecordingSink, StaticDirectory};
use soporte_backend::notifications::{NotificationSink, TicketMutator};
use soporte_backend::workflows::{
    ActionStatus, InMemoryWorkflowStore, WorkflowEngine, WorkflowStore,
};
use soporte_shared::{
    MutableTicketField, NotificationEventConfig, TicketEvent, TicketSnapshot, TriggerKind, Workflow,
};
use std::sync::Arc;
use uuid::Uuid;

struct Harness {
    store: Arc<InMemoryWorkflowStore>,
    sink: Arc<RecordingSink>,
    engine: WorkflowEngine,
}

fn harness(directory: StaticDirectory) -> Harness {
    init_test_logging();
    let store = Arc::new(InMemoryWorkflowStore::new());
    let sink = Arc::new(RecordingSink::default());
    let engine = WorkflowEngine::new(
        store.clone(),
        Arc::new(directory),
        sink.clone() as Arc<dyn NotificationSink>,
        sink.clone() as Arc<dyn TicketMutator>,
    );
    Harness { store, sink, engine }
}

impl Harness {
    async fn enable(&self, trigger: TriggerKind) {
        self.store
            .upsert_event_config(&NotificationEventConfig::enabled(trigger))
            .await
            .unwrap();
    }

    async fn add(&self, workflow: &Workflow) {
        self.store.replace_workflow(workflow).await.unwrap();
    }
}

fn snapshot(client_id: Uuid, agent_id: Uuid) -> TicketSnapshot {
    TicketSnapshot {
        ticket_id: Uuid::new_v4(),
        ticket_number: 1051,
        client_id: Some(client_id),
        priority: Some("URGENTE".to_string()),
        module: Some("AVA-GENERAL".to_string()),
        status: Some("ABIERTO".to_string()),
        subject: Some("Error al cerrar periodo".to_string()),
        assigned_agent_id: Some(agent_id),
        ..Default::default()
    }
}

#[tokio::test]
async fn urgent_client_message_notifies_assigned_agent() {
    let client_id = Uuid::new_v4();
    let agent_id = Uuid::new_v4();
    let h = harness(StaticDirectory::default().with_agent(agent_id, "ana@soporte.test"));
    h.enable(TriggerKind::ClientMessage).await;
    h.add(
        &Workflow::new("Urgentes", TriggerKind::ClientMessage, 1)
            .with_condition("PRIORITY", "EQUALS", Some("URGENTE"), 0)
            .with_recipient("ASSIGNED_AGENT", None, false)
            .with_action("SEND_NOTIFICATION", None, 1),
    )
    .await;

    let event = TicketEvent::client_message(snapshot(client_id, agent_id), "EMAIL", "Sigue sin cerrar");
    let report = h.engine.process_event(&event).await.unwrap();

    let sent = h.sink.notifications();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_addresses().collect::<Vec<_>>(), vec!["ana@soporte.test"]);
    assert_eq!(sent[0].subject, "[#1051] Error al cerrar periodo");
    assert_eq!(report.workflows.len(), 1);
}

#[tokio::test]
async fn stop_on_match_suppresses_later_workflows() {
    let client_id = Uuid::new_v4();
    let agent_id = Uuid::new_v4();
    let h = harness(StaticDirectory::default());
    h.enable(TriggerKind::StatusChanged).await;

    let first = Workflow::new("Cierre", TriggerKind::StatusChanged, 1)
        .with_action("SET_PRIORITY", Some("BAJA"), 1)
        .stop_on_match();
    let second = Workflow::new("General", TriggerKind::StatusChanged, 2).with_action("SET_STATUS", Some("CERRADO"), 1);
    h.add(&second).await;
    h.add(&first).await;

    let event = TicketEvent::status_changed(snapshot(client_id, agent_id), "ABIERTO", "RESUELTO");
    let report = h.engine.process_event(&event).await.unwrap();

    assert_eq!(report.matched_ids(), vec![first.id]);
    assert_eq!(report.stopped_by, Some(first.id));
    let mutations = h.sink.mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].field, MutableTicketField::Priority);
}

#[tokio::test]
async fn unsatisfied_group_blocks_match() {
    let client_id = Uuid::new_v4();
    let agent_id = Uuid::new_v4();
    let h = harness(StaticDirectory::default().with_agent(agent_id, "ana@soporte.test"));
    h.enable(TriggerKind::ClientMessage).await;
    h.add(
        &Workflow::new("AVA por correo", TriggerKind::ClientMessage, 1)
            .with_condition("MODULO", "EQUALS", Some("AVA-GENERAL"), 0)
            .with_condition("CANAL", "EQUALS", Some("EMAIL"), 1)
            .with_recipient("ASSIGNED_AGENT", None, false)
            .with_action("SEND_NOTIFICATION", None, 1),
    )
    .await;

    let event = TicketEvent::client_message(snapshot(client_id, agent_id), "WEB", "Hola");
    let report = h.engine.process_event(&event).await.unwrap();

    assert!(report.trigger_enabled);
    assert!(report.workflows.is_empty());
    assert!(h.sink.effects().is_empty());
}

#[tokio::test]
async fn empty_recipients_skip_notification_but_not_mutation() {
    let client_id = Uuid::new_v4();
    let agent_id = Uuid::new_v4();
    let h = harness(StaticDirectory::default());
    h.enable(TriggerKind::TicketCreated).await;
    h.add(
        &Workflow::new("Aviso a contactos", TriggerKind::TicketCreated, 1)
            .with_recipient("ALL_CLIENT_CONTACTS", None, false)
            .with_action("SEND_NOTIFICATION", None, 1)
            .with_action("SET_STATUS", Some("EN_PROCESO"), 2),
    )
    .await;

    let event = TicketEvent::ticket_created(snapshot(client_id, agent_id), "PORTAL");
    let report = h.engine.process_event(&event).await.unwrap();

    let actions = &report.workflows[0].actions;
    assert!(matches!(actions[0].status, ActionStatus::Skipped { .. }));
    assert_eq!(actions[1].status, ActionStatus::Executed);
    assert_eq!(
        h.sink.effects(),
        vec![Effect::Mutated(soporte_shared::TicketMutationRequest {
            ticket_id: event.snapshot.ticket_id,
            field: MutableTicketField::Status,
            value: "EN_PROCESO".to_string(),
        })]
    );
}

#[tokio::test]
async fn recipients_are_deduplicated_with_primary_precedence() {
    let client_id = Uuid::new_v4();
    let agent_id = Uuid::new_v4();
    let directory = StaticDirectory::default()
        .with_agent(agent_id, "ana@soporte.test")
        .with_contact(client_id, "compras@cliente.test", true)
        .with_contact(client_id, "ANA@soporte.test", false)
        .with_managers(client_id, Some("jp1@cliente.test"), Some("compras@cliente.test"));
    let h = harness(directory);
    h.enable(TriggerKind::AgentReply).await;
    h.add(
        &Workflow::new("Respuesta", TriggerKind::AgentReply, 1)
            .with_recipient("ALL_CLIENT_CONTACTS", None, true)
            .with_recipient("ASSIGNED_AGENT", None, false)
            .with_recipient("CLIENT_PRIMARY_CONTACT", None, false)
            .with_action("SEND_NOTIFICATION", None, 1)
            .cc_project_managers(true, true),
    )
    .await;

    let event = TicketEvent::agent_reply(snapshot(client_id, agent_id), "Ya quedo");
    h.engine.process_event(&event).await.unwrap();

    let sent = h.sink.notifications();
    assert_eq!(sent.len(), 1);
    let mut to: Vec<String> = sent[0].to_addresses().map(str::to_lowercase).collect();
    to.sort();
    assert_eq!(to, vec!["ana@soporte.test", "compras@cliente.test"]);
    assert_eq!(sent[0].cc_addresses().collect::<Vec<_>>(), vec!["jp1@cliente.test"]);
}

#[tokio::test]
async fn replaying_an_event_yields_the_same_report_and_effects() {
    let client_id = Uuid::new_v4();
    let agent_id = Uuid::new_v4();
    let h = harness(StaticDirectory::default().with_agent(agent_id, "ana@soporte.test"));
    h.enable(TriggerKind::InternalNote).await;
    h.add(
        &Workflow::new("Nota", TriggerKind::InternalNote, 1)
            .with_recipient("ASSIGNED_AGENT", None, false)
            .with_action("SEND_NOTIFICATION", Some("NOTA_INTERNA"), 1)
            .with_action("SET_FIELD", Some("MODULO=AVA-NOMINA"), 2),
    )
    .await;

    let event = TicketEvent::internal_note(snapshot(client_id, agent_id), "Revisar con desarrollo");
    let first = h.engine.process_event(&event).await.unwrap();
    let after_first = h.sink.effects();
    let second = h.engine.process_event(&event).await.unwrap();
    let effects = h.sink.effects();

    assert_eq!(first, second);
    assert_eq!(after_first.len(), 2);
    assert_eq!(effects[..2], effects[2..]);
}

#[tokio::test]
async fn disabled_trigger_runs_nothing() {
    let client_id = Uuid::new_v4();
    let agent_id = Uuid::new_v4();
    let h = harness(StaticDirectory::default().with_agent(agent_id, "ana@soporte.test"));
    h.store
        .upsert_event_config(&NotificationEventConfig {
            enabled: false,
            ..NotificationEventConfig::enabled(TriggerKind::AssignmentChanged)
        })
        .await
        .unwrap();
    h.add(
        &Workflow::new("Asignacion", TriggerKind::AssignmentChanged, 1)
            .with_recipient("ASSIGNED_AGENT", None, false)
            .with_action("SEND_NOTIFICATION", None, 1),
    )
    .await;

    let event = TicketEvent::assignment_changed(snapshot(client_id, agent_id), Some(agent_id));
    let report = h.engine.process_event(&event).await.unwrap();

    assert!(!report.trigger_enabled);
    assert!(h.sink.effects().is_empty());
}

#[tokio::test]
async fn client_audience_can_be_switched_off() {
    let client_id = Uuid::new_v4();
    let agent_id = Uuid::new_v4();
    let h = harness(
        StaticDirectory::default()
            .with_agent(agent_id, "ana@soporte.test")
            .with_contact(client_id, "compras@cliente.test", true),
    );
    h.store
        .upsert_event_config(&NotificationEventConfig {
            notify_client: false,
            ..NotificationEventConfig::enabled(TriggerKind::AgentReply)
        })
        .await
        .unwrap();
    h.add(
        &Workflow::new("Respuesta", TriggerKind::AgentReply, 1)
            .with_recipient("CLIENT_PRIMARY_CONTACT", None, false)
            .with_recipient("ASSIGNED_AGENT", None, true)
            .with_action("SEND_NOTIFICATION", None, 1),
    )
    .await;

    let event = TicketEvent::agent_reply(snapshot(client_id, agent_id), "Listo");
    h.engine.process_event(&event).await.unwrap();

    let sent = h.sink.notifications();
    assert_eq!(sent[0].recipients.len(), 1);
    assert_eq!(sent[0].cc_addresses().collect::<Vec<_>>(), vec!["ana@soporte.test"]);
}
