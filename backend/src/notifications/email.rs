// Email delivery of workflow notifications

use async_trait::async_trait;
use regex::Regex;
use soporte_shared::NotificationRequest;
use sqlx::{FromRow, PgPool};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::{NotificationSink, SinkError};
use crate::services::{EmailService, OutgoingEmail};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("valid placeholder pattern"));

/// Stored message template, looked up by the code a workflow references
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct NotificationTemplate {
    pub code: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

/// Replace `{{name}}` placeholders with values from the request variables.
/// Unknown placeholders are left as they are.
pub fn render_placeholders(template: &str, variables: &serde_json::Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let mut current = variables;
            for part in caps[1].split('.') {
                match current.get(part) {
                    Some(v) => current = v,
                    None => return caps[0].to_string(),
                }
            }
            match current {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            }
        })
        .into_owned()
}

/// Turn a notification request into an email, using the template when one was found
pub fn compose(request: &NotificationRequest, template: Option<&NotificationTemplate>) -> OutgoingEmail {
    let vars = &request.variables;
    let subject = render_placeholders(&request.subject, vars);

    let (html_body, text_body) = match template {
        Some(t) => {
            let html = render_placeholders(&t.html_body, vars);
            let text = t
                .text_body
                .as_deref()
                .map(|body| render_placeholders(body, vars))
                .unwrap_or_else(|| default_text(&subject, vars));
            (html, text)
        }
        None => {
            let text = default_text(&subject, vars);
            let html = format!("<html><body><pre>{}</pre></body></html>", escape_html(&text));
            (html, text)
        }
    };

    OutgoingEmail {
        to: request.to_addresses().map(str::to_string).collect(),
        cc: request.cc_addresses().map(str::to_string).collect(),
        subject,
        html_body,
        text_body,
    }
}

fn default_text(subject: &str, vars: &serde_json::Value) -> String {
    let field = |name: &str| match vars.get(name) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    };
    format!(
        "{}\n\nTicket #{}\nEstado: {}\nPrioridad: {}\n\n{}",
        subject,
        field("ticket_number"),
        field("status"),
        field("priority"),
        field("body"),
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub struct EmailNotificationSink {
    email: EmailService,
    pool: PgPool,
}

impl EmailNotificationSink {
    pub fn new(email: EmailService, pool: PgPool) -> Self {
        Self { email, pool }
    }

    async fn load_template(&self, code: &str) -> Result<Option<NotificationTemplate>, SinkError> {
        let template = sqlx::query_as::<_, NotificationTemplate>(
            "SELECT code, html_body, text_body FROM notification_templates WHERE code = $1 AND active = true",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        if template.is_none() {
            warn!("Notification template '{}' not found, using default body", code);
        }
        Ok(template)
    }
}

#[async_trait]
impl NotificationSink for EmailNotificationSink {
    async fn send(&self, request: &NotificationRequest) -> Result<(), SinkError> {
        let template = match request.template_ref.as_deref() {
            Some(code) => self.load_template(code).await?,
            None => None,
        };

        let email = compose(request, template.as_ref());
        debug!(
            workflow_id = %request.workflow_id,
            action_id = %request.action_id,
            "Sending workflow notification '{}'",
            email.subject
        );
        self.email.send(&email).await.map_err(SinkError::from)
    }
}
