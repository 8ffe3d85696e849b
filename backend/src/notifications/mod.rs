// Notification sinks - the effect boundary of the workflow engine
//
// The dispatcher hands every effect to one of two collaborators: a
// `NotificationSink` for outgoing messages and a `TicketMutator` for ticket
// field changes. Retries, backoff and timeouts are layered on with `WithRetry`.

pub mod email;
pub mod retry;
pub mod tickets;

use async_trait::async_trait;
use soporte_shared::{NotificationRequest, TicketMutationRequest};
use std::time::Duration;
use thiserror::Error;

pub use email::EmailNotificationSink;
pub use retry::{RetryConfig, RetryPolicy, WithRetry, MAX_RETRIES_CEILING};
pub use tickets::PgTicketMutator;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transient delivery failure: {0}")]
    Transient(String),

    #[error("delivery rejected: {0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl SinkError {
    /// Transient failures are worth another attempt; everything else is final
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Transient(_) | SinkError::Timeout(_) => true,
            SinkError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            ),
            SinkError::Rejected(_) | SinkError::Exhausted { .. } => false,
        }
    }
}

/// Delivers a rendered notification to its recipients
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, request: &NotificationRequest) -> Result<(), SinkError>;
}

/// Applies a field change to a ticket on behalf of a workflow
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketMutator: Send + Sync {
    async fn apply(&self, request: &TicketMutationRequest) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SinkError::Transient("421 try later".into()).is_transient());
        assert!(SinkError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(SinkError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!SinkError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!SinkError::Rejected("550 mailbox unavailable".into()).is_transient());
        assert!(
            !SinkError::Exhausted {
                attempts: 3,
                last_error: "timeout".into()
            }
            .is_transient()
        );
    }
}
