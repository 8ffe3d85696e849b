// Ticket mutations requested by workflow actions

use async_trait::async_trait;
use soporte_shared::{MutableTicketField, TicketMutationRequest};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::{SinkError, TicketMutator};

/// Column written for each mutable field; never derived from user input
pub fn column_for(field: MutableTicketField) -> &'static str {
    match field {
        MutableTicketField::Status => "status",
        MutableTicketField::Priority => "priority",
        MutableTicketField::AssignedAgent => "assigned_to",
        MutableTicketField::TicketType => "ticket_type",
        MutableTicketField::Module => "module",
    }
}

pub struct PgTicketMutator {
    pool: PgPool,
}

impl PgTicketMutator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketMutator for PgTicketMutator {
    async fn apply(&self, request: &TicketMutationRequest) -> Result<(), SinkError> {
        let sql = format!(
            "UPDATE tickets SET {} = $2, updated_at = NOW() WHERE id = $1",
            column_for(request.field)
        );

        let query = sqlx::query(&sql).bind(request.ticket_id);
        let query = match request.field {
            MutableTicketField::AssignedAgent => {
                let agent_id = Uuid::parse_str(&request.value).map_err(|_| {
                    SinkError::Rejected(format!("'{}' is not an agent id", request.value))
                })?;
                query.bind(agent_id)
            }
            _ => query.bind(request.value.as_str()),
        };

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(SinkError::Rejected(format!(
                "ticket {} not found",
                request.ticket_id
            )));
        }

        info!(
            "Ticket {} {} set to {}",
            request.ticket_id,
            request.field.as_str(),
            request.value
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_are_fixed() {
        assert_eq!(column_for(MutableTicketField::Status), "status");
        assert_eq!(column_for(MutableTicketField::AssignedAgent), "assigned_to");
        assert_eq!(column_for(MutableTicketField::Module), "module");
    }
}
