// Workflow Conditions - Evaluation of a single condition row against an event

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use soporte_shared::WorkflowCondition;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use super::triggers::EventContext;

/// Separators accepted between the literals of an in-list value
pub const LIST_DELIMITERS: &[char] = &[',', ';'];

/// Ticket and event attributes a condition can inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionField {
    Priority,
    TicketType,
    Module,
    Channel,
    Status,
    PreviousStatus,
    ActorKind,
    ClientCode,
    CommercialUnit,
    Subject,
    Body,
    RequesterEmail,
    MessageCount,
    CreatedAt,
    OccurredAt,
}

/// Semantic type of a field, which decides how the condition value is parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Code,
    Text,
    Number,
    Timestamp,
}

/// Value extracted from the event for one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Absent,
    Code(String),
    Text(String),
    Number(Decimal),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    fn code(value: Option<&String>) -> Self {
        value.map_or(FieldValue::Absent, |v| FieldValue::Code(v.clone()))
    }

    fn text(value: Option<&String>) -> Self {
        value.map_or(FieldValue::Absent, |v| FieldValue::Text(v.clone()))
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Absent => true,
            FieldValue::Code(s) | FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Number(_) | FieldValue::Timestamp(_) => false,
        }
    }

    fn display(&self) -> String {
        match self {
            FieldValue::Absent => String::new(),
            FieldValue::Code(s) | FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Timestamp(t) => t.to_rfc3339(),
        }
    }
}

impl ConditionField {
    pub const ALL: [ConditionField; 15] = [
        ConditionField::Priority,
        ConditionField::TicketType,
        ConditionField::Module,
        ConditionField::Channel,
        ConditionField::Status,
        ConditionField::PreviousStatus,
        ConditionField::ActorKind,
        ConditionField::ClientCode,
        ConditionField::CommercialUnit,
        ConditionField::Subject,
        ConditionField::Body,
        ConditionField::RequesterEmail,
        ConditionField::MessageCount,
        ConditionField::CreatedAt,
        ConditionField::OccurredAt,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ConditionField::Priority => "PRIORITY",
            ConditionField::TicketType => "TIPO",
            ConditionField::Module => "MODULO",
            ConditionField::Channel => "CANAL",
            ConditionField::Status => "ESTADO",
            ConditionField::PreviousStatus => "ESTADO_ANTERIOR",
            ConditionField::ActorKind => "ACTOR",
            ConditionField::ClientCode => "CLIENTE",
            ConditionField::CommercialUnit => "UNIDAD_COMERCIAL",
            ConditionField::Subject => "ASUNTO",
            ConditionField::Body => "CUERPO",
            ConditionField::RequesterEmail => "SOLICITANTE",
            ConditionField::MessageCount => "MENSAJES",
            ConditionField::CreatedAt => "CREADO",
            ConditionField::OccurredAt => "FECHA_EVENTO",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            ConditionField::Priority
            | ConditionField::TicketType
            | ConditionField::Module
            | ConditionField::Channel
            | ConditionField::Status
            | ConditionField::PreviousStatus
            | ConditionField::ActorKind
            | ConditionField::ClientCode
            | ConditionField::CommercialUnit => FieldKind::Code,
            ConditionField::Subject | ConditionField::Body | ConditionField::RequesterEmail => {
                FieldKind::Text
            }
            ConditionField::MessageCount => FieldKind::Number,
            ConditionField::CreatedAt | ConditionField::OccurredAt => FieldKind::Timestamp,
        }
    }

    /// Pull this field's value out of the event snapshot
    pub fn extract(&self, ctx: &EventContext<'_>) -> FieldValue {
        let s = ctx.snapshot();
        match self {
            ConditionField::Priority => FieldValue::code(s.priority.as_ref()),
            ConditionField::TicketType => FieldValue::code(s.ticket_type.as_ref()),
            ConditionField::Module => FieldValue::code(s.module.as_ref()),
            ConditionField::Channel => FieldValue::code(s.channel.as_ref()),
            ConditionField::Status => FieldValue::code(s.status.as_ref()),
            ConditionField::PreviousStatus => FieldValue::code(s.previous_status.as_ref()),
            ConditionField::ActorKind => FieldValue::code(s.actor_kind.as_ref()),
            ConditionField::ClientCode => FieldValue::code(s.client_code.as_ref()),
            ConditionField::CommercialUnit => FieldValue::code(s.commercial_unit.as_ref()),
            ConditionField::Subject => FieldValue::text(s.subject.as_ref()),
            ConditionField::Body => FieldValue::text(s.body.as_ref()),
            ConditionField::RequesterEmail => FieldValue::text(s.requester_email.as_ref()),
            ConditionField::MessageCount => s
                .message_count
                .map_or(FieldValue::Absent, |n| FieldValue::Number(Decimal::from(n))),
            ConditionField::CreatedAt => s
                .created_at
                .map_or(FieldValue::Absent, FieldValue::Timestamp),
            ConditionField::OccurredAt => FieldValue::Timestamp(ctx.event().occurred_at),
        }
    }
}

impl fmt::Display for ConditionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase().replace(['-', ' '], "_")
}

impl FromStr for ConditionField {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match normalize_code(s).as_str() {
            "PRIORITY" | "PRIORIDAD" => ConditionField::Priority,
            "TIPO" | "TYPE" | "TICKET_TYPE" => ConditionField::TicketType,
            "MODULO" | "MODULE" => ConditionField::Module,
            "CANAL" | "CHANNEL" => ConditionField::Channel,
            "ESTADO" | "STATUS" => ConditionField::Status,
            "ESTADO_ANTERIOR" | "PREVIOUS_STATUS" => ConditionField::PreviousStatus,
            "ACTOR" | "ACTOR_KIND" | "TIPO_ACTOR" => ConditionField::ActorKind,
            "CLIENTE" | "CLIENT" | "CLIENT_CODE" => ConditionField::ClientCode,
            "UNIDAD_COMERCIAL" | "COMMERCIAL_UNIT" => ConditionField::CommercialUnit,
            "ASUNTO" | "SUBJECT" => ConditionField::Subject,
            "CUERPO" | "BODY" => ConditionField::Body,
            "SOLICITANTE" | "REQUESTER" | "REQUESTER_EMAIL" => ConditionField::RequesterEmail,
            "MENSAJES" | "MESSAGE_COUNT" => ConditionField::MessageCount,
            "CREADO" | "CREATED_AT" => ConditionField::CreatedAt,
            "FECHA_EVENTO" | "OCCURRED_AT" => ConditionField::OccurredAt,
            _ => return Err(ConditionError::UnknownField(s.to_string())),
        };
        Ok(field)
    }
}

/// Condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    InList,
    NotInList,
    IsEmpty,
    IsNotEmpty,
    GreaterThan,
    LessThan,
}

impl FromStr for ConditionOperator {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let operator = match normalize_code(s).as_str() {
            "EQUALS" | "EQ" | "==" | "IGUAL" => ConditionOperator::Equals,
            "NOT_EQUALS" | "NE" | "!=" | "DISTINTO" => ConditionOperator::NotEquals,
            "CONTAINS" | "CONTIENE" => ConditionOperator::Contains,
            "IN" | "IN_LIST" | "EN_LISTA" => ConditionOperator::InList,
            "NOT_IN" | "NOT_IN_LIST" | "NO_EN_LISTA" => ConditionOperator::NotInList,
            "IS_EMPTY" | "VACIO" => ConditionOperator::IsEmpty,
            "IS_NOT_EMPTY" | "NO_VACIO" => ConditionOperator::IsNotEmpty,
            "GREATER_THAN" | "GT" | ">" | "MAYOR_QUE" => ConditionOperator::GreaterThan,
            "LESS_THAN" | "LT" | "<" | "MENOR_QUE" => ConditionOperator::LessThan,
            _ => return Err(ConditionError::UnknownOperator(s.to_string())),
        };
        Ok(operator)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("unknown condition field '{0}'")]
    UnknownField(String),

    #[error("unknown condition operator '{0}'")]
    UnknownOperator(String),

    #[error("operator {0:?} requires a value")]
    MissingValue(ConditionOperator),

    #[error("'{value}' is not a valid {expected} for field {field}")]
    InvalidValue {
        field: ConditionField,
        value: String,
        expected: &'static str,
    },

    #[error("field {field} holds '{actual}', which cannot be compared numerically")]
    NotComparable { field: ConditionField, actual: String },
}

impl ConditionOperator {
    /// Apply the operator to an extracted value and the condition's raw value
    pub fn apply(
        &self,
        field: ConditionField,
        actual: &FieldValue,
        expected: Option<&str>,
    ) -> Result<bool, ConditionError> {
        match self {
            ConditionOperator::IsEmpty => Ok(actual.is_blank()),
            ConditionOperator::IsNotEmpty => Ok(!actual.is_blank()),
            ConditionOperator::Equals => {
                let expected = required(*self, expected)?;
                if *actual == FieldValue::Absent {
                    return Ok(false);
                }
                values_equal(field, actual, expected)
            }
            ConditionOperator::NotEquals => {
                let expected = required(*self, expected)?;
                if *actual == FieldValue::Absent {
                    return Ok(true);
                }
                values_equal(field, actual, expected).map(|eq| !eq)
            }
            ConditionOperator::Contains => {
                let expected = required(*self, expected)?;
                if *actual == FieldValue::Absent {
                    return Ok(false);
                }
                Ok(actual
                    .display()
                    .to_lowercase()
                    .contains(&expected.to_lowercase()))
            }
            ConditionOperator::InList | ConditionOperator::NotInList => {
                let items = parse_list(*self, expected)?;
                let negate = *self == ConditionOperator::NotInList;
                if *actual == FieldValue::Absent {
                    return Ok(negate);
                }
                let mut found = false;
                for item in items {
                    if values_equal(field, actual, item)? {
                        found = true;
                        break;
                    }
                }
                Ok(found != negate)
            }
            ConditionOperator::GreaterThan | ConditionOperator::LessThan => {
                let expected = required(*self, expected)?;
                if *actual == FieldValue::Absent {
                    return Ok(false);
                }
                let wanted = if *self == ConditionOperator::GreaterThan {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
                Ok(compare(field, actual, expected)? == wanted)
            }
        }
    }
}

fn required(operator: ConditionOperator, expected: Option<&str>) -> Result<&str, ConditionError> {
    match expected.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConditionError::MissingValue(operator)),
    }
}

fn parse_list(operator: ConditionOperator, expected: Option<&str>) -> Result<Vec<&str>, ConditionError> {
    let raw = required(operator, expected)?;
    let items: Vec<&str> = raw
        .split(LIST_DELIMITERS)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() {
        return Err(ConditionError::MissingValue(operator));
    }
    Ok(items)
}

fn parse_number(field: ConditionField, raw: &str) -> Result<Decimal, ConditionError> {
    Decimal::from_str(raw.trim()).map_err(|_| ConditionError::InvalidValue {
        field,
        value: raw.to_string(),
        expected: "number",
    })
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC)
fn parse_timestamp(field: ConditionField, raw: &str) -> Result<DateTime<Utc>, ConditionError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ConditionError::InvalidValue {
            field,
            value: raw.to_string(),
            expected: "date",
        })
}

fn values_equal(field: ConditionField, actual: &FieldValue, expected: &str) -> Result<bool, ConditionError> {
    match actual {
        FieldValue::Absent => Ok(false),
        FieldValue::Code(s) | FieldValue::Text(s) => Ok(s.trim() == expected.trim()),
        FieldValue::Number(n) => Ok(*n == parse_number(field, expected)?),
        FieldValue::Timestamp(t) => Ok(*t == parse_timestamp(field, expected)?),
    }
}

fn compare(field: ConditionField, actual: &FieldValue, expected: &str) -> Result<Ordering, ConditionError> {
    match actual {
        FieldValue::Number(n) => Ok(n.cmp(&parse_number(field, expected)?)),
        FieldValue::Timestamp(t) => Ok(t.cmp(&parse_timestamp(field, expected)?)),
        FieldValue::Code(s) | FieldValue::Text(s) => {
            let lhs = Decimal::from_str(s.trim()).map_err(|_| ConditionError::NotComparable {
                field,
                actual: s.clone(),
            })?;
            Ok(lhs.cmp(&parse_number(field, expected)?))
        }
        FieldValue::Absent => Err(ConditionError::NotComparable {
            field,
            actual: String::new(),
        }),
    }
}

/// Evaluate a condition, surfacing configuration errors
pub fn try_evaluate(condition: &WorkflowCondition, ctx: &EventContext<'_>) -> Result<bool, ConditionError> {
    let field: ConditionField = condition.field.parse()?;
    let operator: ConditionOperator = condition.operator.parse()?;
    let actual = field.extract(ctx);
    operator.apply(field, &actual, condition.value.as_deref())
}

/// Evaluate a condition; any configuration error counts as `false`
pub fn evaluate(condition: &WorkflowCondition, ctx: &EventContext<'_>) -> bool {
    match try_evaluate(condition, ctx) {
        Ok(result) => result,
        Err(e) => {
            warn!(
                workflow_id = %condition.workflow_id,
                condition_id = %condition.id,
                "Condition evaluation failed, treating as false: {}",
                e
            );
            false
        }
    }
}
