use axum::{response::IntoResponse, Json};

use super::transitions::StateClass;
use super::types::{StateId, TicketId};

/// Request rejected before any write happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: StateClass, to: StateClass },
    #[error("ticket is in unknown state {0}")]
    UnknownCurrentState(StateId),
    #[error("a reason is required for pending states")]
    ReasonRequired,
    #[error("pending time required for pending states")]
    PendingTimeRequired,
    #[error("invalid pending time format: {0}")]
    InvalidPendingTime(String),
    #[error("resolution notes are required to resolve a ticket")]
    ResolutionRequired,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("no tickets selected")]
    NoTicketsSelected,
    #[error("too many tickets selected: {count} exceeds the limit of {limit}")]
    TooManyTickets { count: usize, limit: usize },
    #[error("no source tickets to merge")]
    NoSourceTickets,
    #[error("ticket {0} is already merged")]
    AlreadyMerged(String),
    #[error("cannot merge into a {0} ticket")]
    InvalidMergeTarget(StateClass),
    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

impl ValidationError {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::IllegalTransition { .. } | Self::UnknownCurrentState(_) => "illegal_transition",
            Self::ReasonRequired => "reason_required",
            Self::PendingTimeRequired => "pending_time_required",
            Self::InvalidPendingTime(_) => "invalid_pending_time",
            Self::ResolutionRequired => "resolution_required",
            Self::PermissionDenied(_) => "permission_denied",
            Self::NoTicketsSelected => "no_tickets_selected",
            Self::TooManyTickets { .. } => "too_many_tickets",
            Self::NoSourceTickets => "no_source_tickets",
            Self::AlreadyMerged(_) => "already_merged",
            Self::InvalidMergeTarget(_) => "invalid_merge_target",
            Self::InvalidValue { .. } => "invalid_value",
        }
    }
}

/// Failure reported by a [`super::store::TicketStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("ticket {0} not found")]
    TicketNotFound(TicketId),
    #[error("rejected: {0}")]
    Rejected(#[from] ValidationError),
    #[error("article move failed: {0}")]
    ArticleMove(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(e: diesel::result::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Connection(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Ticket,
    State,
    Priority,
    Queue,
    User,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ticket => write!(f, "Ticket"),
            Self::State => write!(f, "State"),
            Self::Priority => write!(f, "Priority"),
            Self::Queue => write!(f, "Queue"),
            Self::User => write!(f, "User"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{kind} {id}: not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl LifecycleError {
    pub fn not_found(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::NotFound { .. } => "not_found",
            Self::Persistence(_) => "persistence_error",
        }
    }

    /// Short reason used in per-item batch errors (`"Ticket 7: <reason>"`).
    pub fn item_reason(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::NotFound { .. } => "not found".to_string(),
            Self::Persistence(_) => "update failed".to_string(),
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TicketNotFound(id) => Self::not_found(EntityKind::Ticket, id),
            StoreError::Rejected(v) => Self::Validation(v),
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let status = match &self {
            Self::Validation(ValidationError::PermissionDenied(_)) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.to_string(), "code": self.code() })),
        )
            .into_response()
    }
}
