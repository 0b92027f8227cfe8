//! Audit log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Fetch,
    FetchAll,
    Update,
    Delete,
    Borrow,
    Return,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Fetch => "FETCH",
            AuditAction::FetchAll => "FETCH_ALL",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Borrow => "BORROW",
            AuditAction::Return => "RETURN",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entry handed to an audit sink. `entity_id` 0 marks bulk operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: i32,
    pub message: String,
    pub user_id: Option<i32>,
}

/// Stored audit log row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub entity_type: String,
    pub entity_id: i32,
    pub message: String,
    pub user_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}
