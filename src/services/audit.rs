//! Best-effort audit logging

use std::sync::Arc;

use crate::{
    models::{AuditAction, AuditEntry},
    repository::AuditSink,
};

#[derive(Clone)]
pub struct AuditService {
    sink: Arc<dyn AuditSink>,
}

impl AuditService {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record an audit entry. Sink failures are logged and swallowed so they
    /// never fail the operation being audited.
    pub async fn record(
        &self,
        action: AuditAction,
        entity_type: &str,
        entity_id: i32,
        message: impl Into<String>,
        user_id: Option<i32>,
    ) {
        let entry = AuditEntry {
            action,
            entity_type: entity_type.to_string(),
            entity_id,
            message: message.into(),
            user_id,
        };

        match self.sink.record(&entry).await {
            Ok(()) => tracing::debug!(
                action = %entry.action,
                entity_type = %entry.entity_type,
                entity_id = entry.entity_id,
                "{}",
                entry.message
            ),
            Err(e) => tracing::warn!(
                action = %entry.action,
                entity_type = %entry.entity_type,
                entity_id = entry.entity_id,
                error = %e,
                "Failed to write audit log entry"
            ),
        }
    }
}
