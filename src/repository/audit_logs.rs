//! Audit logs repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{error::AppResult, models::AuditEntry};

use super::AuditSink;

#[derive(Clone)]
pub struct AuditLogsRepository {
    pool: Pool<Postgres>,
}

impl AuditLogsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for AuditLogsRepository {
    async fn record(&self, entry: &AuditEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (action, entity_type, entity_id, message, user_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.action.as_str())
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.message)
        .bind(entry.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
