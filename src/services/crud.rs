//! Generic create/read/update/delete service shared by books and students

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{AuditAction, Entity},
    repository::CrudRepository,
};

use super::audit::AuditService;

#[derive(Clone)]
pub struct CrudService<E: Entity> {
    repository: Arc<dyn CrudRepository<E>>,
    audit: AuditService,
}

impl<E: Entity> CrudService<E> {
    pub fn new(repository: Arc<dyn CrudRepository<E>>, audit: AuditService) -> Self {
        Self { repository, audit }
    }

    pub async fn create(&self, data: E::Create, user_id: Option<i32>) -> AppResult<E> {
        let entity = self.repository.create(&data).await?;

        self.audit
            .record(
                AuditAction::Create,
                E::NAME,
                entity.id(),
                format!("{} created successfully", E::NAME),
                user_id,
            )
            .await;

        Ok(entity)
    }

    pub async fn find_all(&self, filter: &E::Filter) -> AppResult<Vec<E>> {
        let entities = self.repository.find_all(filter).await?;

        self.audit
            .record(
                AuditAction::FetchAll,
                E::NAME,
                0,
                format!("Fetched {} {} records", entities.len(), E::NAME.to_lowercase()),
                None,
            )
            .await;

        Ok(entities)
    }

    pub async fn find_by_id(&self, id: i32, user_id: Option<i32>) -> AppResult<E> {
        let entity = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(E::NAME, id))?;

        self.audit
            .record(
                AuditAction::Fetch,
                E::NAME,
                id,
                format!("Fetched {} with ID: {}", E::NAME.to_lowercase(), id),
                user_id,
            )
            .await;

        Ok(entity)
    }

    pub async fn update(&self, id: i32, data: E::Update, user_id: Option<i32>) -> AppResult<E> {
        let entity = self
            .repository
            .update(id, &data)
            .await?
            .ok_or_else(|| AppError::not_found(E::NAME, id))?;

        self.audit
            .record(
                AuditAction::Update,
                E::NAME,
                id,
                format!("{} with ID: {} updated successfully", E::NAME, id),
                user_id,
            )
            .await;

        Ok(entity)
    }

    pub async fn delete(&self, id: i32, user_id: Option<i32>) -> AppResult<E> {
        let entity = self
            .repository
            .delete(id)
            .await?
            .ok_or_else(|| AppError::not_found(E::NAME, id))?;

        self.audit
            .record(
                AuditAction::Delete,
                E::NAME,
                id,
                format!("{} with ID: {} deleted successfully", E::NAME, id),
                user_id,
            )
            .await;

        Ok(entity)
    }
}
