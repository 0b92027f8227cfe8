//! Business logic services

pub mod audit;
pub mod crud;
pub mod lending;

use std::sync::Arc;

use crate::{
    config::LendingConfig,
    error::AppResult,
    models::{Book, Student},
    repository::{LendingStore, Repository},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub books: crud::CrudService<Book>,
    pub students: crud::CrudService<Student>,
    pub lending: lending::LendingService,
    store: Arc<dyn LendingStore>,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, lending_config: &LendingConfig) -> Self {
        let audit = audit::AuditService::new(repository.audit);

        Self {
            books: crud::CrudService::new(repository.books, audit.clone()),
            students: crud::CrudService::new(repository.students, audit.clone()),
            lending: lending::LendingService::new(
                repository.lending.clone(),
                audit,
                lending::LendingPolicy::from(lending_config),
            ),
            store: repository.lending,
        }
    }

    /// Check that the backing store answers
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }
}
