//! Library lending server
//!
//! REST JSON API for a campus library: a book catalog, a student register,
//! and borrow/return bookkeeping that keeps stock counts consistent under
//! concurrent requests.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
